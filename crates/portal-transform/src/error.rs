use http::StatusCode;
use portal_core::HttpError;
use thiserror::Error;

/// Errors raised while converting between wire formats and the unified
/// request/response model, or while talking to an upstream provider
#[derive(Debug, Error)]
pub enum TransformError {
    /// Requested model was not found in the registry
    #[error("model not found: {model}")]
    ModelNotFound {
        /// The model identifier that could not be resolved
        model: String,
    },

    /// No transformer is registered for the requested wire format
    #[error("unsupported api format: {format}")]
    UnsupportedFormat {
        /// The requested format slug
        format: String,
    },

    /// Upstream provider returned a non-2xx response
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error decoding a streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client has exceeded a rate limit reported by the upstream provider
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the rate limit resets, if the provider reported one
        retry_after: Option<u64>,
    },

    /// Transport-level failure reaching the upstream provider
    #[error("transport error: {0}")]
    Transport(#[from] portal_core::KernelError),
}

impl TransformError {
    /// Whether this error indicates a transient provider issue worth
    /// retrying (same channel or failing over to another channel)
    ///
    /// Grounded on the retryability classification used by the pipeline's
    /// failover loop: only errors that plausibly succeed on a retry are
    /// worth spending a retry budget on.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Streaming(_) | Self::RateLimited { .. } | Self::Transport(_))
    }
}

impl HttpError for TransformError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelNotFound { .. } | Self::UnsupportedFormat { .. } => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Streaming(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::ModelNotFound { .. } => "model_not_found",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Upstream(_) => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::Transport(_) => "transport_error",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
