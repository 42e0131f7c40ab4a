use http::StatusCode;
use portal_core::HttpError;
use portal_transform::TransformError;
use thiserror::Error;

/// Errors surfaced by a middleware hook
///
/// A request-phase error short-circuits the pipeline without retry; a
/// response-phase error is folded into [`PipelineError`] and is subject to
/// the same retry policy as a transport failure.
#[derive(Debug, Error)]
#[error("middleware {middleware} failed: {message}")]
pub struct MiddlewareError {
    /// Name of the middleware that raised the error
    pub middleware: &'static str,
    /// Human-readable detail
    pub message: String,
}

impl MiddlewareError {
    /// Build a middleware error
    pub fn new(middleware: &'static str, message: impl Into<String>) -> Self {
        Self {
            middleware,
            message: message.into(),
        }
    }
}

/// Errors raised while driving one pipeline invocation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A request-phase middleware rejected the request before any upstream
    /// call was attempted. Never retried: no upstream attempt has happened
    /// yet for a same-channel retry or failover to act on.
    #[error("request rejected by middleware: {0}")]
    RequestRejected(#[from] MiddlewareError),

    /// A response-phase middleware (`OnOutboundRaw{Response,Stream}`,
    /// `OnOutboundLlm{Response,Stream}`, `OnInboundRawResponse`) rejected an
    /// attempt after an upstream call already completed. Distinguished from
    /// `RequestRejected` so the retry loop can subject it to the same
    /// same-channel/cross-channel policy as a transport failure, per §4.7.
    #[error("response rejected by middleware: {0}")]
    ResponsePhaseRejected(MiddlewareError),

    /// The transformer registry or a transformer call failed
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The persistence bridge failed to record an audit row
    #[error("persistence error: {0}")]
    Persist(#[from] portal_persist::PersistError),

    /// The caller's context was cancelled or its deadline was exceeded
    /// before the pipeline could complete
    #[error("request cancelled or deadline exceeded")]
    Cancelled,

    /// Every retry/failover strategy was exhausted and the last upstream
    /// attempt still failed
    #[error("retries exhausted: {0}")]
    RetriesExhausted(Box<TransformError>),
}

impl HttpError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestRejected(_) | Self::ResponsePhaseRejected(_) => StatusCode::BAD_REQUEST,
            Self::Transform(err) => err.status_code(),
            Self::Persist(err) => err.status_code(),
            Self::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::RetriesExhausted(err) => err.status_code(),
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::RequestRejected(_) => "middleware_rejected",
            Self::ResponsePhaseRejected(_) => "middleware_rejected_response_phase",
            Self::Transform(err) => err.error_type(),
            Self::Persist(err) => err.error_type(),
            Self::Cancelled => "cancelled",
            Self::RetriesExhausted(_) => "retries_exhausted",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
