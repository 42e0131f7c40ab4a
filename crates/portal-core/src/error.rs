use http::StatusCode;
use thiserror::Error;

/// Trait for domain errors that can be converted to HTTP responses
///
/// Implemented by each feature crate's error type. The server layer
/// converts these into actual HTTP responses, keeping domain errors
/// decoupled from axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `invalid_request_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}

/// Errors raised by the principal/bypass kernel and the scope engine
///
/// These are kernel violations: they are never retried by the pipeline,
/// regardless of any `ChannelRetryable`/`Retryable` capability the
/// outbound transformer may implement.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A second, non-equal principal was bound to a context that already
    /// carries one
    #[error("principal already bound to this context")]
    PrincipalConflict,

    /// An operation required a bound principal but none was present
    #[error("no principal bound to this context")]
    NoPrincipal,

    /// An operation required the System principal but a different one was
    /// bound
    #[error("operation requires the system principal")]
    NotSystem,

    /// `with_bypass` was attempted by a principal other than System (or
    /// Test in test mode)
    #[error("bypass may only be attached by the system principal")]
    BypassForbidden,

    /// The scope engine denied the requested operation
    #[error("principal lacks required scope: {scope}")]
    InsufficientScope {
        /// Scope slug that was denied
        scope: String,
    },

    /// The executor failed to send a request or decode a response
    #[error("transport error: {0}")]
    Transport(String),
}

impl HttpError for KernelError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PrincipalConflict | Self::NoPrincipal => StatusCode::UNAUTHORIZED,
            Self::NotSystem | Self::BypassForbidden | Self::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::PrincipalConflict => "principal_conflict",
            Self::NoPrincipal => "no_principal",
            Self::NotSystem => "not_system",
            Self::BypassForbidden => "bypass_forbidden",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::Transport(_) => "transport_error",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
