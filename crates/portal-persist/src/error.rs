use http::StatusCode;
use portal_core::HttpError;
use thiserror::Error;

/// Errors raised by the persistence bridge and its storage sinks
#[derive(Debug, Error)]
pub enum PersistError {
    /// The referenced request/execution/chunk does not exist
    #[error("record not found: {0}")]
    NotFound(String),

    /// An `Execution` transition was attempted that the state machine
    /// (`Created -> Sent -> {Completed, Failed}`, terminal states immutable)
    /// does not allow
    #[error("invalid execution transition: {0}")]
    InvalidTransition(String),

    /// A listing query omitted both `first` and `last`, or requested more
    /// than the 1000-row pagination bound
    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    /// The underlying storage backend failed
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl HttpError for PersistError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition(_) | Self::InvalidPagination(_) => StatusCode::BAD_REQUEST,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition(_) => "invalid_execution_transition",
            Self::InvalidPagination(_) => "invalid_pagination",
            Self::Backend(_) => "storage_backend_error",
        }
    }

    fn client_message(&self) -> String {
        self.to_string()
    }
}
