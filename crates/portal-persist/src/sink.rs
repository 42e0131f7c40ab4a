//! The abstracted storage sink the persistence bridge writes through
//!
//! Concrete schema and ORM code generation stay outside this crate;
//! this trait is the seam a real deployment's database layer implements.

use async_trait::async_trait;

use crate::error::PersistError;
use crate::record::{ExecutionRecord, ExecutionStatus, RequestRecord, StreamChunkRecord};

/// Fields needed to create a new `Request` row
#[derive(Debug, Clone)]
pub struct NewRequest {
    /// Owning project, if the principal is project-scoped
    pub project_id: Option<String>,
    /// Label of the principal that submitted the request
    pub principal: String,
    /// Requested model identifier
    pub model: String,
    /// `"chat" | "image" | "embedding" | "rerank"`
    pub request_type: String,
    /// Client wire format, e.g. `"openai"`
    pub api_format: String,
    /// Opaque key into wherever the raw body is stored
    pub stored_body_key: String,
}

/// Fields needed to create a new `Execution` row
#[derive(Debug, Clone)]
pub struct NewExecution {
    /// Owning request
    pub request_id: String,
    /// Attempt counter within the request; the idempotency key alongside
    /// `request_id`
    pub attempt_index: u32,
    /// Channel this attempt targets
    pub channel_id: String,
}

/// Fields needed to append a new `StreamChunk` row
#[derive(Debug, Clone)]
pub struct NewStreamChunk {
    /// Owning request
    pub request_id: String,
    /// Owning execution attempt
    pub execution_id: String,
    /// Arrival order within `(request_id, execution_id)`
    pub index: u32,
    /// Raw event payload bytes
    pub bytes: Vec<u8>,
}

/// A page-bounded listing request: callers must supply at least one of
/// `first`/`last` and a ceiling of 1000, with no silent default
#[derive(Debug, Clone, Copy, Default)]
pub struct PageBounds {
    /// Return at most this many rows from the start of the ordered set
    pub first: Option<u32>,
    /// Return at most this many rows from the end of the ordered set
    pub last: Option<u32>,
}

/// Maximum rows a single listing query may request
pub const MAX_PAGE_SIZE: u32 = 1000;

impl PageBounds {
    /// Validate that at least one of `first`/`last`
    /// must be set, and neither may exceed [`MAX_PAGE_SIZE`]
    ///
    /// # Errors
    /// Returns [`PersistError::InvalidPagination`] if both are absent or
    /// either exceeds the bound.
    pub fn validate(self) -> Result<(), PersistError> {
        if self.first.is_none() && self.last.is_none() {
            return Err(PersistError::InvalidPagination("at least one of first/last is required".to_owned()));
        }
        if self.first.is_some_and(|n| n > MAX_PAGE_SIZE) || self.last.is_some_and(|n| n > MAX_PAGE_SIZE) {
            return Err(PersistError::InvalidPagination(format!("first/last must not exceed {MAX_PAGE_SIZE}")));
        }
        Ok(())
    }
}

/// Pure writer/reader surface the persistence bridge drives
///
/// Implemented once per concrete storage backend; `portal-persist` ships
/// only an in-memory reference implementation ([`crate::memory::InMemorySink`])
/// for tests and the demo binary.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Create a new `Request` row
    async fn create_request(&self, input: NewRequest) -> Result<RequestRecord, PersistError>;

    /// Append a new `Execution` row
    ///
    /// Idempotent on `(request_id, attempt_index)`: a second call with the
    /// same pair returns the existing row rather than creating a
    /// duplicate, so a retried pipeline iteration that re-enters this call
    /// after a partial write doesn't fork the audit trail.
    async fn append_execution(&self, input: NewExecution) -> Result<ExecutionRecord, PersistError>;

    /// Apply a status transition to an existing `Execution` row
    async fn transition_execution(
        &self,
        execution_id: &str,
        next: ExecutionStatus,
        error_kind: Option<String>,
        metrics: crate::record::ExecutionMetrics,
    ) -> Result<ExecutionRecord, PersistError>;

    /// Append a new `StreamChunk` row
    async fn append_stream_chunk(&self, input: NewStreamChunk) -> Result<StreamChunkRecord, PersistError>;

    /// List the `StreamChunk` rows for one execution, in arrival order
    async fn list_stream_chunks(
        &self,
        request_id: &str,
        execution_id: &str,
        bounds: PageBounds,
    ) -> Result<Vec<StreamChunkRecord>, PersistError>;

    /// List `Execution` rows for a request, in attempt order
    async fn list_executions(&self, request_id: &str, bounds: PageBounds) -> Result<Vec<ExecutionRecord>, PersistError>;
}
