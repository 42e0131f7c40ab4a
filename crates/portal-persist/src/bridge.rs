//! The persistence bridge: the only code path allowed to write audit
//! records, running under the System principal with a scoped bypass
//!
//! Every write binds its own System-principal [`RequestContext`] rather
//! than accepting the caller's — the pipeline observes a request under
//! whatever principal the client authenticated as, but the audit trail
//! itself is a System-principal concern, matching the kernel's rule that
//! a bypass may only be established by System (or Test, in test mode).

use std::sync::Arc;

use portal_core::{Principal, RequestContext, run_with_bypass, with_principal};

use crate::error::PersistError;
use crate::record::{ExecutionMetrics, ExecutionRecord, ExecutionStatus, RequestRecord, StreamChunkRecord};
use crate::sink::{NewExecution, NewRequest, NewStreamChunk, PageBounds, StorageSink};

/// Reason token attached to every bypass the bridge establishes
pub const AUDIT_BYPASS_REASON: &str = "pipeline-audit";

/// Wraps a [`StorageSink`] with the principal/bypass ceremony every write
/// must go through
///
/// Reads (the `list_*` methods) don't touch privacy-sensitive state beyond
/// what the sink itself already scopes, so they pass straight through
/// without establishing a bypass.
#[derive(Clone)]
pub struct PersistenceBridge {
    sink: Arc<dyn StorageSink>,
}

impl PersistenceBridge {
    /// Wrap a storage sink
    #[must_use]
    pub fn new(sink: Arc<dyn StorageSink>) -> Self {
        Self { sink }
    }

    fn system_context() -> Result<RequestContext, PersistError> {
        let ctx = RequestContext::empty();
        with_principal(&ctx, Principal::System)
            .map_err(|err| PersistError::Backend(format!("failed to bind system principal: {err}")))
    }

    /// Record a new inbound request
    ///
    /// # Errors
    /// Propagates the sink's error, or fails if the System bypass cannot be
    /// established (only possible if the kernel's principal invariants are
    /// violated).
    pub async fn record_request(&self, input: NewRequest) -> Result<RequestRecord, PersistError> {
        let ctx = Self::system_context()?;
        let sink = self.sink.clone();
        run_with_bypass(&ctx, AUDIT_BYPASS_REASON, || async move { sink.create_request(input).await })
            .await
            .map_err(|err| PersistError::Backend(format!("bypass denied: {err}")))?
    }

    /// Record a new execution attempt, in the `Created` state
    ///
    /// # Errors
    /// Propagates the sink's error.
    pub async fn record_execution_created(&self, input: NewExecution) -> Result<ExecutionRecord, PersistError> {
        let ctx = Self::system_context()?;
        let sink = self.sink.clone();
        run_with_bypass(&ctx, AUDIT_BYPASS_REASON, || async move { sink.append_execution(input).await })
            .await
            .map_err(|err| PersistError::Backend(format!("bypass denied: {err}")))?
    }

    /// Mark an execution as sent (first byte written upstream)
    ///
    /// # Errors
    /// Propagates [`PersistError::InvalidTransition`] if the execution is
    /// already terminal, or the sink's own error.
    pub async fn mark_sent(&self, execution_id: &str) -> Result<ExecutionRecord, PersistError> {
        self.transition(execution_id, ExecutionStatus::Sent, None, ExecutionMetrics::default()).await
    }

    /// Mark an execution as completed, with final metrics
    ///
    /// # Errors
    /// Propagates [`PersistError::InvalidTransition`] if the execution is
    /// already terminal, or the sink's own error.
    pub async fn mark_completed(&self, execution_id: &str, metrics: ExecutionMetrics) -> Result<ExecutionRecord, PersistError> {
        self.transition(execution_id, ExecutionStatus::Completed, None, metrics).await
    }

    /// Mark an execution as failed, recording an error taxonomy slug
    ///
    /// # Errors
    /// Propagates [`PersistError::InvalidTransition`] if the execution is
    /// already terminal, or the sink's own error.
    pub async fn mark_failed(&self, execution_id: &str, error_kind: impl Into<String>, metrics: ExecutionMetrics) -> Result<ExecutionRecord, PersistError> {
        self.transition(execution_id, ExecutionStatus::Failed, Some(error_kind.into()), metrics).await
    }

    async fn transition(
        &self,
        execution_id: &str,
        next: ExecutionStatus,
        error_kind: Option<String>,
        metrics: ExecutionMetrics,
    ) -> Result<ExecutionRecord, PersistError> {
        let ctx = Self::system_context()?;
        let sink = self.sink.clone();
        let execution_id = execution_id.to_owned();
        run_with_bypass(&ctx, AUDIT_BYPASS_REASON, || async move {
            sink.transition_execution(&execution_id, next, error_kind, metrics).await
        })
        .await
        .map_err(|err| PersistError::Backend(format!("bypass denied: {err}")))?
    }

    /// Append one received stream chunk for an execution
    ///
    /// # Errors
    /// Propagates the sink's error.
    pub async fn record_stream_chunk(&self, input: NewStreamChunk) -> Result<StreamChunkRecord, PersistError> {
        let ctx = Self::system_context()?;
        let sink = self.sink.clone();
        run_with_bypass(&ctx, AUDIT_BYPASS_REASON, || async move { sink.append_stream_chunk(input).await })
            .await
            .map_err(|err| PersistError::Backend(format!("bypass denied: {err}")))?
    }

    /// List stream chunks for one execution
    ///
    /// # Errors
    /// Propagates [`PersistError::InvalidPagination`] or the sink's own
    /// error.
    pub async fn list_stream_chunks(
        &self,
        request_id: &str,
        execution_id: &str,
        bounds: PageBounds,
    ) -> Result<Vec<StreamChunkRecord>, PersistError> {
        self.sink.list_stream_chunks(request_id, execution_id, bounds).await
    }

    /// List executions for one request, in attempt order
    ///
    /// # Errors
    /// Propagates [`PersistError::InvalidPagination`] or the sink's own
    /// error.
    pub async fn list_executions(&self, request_id: &str, bounds: PageBounds) -> Result<Vec<ExecutionRecord>, PersistError> {
        self.sink.list_executions(request_id, bounds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySink;

    fn bridge() -> PersistenceBridge {
        PersistenceBridge::new(Arc::new(InMemorySink::new()))
    }

    fn new_request() -> NewRequest {
        NewRequest {
            project_id: None,
            principal: "user".to_owned(),
            model: "gpt-4o".to_owned(),
            request_type: "chat".to_owned(),
            api_format: "openai".to_owned(),
            stored_body_key: "body_1".to_owned(),
        }
    }

    #[tokio::test]
    async fn full_lifecycle_through_the_bridge() {
        let bridge = bridge();
        let request = bridge.record_request(new_request()).await.unwrap();

        let execution = bridge
            .record_execution_created(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Created);

        bridge.mark_sent(&execution.id).await.unwrap();
        let completed = bridge.mark_completed(&execution.id, ExecutionMetrics { latency_ms: Some(120), ..Default::default() }).await.unwrap();
        assert_eq!(completed.status, ExecutionStatus::Completed);

        let listed = bridge.list_executions(&request.id, PageBounds { first: Some(10), last: None }).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, execution.id);
    }

    #[tokio::test]
    async fn failed_attempt_records_error_kind() {
        let bridge = bridge();
        let request = bridge.record_request(new_request()).await.unwrap();
        let execution = bridge
            .record_execution_created(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();

        let failed = bridge.mark_failed(&execution.id, "upstream_timeout", ExecutionMetrics::default()).await.unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error_kind.as_deref(), Some("upstream_timeout"));
    }

    #[tokio::test]
    async fn second_attempt_after_failure_gets_its_own_row() {
        let bridge = bridge();
        let request = bridge.record_request(new_request()).await.unwrap();

        let first = bridge
            .record_execution_created(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();
        bridge.mark_failed(&first.id, "connect_error", ExecutionMetrics::default()).await.unwrap();

        let second = bridge
            .record_execution_created(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 1,
                channel_id: "chan_b".to_owned(),
            })
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let listed = bridge.list_executions(&request.id, PageBounds { first: Some(10), last: None }).await.unwrap();
        assert_eq!(listed.len(), 2);
    }
}
