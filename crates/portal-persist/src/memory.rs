//! In-memory reference [`StorageSink`], used by tests and the demo binary
//!
//! Writes are funneled through a single lock rather than a database
//! transaction, which gives the per-`request_id` serialization that
//! `append_execution`/`append_stream_chunk` need without requiring a real
//! backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PersistError;
use crate::record::{ExecutionMetrics, ExecutionRecord, ExecutionStatus, RequestRecord, StreamChunkRecord};
use crate::sink::{NewExecution, NewRequest, NewStreamChunk, PageBounds, StorageSink};

#[derive(Default)]
struct Inner {
    requests: HashMap<String, RequestRecord>,
    executions: HashMap<String, ExecutionRecord>,
    /// `(request_id, attempt_index) -> execution_id`, for idempotent
    /// `append_execution`
    execution_index: HashMap<(String, u32), String>,
    chunks: HashMap<(String, String), Vec<StreamChunkRecord>>,
}

/// In-memory `StorageSink`. Not durable; exists for tests and the demo
/// binary; a real deployment swaps in a database-backed sink.
pub struct InMemorySink {
    inner: Arc<Mutex<Inner>>,
    next_id: AtomicU64,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySink {
    /// Build an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            next_id: AtomicU64::new(1),
        }
    }

    fn generate_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{n}")
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Apply `first`/`last` bounds to an already-ordered slice
fn paginate<T: Clone>(items: &[T], bounds: PageBounds) -> Result<Vec<T>, PersistError> {
    bounds.validate()?;
    let mut out = items.to_vec();
    if let Some(first) = bounds.first {
        out.truncate(first as usize);
    }
    if let Some(last) = bounds.last {
        let len = out.len();
        let start = len.saturating_sub(last as usize);
        out = out[start..].to_vec();
    }
    Ok(out)
}

#[async_trait]
impl StorageSink for InMemorySink {
    async fn create_request(&self, input: NewRequest) -> Result<RequestRecord, PersistError> {
        let id = self.generate_id("req");
        let record = RequestRecord {
            id: id.clone(),
            project_id: input.project_id,
            principal: input.principal,
            model: input.model,
            request_type: input.request_type,
            api_format: input.api_format,
            stored_body_key: input.stored_body_key,
            created_at: unix_now(),
        };
        self.inner.lock().await.requests.insert(id, record.clone());
        Ok(record)
    }

    async fn append_execution(&self, input: NewExecution) -> Result<ExecutionRecord, PersistError> {
        let mut inner = self.inner.lock().await;
        let key = (input.request_id.clone(), input.attempt_index);
        if let Some(existing_id) = inner.execution_index.get(&key) {
            return inner
                .executions
                .get(existing_id)
                .cloned()
                .ok_or_else(|| PersistError::Backend("execution index pointed at a missing row".to_owned()));
        }

        let id = self.generate_id("exec");
        let record = ExecutionRecord {
            id: id.clone(),
            request_id: input.request_id,
            attempt_index: input.attempt_index,
            channel_id: input.channel_id,
            status: ExecutionStatus::Created,
            error_kind: None,
            metrics: ExecutionMetrics::default(),
            stored_body_key: None,
            created_at: unix_now(),
        };
        inner.execution_index.insert(key, id.clone());
        inner.executions.insert(id, record.clone());
        Ok(record)
    }

    async fn transition_execution(
        &self,
        execution_id: &str,
        next: ExecutionStatus,
        error_kind: Option<String>,
        metrics: ExecutionMetrics,
    ) -> Result<ExecutionRecord, PersistError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .executions
            .get_mut(execution_id)
            .ok_or_else(|| PersistError::NotFound(format!("execution {execution_id}")))?;
        record.transition(next)?;
        if next == ExecutionStatus::Failed {
            record.error_kind = error_kind;
        }
        record.metrics = metrics;
        Ok(record.clone())
    }

    async fn append_stream_chunk(&self, input: NewStreamChunk) -> Result<StreamChunkRecord, PersistError> {
        let record = StreamChunkRecord {
            request_id: input.request_id.clone(),
            execution_id: input.execution_id.clone(),
            index: input.index,
            bytes: input.bytes,
            created_at: unix_now(),
        };
        let mut inner = self.inner.lock().await;
        inner
            .chunks
            .entry((input.request_id, input.execution_id))
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list_stream_chunks(
        &self,
        request_id: &str,
        execution_id: &str,
        bounds: PageBounds,
    ) -> Result<Vec<StreamChunkRecord>, PersistError> {
        let inner = self.inner.lock().await;
        let chunks = inner
            .chunks
            .get(&(request_id.to_owned(), execution_id.to_owned()))
            .cloned()
            .unwrap_or_default();
        paginate(&chunks, bounds)
    }

    async fn list_executions(&self, request_id: &str, bounds: PageBounds) -> Result<Vec<ExecutionRecord>, PersistError> {
        let inner = self.inner.lock().await;
        let mut executions: Vec<ExecutionRecord> = inner
            .executions
            .values()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.attempt_index);
        paginate(&executions, bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request() -> NewRequest {
        NewRequest {
            project_id: Some("proj_1".to_owned()),
            principal: "system".to_owned(),
            model: "gpt-4o".to_owned(),
            request_type: "chat".to_owned(),
            api_format: "openai".to_owned(),
            stored_body_key: "body_1".to_owned(),
        }
    }

    #[tokio::test]
    async fn append_execution_is_idempotent_on_request_and_attempt() {
        let sink = InMemorySink::new();
        let request = sink.create_request(new_request()).await.unwrap();

        let first = sink
            .append_execution(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();
        let second = sink
            .append_execution(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_b".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.channel_id, "chan_a", "idempotent replay keeps the original row");
    }

    #[tokio::test]
    async fn stream_chunks_persist_in_arrival_order() {
        let sink = InMemorySink::new();
        let request = sink.create_request(new_request()).await.unwrap();
        let execution = sink
            .append_execution(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();

        for i in 0..3 {
            sink.append_stream_chunk(NewStreamChunk {
                request_id: request.id.clone(),
                execution_id: execution.id.clone(),
                index: i,
                bytes: format!("chunk-{i}").into_bytes(),
            })
            .await
            .unwrap();
        }

        let chunks = sink
            .list_stream_chunks(&request.id, &execution.id, PageBounds { first: Some(10), last: None })
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].bytes, b"chunk-0");
        assert_eq!(chunks[2].bytes, b"chunk-2");
    }

    #[tokio::test]
    async fn listing_without_first_or_last_is_rejected() {
        let sink = InMemorySink::new();
        let request = sink.create_request(new_request()).await.unwrap();
        let err = sink.list_executions(&request.id, PageBounds::default()).await.unwrap_err();
        assert!(matches!(err, PersistError::InvalidPagination(_)));
    }

    #[tokio::test]
    async fn listing_above_max_page_size_is_rejected() {
        let sink = InMemorySink::new();
        let request = sink.create_request(new_request()).await.unwrap();
        let err = sink
            .list_executions(&request.id, PageBounds { first: Some(1001), last: None })
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidPagination(_)));
    }

    #[tokio::test]
    async fn execution_transitions_through_sink_enforce_state_machine() {
        let sink = InMemorySink::new();
        let request = sink.create_request(new_request()).await.unwrap();
        let execution = sink
            .append_execution(NewExecution {
                request_id: request.id.clone(),
                attempt_index: 0,
                channel_id: "chan_a".to_owned(),
            })
            .await
            .unwrap();

        sink.transition_execution(&execution.id, ExecutionStatus::Sent, None, ExecutionMetrics::default())
            .await
            .unwrap();
        let completed = sink
            .transition_execution(&execution.id, ExecutionStatus::Completed, None, ExecutionMetrics::default())
            .await
            .unwrap();
        assert_eq!(completed.status, ExecutionStatus::Completed);

        let err = sink
            .transition_execution(&execution.id, ExecutionStatus::Failed, None, ExecutionMetrics::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidTransition(_)));
    }
}
