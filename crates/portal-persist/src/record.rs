//! Persisted Request/Execution/StreamChunk record shapes, abstracted over
//! whatever concrete schema a real deployment uses (ORM codegen and
//! migrations stay outside this crate)

use crate::error::PersistError;

/// `Execution`'s lifecycle: `Created -> Sent -> (Completed | Failed)`.
/// `Completed` and `Failed` are terminal; no further transition is valid
/// once one is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Row written, no bytes sent upstream yet
    Created,
    /// First byte sent to the upstream channel
    Sent,
    /// Final response (or `[DONE]`) received
    Completed,
    /// Any error, including a transport failure before first byte
    Failed,
}

impl ExecutionStatus {
    /// Whether this status is terminal (`Completed` or `Failed`)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether transitioning from `self` to `next` is a legal state-machine
    /// edge
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Sent)
                | (Self::Created, Self::Completed)
                | (Self::Created, Self::Failed)
                | (Self::Sent, Self::Completed)
                | (Self::Sent, Self::Failed)
        )
    }
}

/// Timing and size metrics recorded for one execution attempt
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionMetrics {
    /// Total attempt latency in milliseconds
    pub latency_ms: Option<u64>,
    /// Latency to the first streamed token/byte, if streaming
    pub first_token_latency_ms: Option<u64>,
    /// Bytes read from the upstream channel
    pub bytes_in: u64,
    /// Bytes sent to the upstream channel
    pub bytes_out: u64,
}

/// `Request`: client-visible identity of one inbound call
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Generated record id
    pub id: String,
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
    /// Unix timestamp (seconds)
    pub created_at: u64,
}

/// `RequestExecution`: one attempt against one channel
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Generated record id
    pub id: String,
    /// Owning request
    pub request_id: String,
    /// 0-based attempt counter within the request; the idempotency key
    /// alongside `request_id`
    pub attempt_index: u32,
    /// Channel this attempt was sent to
    pub channel_id: String,
    /// Current lifecycle state
    pub status: ExecutionStatus,
    /// Error taxonomy slug, populated once `status == Failed`
    pub error_kind: Option<String>,
    /// Timing/size metrics
    pub metrics: ExecutionMetrics,
    /// Opaque key into wherever the response body is stored
    pub stored_body_key: Option<String>,
    /// Unix timestamp (seconds)
    pub created_at: u64,
}

impl ExecutionRecord {
    /// Validate and apply a status transition in place
    ///
    /// # Errors
    /// Returns [`PersistError::InvalidTransition`] if `self.status` is
    /// already terminal, or if the requested edge isn't in the state
    /// machine.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), PersistError> {
        if self.status.is_terminal() {
            return Err(PersistError::InvalidTransition(format!(
                "execution {} is already terminal ({:?})",
                self.id, self.status
            )));
        }
        if !self.status.can_transition_to(next) {
            return Err(PersistError::InvalidTransition(format!(
                "execution {} cannot move from {:?} to {next:?}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// `StreamChunk`: one received SSE event, persisted for replay/audit
#[derive(Debug, Clone)]
pub struct StreamChunkRecord {
    /// Owning request
    pub request_id: String,
    /// Owning execution attempt
    pub execution_id: String,
    /// Arrival order within `(request_id, execution_id)`
    pub index: u32,
    /// Raw event payload bytes
    pub bytes: Vec<u8>,
    /// Unix timestamp (seconds)
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(status: ExecutionStatus) -> ExecutionRecord {
        ExecutionRecord {
            id: "exec_1".to_owned(),
            request_id: "req_1".to_owned(),
            attempt_index: 0,
            channel_id: "chan_1".to_owned(),
            status,
            error_kind: None,
            metrics: ExecutionMetrics::default(),
            stored_body_key: None,
            created_at: 0,
        }
    }

    #[test]
    fn created_to_sent_to_completed_is_legal() {
        let mut exec = execution(ExecutionStatus::Created);
        exec.transition(ExecutionStatus::Sent).unwrap();
        exec.transition(ExecutionStatus::Completed).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut exec = execution(ExecutionStatus::Completed);
        assert!(exec.transition(ExecutionStatus::Failed).is_err());

        let mut exec = execution(ExecutionStatus::Failed);
        assert!(exec.transition(ExecutionStatus::Sent).is_err());
    }

    #[test]
    fn sent_cannot_revert_to_created() {
        let mut exec = execution(ExecutionStatus::Sent);
        assert!(exec.transition(ExecutionStatus::Created).is_err());
    }

    #[test]
    fn created_can_fail_directly_on_transport_error_before_first_byte() {
        let mut exec = execution(ExecutionStatus::Created);
        exec.transition(ExecutionStatus::Failed).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
    }
}
