//! Persistence bridge: `Request`/`Execution`/`StreamChunk` audit records
//! behind an abstracted [`StorageSink`]
//!
//! The concrete relational schema, migrations, and ORM glue stay outside
//! this crate's scope; it owns the state machine, the pagination
//! invariant, and the System-principal/bypass ceremony every write goes
//! through, and ships one reference [`memory::InMemorySink`] for tests and
//! the demo binary.

pub mod bridge;
pub mod error;
pub mod memory;
pub mod record;
pub mod sink;

pub use bridge::{AUDIT_BYPASS_REASON, PersistenceBridge};
pub use error::PersistError;
pub use memory::InMemorySink;
pub use record::{ExecutionMetrics, ExecutionRecord, ExecutionStatus, RequestRecord, StreamChunkRecord};
pub use sink::{MAX_PAGE_SIZE, NewExecution, NewRequest, NewStreamChunk, PageBounds, StorageSink};
