//! Optional capability interfaces, discovered by type-test
//!
//! An `Outbound` implements zero or more of these. The pipeline probes for
//! them with `(&*outbound as &dyn Any).downcast_ref::<dyn Trait>()`-style
//! discovery (in practice, `Outbound` exposes `as_channel_retryable` /
//! `as_retryable` / `as_customized_executor` accessors returning `Option`,
//! since `dyn Any` downcasting to a second trait object requires the
//! concrete type, not the trait — accessor methods are the idiomatic way to
//! offer "maybe-implements" on a trait object in Rust).

use std::sync::Arc;

use portal_core::{Executor, RequestContext};

use crate::error::TransformError;

/// Same-channel retry: the outbound can recover from an error without
/// switching to a different upstream channel (e.g. re-signing a request
/// whose timestamp expired, or retrying a 429 after a short backoff)
pub trait ChannelRetryable: Send + Sync {
    /// Whether `err` is worth retrying on the same channel
    fn can_retry(&self, err: &TransformError) -> bool;

    /// Prepare the outbound's internal state for another same-channel
    /// attempt (e.g. refresh a signature); an `Err` aborts the retry
    fn prepare_for_retry(&self, ctx: &RequestContext) -> Result<(), TransformError>;
}

/// Cross-channel failover: the outbound can switch to an equivalent
/// upstream channel when the current one is exhausted or unhealthy
pub trait Retryable: Send + Sync {
    /// Whether another channel is available to try
    fn has_more_channels(&self) -> bool;

    /// Advance to the next channel; an `Err` aborts the failover attempt
    fn next_channel(&self, ctx: &RequestContext) -> Result<(), TransformError>;
}

/// Lets an outbound wrap the default executor with special transport logic
/// (AWS SigV4 signing, mTLS, etc.) rather than implementing HTTP I/O itself
pub trait CustomizedExecutor: Send + Sync {
    /// Wrap `exec` with this outbound's transport requirements
    fn customize_executor(&self, exec: Arc<dyn Executor>) -> Arc<dyn Executor>;
}
