//! HTTP executor, dual-axis retry pipeline, and middleware chain driving
//! Inbound/Outbound transformers
//!
//! This is the crate that actually talks to the network: [`executor`] owns
//! the reqwest-backed [`Executor`](portal_core::Executor), [`middleware`]
//! defines the hook chain spec'd around every pipeline edge, and
//! [`pipeline`] is the orchestrator that ties transformers, middleware, and
//! the dual-axis retry/failover loop together.

pub mod error;
pub mod executor;
pub mod middleware;
pub mod pipeline;

pub use error::{MiddlewareError, PipelineError};
pub use executor::{ReqwestExecutor, default_decoder_registry};
pub use middleware::{
    ChannelSwitchMiddleware, MaxTokensMiddleware, Middleware, MiddlewareChain, PipelineState, RequestLogMiddleware, UsageMiddleware,
};
pub use pipeline::{Pipeline, PipelineOutcome};
