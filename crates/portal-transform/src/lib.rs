//! Inbound/Outbound transformer registry for the portal gateway
//!
//! Converts between a client's wire format and the unified request/response
//! model ([`Inbound`]), and between the unified model and an upstream
//! provider's wire format ([`Outbound`]). Providers that are `OpenAI`-
//! compatible with small quirks (`OpenRouter`, `DeepSeek`, Longcat, Bailian,
//! Doubao) wrap the `OpenAI` outbound rather than reimplementing it.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod aggregate;
pub mod capability;
pub mod channel;
pub mod convert;
pub mod error;
pub mod image;
pub mod inbound;
pub mod outbound;
pub mod protocol;
pub mod provider;
pub mod registry;

pub use capability::{ChannelRetryable, CustomizedExecutor, Retryable};
pub use channel::FailoverOutbound;
pub use error::TransformError;
pub use inbound::Inbound;
pub use outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};
pub use registry::TransformerRegistry;
