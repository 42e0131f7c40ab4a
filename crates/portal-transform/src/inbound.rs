//! The Inbound half of the transformer registry: client wire <-> unified model

use async_trait::async_trait;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::RequestContext;

use crate::error::TransformError;
use crate::outbound::ApiFormat;

/// Converts a client's wire request into the unified model, and the unified
/// response back into that client's expected wire shape
///
/// One `Inbound` is selected per exposed route (`/v1/chat/completions` picks
/// the `OpenAi` inbound, `/anthropic/v1/messages` picks `Anthropic`, etc.);
/// it is independent of which `Outbound` eventually serves the request, so a
/// client speaking the `OpenAI` wire format can be routed to an Anthropic
/// channel and back without the client observing the difference.
#[async_trait]
pub trait Inbound: Send + Sync {
    /// The wire format this inbound accepts
    fn api_format(&self) -> ApiFormat;

    /// Parse a raw client request body into the unified model
    fn transform_request(&self, raw: &[u8]) -> Result<Request, TransformError>;

    /// Serialize a unified response back into this client's wire shape
    fn transform_response(&self, ctx: &RequestContext, response: &Response) -> Result<Vec<u8>, TransformError>;

    /// Re-encode a unified stream item into this client's native SSE frame(s)
    ///
    /// Finite and non-restartable: callers drive this once per item, in
    /// order, terminating with the provider's native `[DONE]` sentinel
    /// (or equivalent) once `ResponseStreamItem::Done` is observed.
    fn transform_stream(&self, ctx: &RequestContext, item: &ResponseStreamItem) -> Vec<u8>;
}
