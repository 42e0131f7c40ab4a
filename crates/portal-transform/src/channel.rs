//! Cross-channel failover: a list of equivalent-purpose outbounds tried
//! in order when the current one is exhausted or unhealthy
//!
//! The list is a `Vec<Arc<dyn Outbound>>`, and the "try the next one"
//! behavior is expressed through the capability traits the pipeline's
//! dual-axis retry loop discovers, rather than being inlined into the
//! router itself.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use portal_core::RequestContext;
use portal_core::model::{Request, Response, ResponseStreamItem};
use portal_core::transport::{EventStream, HttpRequest, HttpResponse};

use crate::capability::{ChannelRetryable, Retryable};
use crate::error::TransformError;
use crate::outbound::{ApiFormat, Outbound, ResponseMeta, ResponseStreamChunks};

/// Wraps an ordered list of channels that all speak the same wire format;
/// routes every call to the current channel and advances on failover
///
/// `same_channel_retries` is delegated too: a channel that is itself
/// `ChannelRetryable` (e.g. one that re-signs an expired request) keeps
/// that capability while wrapped.
pub struct FailoverOutbound {
    channels: Vec<Arc<dyn Outbound>>,
    current: AtomicUsize,
}

impl FailoverOutbound {
    /// Build a failover wrapper over a non-empty, ordered channel list
    ///
    /// # Panics
    /// Panics if `channels` is empty — a failover wrapper with nothing to
    /// fail over to is a construction error.
    #[must_use]
    pub fn new(channels: Vec<Arc<dyn Outbound>>) -> Self {
        assert!(!channels.is_empty(), "FailoverOutbound requires at least one channel");
        Self {
            channels,
            current: AtomicUsize::new(0),
        }
    }

    fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn current_channel(&self) -> &Arc<dyn Outbound> {
        &self.channels[self.current_index()]
    }
}

#[async_trait]
impl Outbound for FailoverOutbound {
    fn api_format(&self) -> ApiFormat {
        self.current_channel().api_format()
    }

    async fn transform_request(&self, ctx: &RequestContext, request: &Request) -> Result<HttpRequest, TransformError> {
        self.current_channel().transform_request(ctx, request).await
    }

    async fn transform_response(&self, ctx: &RequestContext, response: HttpResponse) -> Result<Response, TransformError> {
        self.current_channel().transform_response(ctx, response).await
    }

    async fn transform_stream(&self, ctx: &RequestContext, events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
        self.current_channel().transform_stream(ctx, events).await
    }

    fn transform_error(&self, status: http::StatusCode, body: &[u8]) -> TransformError {
        self.current_channel().transform_error(status, body)
    }

    fn aggregate_stream_chunks(&self, chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta) {
        self.current_channel().aggregate_stream_chunks(chunks)
    }

    fn as_channel_retryable(&self) -> Option<&dyn ChannelRetryable> {
        Some(self)
    }

    fn as_retryable(&self) -> Option<&dyn Retryable> {
        Some(self)
    }
}

impl ChannelRetryable for FailoverOutbound {
    fn can_retry(&self, err: &TransformError) -> bool {
        self.current_channel().as_channel_retryable().is_some_and(|r| r.can_retry(err)) || err.is_retryable()
    }

    fn prepare_for_retry(&self, ctx: &RequestContext) -> Result<(), TransformError> {
        if let Some(r) = self.current_channel().as_channel_retryable() {
            return r.prepare_for_retry(ctx);
        }
        Ok(())
    }
}

impl Retryable for FailoverOutbound {
    fn has_more_channels(&self) -> bool {
        self.current_index() + 1 < self.channels.len()
    }

    fn next_channel(&self, _ctx: &RequestContext) -> Result<(), TransformError> {
        if !self.has_more_channels() {
            return Err(TransformError::Upstream("no more channels configured".to_owned()));
        }
        self.current.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use portal_core::transport::EventStream;

    use super::*;

    struct FlakyOutbound {
        format: ApiFormat,
        fail_times: Mutex<u32>,
    }

    #[async_trait]
    impl Outbound for FlakyOutbound {
        fn api_format(&self) -> ApiFormat {
            self.format
        }

        async fn transform_request(&self, _ctx: &RequestContext, _request: &Request) -> Result<HttpRequest, TransformError> {
            let mut remaining = self.fail_times.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransformError::Upstream("simulated failure".to_owned()));
            }
            Ok(HttpRequest::post_json("https://example.test", http::HeaderMap::new(), vec![]))
        }

        async fn transform_response(&self, _ctx: &RequestContext, _response: HttpResponse) -> Result<Response, TransformError> {
            unreachable!("not exercised by channel failover tests")
        }

        async fn transform_stream(&self, _ctx: &RequestContext, _events: EventStream) -> Result<ResponseStreamChunks, TransformError> {
            unreachable!("not exercised by channel failover tests")
        }

        fn transform_error(&self, _status: http::StatusCode, _body: &[u8]) -> TransformError {
            TransformError::Upstream("error".to_owned())
        }

        fn aggregate_stream_chunks(&self, _chunks: &[ResponseStreamItem]) -> (Vec<u8>, ResponseMeta) {
            (vec![], ResponseMeta::default())
        }
    }

    fn flaky(format: ApiFormat, fail_times: u32) -> Arc<dyn Outbound> {
        Arc::new(FlakyOutbound {
            format,
            fail_times: Mutex::new(fail_times),
        })
    }

    #[tokio::test]
    async fn routes_to_current_channel_until_switched() {
        let wrapper = FailoverOutbound::new(vec![flaky(ApiFormat::OpenAi, 0), flaky(ApiFormat::Anthropic, 0)]);
        assert_eq!(wrapper.api_format(), ApiFormat::OpenAi);
        assert!(wrapper.has_more_channels());
        let ctx = RequestContext::empty();
        wrapper.next_channel(&ctx).unwrap();
        assert_eq!(wrapper.api_format(), ApiFormat::Anthropic);
        assert!(!wrapper.has_more_channels());
    }

    #[tokio::test]
    async fn next_channel_fails_once_exhausted() {
        let wrapper = FailoverOutbound::new(vec![flaky(ApiFormat::OpenAi, 0)]);
        let ctx = RequestContext::empty();
        assert!(!wrapper.has_more_channels());
        assert!(wrapper.next_channel(&ctx).is_err());
    }

    #[tokio::test]
    async fn same_channel_retry_succeeds_then_cross_channel_not_needed() {
        let wrapper = FailoverOutbound::new(vec![flaky(ApiFormat::OpenAi, 1)]);
        let ctx = RequestContext::empty();
        let request = Request::chat("gpt-4o", vec![]);

        let first = wrapper.transform_request(&ctx, &request).await;
        assert!(first.is_err());
        assert!(wrapper.as_channel_retryable().unwrap().can_retry(&first.unwrap_err()));
        wrapper.as_channel_retryable().unwrap().prepare_for_retry(&ctx).unwrap();

        let second = wrapper.transform_request(&ctx, &request).await;
        assert!(second.is_ok());
    }
}
