//! The reqwest-backed [`Executor`], the only thing in this workspace that
//! actually performs upstream HTTP I/O
//!
//! A shared `reqwest::Client`, `eventsource-stream` framing over
//! `bytes_stream()`, and the "non-2xx is an error with the body attached"
//! convention. Concurrency is bounded by a semaphore sized from
//! [`ExecutorConfig::max_concurrent`](portal_config::ExecutorConfig).

use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use portal_config::{ExecutorConfig, StreamingConfig};
use portal_core::error::KernelError;
use portal_core::model::StreamEvent;
use portal_core::transport::{ByteChunkStream, DecoderRegistry, EventStream, HttpRequest, HttpResponse};
use portal_core::{Executor, RequestContext};
use tokio::sync::Semaphore;

/// Build the decoder registry this executor ships: `text/event-stream`
/// decoded via `eventsource-stream`
#[must_use]
pub fn default_decoder_registry() -> DecoderRegistry {
    let mut registry = DecoderRegistry::new();
    registry.insert("text/event-stream", decode_sse);
    registry
}

fn decode_sse(chunks: ByteChunkStream, max_event_size: usize) -> EventStream {
    let byte_stream = chunks.map(|chunk| chunk.map(bytes::Bytes::from).map_err(|err| std::io::Error::other(err.to_string())));
    let events = byte_stream.eventsource().map(move |frame| match frame {
        Ok(event) => {
            if event.data.len() > max_event_size {
                return Err(KernelError::Transport(format!("SSE event exceeds max size of {max_event_size} bytes")));
            }
            Ok(StreamEvent {
                last_event_id: if event.id.is_empty() { None } else { Some(event.id) },
                event_type: if event.event.is_empty() { "message".to_owned() } else { event.event },
                data: event.data.into_bytes(),
            })
        }
        Err(err) => Err(KernelError::Transport(err.to_string())),
    });
    Box::pin(events)
}

/// A content-type without its parameters, e.g. `text/event-stream` from
/// `text/event-stream; charset=utf-8`, mapped onto the `'static` key the
/// decoder registry is keyed by
fn base_content_type(headers: &http::HeaderMap) -> Option<&'static str> {
    let content_type = headers.get(http::header::CONTENT_TYPE)?.to_str().ok()?;
    let base = content_type.split(';').next()?.trim();
    (base == "text/event-stream").then_some("text/event-stream")
}

/// Reqwest-backed [`Executor`]
pub struct ReqwestExecutor {
    client: reqwest::Client,
    decoders: DecoderRegistry,
    max_event_size: usize,
    permits: Arc<Semaphore>,
}

impl ReqwestExecutor {
    /// Build an executor from gateway configuration
    ///
    /// # Panics
    /// Panics if the underlying `reqwest::Client` fails to build, which
    /// only happens for an invalid static TLS/DNS configuration.
    #[must_use]
    pub fn new(executor_config: &ExecutorConfig, streaming_config: &StreamingConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("static reqwest client configuration is always valid");
        Self {
            client,
            decoders: default_decoder_registry(),
            max_event_size: streaming_config.max_event_size,
            permits: Arc::new(Semaphore::new(executor_config.max_concurrent)),
        }
    }

    fn decoder_for(&self, headers: &http::HeaderMap) -> Option<portal_core::DecoderFactory> {
        self.decoders.get(base_content_type(headers)?).copied()
    }
}

fn build_request(client: &reqwest::Client, request: &HttpRequest) -> reqwest::RequestBuilder {
    client
        .request(request.method.clone(), &request.url)
        .headers(request.headers.clone())
        .body(request.body.clone())
}

#[async_trait::async_trait]
impl Executor for ReqwestExecutor {
    async fn do_request(&self, ctx: &RequestContext, request: HttpRequest) -> Result<HttpResponse, KernelError> {
        let _permit = self.permits.acquire().await.map_err(|err| KernelError::Transport(err.to_string()))?;
        let _ = ctx;

        let response = build_request(&self.client, &request)
            .send()
            .await
            .map_err(|err| KernelError::Transport(err.to_string()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|err| KernelError::Transport(err.to_string()))?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }

    async fn do_stream(&self, ctx: &RequestContext, request: HttpRequest) -> Result<EventStream, KernelError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| KernelError::Transport(err.to_string()))?;
        let _ = ctx;

        let response = build_request(&self.client, &request)
            .send()
            .await
            .map_err(|err| KernelError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KernelError::Transport(format!("upstream returned {status}: {body}")));
        }

        let decoder = self.decoder_for(response.headers()).unwrap_or(decode_sse);
        let max_event_size = self.max_event_size;

        let raw: ByteChunkStream = Box::pin(response.bytes_stream().map(move |chunk| {
            let _ = &permit;
            chunk.map(|b| b.to_vec()).map_err(|err| KernelError::Transport(err.to_string()))
        }));

        Ok(decoder(raw, max_event_size))
    }
}

/// Sleep for the configured retry delay, if any
pub async fn sleep_retry_delay(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

/// Parse a duration string (e.g. `"250ms"`, `"2s"`) for the retry
/// delay config
///
/// # Errors
/// Returns the underlying parse error as a string.
pub fn parse_retry_delay(raw: &Option<String>) -> Result<Option<Duration>, String> {
    raw.as_deref().map(duration_str::parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_event_stream_content_type() {
        let registry = default_decoder_registry();
        assert!(registry.contains_key("text/event-stream"));
    }

    #[test]
    fn retry_delay_parses_human_durations() {
        let parsed = parse_retry_delay(&Some("250ms".to_owned())).unwrap();
        assert_eq!(parsed, Some(Duration::from_millis(250)));
    }

    #[test]
    fn retry_delay_is_none_when_unconfigured() {
        assert_eq!(parse_retry_delay(&None).unwrap(), None);
    }

    #[tokio::test]
    async fn sse_decoder_yields_events_in_order() {
        let raw = "data: first\n\ndata: second\n\ndata: [DONE]\n\n".as_bytes().to_vec();
        let chunks: ByteChunkStream = Box::pin(futures_util::stream::iter(vec![Ok(raw)]));
        let mut events = decode_sse(chunks, 32 * 1024 * 1024);

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.data, b"first");
        let second = events.next().await.unwrap().unwrap();
        assert_eq!(second.data, b"second");
        let third = events.next().await.unwrap().unwrap();
        assert!(third.is_done_sentinel());
    }

    #[tokio::test]
    async fn sse_decoder_rejects_events_over_the_size_limit() {
        let raw = format!("data: {}\n\n", "x".repeat(100)).into_bytes();
        let chunks: ByteChunkStream = Box::pin(futures_util::stream::iter(vec![Ok(raw)]));
        let mut events = decode_sse(chunks, 10);
        assert!(events.next().await.unwrap().is_err());
    }
}
