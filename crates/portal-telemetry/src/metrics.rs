//! Metric name constants and recording helpers

use std::time::Instant;

use opentelemetry::metrics::Histogram;

/// Record a duration measurement on a histogram
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[opentelemetry::KeyValue]) {
    let duration = start.elapsed().as_secs_f64();
    histogram.record(duration, attributes);
}

// HTTP metric names
pub const HTTP_REQUEST_DURATION: &str = "http.server.request.duration";
pub const HTTP_REQUEST_COUNT: &str = "http.server.request.count";

// LLM metric names
pub const LLM_REQUEST_DURATION: &str = "llm.request.duration";
pub const LLM_REQUEST_COUNT: &str = "llm.request.count";
pub const LLM_TOKEN_USAGE: &str = "llm.token.usage";
pub const LLM_STREAMING_DURATION: &str = "llm.streaming.duration";
pub const LLM_TIME_TO_FIRST_TOKEN: &str = "llm.time_to_first_token";

// Pipeline retry metric names
pub const PIPELINE_CHANNEL_SWITCH_COUNT: &str = "pipeline.channel_switch.count";
pub const PIPELINE_SAME_CHANNEL_RETRY_COUNT: &str = "pipeline.same_channel_retry.count";
