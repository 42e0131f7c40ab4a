use serde::Deserialize;

/// Retry and failover budget applied by the pipeline's dual-axis retry loop
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Maximum cross-channel switches (default 0)
    #[serde(default)]
    pub max_channel_retries: u32,
    /// Maximum same-channel retries (default 0)
    #[serde(default)]
    pub max_same_channel_retries: u32,
    /// Sleep between retries, parsed as a duration string (e.g. `"250ms"`)
    #[serde(default)]
    pub delay: Option<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_channel_retries: 0,
            max_same_channel_retries: 0,
            delay: None,
        }
    }
}

/// Header-handling configuration for the pipeline's outbound merge step
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineHeadersConfig {
    /// Extra header names to merge-with-append rather than overwrite
    #[serde(default)]
    pub append: Vec<String>,
}

/// Streaming decoder limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamingConfig {
    /// Maximum size of a single decoded SSE event, in bytes (default 32 MiB)
    #[serde(default = "default_max_event_size")]
    pub max_event_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_event_size: default_max_event_size(),
        }
    }
}

const fn default_max_event_size() -> usize {
    32 * 1024 * 1024
}

/// HTTP executor concurrency limits
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Maximum number of concurrent in-flight upstream requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum number of blocking tasks the executor may spawn
    #[serde(default = "default_max_blocking_tasks")]
    pub max_blocking_tasks: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_blocking_tasks: default_max_blocking_tasks(),
        }
    }
}

const fn default_max_concurrent() -> usize {
    64
}

const fn default_max_blocking_tasks() -> usize {
    1024
}

/// Top-level pipeline configuration: §6 "Config (recognized options)"
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Retry/failover budget
    #[serde(default)]
    pub retry: RetryConfig,
    /// Header merge behavior
    #[serde(default)]
    pub headers: PipelineHeadersConfig,
    /// Streaming decoder limits
    #[serde(default)]
    pub streaming: StreamingConfig,
    /// Executor concurrency limits
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_defaults_to_zero_budget() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_channel_retries, 0);
        assert_eq!(retry.max_same_channel_retries, 0);
        assert!(retry.delay.is_none());
    }

    #[test]
    fn streaming_defaults_to_32_mebibytes() {
        assert_eq!(StreamingConfig::default().max_event_size, 32 * 1024 * 1024);
    }

    #[test]
    fn deserializes_from_toml() {
        let toml = r#"
            [retry]
            max_channel_retries = 2
            max_same_channel_retries = 1
            delay = "250ms"

            [headers]
            append = ["User-Agent"]

            [streaming]
            max_event_size = 1048576

            [executor]
            max_concurrent = 32
            max_blocking_tasks = 256
        "#;
        let config: PipelineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_channel_retries, 2);
        assert_eq!(config.headers.append, vec!["User-Agent".to_owned()]);
        assert_eq!(config.streaming.max_event_size, 1_048_576);
        assert_eq!(config.executor.max_concurrent, 32);
    }
}
