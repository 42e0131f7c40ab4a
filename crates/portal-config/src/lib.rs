#![allow(clippy::must_use_candidate)]

pub mod auth;
pub mod cache;
pub mod client_identification;
pub mod client_ip;
pub mod cors;
pub mod csrf;
pub mod embeddings;
mod env;
pub mod imagegen;
pub mod headers;
pub mod health;
pub mod llm;
mod loader;
pub mod pipeline;
pub mod proxy;
pub mod rate_limit;
pub mod server;
pub mod telemetry;
pub mod tls;

use serde::Deserialize;

pub use auth::*;
pub use cache::*;
pub use client_identification::*;
pub use cors::*;
pub use csrf::*;
pub use embeddings::*;
pub use headers::*;
pub use imagegen::*;
pub use health::*;
pub use llm::*;
pub use pipeline::*;
pub use proxy::*;
pub use rate_limit::*;
pub use server::*;
pub use telemetry::TelemetryConfig;
pub use tls::*;

/// Top-level gateway configuration
///
/// Scoped to the recognized gateway options plus the ambient concerns
/// (server bind address, telemetry) every feature area's config carries
/// alongside it. MCP/STT/TTS/billing/OAuth configuration is out of this
/// gateway's scope (billing is a separate concern; the others are product
/// surfaces this gateway never exposes).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM provider configuration (upstream channels)
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embeddings provider configuration
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    /// Image generation provider configuration
    #[serde(default)]
    pub imagegen: ImageGenConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
    /// Proxy configuration
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    /// API key authentication configuration
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    /// Response cache configuration
    #[serde(default)]
    pub cache: Option<ResponseCacheConfig>,
    /// Pipeline retry/streaming/executor configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}
