#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::sync::Arc;

use args::Args;
use clap::Parser;
use portal_config::{Config, LlmProviderType};
use portal_persist::{InMemorySink, PersistenceBridge};
use portal_pipeline::{
    ChannelSwitchMiddleware, MaxTokensMiddleware, Middleware, MiddlewareChain, Pipeline, RequestLogMiddleware, ReqwestExecutor, UsageMiddleware,
};
use portal_transform::TransformerRegistry;
use portal_transform::provider::{anthropic, bailian, deepseek, doubao, google, longcat, openai, openrouter};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    let _telemetry_guard = portal_telemetry::init(config.telemetry.as_ref(), "info")?;

    tracing::info!(config_path = %args.config.display(), "starting portal");

    let registry = build_registry(&config);
    let _pipeline = build_pipeline(&config);

    tracing::info!(
        providers = config.llm.providers.len(),
        inbounds = registry.inbound(portal_transform::ApiFormat::OpenAi).is_ok(),
        "transformer registry and pipeline ready"
    );

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });
    shutdown.cancelled().await;

    tracing::info!("portal stopped");
    Ok(())
}

/// Build the process-wide transformer registry from configured providers
///
/// Native wire formats (`OpenAI`, Anthropic, Google) register both halves;
/// the `OpenAI`-compatible quirk wrappers only ever serve as an `Outbound`
/// (clients never address them directly, so they carry no `Inbound` side).
fn build_registry(config: &Config) -> TransformerRegistry {
    let mut registry = TransformerRegistry::new();

    // The native wire formats double as inbound surfaces for their own
    // client-facing endpoints regardless of whether a matching provider
    // channel is configured.
    registry.register_inbound(Arc::new(openai::OpenAiOutbound::new("openai".to_owned(), &default_openai_config())));
    registry.register_inbound(Arc::new(anthropic::AnthropicOutbound::new(&default_anthropic_config())));
    registry.register_inbound(Arc::new(google::GoogleOutbound::new(&default_google_config())));

    for (name, provider) in &config.llm.providers {
        match &provider.provider_type {
            LlmProviderType::Openai => {
                registry.register_outbound(Arc::new(openai::OpenAiOutbound::new(name.clone(), provider)));
            }
            LlmProviderType::Anthropic => {
                registry.register_outbound(Arc::new(anthropic::AnthropicOutbound::new(provider)));
            }
            LlmProviderType::Google => {
                registry.register_outbound(Arc::new(google::GoogleOutbound::new(provider)));
            }
            LlmProviderType::OpenRouter => {
                registry.register_outbound(Arc::new(openrouter::OpenRouterOutbound::new(name.clone(), provider)));
            }
            LlmProviderType::DeepSeek => {
                registry.register_outbound(Arc::new(deepseek::DeepSeekOutbound::new(name.clone(), provider)));
            }
            LlmProviderType::Longcat => {
                registry.register_outbound(Arc::new(longcat::LongcatOutbound::new(name.clone(), provider)));
            }
            LlmProviderType::Bailian => {
                registry.register_outbound(Arc::new(bailian::BailianOutbound::new(name.clone(), provider)));
            }
            LlmProviderType::Doubao => {
                registry.register_outbound(Arc::new(doubao::DoubaoOutbound::new(name.clone(), provider)));
            }
        }
    }

    registry
}

/// Wire the default executor, built-in middleware chain, and in-memory
/// persistence sink into a [`Pipeline`]
///
/// The in-memory sink is the reference [`StorageSink`](portal_persist::StorageSink);
/// a real deployment swaps it for a database-backed implementation without
/// touching this wiring.
fn build_pipeline(config: &Config) -> Pipeline {
    let executor = Arc::new(ReqwestExecutor::new(&config.pipeline.executor, &config.pipeline.streaming));

    let sink = Arc::new(InMemorySink::new());
    let bridge = Arc::new(PersistenceBridge::new(sink));

    let middlewares: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(MaxTokensMiddleware::new(4096)),
        Arc::new(UsageMiddleware),
        Arc::new(RequestLogMiddleware::new(bridge)),
        Arc::new(ChannelSwitchMiddleware),
    ];

    Pipeline::new(config.pipeline.clone(), MiddlewareChain::new(middlewares), executor)
}

fn default_openai_config() -> portal_config::LlmProviderConfig {
    provider_config(LlmProviderType::Openai)
}

fn default_anthropic_config() -> portal_config::LlmProviderConfig {
    provider_config(LlmProviderType::Anthropic)
}

fn default_google_config() -> portal_config::LlmProviderConfig {
    provider_config(LlmProviderType::Google)
}

fn provider_config(provider_type: LlmProviderType) -> portal_config::LlmProviderConfig {
    portal_config::LlmProviderConfig {
        provider_type,
        api_key: None,
        base_url: None,
        models: portal_config::ModelConfig::default(),
        headers: Vec::new(),
        forward_authorization: false,
        rate_limit: None,
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
