//! switchboard HTTP Server
//!
//! Axum front end: one registry of agents, one registry of tools, one model
//! provider, and a REST API over them.

mod handlers;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard_agents::{AgentSettings, Workspace, install, tools::ShellConfig};
use switchboard_core::{
    AgentRegistry, DispatchConfig, InMemoryMetrics, LlmProvider, TurnConfig, TurnRunner,
};
use switchboard_runtime::{OllamaConfig, OllamaProvider, StaticProvider};

use crate::handlers::{
    chat_handler, health_check, list_agents, list_models, list_tools, metrics, validate_tool,
};
use crate::state::AppState;

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/api/models", get(list_models))
        .route("/api/agents", get(list_agents))
        .route("/api/tools", get(list_tools))
        .route("/api/metrics", get(metrics))
        // Work
        .route("/api/chat", post(chat_handler))
        .route("/api/tools/validate", post(validate_tool))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `SWITCHBOARD_PROVIDER=static` swaps Ollama for an echoing provider
fn provider_from_env(ollama: &OllamaConfig) -> Arc<dyn LlmProvider> {
    match std::env::var("SWITCHBOARD_PROVIDER").as_deref() {
        Ok("static") => Arc::new(StaticProvider::echo()),
        _ => Arc::new(OllamaProvider::from_config(ollama.clone())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let ollama = OllamaConfig::from_env();
    let provider = provider_from_env(&ollama);

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to {}", provider.name());
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::info!("  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not available - agents will fail", provider.name());
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let workspace_root = std::env::var("SWITCHBOARD_WORKSPACE")
        .map(PathBuf::from)
        .or_else(|_| std::env::current_dir())?;
    let settings = AgentSettings {
        model: ollama.model.clone(),
        workspace: Arc::new(Workspace::open(&workspace_root)?),
        shell: ShellConfig::from_env(),
    };
    tracing::info!("Workspace: {}", settings.workspace.root().display());

    let dispatch = DispatchConfig::from_env();
    let metrics = Arc::new(InMemoryMetrics::new());
    let registry = AgentRegistry::with_config(&dispatch).with_metrics(metrics.clone());
    let bundle = install(registry, &provider, &settings, &dispatch)?;

    tracing::info!("Registered {} agents:", bundle.agents.len());
    for agent in bundle.agents.descriptors() {
        tracing::info!("  • {} (priority {})", agent.name, agent.priority);
    }
    tracing::info!("Registered {} tools:", bundle.tools.len());
    for name in bundle.tools.names() {
        tracing::info!("  • {}", name);
    }

    let runner = TurnRunner::new(
        Arc::new(bundle.agents),
        Arc::new(bundle.tools),
        TurnConfig::default(),
    );
    let app = router(AppState::new(provider, runner, metrics));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("switchboard server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health              - Health check");
    tracing::info!("  GET  /api/models          - List available models");
    tracing::info!("  GET  /api/agents          - Registered agents");
    tracing::info!("  GET  /api/tools           - Tool definitions (?format=function|input_schema)");
    tracing::info!("  GET  /api/metrics         - Per-agent call statistics");
    tracing::info!("  POST /api/chat            - Run one turn");
    tracing::info!("  POST /api/tools/validate  - Validate a tool call");

    axum::serve(listener, app).await?;

    Ok(())
}
