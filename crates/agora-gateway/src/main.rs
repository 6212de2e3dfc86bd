//! Agora Gateway - HTTP/WebSocket entry point of the chat service.
//!
//! Configuration comes from the environment:
//!
//! - `LISTEN_ADDR`, `DATA_DIR`, `CORS_ORIGINS`
//! - `MODEL_BASE_URL`, `MODEL_API_KEY`, `MODEL_NAME`
//! - `SEARCH_TOOL_URL`, `RESEARCH_TOOL_URL`, `CRAWL_TOOL_URL`, `TOOL_API_KEY`
//!
//! A remote tool is offered to agents only when its URL is set.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora_actor::{ActorConfig, Hub, RemoteTool, ToolRegistry};
use agora_gateway::{create_router, GatewayConfig, GatewayState};
use agora_model::{HttpModel, ModelConfig};
use agora_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,agora=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Agora Gateway");

    let gateway_config = GatewayConfig::from_env();
    let model_config = ModelConfig {
        base_url: env_or("MODEL_BASE_URL", "http://localhost:8600"),
        api_key: std::env::var("MODEL_API_KEY").ok(),
        model: env_or("MODEL_NAME", "default"),
        ..ModelConfig::default()
    };

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %gateway_config.data_dir,
        model_base_url = %model_config.base_url,
        model = %model_config.model,
        "Gateway configuration loaded"
    );

    tracing::info!(path = %gateway_config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&gateway_config.data_dir)?);

    let model = Arc::new(HttpModel::new(model_config)?);
    let tools = Arc::new(remote_tools()?);
    tracing::info!(tools = tools.definitions().len(), "Remote tools configured");

    let hub = Arc::new(Hub::new(store, model, tools, ActorConfig::default()));
    let warmed = hub.warm_start()?;
    tracing::info!(actors = warmed, "Organization actors ready");

    let listen_addr = gateway_config.listen_addr.clone();
    let app = create_router(GatewayState::new(hub, gateway_config));

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn remote_tools() -> agora_actor::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new(std::env::var("TOOL_API_KEY").ok())?;

    let configured: [(&str, fn(String) -> RemoteTool); 3] = [
        ("SEARCH_TOOL_URL", RemoteTool::search),
        ("RESEARCH_TOOL_URL", RemoteTool::research),
        ("CRAWL_TOOL_URL", RemoteTool::crawl),
    ];
    for (var, tool) in configured {
        match std::env::var(var) {
            Ok(url) => registry = registry.register(tool(url)),
            Err(_) => tracing::warn!(var, "Remote tool disabled"),
        }
    }

    Ok(registry)
}
