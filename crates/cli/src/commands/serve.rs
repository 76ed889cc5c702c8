//! `streamgate serve` — Start the gateway HTTP server.
//!
//! Builds the shared subsystems once (upstream client, tool registry,
//! memory store, pattern store), wires the gateway and the MCP tool
//! server to them, and runs until stopped.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use streamgate_agent::PatternStore;
use streamgate_config::AppConfig;
use streamgate_gateway::GatewayState;
use streamgate_mcp::{McpContext, McpServer};
use streamgate_memory::{MemoryStore, MemoryWorker, WorkerOptions};
use streamgate_upstream::UpstreamClient;

pub async fn run(port: Option<u16>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let port = port.unwrap_or(config.gateway.port);
    let addr = format!("{}:{}", config.gateway.host, port);

    let upstream = UpstreamClient::new(
        config.upstream.normalized_endpoint(),
        config.upstream.effective_token(),
    );
    let store = Arc::new(MemoryStore::new(config.memory_dir()));
    let registry = Arc::new(streamgate_tools::default_registry(store.clone()));
    let patterns = Arc::new(PatternStore::load(config.patterns_path()));
    let mcp_context = Arc::new(McpContext::new());

    let mcp_server = config
        .mcp
        .enabled
        .then(|| Arc::new(McpServer::new(registry.clone(), mcp_context.clone())));

    let state = Arc::new(GatewayState {
        config: RwLock::new(config.clone()),
        upstream: upstream.clone(),
        registry,
        store: store.clone(),
        patterns,
        mcp_context,
        models_cache: tokio::sync::RwLock::new(None),
    });

    if config.memory.enabled {
        // The worker reads the policy switch fresh each pass so a runtime
        // config update takes effect without a restart.
        let shared = state.clone();
        let memory_enabled = Arc::new(move |user: &str| shared.memory_enabled_for(user));
        MemoryWorker::new(
            store,
            upstream,
            WorkerOptions {
                initial_delay: Duration::from_secs(config.memory.worker_initial_delay_secs),
                interval: Duration::from_secs(config.memory.worker_interval_secs),
                consolidation_threshold_bytes: config.memory.consolidation_threshold_bytes,
                fallback_model: config.upstream.default_model.clone(),
            },
            memory_enabled,
        )
        .spawn();
    } else {
        info!("Memory engine disabled, background worker not started");
    }

    streamgate_gateway::serve(state, mcp_server, &addr)
        .await
        .context("Gateway server failed")?;

    Ok(())
}
