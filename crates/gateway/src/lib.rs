//! HTTP gateway for StreamGate.
//!
//! Sits between a chat client and a local OpenAI-compatible inference
//! server. Chat requests stream back through the turn orchestrator, the
//! model list proxies through with a cached fallback, and the MCP tool
//! server mounts under the same router.
//!
//! Built on Axum.

use std::convert::Infallible;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use streamgate_agent::{ChatOrchestrator, OrchestratorOptions, PatternStore, RequestScope};
use streamgate_config::AppConfig;
use streamgate_core::{ClientEvent, ToolRegistry, UserPolicy};
use streamgate_mcp::{mcp_router, McpContext, McpServer};
use streamgate_memory::MemoryStore;
use streamgate_upstream::{UpstreamClient, UpstreamMode};

/// User id assumed when the client sends no `X-User-ID` header.
const DEFAULT_USER: &str = "default";

/// Shared application state for the gateway.
///
/// The config sits behind a `std::sync::RwLock` so synchronous readers
/// (the memory worker's policy check runs outside any handler) always see
/// the current value. Guards are held only for short copies, never across
/// an await.
pub struct GatewayState {
    pub config: RwLock<AppConfig>,
    pub upstream: UpstreamClient,
    pub registry: Arc<ToolRegistry>,
    pub store: Arc<MemoryStore>,
    pub patterns: Arc<PatternStore>,
    pub mcp_context: Arc<McpContext>,
    /// Last good `/v1/models` body, served when the upstream is down.
    pub models_cache: tokio::sync::RwLock<Option<String>>,
}

impl GatewayState {
    fn read_config(&self) -> RwLockReadGuard<'_, AppConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn policy_for(&self, user_id: &str) -> UserPolicy {
        self.read_config().policy_for(user_id)
    }

    /// Whether the memory engine is on for this user, read from the live
    /// config. Used by the background worker between passes.
    pub fn memory_enabled_for(&self, user_id: &str) -> bool {
        self.policy_for(user_id).memory_enabled
    }

    /// Orchestrator tunables snapshotted from the current config. Each chat
    /// request takes a fresh snapshot, so `/api/config` updates apply to the
    /// next request without a restart.
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        let config = self.read_config();
        OrchestratorOptions {
            mode: UpstreamMode::from_str(&config.upstream.mode),
            max_turns: config.agent.max_turns,
            history_keep: config.agent.history_keep,
            buffer_threshold: config.detector.buffer_threshold,
            enable_mcp: config.mcp.enabled,
            integration_id: config.mcp.integration_id.clone(),
            preload_char_limit: config.memory.preload_char_limit,
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router, including the MCP tool server when enabled.
pub fn build_router(state: SharedState, mcp: Option<Arc<McpServer>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/chat/completions", post(chat_handler))
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/models", get(models_handler))
        .route("/v1/models", get(models_handler))
        .route("/api/config", get(get_config_handler).post(update_config_handler))
        .with_state(state);

    if let Some(server) = mcp {
        router = router.merge(mcp_router(server));
    }

    router
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve until the process is stopped.
pub async fn serve(
    state: SharedState,
    mcp: Option<Arc<McpServer>>,
    addr: &str,
) -> std::io::Result<()> {
    let app = build_router(state, mcp);
    info!(%addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// --- Chat ---

/// Stream a chat request through the turn orchestrator.
///
/// The caller's identity arrives in `X-User-ID`; the matching policy is
/// resolved here and also pushed into the MCP context so tool calls made
/// over MCP run as the same user.
async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(mut body): Json<Value>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let user_id = headers
        .get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_USER)
        .to_string();
    let policy = state.policy_for(&user_id);
    state.mcp_context.set(&user_id, policy.clone());

    if body["model"].as_str().map(str::is_empty).unwrap_or(true) {
        body["model"] = Value::String(state.read_config().upstream.default_model.clone());
    }

    let scope = RequestScope {
        user_id,
        policy,
    };

    // A fresh orchestrator per request picks up runtime config changes.
    let orchestrator = ChatOrchestrator::new(
        state.upstream.clone(),
        state.registry.clone(),
        state.store.clone(),
        state.patterns.clone(),
        state.orchestrator_options(),
    );

    let (tx, rx) = tokio::sync::mpsc::channel::<ClientEvent>(64);
    tokio::spawn(async move {
        orchestrator.run(body, scope, tx).await;
    });

    let stream =
        ReceiverStream::new(rx).map(|ev| Ok(SseEvent::default().data(ev.into_data())));
    Sse::new(stream)
}

// --- Models ---

/// Proxy the upstream model list, falling back to the last good body when
/// the upstream is unreachable. `X-Model-Source` tells the client which
/// one it got.
async fn models_handler(State(state): State<SharedState>) -> Response {
    match state.upstream.list_models_raw().await {
        Ok(body) => {
            *state.models_cache.write().await = Some(body.clone());
            (
                [
                    ("content-type", "application/json"),
                    ("X-Model-Source", "live"),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Model list fetch failed, trying cache");
            match state.models_cache.read().await.clone() {
                Some(cached) => (
                    [
                        ("content-type", "application/json"),
                        ("X-Model-Source", "cache-fallback"),
                    ],
                    cached,
                )
                    .into_response(),
                None => (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": format!("upstream unreachable: {e}")})),
                )
                    .into_response(),
            }
        }
    }
}

// --- Health ---

async fn health_handler(State(state): State<SharedState>) -> Json<Value> {
    let upstream_ok = state.upstream.reachable().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": {
            "endpoint": state.upstream.endpoint(),
            "reachable": upstream_ok,
        }
    }))
}

// --- Config ---

/// Fields a client may change at runtime. They apply to the next chat
/// request; endpoint and token changes need a restart. Disabling MCP stops
/// integration advertisement, the `/mcp` routes stay mounted.
#[derive(Debug, Deserialize)]
struct ConfigUpdate {
    default_model: Option<String>,
    memory_enabled: Option<bool>,
    mcp_enabled: Option<bool>,
    buffer_threshold: Option<usize>,
}

/// Current settings with the token reduced to presence.
async fn get_config_handler(State(state): State<SharedState>) -> Json<Value> {
    let config = state.read_config();
    Json(json!({
        "upstream": {
            "endpoint": config.upstream.endpoint,
            "mode": config.upstream.mode,
            "default_model": config.upstream.default_model,
            "has_token": config.upstream.api_token.is_some(),
        },
        "memory": {"enabled": config.memory.enabled},
        "mcp": {"enabled": config.mcp.enabled, "integration_id": config.mcp.integration_id},
        "detector": {"buffer_threshold": config.detector.buffer_threshold},
    }))
}

async fn update_config_handler(
    State(state): State<SharedState>,
    Json(update): Json<ConfigUpdate>,
) -> Json<Value> {
    let mut config = state.config.write().unwrap_or_else(|e| e.into_inner());
    if let Some(model) = update.default_model {
        config.upstream.default_model = model;
    }
    if let Some(enabled) = update.memory_enabled {
        config.memory.enabled = enabled;
    }
    if let Some(enabled) = update.mcp_enabled {
        config.mcp.enabled = enabled;
    }
    if let Some(threshold) = update.buffer_threshold {
        if threshold > 0 {
            config.detector.buffer_threshold = threshold;
        }
    }
    info!("Runtime config updated");
    Json(json!({"status": "updated"}))
}
