//! HTTP API layer.
//!
//! Thin handlers that delegate to the services wired up in [`crate::bootstrap`].
//! This module owns router construction and server startup; handlers
//! themselves live in `download` and `stats`.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::id_codec::IdCodec;
use crate::quota::TokenStore;
use crate::state::Config;
use crate::stream::StreamRegistry;
use crate::upstream::{FileCache, SessionPool, UpstreamClient, WorkloadTable};

mod download;
mod stats;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper around `Arc`-ed services; all business logic lives in the
/// services themselves, wired together once in [`crate::bootstrap`].
#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
    pub session_pool: Arc<SessionPool>,
    pub file_cache: Arc<FileCache>,
    pub workloads: Arc<WorkloadTable>,
    pub stream_registry: Arc<StreamRegistry>,
    pub token_store: Arc<dyn TokenStore>,
    pub id_codec: Arc<dyn IdCodec>,
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    upstream: Option<Arc<dyn UpstreamClient>>,
    session_pool: Option<Arc<SessionPool>>,
    file_cache: Option<Arc<FileCache>>,
    workloads: Option<Arc<WorkloadTable>>,
    stream_registry: Option<Arc<StreamRegistry>>,
    token_store: Option<Arc<dyn TokenStore>>,
    id_codec: Option<Arc<dyn IdCodec>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates every field from a `BootstrappedServices` container.
    pub fn from_services(mut self, services: &crate::bootstrap::BootstrappedServices) -> Self {
        self.upstream = Some(Arc::clone(&services.upstream));
        self.session_pool = Some(Arc::clone(&services.session_pool));
        self.file_cache = Some(Arc::clone(&services.file_cache));
        self.workloads = Some(Arc::clone(&services.workloads));
        self.stream_registry = Some(Arc::clone(&services.stream_registry));
        self.token_store = Some(Arc::clone(&services.token_store));
        self.id_codec = Some(Arc::clone(&services.id_codec));
        self.config = Some(Arc::clone(&services.config));
        self
    }

    pub fn build(self) -> AppState {
        AppState {
            upstream: self.upstream.expect("upstream is required"),
            session_pool: self.session_pool.expect("session_pool is required"),
            file_cache: self.file_cache.expect("file_cache is required"),
            workloads: self.workloads.expect("workloads is required"),
            stream_registry: self.stream_registry.expect("stream_registry is required"),
            token_store: self.token_store.expect("token_store is required"),
            id_codec: self.id_codec.expect("id_codec is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

/// Liveness probe: always 200 while the process is up.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: 200 once the session pool has pre-warmed at least once,
/// 503 otherwise.
async fn readiness_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::response::Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    let ready = state.session_pool.is_prewarmed();
    let body = serde_json::json!({ "ready": ready });
    if ready {
        (StatusCode::OK, axum::Json(body)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, axum::Json(body)).into_response()
    }
}

/// Builds the axum router with every route mounted.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/dl/{token}/{id}/{name}",
            get(download::stream_download).head(download::stream_download),
        )
        .route("/stream/stats", get(stats::get_stream_stats))
        .route("/stream/stats/{stream_id}", get(stats::get_stream_detail))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Binds the configured port and serves forever (until the process is killed
/// or the listener errors).
pub async fn start_server(state: AppState, addr: std::net::SocketAddr) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[Server] listening on http://{addr}");
    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
