//! HTTP surface over the presentation state and the timeline engine.

mod awb_list;
mod handlers;
mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use sts_state::PresentationView;
use sts_timeline::TimelineEngine;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

pub use awb_list::{
    list_identifiers, paginate, recent_window_start, AwbFilter, AwbSortKey, PageError,
    RECENT_WINDOW_MS,
};
pub use handlers::DEFAULT_TIMESPAN_MINUTES;

pub const STATUS_ENDPOINT: &str = "/api/status";
pub const AWB_LIST_ENDPOINT: &str = "/api/awb";
pub const USER_LIST_ENDPOINT: &str = "/api/user";
pub const STATUS_CODE_LIST_ENDPOINT: &str = "/api/stslist";
pub const TIMELINE_ENDPOINT: &str = "/api/timeline";
pub const METRICS_ENDPOINT: &str = "/api/metrics";
pub const HEALTH_ENDPOINT: &str = "/api/deadoralive";

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct GatewayState {
    pub view: PresentationView,
    pub timeline: TimelineEngine,
}

impl GatewayState {
    pub fn new(view: PresentationView, timeline: TimelineEngine) -> Self {
        Self { view, timeline }
    }
}

/// Builds the `/api/*` router. `static_dir` is served as the fallback when
/// it names an existing directory.
pub fn build_gateway_router(state: Arc<GatewayState>, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route(STATUS_ENDPOINT, get(handlers::handle_status))
        .route(AWB_LIST_ENDPOINT, get(handlers::handle_awb_list))
        .route(USER_LIST_ENDPOINT, get(handlers::handle_user_list))
        .route(STATUS_CODE_LIST_ENDPOINT, get(handlers::handle_status_code_list))
        .route(TIMELINE_ENDPOINT, get(handlers::handle_timeline))
        .route(METRICS_ENDPOINT, get(handlers::handle_metrics))
        .route(HEALTH_ENDPOINT, get(handlers::handle_health))
        .with_state(state);

    let router = match static_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => {
            if let Some(dir) = static_dir {
                tracing::warn!(path = %dir.display(), "static directory not found; serving api only");
            }
            router
        }
    };
    router.layer(CorsLayer::permissive())
}

/// Binds `bind` and serves `router` until `shutdown` resolves.
pub async fn serve_gateway<F>(bind: SocketAddr, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind gateway on {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve gateway bound address")?;
    tracing::info!(addr = %local_addr, "gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited unexpectedly")?;
    Ok(())
}
