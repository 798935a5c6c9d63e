//! # Relwatch Gateway
//! HTTP control surface: manage tracked projects and tags, browse release
//! history, trigger checks, and test channel credentials.

mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use relwatch_core::RelwatchConfig;
use relwatch_core::traits::ReleaseSource;
use relwatch_engine::{Dispatcher, Scheduler};
use relwatch_store::StateStore;

pub struct AppState {
    pub store: Arc<StateStore>,
    pub scheduler: Arc<Scheduler>,
    pub dispatcher: Arc<Dispatcher>,
    pub source: Arc<dyn ReleaseSource>,
    pub config: RelwatchConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/projects", get(routes::list_projects))
        .route("/api/projects", post(routes::add_project))
        .route(
            "/api/projects/{owner}/{name}",
            delete(routes::remove_project),
        )
        .route(
            "/api/projects/{owner}/{name}/tags/{tag_id}",
            post(routes::assign_tag).delete(routes::unassign_tag),
        )
        .route("/api/releases", get(routes::recent_releases))
        .route("/api/tags", get(routes::list_tags).post(routes::create_tag))
        .route(
            "/api/tags/{tag_id}",
            patch(routes::update_tag).delete(routes::delete_tag),
        )
        .route(
            "/api/tags/{tag_id}/channels/{kind}",
            post(routes::set_tag_channel),
        )
        .route("/api/check-now", post(routes::check_now))
        .route("/api/last-cycle", get(routes::last_cycle))
        .route("/api/test/{kind}", post(routes::test_channel))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the future is dropped or the listener fails.
pub async fn serve(state: Arc<AppState>) -> relwatch_core::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.gateway.host, state.config.gateway.port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 gateway listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
