use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{downloads, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Downloads
        .route("/downloads", post(downloads::submit_download))
        .route("/downloads/status", get(downloads::get_status))
        .route(
            "/downloads/users/{user_id}",
            get(downloads::list_user_tasks).delete(downloads::cancel_user),
        )
        .route("/downloads/{task_id}", delete(downloads::cancel_task))
        // Formats
        .route("/formats", post(downloads::list_formats))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
