//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let sync_routes = Router::new()
        .route("/check", post(handlers::check))
        .route("/bidirectional-diff", post(handlers::bidirectional_diff))
        .route("/add", post(handlers::add_fingerprints))
        .route("/analyze-diff", post(handlers::analyze_diff))
        .route("/pull-diff-page", post(handlers::pull_diff_page))
        .route("/reset", post(handlers::reset_user))
        .route("/status", get(handlers::sync_status))
        .route("/service-stats", get(handlers::service_stats))
        // Operator overrides
        .route("/lock/{user_key}", delete(handlers::force_unlock))
        .route("/cache/{user_key}", delete(handlers::clear_caches));

    let admin_routes = Router::new()
        .route(
            "/user-keys",
            post(handlers::create_user_key).get(handlers::list_user_keys),
        )
        .route("/user-keys/{user_key}", put(handlers::update_user_key));

    // Health check is intentionally unauthenticated for probes.
    let mut router = Router::new()
        .nest("/frkbapi/v1/fingerprint-sync", sync_routes)
        .nest("/frkbapi/v1/admin", admin_routes)
        .route("/healthz", get(handlers::health_check));

    // When enabled, restrict /metrics to scraper IPs at the infrastructure
    // level; see crate::metrics.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Layers run outermost-first: TraceLayer -> auth -> handler.
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
