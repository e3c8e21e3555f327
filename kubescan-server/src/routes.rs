use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{assets, health, scan_results, subscribe};
use crate::infra::app_state::AppState;

/// Builds the HTTP surface: result CRUD, live subscription, dashboard.
pub fn create_router(state: AppState) -> Router {
    // Reports for large images routinely exceed axum's 2 MB default
    let report_limit = match state.config().max_report_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(assets::index_handler))
        .route("/bundle.js", get(assets::bundle_js_handler))
        .route("/output.css", get(assets::output_css_handler))
        .route("/health", get(health::health_handler))
        .route("/subscribe", get(subscribe::subscribe_handler))
        .route(
            "/scan-results",
            get(scan_results::list_scan_results_handler)
                .merge(put(scan_results::put_scan_result_handler).layer(report_limit)),
        )
        // Image ids contain slashes, so the key is a wildcard segment
        .route(
            "/scan-results/{*image_id}",
            get(scan_results::get_scan_result_handler)
                .delete(scan_results::delete_scan_result_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
