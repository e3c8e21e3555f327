//! Dashboard assets compiled into the binary.

use axum::{http::header, response::IntoResponse};

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const BUNDLE_JS: &str = include_str!("../../assets/bundle.js");
const OUTPUT_CSS: &str = include_str!("../../assets/output.css");

pub async fn index_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], INDEX_HTML)
}

pub async fn bundle_js_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        BUNDLE_JS,
    )
}

pub async fn output_css_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], OUTPUT_CSS)
}
