#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, header},
};
use kubescan_core::{ServiceContainer, Services};
use kubescan_server::{AppState, create_router, infra::config::Config};

pub const IMAGE: &str = "docker.io/library/nginx@sha256:4c0fdaa8b6341bfdeca5f18f7837462c80cff90527ee35ef185571e1c327beac";

// Deliberately unusual spacing so byte-for-byte storage is observable.
pub const REPORT: &str = r#"{"bomFormat": "CycloneDX",  "specVersion":"1.5","version":1,
  "components":[{"type":"library","name":"openssl","version":"3.0.13"}],
  "vulnerabilities":[{"id":"CVE-2024-0727"}]}"#;

/// Router over a fresh in-memory store with default settings.
pub async fn setup() -> (Router, Arc<Services>) {
    setup_with(&[]).await
}

/// Like [`setup`], with extra environment entries.
pub async fn setup_with(vars: &[(&str, &str)]) -> (Router, Arc<Services>) {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = Config::from_lookup(|key| match key {
        "DATABASE_TYPE" => Some("sqlite".to_string()),
        "DSN" => Some("sqlite::memory:".to_string()),
        _ => vars.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
    })
    .expect("config");

    let container = ServiceContainer::new(config.service_settings());
    let services = container.get().await.expect("services");
    let app = create_router(AppState::new(services.clone(), Arc::new(config)));
    (app, services)
}

pub fn put_request(body: String) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri("/scan-results")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn payload(image_id: &str, report: &str) -> String {
    format!(
        r#"{{"imageId":{},"report":{}}}"#,
        serde_json::to_string(image_id).unwrap(),
        report
    )
}

/// A valid BOM listing `count` components, roughly 95 bytes each.
pub fn bom_with_components(count: usize) -> String {
    let components: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"type":"library","name":"pkg-{i}","version":"1.0.{i}","purl":"pkg:deb/debian/pkg-{i}@1.0.{i}"}}"#
            )
        })
        .collect();
    format!(
        r#"{{"bomFormat":"CycloneDX","specVersion":"1.6","version":1,"components":[{}]}}"#,
        components.join(",")
    )
}
