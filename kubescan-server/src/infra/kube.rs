//! Kubernetes API adapter for the scheduler's cluster port.
//!
//! Talks to the API server's REST endpoints directly: pods and jobs are
//! listed per namespace and new scan jobs are created through the batch API.

use std::{env, fmt, fs, path::Path, time::Duration};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use kubescan_core::{
    ClusterClient, ObservedJob, ScanError, ScanJobRequest,
    jobs::{MANAGED_BY_LABEL, MANAGED_BY_VALUE},
};
use reqwest::{Certificate, Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Clone)]
pub struct KubeApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub ca_pem: Option<Vec<u8>>,
    /// Pods whose value for this label is `false` are never scanned.
    pub scan_label: String,
}

impl fmt::Debug for KubeApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeApiConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("scan_label", &self.scan_label)
            .finish()
    }
}

impl KubeApiConfig {
    /// `KUBE_API_URL`/`KUBE_TOKEN` when set, otherwise the in-cluster
    /// service account.
    pub fn from_env(scan_label: &str) -> anyhow::Result<Self> {
        if let Ok(base_url) = env::var("KUBE_API_URL") {
            return Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                token: env::var("KUBE_TOKEN").ok(),
                ca_pem: None,
                scan_label: scan_label.to_string(),
            });
        }

        let host = env::var("KUBERNETES_SERVICE_HOST")
            .context("KUBERNETES_SERVICE_HOST is not set; not running in a cluster and KUBE_API_URL is unset")?;
        let port = env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host
        };

        let account = Path::new(SERVICE_ACCOUNT_DIR);
        let token = fs::read_to_string(account.join("token"))
            .context("failed to read service account token")?;
        let ca_pem = fs::read(account.join("ca.crt")).context("failed to read cluster CA bundle")?;

        Ok(Self {
            base_url: format!("https://{host}:{port}"),
            token: Some(token.trim().to_string()),
            ca_pem: Some(ca_pem),
            scan_label: scan_label.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct KubeApiClient {
    http: Client,
    config: KubeApiConfig,
}

impl KubeApiClient {
    pub fn new(config: KubeApiConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(30));
        if let Some(pem) = &config.ca_pem {
            let cert = Certificate::from_pem(pem).map_err(|e| anyhow!("invalid cluster CA: {e}"))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build().context("failed to build Kubernetes API client")?;
        Ok(Self { http, config })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        label_selector: &str,
    ) -> kubescan_core::Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .authorized(self.http.get(&url))
            .query(&[("labelSelector", label_selector)])
            .send()
            .await
            .map_err(|e| ScanError::Cluster(format!("GET {path} failed: {e}")))?;

        check_status(response, path)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ScanError::Cluster(format!("GET {path} returned an unexpected body: {e}")))
    }
}

async fn check_status(response: Response, path: &str) -> kubescan_core::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ScanError::Cluster(format!("{path} returned {status}: {body}")))
}

#[async_trait]
impl ClusterClient for KubeApiClient {
    async fn list_observed_images(&self, namespace: &str) -> kubescan_core::Result<Vec<String>> {
        let selector = format!("{}!=false", self.config.scan_label);
        let pods: PodList = self
            .get_json(&format!("/api/v1/namespaces/{namespace}/pods"), &selector)
            .await?;
        Ok(collect_image_ids(&pods))
    }

    async fn list_scan_jobs(&self, namespace: &str) -> kubescan_core::Result<Vec<ObservedJob>> {
        let selector = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE}");
        let jobs: JobList = self
            .get_json(&format!("/apis/batch/v1/namespaces/{namespace}/jobs"), &selector)
            .await?;
        Ok(jobs.into_observed())
    }

    async fn submit_job(&self, request: &ScanJobRequest) -> kubescan_core::Result<()> {
        let path = format!("/apis/batch/v1/namespaces/{}/jobs", request.namespace);
        let response = self
            .authorized(self.http.post(format!("{}{}", self.config.base_url, path)))
            .json(&request.manifest)
            .send()
            .await
            .map_err(|e| ScanError::Cluster(format!("POST {path} failed: {e}")))?;
        check_status(response, &path).await?;
        debug!(job = %request.job_name, "job accepted by API server");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Default, Deserialize)]
struct Pod {
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
    #[serde(default)]
    init_container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerStatus {
    #[serde(rename = "imageID", default)]
    image_id: String,
}

/// Image ids in listing order: each pod's containers, then its init
/// containers. Blank ids (not yet pulled) are skipped, repeats collapse.
fn collect_image_ids(pods: &PodList) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    pods.items
        .iter()
        .filter_map(|pod| pod.status.as_ref())
        .flat_map(|status| {
            status
                .container_statuses
                .iter()
                .chain(status.init_container_statuses.iter())
        })
        .map(|container| container.image_id.as_str())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct JobList {
    #[serde(default)]
    items: Vec<Job>,
}

#[derive(Debug, Default, Deserialize)]
struct Job {
    #[serde(default)]
    metadata: JobMeta,
    #[serde(default)]
    status: Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct JobMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct JobStatus {
    #[serde(default)]
    succeeded: Option<u32>,
}

impl JobList {
    fn into_observed(self) -> Vec<ObservedJob> {
        self.items
            .into_iter()
            .map(|job| ObservedJob {
                name: job.metadata.name,
                succeeded: job.status.and_then(|s| s.succeeded).unwrap_or(0),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_image_ids_in_listing_order() {
        let pods: PodList = serde_json::from_value(serde_json::json!({
            "items": [
                {"status": {
                    "containerStatuses": [
                        {"name": "web", "imageID": "docker.io/nginx@sha256:aaa"},
                        {"name": "sidecar", "imageID": "docker.io/envoy@sha256:bbb"}
                    ],
                    "initContainerStatuses": [
                        {"name": "migrate", "imageID": "docker.io/flyway@sha256:ccc"}
                    ]
                }},
                {"status": {"phase": "Pending", "containerStatuses": [{"name": "web", "imageID": ""}]}},
                {"metadata": {"name": "no-status"}},
                {"status": {"containerStatuses": [
                    {"name": "web", "imageID": "docker.io/nginx@sha256:aaa"},
                    {"name": "api", "imageID": "ghcr.io/acme/api@sha256:ddd"}
                ]}}
            ]
        }))
        .unwrap();

        assert_eq!(
            collect_image_ids(&pods),
            vec![
                "docker.io/nginx@sha256:aaa",
                "docker.io/envoy@sha256:bbb",
                "docker.io/flyway@sha256:ccc",
                "ghcr.io/acme/api@sha256:ddd",
            ]
        );
    }

    #[test]
    fn reads_job_completion() {
        let jobs: JobList = serde_json::from_value(serde_json::json!({
            "items": [
                {"metadata": {"name": "scan-done"}, "status": {"succeeded": 1}},
                {"metadata": {"name": "scan-running"}, "status": {"active": 1}},
                {"metadata": {"name": "scan-new"}}
            ]
        }))
        .unwrap();

        let observed = jobs.into_observed();
        assert_eq!(observed.len(), 3);
        assert!(observed[0].is_terminal_success());
        assert!(!observed[1].is_terminal_success());
        assert!(!observed[2].is_terminal_success());
    }

    #[test]
    fn config_debug_hides_token() {
        let config = KubeApiConfig {
            base_url: "https://10.0.0.1:443".into(),
            token: Some("secret-token".into()),
            ca_pem: None,
            scan_label: "security-scan".into(),
        };
        assert!(!format!("{config:?}").contains("secret-token"));
    }
}
