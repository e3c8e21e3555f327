//! The port through which workloads and scan jobs are observed.

use async_trait::async_trait;

use crate::error::Result;
use crate::jobs::ScanJobRequest;

/// Scan job as last reported by the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedJob {
    /// Job name.
    pub name: String,
    /// Number of pods that ran to completion.
    pub succeeded: u32,
}

impl ObservedJob {
    /// Finished with at least one successful pod.
    pub fn is_terminal_success(&self) -> bool {
        self.succeeded > 0
    }
}

/// Read/act surface over the cluster used by the scheduler.
///
/// Implementations report failures as [`crate::ScanError::Cluster`]; the
/// scheduler treats every one of them as transient.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Image ids of running workloads in `namespace`, in enumeration order.
    async fn list_observed_images(&self, namespace: &str) -> Result<Vec<String>>;

    /// Scan jobs owned by this system in `namespace`.
    async fn list_scan_jobs(&self, namespace: &str) -> Result<Vec<ObservedJob>>;

    /// Hands a rendered job to the orchestration layer.
    async fn submit_job(&self, request: &ScanJobRequest) -> Result<()>;
}
