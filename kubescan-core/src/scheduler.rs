//! Reconciliation-driven scan scheduling.
//!
//! Each trigger re-reads the cluster and the result store from scratch, so
//! missed or duplicated triggers are harmless. The single-job invariant is
//! checked against the live job list every cycle instead of a stored flag.

use std::{collections::HashSet, fmt, sync::Arc};

use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::cluster::ClusterClient;
use crate::error::{Result, ScanError};
use crate::jobs::JobFactory;
use crate::store::ScanResultStore;

/// Result of one scheduling cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingOutcome {
    /// Every observed image already has a stored result.
    AllScanned,
    /// A scan job has not finished yet; nothing was submitted.
    JobInFlight,
    /// A job for this image was handed to the cluster.
    JobSubmitted(String),
    /// Observation or submission failed; the next trigger retries.
    TransientError,
    /// The job template could not be rendered or decoded.
    JobCreationFailed,
}

/// Per-scope state, derived from an outcome rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Nothing running or nothing left to scan.
    Idle,
    /// A scan job is running for the scope.
    Scanning,
}

impl SchedulingOutcome {
    /// State of the scope after this outcome.
    pub fn scope_state(&self) -> ScopeState {
        match self {
            SchedulingOutcome::JobInFlight | SchedulingOutcome::JobSubmitted(_) => {
                ScopeState::Scanning
            }
            _ => ScopeState::Idle,
        }
    }
}

/// Decides, per trigger, whether to start the next scan job.
#[derive(Clone)]
pub struct ScanScheduler {
    cluster: Arc<dyn ClusterClient>,
    store: Arc<dyn ScanResultStore>,
    jobs: Arc<dyn JobFactory>,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanScheduler").finish_non_exhaustive()
    }
}

impl ScanScheduler {
    /// Scheduler over the given cluster, store and job factory.
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        store: Arc<dyn ScanResultStore>,
        jobs: Arc<dyn JobFactory>,
    ) -> Self {
        Self {
            cluster,
            store,
            jobs,
        }
    }

    /// Runs one cycle for `namespace`. Never fails; errors are logged and
    /// folded into the outcome.
    pub async fn on_trigger(&self, namespace: &str) -> SchedulingOutcome {
        let span = info_span!("scan_cycle", namespace = %namespace);
        match self.run_cycle(namespace).instrument(span).await {
            Ok(outcome) => outcome,
            Err(ScanError::JobCreation(err)) => {
                error!(namespace, error = %err, "failed to create job from template");
                SchedulingOutcome::JobCreationFailed
            }
            Err(err) => {
                warn!(namespace, error = %err, "scheduling cycle aborted");
                SchedulingOutcome::TransientError
            }
        }
    }

    async fn run_cycle(&self, namespace: &str) -> Result<SchedulingOutcome> {
        let recorded: HashSet<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|result| result.image_id)
            .collect();

        let observed = self.cluster.list_observed_images(namespace).await?;

        let candidates: Vec<&String> = observed
            .iter()
            .filter(|image| !recorded.contains(image.as_str()))
            .collect();

        let Some(next) = candidates.first() else {
            info!(observed = observed.len(), "all images scanned");
            return Ok(SchedulingOutcome::AllScanned);
        };

        debug!(candidates = candidates.len(), "unscanned images found");

        let jobs = self.cluster.list_scan_jobs(namespace).await?;
        if let Some(running) = jobs.iter().find(|job| !job.is_terminal_success()) {
            info!(job = %running.name, "job is still in progress");
            return Ok(SchedulingOutcome::JobInFlight);
        }

        let request = self.jobs.create(next, namespace)?;
        self.cluster.submit_job(&request).await?;

        info!(job = %request.job_name, image_id = %request.image_id, "new job created");
        Ok(SchedulingOutcome::JobSubmitted(request.image_id))
    }
}
