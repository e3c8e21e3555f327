//! Periodic reconciliation triggers, one loop per watched namespace.

use std::{sync::Arc, time::Duration};

use kubescan_core::{ClusterClient, ScanScheduler, SchedulingOutcome, ServiceContainer};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy)]
pub struct TriggerTiming {
    /// Delay after a cycle that found nothing to scan.
    pub idle_requeue: Duration,
    /// Delay after every other outcome.
    pub poll_interval: Duration,
}

impl TriggerTiming {
    pub fn next_delay(&self, outcome: &SchedulingOutcome) -> Duration {
        match outcome {
            SchedulingOutcome::AllScanned => self.idle_requeue,
            _ => self.poll_interval,
        }
    }
}

/// Drives the scheduler for `namespace` until initialization fails.
///
/// Services are fetched from the shared container on the first trigger; an
/// initialization error ends the loop and is returned to the caller.
pub async fn run_namespace_loop(
    namespace: String,
    container: Arc<ServiceContainer>,
    cluster: Arc<dyn ClusterClient>,
    timing: TriggerTiming,
) -> anyhow::Result<()> {
    let services = container.get().await.map_err(|e| {
        error!(namespace = %namespace, error = %e, "failed to initialize services");
        anyhow::anyhow!("service initialization failed for namespace {namespace}: {e}")
    })?;

    let scheduler = ScanScheduler::new(
        cluster,
        services.store.clone(),
        services.job_factory.clone(),
    );

    info!(namespace = %namespace, "scan trigger loop started");
    loop {
        let outcome = scheduler.on_trigger(&namespace).await;
        let delay = timing.next_delay(&outcome);
        debug!(
            namespace = %namespace,
            ?outcome,
            state = ?outcome.scope_state(),
            requeue_after = %humantime::format_duration(delay),
            "cycle finished"
        );
        tokio::time::sleep(delay).await;
    }
}
