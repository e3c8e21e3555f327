//! The validate, store and announce pipeline.

use std::{fmt, sync::Arc};

use tracing::info;

use crate::error::Result;
use crate::notify::NotificationHub;
use crate::store::{ScanResult, ScanResultStore};

/// Application-facing operations on scan results. Successful upserts are
/// broadcast to live subscribers; rejected ones never are.
#[derive(Clone)]
pub struct ScanService {
    store: Arc<dyn ScanResultStore>,
    hub: Arc<NotificationHub>,
}

impl fmt::Debug for ScanService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanService")
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl ScanService {
    /// Service announcing on `hub` whatever it stores in `store`.
    pub fn new(store: Arc<dyn ScanResultStore>, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn ScanResultStore> {
        &self.store
    }

    /// Hub new results are announced on.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// See [`ScanResultStore::get`].
    pub async fn get(&self, image_id: &str) -> Result<ScanResult> {
        self.store.get(image_id).await
    }

    /// See [`ScanResultStore::list`].
    pub async fn list(&self) -> Result<Vec<ScanResult>> {
        self.store.list().await
    }

    /// Idempotent delete.
    pub async fn delete(&self, image_id: &str) -> Result<()> {
        self.store.delete(image_id).await
    }

    /// Stores a worker's report, then announces the image id. Waits for the
    /// notification dispatcher to accept the announcement before returning.
    pub async fn submit_report(&self, image_id: &str, raw_report: &str) -> Result<ScanResult> {
        let result = self.store.upsert(image_id, raw_report).await?;
        self.hub.publish(result.image_id.clone()).await;
        info!(image_id = %result.image_id, "new imageId broadcasted");
        Ok(result)
    }
}
