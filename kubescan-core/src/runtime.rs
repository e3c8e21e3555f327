//! Process-wide services built once on first use.
//!
//! Any number of triggers and request handlers may race on
//! [`ServiceContainer::get`]; the first caller initializes, the rest wait for
//! it and share the result. A failed initialization is not cached, so callers
//! see the error and decide whether it is fatal.

use std::{fmt, path::PathBuf, sync::Arc};

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{Result, ScanError};
use crate::jobs::{JobFactory, TemplateJobFactory};
use crate::notify::{DEFAULT_SUBSCRIBER_BUFFER, NotificationHub};
use crate::service::ScanService;
use crate::store::{DatabaseKind, ScanResultStore, connect_store};

/// Inputs needed to build [`Services`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Storage backend.
    pub database: DatabaseKind,
    /// Connection string for the backend.
    pub dsn: String,
    /// Overrides the embedded job template.
    pub job_template: Option<PathBuf>,
    /// See [`DEFAULT_SUBSCRIBER_BUFFER`].
    pub subscriber_buffer: usize,
}

impl ServiceSettings {
    /// Settings with the embedded template and default buffer.
    pub fn new(database: DatabaseKind, dsn: impl Into<String>) -> Self {
        Self {
            database,
            dsn: dsn.into(),
            job_template: None,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// The process-wide singletons.
pub struct Services {
    /// Result store.
    pub store: Arc<dyn ScanResultStore>,
    /// Job factory shared by all trigger loops.
    pub job_factory: Arc<dyn JobFactory>,
    /// Notification hub.
    pub hub: Arc<NotificationHub>,
    /// Store and hub combined for request handlers.
    pub scans: ScanService,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

/// Builds [`Services`] on first [`get`](ServiceContainer::get).
#[derive(Debug)]
pub struct ServiceContainer {
    settings: ServiceSettings,
    services: OnceCell<Arc<Services>>,
}

impl ServiceContainer {
    /// Container that initializes lazily from `settings`.
    pub fn new(settings: ServiceSettings) -> Self {
        Self {
            settings,
            services: OnceCell::new(),
        }
    }

    /// Shared services, initializing them if no earlier call succeeded.
    pub async fn get(&self) -> Result<Arc<Services>> {
        self.services
            .get_or_try_init(|| initialize(&self.settings))
            .await
            .cloned()
    }
}

async fn initialize(settings: &ServiceSettings) -> Result<Arc<Services>> {
    let store = connect_store(settings.database, &settings.dsn).await?;

    let factory = match &settings.job_template {
        Some(path) => {
            info!(path = %path.display(), "loading job template");
            TemplateJobFactory::from_file(path)
        }
        None => TemplateJobFactory::with_default_template(),
    }
    .map_err(|e| ScanError::Initialization(format!("unable to create job factory: {e}")))?;

    let hub = Arc::new(NotificationHub::with_subscriber_buffer(settings.subscriber_buffer));
    let scans = ScanService::new(store.clone(), hub.clone());

    info!(database = %settings.database, "services initialized");
    Ok(Arc::new(Services {
        store,
        job_factory: Arc::new(factory),
        hub,
        scans,
    }))
}
