use std::{fmt, sync::Arc};

use kubescan_core::{NotificationHub, ScanService, Services};

use crate::infra::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(services: Arc<Services>, config: Arc<Config>) -> Self {
        Self { services, config }
    }

    pub fn scans(&self) -> &ScanService {
        &self.services.scans
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.services.hub
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
