//! # Kubescan Core
//!
//! Scan orchestration engine: decides which running image to scan next,
//! keeps at most one scan job in flight per namespace, stores CycloneDX
//! reports, and pushes newly stored image ids to live subscribers.
//!
//! ## Modules
//!
//! - [`scheduler`]: reconciliation-triggered scheduling decisions
//! - [`jobs`]: scan job rendering from a YAML template
//! - [`store`]: scan result persistence (PostgreSQL, SQLite)
//! - [`report`]: CycloneDX report validation
//! - [`notify`]: subscriber registry and broadcast dispatcher
//! - [`cluster`]: the port through which workloads and jobs are observed
//! - [`runtime`]: lazily-initialized process-wide services

pub mod cluster;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod store;

pub use cluster::{ClusterClient, ObservedJob};
pub use error::{Result, ScanError};
pub use jobs::{JobFactory, JobFactoryError, JobManifest, ScanJobRequest, TemplateJobFactory};
pub use notify::{NotificationHub, SubscriberHandle, SubscriberId};
pub use report::{ReportError, validate_report};
pub use runtime::{ServiceContainer, ServiceSettings, Services};
pub use scheduler::{ScanScheduler, SchedulingOutcome, ScopeState};
pub use service::ScanService;
pub use store::{DatabaseKind, ScanResult, ScanResultStore};
