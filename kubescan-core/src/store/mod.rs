//! Scan result persistence.
//!
//! [`ScanResultStore`] is the capability surface the scheduler and the HTTP
//! layer depend on. Both SQL adapters validate a report before touching
//! storage and replace the whole row on conflict.

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, ScanError};

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresScanResultStore;
pub use sqlite::SqliteScanResultStore;

/// A stored report keyed by the image it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Unique key.
    pub image_id: String,
    /// Original report text, byte-identical to what was validated.
    pub report: String,
    /// Time of the last upsert.
    pub updated_at: DateTime<Utc>,
}

/// Keyed storage for scan reports.
#[async_trait]
pub trait ScanResultStore: Send + Sync {
    /// Result for `image_id`, or [`ScanError::NotFound`].
    async fn get(&self, image_id: &str) -> Result<ScanResult>;

    /// All stored results. Order is unspecified.
    async fn list(&self) -> Result<Vec<ScanResult>>;

    /// Removes a result. Deleting an absent key succeeds.
    async fn delete(&self, image_id: &str) -> Result<()>;

    /// Validates `raw_report` and inserts or fully replaces the row for
    /// `image_id`. Invalid reports never reach storage.
    async fn upsert(&self, image_id: &str, raw_report: &str) -> Result<ScanResult>;

    /// Cheap reachability probe used by health checks.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Storage backends selectable through `DATABASE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    /// PostgreSQL via `sqlx`.
    Postgres,
    /// SQLite file or in-memory database.
    Sqlite,
}

impl FromStr for DatabaseKind {
    type Err = ScanError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "sqlite" => Ok(DatabaseKind::Sqlite),
            "mysql" => Err(ScanError::Config(
                "mysql is not supported; use postgres or sqlite".to_string(),
            )),
            other => Err(ScanError::Config(format!(
                "unsupported database type: {other}"
            ))),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Postgres => f.write_str("postgres"),
            DatabaseKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Opens the configured backend and applies its schema.
pub async fn connect_store(kind: DatabaseKind, dsn: &str) -> Result<Arc<dyn ScanResultStore>> {
    info!(database = %kind, "connecting to database");
    let store: Arc<dyn ScanResultStore> = match kind {
        DatabaseKind::Postgres => Arc::new(PostgresScanResultStore::connect(dsn).await?),
        DatabaseKind::Sqlite => Arc::new(SqliteScanResultStore::connect(dsn).await?),
    };
    Ok(store)
}
