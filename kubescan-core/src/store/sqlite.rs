//! SQLite adapter.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::debug;

use super::{ScanResult, ScanResultStore};
use crate::error::{Result, ScanError};
use crate::report::validate_report;

/// Embedded SQLite schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// [`ScanResultStore`] over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteScanResultStore {
    pool: SqlitePool,
}

impl SqliteScanResultStore {
    /// Opens `dsn` (creating the file if needed) and applies the schema.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| ScanError::Config(format!("invalid SQLite DSN: {e}")))?
            .create_if_missing(true);

        // In-memory databases live and die with a single connection.
        let in_memory = dsn.contains(":memory:") || dsn.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| ScanError::Initialization(format!("failed to open SQLite database: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, mainly for tests and local runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ScanResultStore for SqliteScanResultStore {
    async fn get(&self, image_id: &str) -> Result<ScanResult> {
        sqlx::query_as::<_, ScanResult>(
            "SELECT image_id, report, updated_at FROM scan_results WHERE image_id = ?1",
        )
        .bind(image_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ScanError::Storage(format!("Failed to load scan result: {e}")))?
        .ok_or_else(|| ScanError::NotFound(image_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<ScanResult>> {
        sqlx::query_as::<_, ScanResult>("SELECT image_id, report, updated_at FROM scan_results")
            .fetch_all(self.pool())
            .await
            .map_err(|e| ScanError::Storage(format!("Failed to list scan results: {e}")))
    }

    async fn delete(&self, image_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scan_results WHERE image_id = ?1")
            .bind(image_id)
            .execute(self.pool())
            .await
            .map_err(|e| ScanError::Storage(format!("Failed to delete scan result: {e}")))?;
        Ok(())
    }

    async fn upsert(&self, image_id: &str, raw_report: &str) -> Result<ScanResult> {
        let summary = validate_report(raw_report)?;
        debug!(
            image_id,
            spec_version = %summary.spec_version,
            components = summary.component_count,
            "report validated"
        );

        sqlx::query_as::<_, ScanResult>(
            r#"
            INSERT INTO scan_results (image_id, report, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (image_id) DO UPDATE
            SET report = excluded.report,
                updated_at = excluded.updated_at
            RETURNING image_id, report, updated_at
            "#,
        )
        .bind(image_id)
        .bind(raw_report)
        .bind(Utc::now())
        .fetch_one(self.pool())
        .await
        .map_err(|e| ScanError::Storage(format!("Failed to upsert scan result: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| ScanError::Storage(format!("Database ping failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bom(component: &str) -> String {
        format!(
            r#"{{"bomFormat":"CycloneDX","specVersion":"1.5","version":1,"components":[{{"type":"library","name":"{component}"}}]}}"#
        )
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = SqliteScanResultStore::in_memory().await.unwrap();
        let err = store.get("sha256:missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn upsert_round_trips_exact_bytes() {
        let store = SqliteScanResultStore::in_memory().await.unwrap();
        // Odd spacing and key order must survive untouched.
        let raw = "{ \"specVersion\":\"1.4\",   \"bomFormat\" : \"CycloneDX\" }";

        let stored = store.upsert("img1", raw).await.unwrap();
        assert_eq!(stored.report, raw);

        let fetched = store.get("img1").await.unwrap();
        assert_eq!(fetched.image_id, "img1");
        assert_eq!(fetched.report, raw);
    }

    #[tokio::test]
    async fn upsert_replaces_previous_report() {
        let store = SqliteScanResultStore::in_memory().await.unwrap();
        let first = store.upsert("img1", &bom("openssl")).await.unwrap();
        let second = store.upsert("img1", &bom("zlib")).await.unwrap();
        assert!(second.updated_at >= first.updated_at);

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].report, bom("zlib"));
        assert!(!all[0].report.contains("openssl"));
    }

    #[tokio::test]
    async fn invalid_report_leaves_store_unchanged() {
        let store = SqliteScanResultStore::in_memory().await.unwrap();
        store.upsert("img1", &bom("openssl")).await.unwrap();

        let err = store.upsert("img1", "{not valid json}").await.unwrap_err();
        assert!(err.is_validation());

        let err = store.upsert("img2", "{not valid json}").await.unwrap_err();
        assert!(err.is_validation());

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].report, bom("openssl"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SqliteScanResultStore::in_memory().await.unwrap();
        store.delete("never-stored").await.unwrap();

        store.upsert("img1", &bom("openssl")).await.unwrap();
        store.delete("img1").await.unwrap();
        store.delete("img1").await.unwrap();

        assert!(store.get("img1").await.unwrap_err().is_not_found());
        assert!(store.list().await.unwrap().is_empty());
    }
}
