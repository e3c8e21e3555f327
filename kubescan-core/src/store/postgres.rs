//! PostgreSQL adapter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::debug;

use super::{ScanResult, ScanResultStore};
use crate::error::{Result, ScanError};
use crate::report::validate_report;

/// Embedded PostgreSQL schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

/// [`ScanResultStore`] over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PostgresScanResultStore {
    pool: PgPool,
}

impl PostgresScanResultStore {
    /// Connects to `dsn` and applies the schema.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| ScanError::Initialization(format!("failed to connect to PostgreSQL: {e}")))?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wraps an existing pool without migrating.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ScanResultStore for PostgresScanResultStore {
    async fn get(&self, image_id: &str) -> Result<ScanResult> {
        sqlx::query_as::<_, ScanResult>(
            r#"
            SELECT image_id, report, updated_at
            FROM scan_results
            WHERE image_id = $1
            "#,
        )
        .bind(image_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| ScanError::Storage(format!("Failed to load scan result: {e}")))?
        .ok_or_else(|| ScanError::NotFound(image_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<ScanResult>> {
        sqlx::query_as::<_, ScanResult>(
            r#"
            SELECT image_id, report, updated_at
            FROM scan_results
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| ScanError::Storage(format!("Failed to list scan results: {e}")))
    }

    async fn delete(&self, image_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scan_results WHERE image_id = $1")
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
            vulnerabilities = summary.vulnerability_count,
            "report validated"
        );

        sqlx::query_as::<_, ScanResult>(
            r#"
            INSERT INTO scan_results (image_id, report, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (image_id) DO UPDATE
            SET report = EXCLUDED.report,
                updated_at = EXCLUDED.updated_at
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
    use crate::jobs::generate_id;

    async fn store_or_skip() -> Option<PostgresScanResultStore> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("skipping: DATABASE_URL not set");
                return None;
            }
        };

        match PostgresScanResultStore::connect(&database_url).await {
            Ok(store) => Some(store),
            Err(err) => {
                eprintln!("skipping: failed to connect to DATABASE_URL ({err})");
                None
            }
        }
    }

    #[tokio::test]
    async fn upsert_get_delete_round_trip() {
        let Some(store) = store_or_skip().await else {
            return;
        };
        store.ping().await.unwrap();

        let image_id = format!("registry.test/app@sha256:{}", generate_id());
        let first = "{ \"specVersion\":\"1.4\",   \"bomFormat\" : \"CycloneDX\" }";
        let second = r#"{"bomFormat":"CycloneDX","specVersion":"1.6","version":2}"#;

        assert!(store.get(&image_id).await.unwrap_err().is_not_found());

        let stored = store.upsert(&image_id, first).await.unwrap();
        assert_eq!(stored.report, first);
        assert_eq!(store.get(&image_id).await.unwrap().report, first);

        let replaced = store.upsert(&image_id, second).await.unwrap();
        assert!(replaced.updated_at >= stored.updated_at);
        let listed: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|result| result.image_id == image_id)
            .collect();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].report, second);

        let err = store.upsert(&image_id, "{not valid json}").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.get(&image_id).await.unwrap().report, second);

        store.delete(&image_id).await.unwrap();
        store.delete(&image_id).await.unwrap();
        assert!(store.get(&image_id).await.unwrap_err().is_not_found());
    }
}
