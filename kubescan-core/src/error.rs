//! Crate-wide error type.

use thiserror::Error;

use crate::jobs::JobFactoryError;
use crate::report::ReportError;

/// Everything that can go wrong in the engine.
#[derive(Error, Debug)]
pub enum ScanError {
    /// No result is stored for the image id.
    #[error("Scan result not found: {0}")]
    NotFound(String),

    /// A report failed validation and was not stored.
    #[error(transparent)]
    Validation(#[from] ReportError),

    /// The persistence layer failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Listing workloads or jobs, or submitting a job, failed.
    #[error("Cluster error: {0}")]
    Cluster(String),

    /// The job template could not be rendered or decoded.
    #[error("Job creation failed: {0}")]
    JobCreation(#[from] JobFactoryError),

    /// Unusable configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required singleton could not be built. Fatal at startup.
    #[error("Initialization failed: {0}")]
    Initialization(String),
}

impl ScanError {
    /// True for [`ScanError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScanError::NotFound(_))
    }

    /// True for [`ScanError::Validation`].
    pub fn is_validation(&self) -> bool {
        matches!(self, ScanError::Validation(_))
    }
}

impl From<sqlx::Error> for ScanError {
    fn from(err: sqlx::Error) -> Self {
        ScanError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ScanError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        ScanError::Initialization(format!("schema migration failed: {err}"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScanError>;
