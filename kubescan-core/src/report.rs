//! CycloneDX report validation.
//!
//! Reports arrive as raw JSON text from scan workers. Validation only reads
//! the payload; callers keep the original text and persist it unchanged.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

const BOM_FORMAT: &str = "CycloneDX";
const SUPPORTED_SPEC_VERSIONS: &[&str] = &["1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6"];

/// Why a report was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// Malformed, truncated or not a CycloneDX BOM.
    #[error("invalid CycloneDX BOM: {0}")]
    InvalidFormat(String),
}

/// Facts gathered while validating a report, used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BomSummary {
    /// Declared `specVersion`.
    pub spec_version: String,
    /// Top-level and nested components.
    pub component_count: usize,
    /// Entries in `vulnerabilities`.
    pub vulnerability_count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BomDocument {
    bom_format: String,
    spec_version: String,
    #[serde(default)]
    #[allow(dead_code)]
    serial_number: Option<String>,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    vulnerabilities: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    components: Vec<Component>,
}

impl Component {
    fn count(&self) -> usize {
        1 + self.components.iter().map(Component::count).sum::<usize>()
    }

    fn check(&self) -> Result<(), ReportError> {
        if self.kind.trim().is_empty() {
            return Err(ReportError::InvalidFormat(format!(
                "component '{}' has an empty type",
                self.name
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ReportError::InvalidFormat(
                "component with an empty name".to_string(),
            ));
        }
        self.components.iter().try_for_each(Component::check)
    }
}

/// Parses `raw` as a CycloneDX JSON document and checks its structure.
pub fn validate_report(raw: &str) -> Result<BomSummary, ReportError> {
    let bom: BomDocument =
        serde_json::from_str(raw).map_err(|e| ReportError::InvalidFormat(e.to_string()))?;

    if bom.bom_format != BOM_FORMAT {
        return Err(ReportError::InvalidFormat(format!(
            "unexpected bomFormat '{}'",
            bom.bom_format
        )));
    }

    if !SUPPORTED_SPEC_VERSIONS.contains(&bom.spec_version.as_str()) {
        return Err(ReportError::InvalidFormat(format!(
            "unsupported specVersion '{}'",
            bom.spec_version
        )));
    }

    if bom.version == Some(0) {
        return Err(ReportError::InvalidFormat(
            "version must be at least 1".to_string(),
        ));
    }

    bom.components.iter().try_for_each(Component::check)?;

    Ok(BomSummary {
        spec_version: bom.spec_version,
        component_count: bom.components.iter().map(Component::count).sum(),
        vulnerability_count: bom.vulnerabilities.len(),
    })
}
