//! Scan job rendering.
//!
//! A job is rendered from a YAML template, then decoded back into a
//! [`JobManifest`] so a corrupted template or an image id that breaks the
//! YAML is caught before anything reaches the cluster.

use std::{collections::BTreeMap, fmt, path::Path};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Job name suffixes.
pub mod id;

pub use id::generate_id;

/// Template shipped with the crate.
pub const DEFAULT_JOB_TEMPLATE: &str = include_str!("job.template.yaml");

/// Label carried by every job this system creates.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`] on our jobs.
pub const MANAGED_BY_VALUE: &str = "kubescan";

const JOB_API_VERSION: &str = "batch/v1";
const JOB_KIND: &str = "Job";
const KNOWN_VARIABLES: &[&str] = &["ScanName", "ImageID", "Namespace"];

/// Failure to produce a job description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobFactoryError {
    /// The template is unreadable or has an unknown or broken placeholder.
    #[error("template error: {0}")]
    Template(String),

    /// The rendered text is not a usable Job.
    #[error("decode error: {0}")]
    Decode(String),
}

/// The subset of Kubernetes object metadata a scan job needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Object name.
    pub name: String,
    /// Namespace, if set in the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Object labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Object annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Decoded `batch/v1` Job, ready to submit as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManifest {
    /// Always `batch/v1` after decoding.
    pub api_version: String,
    /// Always `Job` after decoding.
    pub kind: String,
    /// Name and namespace match the request.
    pub metadata: ObjectMeta,
    /// Job spec, passed through untouched.
    pub spec: Value,
}

/// One scheduling decision's worth of work. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanJobRequest {
    /// Image the job will scan.
    pub image_id: String,
    /// Namespace the job is created in.
    pub namespace: String,
    /// `scan-` plus a random suffix.
    pub job_name: String,
    /// The decoded Job.
    pub manifest: JobManifest,
}

/// Produces the job description for scanning one image.
pub trait JobFactory: Send + Sync {
    /// Builds a fresh, uniquely named job for `image_id` in `namespace`.
    fn create(&self, image_id: &str, namespace: &str) -> Result<ScanJobRequest, JobFactoryError>;
}

/// [`JobFactory`] backed by a YAML template with `{{ .Var }}` placeholders.
pub struct TemplateJobFactory {
    template: String,
    placeholder: Regex,
}

impl fmt::Debug for TemplateJobFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateJobFactory")
            .field("template_len", &self.template.len())
            .finish()
    }
}

impl TemplateJobFactory {
    /// Compiles `template`, rejecting placeholders that can never be filled.
    pub fn new(template: impl Into<String>) -> Result<Self, JobFactoryError> {
        let placeholder = Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
            .map_err(|e| JobFactoryError::Template(e.to_string()))?;
        let template = template.into();

        for caps in placeholder.captures_iter(&template) {
            let name = &caps[1];
            if !KNOWN_VARIABLES.contains(&name) {
                return Err(JobFactoryError::Template(format!(
                    "unknown template variable '{name}'"
                )));
            }
        }

        Ok(Self {
            template,
            placeholder,
        })
    }

    /// Uses [`DEFAULT_JOB_TEMPLATE`].
    pub fn with_default_template() -> Result<Self, JobFactoryError> {
        Self::new(DEFAULT_JOB_TEMPLATE)
    }

    /// Reads the template from `path`.
    pub fn from_file(path: &Path) -> Result<Self, JobFactoryError> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            JobFactoryError::Template(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::new(template)
    }

    fn render(&self, scan_name: &str, image_id: &str, namespace: &str) -> Result<String, JobFactoryError> {
        let mut unknown = None;
        let rendered = self
            .placeholder
            .replace_all(&self.template, |caps: &Captures<'_>| match &caps[1] {
                "ScanName" => scan_name.to_string(),
                "ImageID" => image_id.to_string(),
                "Namespace" => namespace.to_string(),
                other => {
                    unknown.get_or_insert_with(|| other.to_string());
                    String::new()
                }
            })
            .into_owned();

        if let Some(name) = unknown {
            return Err(JobFactoryError::Template(format!(
                "unknown template variable '{name}'"
            )));
        }
        if rendered.contains("{{") {
            return Err(JobFactoryError::Template(
                "unterminated placeholder in job template".to_string(),
            ));
        }
        Ok(rendered)
    }

    fn decode(rendered: &str, job_name: &str, namespace: &str) -> Result<JobManifest, JobFactoryError> {
        let manifest: JobManifest =
            serde_yaml::from_str(rendered).map_err(|e| JobFactoryError::Decode(e.to_string()))?;

        if manifest.api_version != JOB_API_VERSION || manifest.kind != JOB_KIND {
            return Err(JobFactoryError::Decode(format!(
                "expected {JOB_API_VERSION} {JOB_KIND}, got {} {}",
                manifest.api_version, manifest.kind
            )));
        }
        if manifest.metadata.name != job_name {
            return Err(JobFactoryError::Decode(format!(
                "rendered job name '{}' does not match '{job_name}'",
                manifest.metadata.name
            )));
        }
        if manifest.metadata.namespace.as_deref() != Some(namespace) {
            return Err(JobFactoryError::Decode(format!(
                "rendered job namespace does not match '{namespace}'"
            )));
        }
        if !manifest.spec.get("template").is_some_and(Value::is_object) {
            return Err(JobFactoryError::Decode(
                "job spec has no pod template".to_string(),
            ));
        }

        Ok(manifest)
    }
}

impl JobFactory for TemplateJobFactory {
    fn create(&self, image_id: &str, namespace: &str) -> Result<ScanJobRequest, JobFactoryError> {
        let job_name = format!("scan-{}", generate_id());
        let rendered = self.render(&job_name, image_id, namespace)?;
        let manifest = Self::decode(&rendered, &job_name, namespace)?;

        Ok(ScanJobRequest {
            image_id: image_id.to_string(),
            namespace: namespace.to_string(),
            job_name,
            manifest,
        })
    }
}
