//! [`DeploymentRecord`]: persisted summary of one deployer run.

use crate::certificate::CertificateSummary;
use crate::error::DeployError;
use crate::state::current_unix_millis;
use crate::types::{DeploymentResult, LogEntry, Outcome, UploadResult};
use serde::{Deserialize, Serialize};

/// One failed resource, with its cause rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedFailure {
    pub resource_id: String,
    pub error: String,
}

/// History entry for one deployer run.
///
/// Carries the certificate summary and the provider's upload handle, never
/// the PEM material itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub deployer_id: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadResult>,
    #[serde(default)]
    pub discovered: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    #[serde(default)]
    pub failures: Vec<RecordedFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    /// Unix millis.
    pub created_at: u64,
}

impl DeploymentRecord {
    /// Record whatever `deploy` returned.
    ///
    /// An `Err` becomes a `Failure` (or `Cancelled`) record with no resources
    /// and the deployer's current log.
    pub fn from_run(
        deployer_id: &str,
        certificate: Option<&CertificateSummary>,
        run: &Result<DeploymentResult, DeployError>,
        log_on_error: Vec<LogEntry>,
    ) -> Self {
        let base = Self {
            deployer_id: deployer_id.to_string(),
            outcome: Outcome::Failure,
            certificate: certificate.cloned(),
            upload: None,
            discovered: Vec::new(),
            updated: Vec::new(),
            failures: Vec::new(),
            error: None,
            log: Vec::new(),
            created_at: current_unix_millis(),
        };

        match run {
            Ok(result) => Self {
                outcome: result.outcome,
                upload: result.upload.clone(),
                discovered: result.discovered.clone(),
                updated: result.updated.clone(),
                failures: result
                    .failures
                    .iter()
                    .map(|f| RecordedFailure {
                        resource_id: f.resource_id.clone(),
                        error: f.cause.to_string(),
                    })
                    .collect(),
                error: result.overall_error.as_ref().map(ToString::to_string),
                log: result.log_entries.clone(),
                ..base
            },
            Err(e) => Self {
                outcome: match e {
                    DeployError::Cancelled => Outcome::Cancelled,
                    _ => Outcome::Failure,
                },
                error: Some(e.to_string()),
                log: log_on_error,
                ..base
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}
