//! The caller-facing deployer interface.

use crate::error::{BindingFailures, DeployError};
use crate::types::{DeploymentResult, LogEntry, Outcome};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One configured deployment target.
///
/// Built by the registry; object-safe so heterogeneous targets can sit in
/// one pipeline.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// `"{target-tag}-{label}"`.
    fn id(&self) -> &str;

    /// Deploy one PEM pair.
    ///
    /// `Err` means nothing was bound (bad configuration, unreadable
    /// certificate, failed upload). Once resolution starts an `Ok` result is
    /// always returned, with `overall_error` set when the run did not succeed.
    async fn deploy(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<DeploymentResult, DeployError>;

    /// Audit entries of the latest run.
    fn log_entries(&self) -> Vec<LogEntry>;
}

/// Result for targets that are one resource and one delivery attempt.
pub(crate) fn single_target_result(
    target: &str,
    attempt: Result<(), DeployError>,
    log_entries: Vec<LogEntry>,
) -> DeploymentResult {
    let mut failures = BindingFailures::new();
    let mut updated = Vec::new();
    let (outcome, overall_error) = match attempt {
        Ok(()) => {
            updated.push(target.to_string());
            (Outcome::Success, None)
        }
        Err(e) => {
            failures.push(target, e);
            (Outcome::Failure, Some(DeployError::Binding(failures.clone())))
        }
    };

    DeploymentResult {
        outcome,
        upload: None,
        log_entries,
        discovered: vec![target.to_string()],
        updated,
        failures,
        overall_error,
    }
}
