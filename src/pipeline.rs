//! Deploy Pipeline
//!
//! One certificate, many targets. Every deployer runs in order whatever the
//! others did; each run is written to the history store and one summary goes
//! to the notifier at the end. Store and notifier failures are logged and
//! reported, never fatal.

use crate::certificate::{parse_certificate, CertificateSummary};
use crate::deployer::Deployer;
use crate::error::DeployError;
use crate::store::{DeploymentHistoryStore, DeploymentRecord};
use crate::types::{DeploymentResult, Outcome};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delivers run summaries. Transports live outside this crate.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), DeployError>;
}

/// Result of one deployer inside a pipeline run.
#[derive(Debug)]
pub struct PipelineEntry {
    pub deployer_id: String,
    pub run: Result<DeploymentResult, DeployError>,
    /// Set when the history record could not be written.
    pub store_error: Option<DeployError>,
}

impl PipelineEntry {
    pub fn outcome(&self) -> Outcome {
        match &self.run {
            Ok(result) => result.outcome,
            Err(DeployError::Cancelled) => Outcome::Cancelled,
            Err(_) => Outcome::Failure,
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub certificate: CertificateSummary,
    pub entries: Vec<PipelineEntry>,
    pub notify_error: Option<DeployError>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.outcome() == Outcome::Success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PipelineEntry> {
        self.entries.iter().filter(|e| e.outcome() != Outcome::Success)
    }

    /// Subject line of the summary notification.
    pub fn subject(&self) -> String {
        let failed = self.failed().count();
        if failed == 0 {
            format!("certificate {} deployed", self.certificate.common_name)
        } else {
            format!(
                "certificate {} deployment failed on {} of {} targets",
                self.certificate.common_name,
                failed,
                self.entries.len()
            )
        }
    }

    /// Body of the summary notification, one line per deployer.
    pub fn message(&self) -> String {
        self.entries
            .iter()
            .map(|entry| match &entry.run {
                Ok(result) => match &result.overall_error {
                    None => format!("{}: {} resource(s) updated", entry.deployer_id, result.updated.len()),
                    Some(e) => format!(
                        "{}: {} of {} resource(s) updated, {}",
                        entry.deployer_id,
                        result.updated.len(),
                        result.discovered.len(),
                        e
                    ),
                },
                Err(e) => format!("{}: {}", entry.deployer_id, e),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs one PEM pair through several deployers.
#[derive(Default)]
pub struct DeployPipeline {
    deployers: Vec<Box<dyn Deployer>>,
    history: Option<Arc<dyn DeploymentHistoryStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl DeployPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deployer(mut self, deployer: Box<dyn Deployer>) -> Self {
        self.deployers.push(deployer);
        self
    }

    pub fn with_history(mut self, history: Arc<dyn DeploymentHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn deployers(&self) -> impl Iterator<Item = &dyn Deployer> {
        self.deployers.iter().map(|d| d.as_ref())
    }

    /// Deploy to every target.
    ///
    /// `Err` only when the certificate itself is unreadable; per-target
    /// failures are in the report.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<PipelineReport, DeployError> {
        let certificate = parse_certificate(cert_pem)?;
        let mut entries = Vec::with_capacity(self.deployers.len());

        for deployer in &self.deployers {
            let run = deployer.deploy(cancel, cert_pem, key_pem).await;
            match &run {
                Ok(result) if result.is_success() => {
                    info!(deployer = %deployer.id(), updated = result.updated.len(), "target deployed")
                }
                Ok(result) => {
                    warn!(deployer = %deployer.id(), outcome = ?result.outcome, "target deployed with errors")
                }
                Err(e) => warn!(deployer = %deployer.id(), error = %e, "target failed"),
            }

            let store_error = match &self.history {
                Some(history) => {
                    let record = DeploymentRecord::from_run(
                        deployer.id(),
                        Some(&certificate),
                        &run,
                        deployer.log_entries(),
                    );
                    history.save(&record).await.err()
                }
                None => None,
            };
            if let Some(e) = &store_error {
                warn!(deployer = %deployer.id(), error = %e, "failed to record deployment");
            }

            entries.push(PipelineEntry {
                deployer_id: deployer.id().to_string(),
                run,
                store_error,
            });
        }

        let mut report = PipelineReport {
            certificate,
            entries,
            notify_error: None,
        };

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&report.subject(), &report.message()).await {
                warn!(error = %e, "failed to send deployment notification");
                report.notify_error = Some(e);
            }
        }

        Ok(report)
    }
}
