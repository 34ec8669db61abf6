//! Deployment state machine definition.
//!
//! The state is the complete snapshot of one deployment attempt. It lives
//! exactly as long as the `deploy` call that created it; nothing here is
//! persisted beyond the result handed back to the caller.

use crate::error::{BindingFailures, DeployError};
use crate::types::{DeploymentRequest, DeploymentResult, LogEntry, Outcome, UploadResult};
use serde::{Deserialize, Serialize};

/// Workflow steps: the state machine's nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Validate the selector. No network yet.
    Init,
    /// Register the certificate with the provider's store.
    Uploading,
    /// Turn the selector into a concrete resource list.
    Resolving,
    /// Repoint every resolved resource at the new certificate.
    Binding,
    /// Terminal.
    Done(Outcome),
}

impl Step {
    /// Human-readable step name for logging/display.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Init => "init",
            Step::Uploading => "uploading",
            Step::Resolving => "resolving",
            Step::Binding => "binding",
            Step::Done(Outcome::Success) => "done_success",
            Step::Done(Outcome::PartialFailure) => "done_partial_failure",
            Step::Done(Outcome::Failure) => "done_failure",
            Step::Done(Outcome::Cancelled) => "done_cancelled",
        }
    }
}

/// Request-scoped workflow state.
#[derive(Debug, Clone)]
pub struct DeploymentState {
    /// Deployer that owns this run.
    pub deployer_id: String,
    /// Current step in the workflow.
    pub step: Step,
    pub request: DeploymentRequest,

    // Populated as the workflow progresses
    pub upload: Option<UploadResult>,
    /// Resource ids in discovery order.
    pub discovered: Vec<String>,
    /// Resource ids bound successfully, in discovery order.
    pub updated: Vec<String>,
    pub failures: BindingFailures,
    pub error: Option<DeployError>,
    pub log: Vec<LogEntry>,

    // Audit
    /// Unix timestamp (millis) of creation.
    pub started_at: u64,
    /// Unix timestamp (millis) of last transition.
    pub updated_at: u64,
}

impl DeploymentState {
    pub fn new(deployer_id: impl Into<String>, request: DeploymentRequest) -> Self {
        let now = current_unix_millis();
        Self {
            deployer_id: deployer_id.into(),
            step: Step::Init,
            request,
            upload: None,
            discovered: Vec::new(),
            updated: Vec::new(),
            failures: BindingFailures::new(),
            error: None,
            log: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Is this workflow in a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(self.step, Step::Done(_))
    }

    /// Outcome, once terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.step {
            Step::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Transition to a new step.
    pub fn transition(&mut self, step: Step) {
        self.step = step;
        self.updated_at = current_unix_millis();
    }

    /// Fail the workflow, keeping the cause for the result.
    pub fn fail(&mut self, error: DeployError) {
        self.error = Some(error);
        self.transition(Step::Done(Outcome::Failure));
    }

    /// Snapshot the state as a caller-facing result.
    pub fn to_result(&self) -> DeploymentResult {
        DeploymentResult {
            outcome: self.outcome().unwrap_or(Outcome::Failure),
            upload: self.upload.clone(),
            log_entries: self.log.clone(),
            discovered: self.discovered.clone(),
            updated: self.updated.clone(),
            failures: self.failures.clone(),
            overall_error: self.error.clone(),
        }
    }
}

pub(crate) fn current_unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceSelector;
    use std::collections::BTreeSet;

    fn request() -> DeploymentRequest {
        DeploymentRequest {
            certificate_pem: String::new(),
            private_key_pem: String::new(),
            provider_credentials: None,
            selector: ResourceSelector::single("example.com"),
            protocols: BTreeSet::new(),
        }
    }

    #[test]
    fn test_new_state() {
        let state = DeploymentState::new("qiniu-cdn-1", request());
        assert_eq!(state.deployer_id, "qiniu-cdn-1");
        assert!(matches!(state.step, Step::Init));
        assert!(!state.is_terminal());
        assert_eq!(state.outcome(), None);
    }

    #[test]
    fn test_terminal_states() {
        let mut state = DeploymentState::new("d", request());
        state.transition(Step::Done(Outcome::Success));
        assert!(state.is_terminal());
        assert_eq!(state.outcome(), Some(Outcome::Success));

        state.fail(DeployError::ResourceNotFound("example.com".into()));
        assert_eq!(state.step.name(), "done_failure");
        let result = state.to_result();
        assert_eq!(result.outcome, Outcome::Failure);
        assert!(result.overall_error.is_some());
    }
}
