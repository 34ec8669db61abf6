//! Error types for certificate deployment.
//!
//! No `anyhow` leakage. Explicit, typed errors. Every variant carries plain
//! strings so results can be cloned into history records and reports.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeployError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unsupported target type: {0}")]
    UnsupportedTarget(String),

    #[error("failed to upload certificate ({operation}): {message}")]
    Upload { operation: String, message: String },

    #[error("failed to enumerate resources ({operation}): {message}")]
    Enumeration { operation: String, message: String },

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    Binding(BindingFailures),

    #[error("provider request '{operation}' failed: {message}")]
    Provider { operation: String, message: String },

    #[error("provider request '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("deployment cancelled")]
    Cancelled,

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification failed: {0}")]
    Notify(String),
}

impl DeployError {
    /// Whether this error might be recoverable by retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DeployError::Upload { .. }
                | DeployError::Enumeration { .. }
                | DeployError::Binding(_)
                | DeployError::Provider { .. }
                | DeployError::Timeout { .. }
                | DeployError::Cancelled
        )
    }

    /// Whether the error was raised before any network call was made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeployError::Configuration(_) | DeployError::UnsupportedTarget(_)
        )
    }

    pub(crate) fn provider(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        DeployError::Provider {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Re-tag a primitive provider failure or a timed-out upload call as an
    /// upload failure. Cancellation and configuration errors pass through.
    pub(crate) fn into_upload(self) -> Self {
        match self {
            DeployError::Provider { operation, message } => {
                DeployError::Upload { operation, message }
            }
            DeployError::Timeout { operation, after } => DeployError::Upload {
                operation,
                message: format!("timed out after {:?}", after),
            },
            other => other,
        }
    }

    /// Re-tag a primitive provider failure as an enumeration failure.
    pub(crate) fn into_enumeration(self) -> Self {
        match self {
            DeployError::Provider { operation, message } => {
                DeployError::Enumeration { operation, message }
            }
            other => other,
        }
    }
}

/// One resource whose binding failed.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingFailure {
    pub resource_id: String,
    pub cause: DeployError,
}

/// Ordered collection of per-resource binding failures.
///
/// Kept as a list (not a flattened string) so callers can inspect every
/// failing resource and its cause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingFailures(Vec<BindingFailure>);

impl BindingFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource_id: impl Into<String>, cause: DeployError) {
        self.0.push(BindingFailure {
            resource_id: resource_id.into(),
            cause,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingFailure> {
        self.0.iter()
    }

    /// Failing resource ids in the order they were attempted.
    pub fn resource_ids(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.resource_id.as_str()).collect()
    }

    /// Mapping view: resource id to its cause.
    pub fn by_resource(&self) -> BTreeMap<&str, &DeployError> {
        self.0
            .iter()
            .map(|f| (f.resource_id.as_str(), &f.cause))
            .collect()
    }
}

impl fmt::Display for BindingFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed to bind", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  {}: {}", failure.resource_id, failure.cause)?;
        }
        Ok(())
    }
}

impl IntoIterator for BindingFailures {
    type Item = BindingFailure;
    type IntoIter = std::vec::IntoIter<BindingFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<std::io::Error> for DeployError {
    fn from(e: std::io::Error) -> Self {
        DeployError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeployError::Configuration("config `loadbalancerId` is required".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: config `loadbalancerId` is required"
        );

        let err = DeployError::Upload {
            operation: "slb.UploadServerCertificate".into(),
            message: "InvalidParameter".into(),
        };
        assert!(err.to_string().contains("slb.UploadServerCertificate"));
        assert!(err.to_string().contains("InvalidParameter"));

        let err = DeployError::UnsupportedTarget("gcp-lb".into());
        assert_eq!(err.to_string(), "unsupported target type: gcp-lb");

        let err = DeployError::Timeout {
            operation: "clb.ModifyListener".into(),
            after: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "provider request 'clb.ModifyListener' timed out after 5s"
        );
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(DeployError::provider("op", "boom").is_recoverable());
        assert!(DeployError::Cancelled.is_recoverable());
        assert!(DeployError::Binding(BindingFailures::new()).is_recoverable());

        assert!(!DeployError::Configuration("x".into()).is_recoverable());
        assert!(!DeployError::UnsupportedTarget("x".into()).is_recoverable());
        assert!(!DeployError::ResourceNotFound("x".into()).is_recoverable());
        assert!(!DeployError::Certificate("x".into()).is_recoverable());
    }

    #[test]
    fn test_retagging_keeps_operation() {
        let err = DeployError::provider("cdn.DescribeCertDomains", "throttled").into_enumeration();
        assert_eq!(
            err,
            DeployError::Enumeration {
                operation: "cdn.DescribeCertDomains".into(),
                message: "throttled".into(),
            }
        );

        // Non-provider errors pass through untouched.
        let err = DeployError::Cancelled.into_upload();
        assert_eq!(err, DeployError::Cancelled);
    }

    #[test]
    fn test_upload_timeout_becomes_upload_failure() {
        let err = DeployError::Timeout {
            operation: "upload".into(),
            after: Duration::from_secs(30),
        }
        .into_upload();
        assert_eq!(
            err,
            DeployError::Upload {
                operation: "upload".into(),
                message: "timed out after 30s".into(),
            }
        );
    }

    #[test]
    fn test_binding_failures_enumerate_every_cause() {
        let mut failures = BindingFailures::new();
        failures.push("lb-1:443", DeployError::provider("slb.Set", "denied"));
        failures.push("lb-1:8443", DeployError::provider("slb.Set", "throttled"));

        assert_eq!(failures.len(), 2);
        assert_eq!(failures.resource_ids(), vec!["lb-1:443", "lb-1:8443"]);

        let text = DeployError::Binding(failures.clone()).to_string();
        assert!(text.starts_with("2 resource(s) failed to bind"));
        assert!(text.contains("lb-1:443: provider request 'slb.Set' failed: denied"));
        assert!(text.contains("lb-1:8443: provider request 'slb.Set' failed: throttled"));

        let map = failures.by_resource();
        assert!(map.contains_key("lb-1:8443"));
    }
}
