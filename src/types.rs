//! Minimal domain types for the deployment workflow.
//!
//! These are the types the orchestrator needs. Nothing more.

use crate::credentials::Credentials;
use crate::error::{BindingFailures, DeployError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Free-form attributes a provider attaches to a resource.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Which resources a deployment affects. Exactly one variant per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSelector {
    /// One concrete resource (listener, domain, bucket).
    SingleResource { id: String },
    /// Every eligible listener of a load balancer; implies enumeration.
    LoadBalancer { id: String },
    /// Every domain the certificate can bind; implies certificate-driven discovery.
    WildcardDomain { pattern: String },
}

impl ResourceSelector {
    pub fn single(id: impl Into<String>) -> Self {
        ResourceSelector::SingleResource { id: id.into() }
    }

    pub fn load_balancer(id: impl Into<String>) -> Self {
        ResourceSelector::LoadBalancer { id: id.into() }
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        ResourceSelector::WildcardDomain {
            pattern: pattern.into(),
        }
    }

    /// Human-readable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceSelector::SingleResource { .. } => "single_resource",
            ResourceSelector::LoadBalancer { .. } => "load_balancer",
            ResourceSelector::WildcardDomain { .. } => "wildcard_domain",
        }
    }

    /// Check required fields. Runs before any network call.
    pub fn validate(&self) -> Result<(), DeployError> {
        match self {
            ResourceSelector::SingleResource { id } if id.trim().is_empty() => Err(
                DeployError::Configuration("selector requires a resource id".into()),
            ),
            ResourceSelector::LoadBalancer { id } if id.trim().is_empty() => Err(
                DeployError::Configuration("config `loadbalancerId` is required".into()),
            ),
            ResourceSelector::WildcardDomain { pattern } if !pattern.starts_with("*.") => {
                Err(DeployError::Configuration(format!(
                    "wildcard selector must start with `*.` (got `{}`)",
                    pattern
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Everything one deployment attempt needs. Immutable once built.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub certificate_pem: String,
    pub private_key_pem: String,
    /// Opaque to the orchestrator; already bound into the provider adapter.
    pub provider_credentials: Option<Arc<Credentials>>,
    pub selector: ResourceSelector,
    pub protocols: BTreeSet<String>,
}

/// Provider-assigned handle for an uploaded certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub cert_id: String,
    pub cert_name: String,
}

/// A provider-side object that references a certificate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    pub protocol: String,
    pub current_cert_id: Option<String>,
    /// Unrelated attributes that must be re-submitted verbatim on update.
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            protocol: protocol.into(),
            current_cert_id: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_cert(mut self, cert_id: impl Into<String>) -> Self {
        self.current_cert_id = Some(cert_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// String attribute lookup.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

/// Page request for cursor-based listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: Option<String>,
    pub size: u32,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// Single, final page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// One audit trail entry: a tag plus optional structured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// Terminal status of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    PartialFailure,
    Failure,
    Cancelled,
}

/// Everything the caller learns from a deployment that got past upload.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub outcome: Outcome,
    pub upload: Option<UploadResult>,
    pub log_entries: Vec<LogEntry>,
    /// Resource ids resolved for binding, in discovery order.
    pub discovered: Vec<String>,
    /// Resource ids bound successfully (including already-bound ones).
    pub updated: Vec<String>,
    pub failures: BindingFailures,
    pub overall_error: Option<DeployError>,
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Mapping of failing resource id to its cause.
    ///
    /// An id that failed more than once keeps only its last cause here;
    /// `failures` holds every one in the order they happened.
    pub fn per_resource_errors(&self) -> BTreeMap<&str, &DeployError> {
        self.failures.by_resource()
    }

    /// Collapse into `Ok(self)` on success, `Err(overall_error)` otherwise.
    pub fn into_result(self) -> Result<Self, DeployError> {
        match self.overall_error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
