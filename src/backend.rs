//! The provider seam.
//!
//! The orchestrator is pure logic. It doesn't know about signatures, REST
//! endpoints, or which cloud calls a listener a listener. That's the
//! adapter's problem when it implements these three traits.

use crate::certificate::CertificateBundle;
use crate::error::DeployError;
use crate::types::*;
use async_trait::async_trait;

/// Registers certificate material with a provider's certificate store.
#[async_trait]
pub trait CertificateUploader: Send + Sync {
    /// Upload once. No retry at this layer; failures surface as
    /// `Provider`/`Upload` errors carrying the operation name.
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError>;
}

/// Discovers the resources a certificate should be bound to.
#[async_trait]
pub trait ResourceEnumerator: Send + Sync {
    // ═══════════════════════════════════════════════════════════════
    // LISTENER DISCOVERY
    // ═══════════════════════════════════════════════════════════════

    /// Describe the scope (load balancer) before listing it. The payload is
    /// only logged; an error aborts enumeration.
    async fn describe_scope(
        &self,
        _scope_id: &str,
    ) -> Result<Option<serde_json::Value>, DeployError> {
        Ok(None)
    }

    /// One page of resources under `scope_id` speaking `protocol`.
    async fn list_page(
        &self,
        scope_id: &str,
        _protocol: &str,
        _page: PageRequest,
    ) -> Result<Page<ResourceDescriptor>, DeployError> {
        Err(DeployError::Configuration(format!(
            "provider cannot enumerate resources under `{}`",
            scope_id
        )))
    }

    // ═══════════════════════════════════════════════════════════════
    // CERTIFICATE-DRIVEN DOMAIN DISCOVERY
    // ═══════════════════════════════════════════════════════════════

    /// Whether `bindable_domains`/`bound_domains` are implemented.
    fn supports_domain_discovery(&self) -> bool {
        false
    }

    /// Domains the uploaded certificate can be bound to.
    async fn bindable_domains(&self, _cert_id: &str) -> Result<Vec<String>, DeployError> {
        Err(DeployError::Configuration(
            "provider has no certificate-driven domain discovery".into(),
        ))
    }

    /// Domains already carrying the uploaded certificate.
    async fn bound_domains(&self, _cert_id: &str) -> Result<Vec<String>, DeployError> {
        Err(DeployError::Configuration(
            "provider has no certificate-driven domain discovery".into(),
        ))
    }
}

/// Read-modify-write updates of one resource's certificate reference.
#[async_trait]
pub trait BindingUpdater: Send + Sync {
    /// Current state of the resource, including attributes that must be
    /// re-submitted on update.
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError>;

    /// Whether `resource` already serves `cert_id`. Providers that record
    /// bindings outside the resource itself override this.
    async fn carries(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<bool, DeployError> {
        Ok(resource.current_cert_id.as_deref() == Some(cert_id))
    }

    /// Nested overrides beneath `parent` (e.g. SNI domain extensions).
    async fn list_extensions(
        &self,
        _parent: &ResourceDescriptor,
    ) -> Result<Vec<ResourceDescriptor>, DeployError> {
        Ok(Vec::new())
    }

    async fn update_extension(
        &self,
        _parent: &ResourceDescriptor,
        extension: &ResourceDescriptor,
        _cert_id: &str,
    ) -> Result<(), DeployError> {
        Err(DeployError::Configuration(format!(
            "provider does not support extension `{}`",
            extension.id
        )))
    }

    /// Point `resource` at `cert_id`, keeping its other attributes.
    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str)
        -> Result<(), DeployError>;
}

/// Everything an orchestrator needs from one cloud.
pub trait ProviderAdapter: CertificateUploader + ResourceEnumerator + BindingUpdater {}

impl<T> ProviderAdapter for T where T: CertificateUploader + ResourceEnumerator + BindingUpdater {}
