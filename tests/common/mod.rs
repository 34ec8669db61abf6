//! Shared fixtures: certificate generation and a recording provider.

#![allow(dead_code)]

use async_trait::async_trait;
use cert_deploy_rs::{
    BindingUpdater, CertificateBundle, CertificateUploader, DeployError, Page, PageRequest,
    ResourceDescriptor, ResourceEnumerator, UploadResult,
};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const NEW_CERT: &str = "cert-new";

/// Self-signed PEM pair for `cn`.
pub fn pem_pair(cn: &str) -> (String, String) {
    let key_pair = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec![cn.to_string()]).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    let cert = params.self_signed(&key_pair).unwrap();
    (cert.pem(), key_pair.serialize_pem())
}

/// In-memory provider that records every call it receives.
#[derive(Default)]
pub struct RecordingProvider {
    pub calls: Mutex<Vec<String>>,
    /// Listeners per protocol, in listing order.
    pub listeners: BTreeMap<String, Vec<ResourceDescriptor>>,
    /// Current certificate per resource id.
    pub current: BTreeMap<String, String>,
    /// Extensions per parent resource id.
    pub extensions: BTreeMap<String, Vec<ResourceDescriptor>>,
    /// Resource ids whose update fails.
    pub failing: BTreeSet<String>,
    pub fail_upload: bool,
    /// Upload sleeps this long before answering.
    pub upload_delay: Option<Duration>,
    /// Every listing call fails.
    pub fail_list: bool,
    /// `(bindable, bound)` when domain discovery is supported.
    pub discovery: Option<(Vec<String>, Vec<String>)>,
    /// Cancel this token once `n` parent updates went through.
    pub cancel_after: Option<(usize, CancellationToken)>,
    /// Parent updates sleep this long.
    pub update_delay: Option<Duration>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(mut self, protocol: &str, count: usize) -> Self {
        let listeners = (0..count)
            .map(|i| ResourceDescriptor::new(format!("{}-{}", protocol, i), protocol))
            .collect();
        self.listeners.insert(protocol.to_string(), listeners);
        self
    }

    pub fn failing_on<I: IntoIterator<Item = &'static str>>(mut self, ids: I) -> Self {
        self.failing.extend(ids.into_iter().map(str::to_string));
        self
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose name starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl CertificateUploader for RecordingProvider {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        self.push(format!("upload:{}", bundle.summary.common_name));
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_upload {
            return Err(DeployError::Provider {
                operation: "cas.UploadUserCertificate".into(),
                message: "quota exceeded".into(),
            });
        }
        Ok(UploadResult {
            cert_id: NEW_CERT.into(),
            cert_name: bundle.name.clone(),
        })
    }
}

#[async_trait]
impl ResourceEnumerator for RecordingProvider {
    async fn list_page(
        &self,
        scope_id: &str,
        protocol: &str,
        page: PageRequest,
    ) -> Result<Page<ResourceDescriptor>, DeployError> {
        self.push(format!("list:{}:{}:{}", scope_id, protocol, page.token.as_deref().unwrap_or("")));
        if self.fail_list {
            return Err(DeployError::Provider {
                operation: "slb.DescribeLoadBalancerListeners".into(),
                message: "Throttling.User".into(),
            });
        }
        let all = self.listeners.get(protocol).cloned().unwrap_or_default();
        let offset: usize = page.token.as_deref().and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (offset + page.size as usize).min(all.len());
        let items = all.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_token = (end < all.len()).then(|| end.to_string());
        Ok(Page { items, next_token })
    }

    fn supports_domain_discovery(&self) -> bool {
        self.discovery.is_some()
    }

    async fn bindable_domains(&self, cert_id: &str) -> Result<Vec<String>, DeployError> {
        self.push(format!("bindable:{}", cert_id));
        Ok(self.discovery.clone().map(|d| d.0).unwrap_or_default())
    }

    async fn bound_domains(&self, cert_id: &str) -> Result<Vec<String>, DeployError> {
        self.push(format!("bound:{}", cert_id));
        Ok(self.discovery.clone().map(|d| d.1).unwrap_or_default())
    }
}

#[async_trait]
impl BindingUpdater for RecordingProvider {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        self.push(format!("describe:{}", resource_id));
        let mut descriptor = ResourceDescriptor::new(resource_id, "https");
        descriptor.current_cert_id = self.current.get(resource_id).cloned();
        Ok(descriptor)
    }

    async fn list_extensions(
        &self,
        parent: &ResourceDescriptor,
    ) -> Result<Vec<ResourceDescriptor>, DeployError> {
        self.push(format!("list_extensions:{}", parent.id));
        Ok(self.extensions.get(&parent.id).cloned().unwrap_or_default())
    }

    async fn update_extension(
        &self,
        parent: &ResourceDescriptor,
        extension: &ResourceDescriptor,
        cert_id: &str,
    ) -> Result<(), DeployError> {
        self.push(format!("update_extension:{}:{}:{}", parent.id, extension.id, cert_id));
        Ok(())
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        self.push(format!("update:{}:{}", resource.id, cert_id));
        if self.failing.contains(&resource.id) {
            return Err(DeployError::Provider {
                operation: "update".into(),
                message: format!("{} is locked", resource.id),
            });
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.calls_to("update:").len() >= *after {
                token.cancel();
            }
        }
        Ok(())
    }
}
