//! TencentCloud Cloud Load Balancer.
//!
//! Listener ids are `{loadbalancerId}|{listenerId}`; a forwarding-rule
//! domain adds `|{domain}`. `DescribeListeners` is not paginated, so every
//! listing is a single page. The SSL mode and client CA survive the swap.
//!
//! With `resourceType = ssl-deploy` the SSL service does the binding
//! (`DeployCertificateInstance`, resource type `clb`) and the CLB API is
//! never touched.

use super::{upload_certificate, TcClient, SSL_VERSION};
use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::{ResourceType, TencentCloudClbConfig};
use crate::credentials::TencentCloudAccess;
use crate::error::DeployError;
use crate::providers::http::{build_client, str_field, DEFAULT_HTTP_TIMEOUT};
use crate::types::{Page, PageRequest, ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const CLB_VERSION: &str = "2018-03-17";

pub const CLB_PROTOCOLS: &[&str] = &["HTTPS", "QUIC", "TCP_SSL"];

const DEFAULT_SSL_MODE: &str = "UNIDIRECTIONAL";

pub struct TencentCloudClbAdapter {
    ssl: TcClient,
    clb: TcClient,
    via_ssl_service: bool,
}

impl TencentCloudClbAdapter {
    pub fn new(
        access: TencentCloudAccess,
        config: &TencentCloudClbConfig,
    ) -> Result<Self, DeployError> {
        let http = build_client(DEFAULT_HTTP_TIMEOUT)?;
        let endpoint = config.endpoint.as_deref();
        // CLB deployments need the region on the SSL calls too.
        Ok(Self {
            ssl: TcClient::new(
                http.clone(),
                "ssl",
                SSL_VERSION,
                endpoint,
                config.region.clone(),
                access.clone(),
            )?,
            clb: TcClient::new(
                http,
                "clb",
                CLB_VERSION,
                endpoint,
                config.region.clone(),
                access,
            )?,
            via_ssl_service: config.resource_type == ResourceType::SslDeploy,
        })
    }

    async fn describe_listeners(&self, payload: Value) -> Result<Vec<Value>, DeployError> {
        let response = self.clb.call("DescribeListeners", &payload).await?;
        Ok(response
            .get("Listeners")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// `lb|listener` or `lb|listener|domain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ClbTarget<'a> {
    lb: &'a str,
    listener: &'a str,
    domain: Option<&'a str>,
}

fn split_resource_id(resource_id: &str) -> Result<ClbTarget<'_>, DeployError> {
    let mut parts = resource_id.splitn(3, '|');
    let lb = parts.next().unwrap_or_default();
    let listener = parts.next().unwrap_or_default();
    let domain = parts.next();

    if lb.is_empty() || listener.is_empty() || domain.is_some_and(str::is_empty) {
        return Err(DeployError::Configuration(format!(
            "CLB resource id must be `loadbalancerId|listenerId[|domain]` (got `{}`)",
            resource_id
        )));
    }
    Ok(ClbTarget {
        lb,
        listener,
        domain,
    })
}

/// Certificate id plus the SSL attributes worth keeping.
fn with_certificate(mut descriptor: ResourceDescriptor, cert: Option<&Value>) -> ResourceDescriptor {
    if let Some(cert) = cert.filter(|c| !c.is_null()) {
        descriptor.current_cert_id = str_field(cert, "CertId");
        if let Some(mode) = str_field(cert, "SSLMode") {
            descriptor = descriptor.with_attribute("SSLMode", json!(mode));
        }
        if let Some(ca) = str_field(cert, "CertCaId") {
            descriptor = descriptor.with_attribute("CertCaId", json!(ca));
        }
    }
    descriptor
}

fn listener_descriptor(lb: &str, listener: &Value) -> Option<ResourceDescriptor> {
    let listener_id = str_field(listener, "ListenerId")?;
    let protocol = str_field(listener, "Protocol").unwrap_or_default();
    let mut descriptor = with_certificate(
        ResourceDescriptor::new(format!("{}|{}", lb, listener_id), protocol),
        listener.get("Certificate"),
    );
    if let Some(port) = listener.get("Port") {
        descriptor = descriptor.with_attribute("Port", port.clone());
    }
    Some(descriptor)
}

/// The rule matching `domain` beneath a layer-7 listener.
fn rule_descriptor(resource_id: &str, listener: &Value, domain: &str) -> Option<ResourceDescriptor> {
    let protocol = str_field(listener, "Protocol").unwrap_or_default();
    let rule = listener
        .get("Rules")
        .and_then(Value::as_array)?
        .iter()
        .find(|rule| str_field(rule, "Domain").as_deref() == Some(domain))?;

    Some(
        with_certificate(
            ResourceDescriptor::new(resource_id, protocol),
            rule.get("Certificate"),
        )
        .with_attribute("domain", json!(domain)),
    )
}

/// `Certificate` input re-submitting what describe captured.
fn certificate_input(resource: &ResourceDescriptor, cert_id: &str) -> Value {
    let mut certificate = json!({
        "CertId": cert_id,
        "SSLMode": resource.attribute_str("SSLMode").unwrap_or(DEFAULT_SSL_MODE),
    });
    if let Some(ca) = resource.attribute_str("CertCaId") {
        certificate["CertCaId"] = json!(ca);
    }
    certificate
}

#[async_trait]
impl CertificateUploader for TencentCloudClbAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        upload_certificate(&self.ssl, bundle).await
    }
}

#[async_trait]
impl ResourceEnumerator for TencentCloudClbAdapter {
    async fn list_page(
        &self,
        scope_id: &str,
        protocol: &str,
        _page: PageRequest,
    ) -> Result<Page<ResourceDescriptor>, DeployError> {
        let listeners = self
            .describe_listeners(json!({ "LoadBalancerId": scope_id, "Protocol": protocol }))
            .await?;

        Ok(Page::last(
            listeners
                .iter()
                .filter_map(|listener| listener_descriptor(scope_id, listener))
                .filter(|descriptor| descriptor.protocol == protocol)
                .collect(),
        ))
    }
}

#[async_trait]
impl BindingUpdater for TencentCloudClbAdapter {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        let target = split_resource_id(resource_id)?;
        if self.via_ssl_service {
            // The SSL service resolves the instance itself.
            return Ok(ResourceDescriptor::new(resource_id, "clb"));
        }

        let listeners = self
            .describe_listeners(json!({ "LoadBalancerId": target.lb, "ListenerIds": [target.listener] }))
            .await?;
        let listener = listeners.first();

        let descriptor = match target.domain {
            None => listener.and_then(|l| listener_descriptor(target.lb, l)),
            Some(domain) => listener.and_then(|l| rule_descriptor(resource_id, l, domain)),
        };
        descriptor.ok_or_else(|| DeployError::ResourceNotFound(format!("listener `{}`", resource_id)))
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        let target = split_resource_id(&resource.id)?;

        if self.via_ssl_service {
            return self
                .ssl
                .call(
                    "DeployCertificateInstance",
                    &json!({
                        "CertificateId": cert_id,
                        "InstanceIdList": [resource.id],
                        "ResourceType": "clb",
                        "Status": 1,
                    }),
                )
                .await
                .map(drop);
        }

        match target.domain {
            None => self
                .clb
                .call(
                    "ModifyListener",
                    &json!({
                        "LoadBalancerId": target.lb,
                        "ListenerId": target.listener,
                        "Certificate": certificate_input(resource, cert_id),
                    }),
                )
                .await
                .map(drop),
            Some(domain) => self
                .clb
                .call(
                    "ModifyDomainAttributes",
                    &json!({
                        "LoadBalancerId": target.lb,
                        "ListenerId": target.listener,
                        "Domain": domain,
                        "Certificate": certificate_input(resource, cert_id),
                    }),
                )
                .await
                .map(drop),
        }
    }
}
