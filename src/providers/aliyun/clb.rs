//! Aliyun Classic Load Balancer (SLB).
//!
//! Certificates live in SLB's own store. Listeners are addressed by
//! `{loadbalancerId}:{listenerPort}`; SNI domain extensions beneath a
//! listener are rewritten only when they shared the listener's old
//! certificate.

use super::{clb_endpoint, nested_array, RpcClient, DEFAULT_REGION};
use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::AliyunClbConfig;
use crate::credentials::AliyunAccess;
use crate::error::DeployError;
use crate::providers::http::{build_client, str_field, DEFAULT_HTTP_TIMEOUT};
use crate::types::{Page, PageRequest, ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const SLB_VERSION: &str = "2014-05-15";

/// Listener protocols CLB can terminate TLS on.
pub const CLB_PROTOCOLS: &[&str] = &["https"];

pub struct AliyunClbAdapter {
    slb: RpcClient,
    region: String,
}

impl AliyunClbAdapter {
    pub fn new(access: AliyunAccess, config: &AliyunClbConfig) -> Result<Self, DeployError> {
        let region = config
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| clb_endpoint(&region));
        let http = build_client(DEFAULT_HTTP_TIMEOUT)?;

        Ok(Self {
            slb: RpcClient::new(http, "slb", &endpoint, SLB_VERSION, access),
            region,
        })
    }

    fn region_param(&self) -> (&'static str, String) {
        ("RegionId", self.region.clone())
    }
}

fn split_listener_id(resource_id: &str) -> Result<(&str, &str), DeployError> {
    resource_id
        .rsplit_once(':')
        .filter(|(lb, port)| !lb.is_empty() && port.parse::<u16>().is_ok())
        .ok_or_else(|| {
            DeployError::Configuration(format!(
                "CLB listener id must be `loadbalancerId:port` (got `{}`)",
                resource_id
            ))
        })
}

#[async_trait]
impl CertificateUploader for AliyunClbAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        let body = self
            .slb
            .post(
                "UploadServerCertificate",
                &[
                    self.region_param(),
                    ("ServerCertificateName", bundle.name.clone()),
                    ("ServerCertificate", bundle.cert_pem.clone()),
                    ("PrivateKey", bundle.key_pem.clone()),
                ],
            )
            .await?;

        let cert_id = str_field(&body, "ServerCertificateId").ok_or_else(|| {
            DeployError::provider(
                "slb.UploadServerCertificate",
                "response is missing ServerCertificateId",
            )
        })?;
        Ok(UploadResult {
            cert_id,
            cert_name: str_field(&body, "ServerCertificateName")
                .unwrap_or_else(|| bundle.name.clone()),
        })
    }
}

#[async_trait]
impl ResourceEnumerator for AliyunClbAdapter {
    async fn describe_scope(&self, scope_id: &str) -> Result<Option<Value>, DeployError> {
        let body = self
            .slb
            .call(
                "DescribeLoadBalancerAttribute",
                &[self.region_param(), ("LoadBalancerId", scope_id.to_string())],
            )
            .await?;
        Ok(Some(json!({
            "loadBalancerId": body.get("LoadBalancerId"),
            "loadBalancerName": body.get("LoadBalancerName"),
            "address": body.get("Address"),
            "status": body.get("LoadBalancerStatus"),
        })))
    }

    async fn list_page(
        &self,
        scope_id: &str,
        protocol: &str,
        page: PageRequest,
    ) -> Result<Page<ResourceDescriptor>, DeployError> {
        let mut params = vec![
            self.region_param(),
            ("MaxResults", page.size.to_string()),
            ("LoadBalancerId.1", scope_id.to_string()),
            ("ListenerProtocol", protocol.to_string()),
        ];
        if let Some(token) = page.token {
            params.push(("NextToken", token));
        }

        let body = self.slb.call("DescribeLoadBalancerListeners", &params).await?;
        let items = body
            .get("Listeners")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|listener| str_field(listener, "ListenerPort"))
            .map(|port| {
                ResourceDescriptor::new(format!("{}:{}", scope_id, port), protocol)
                    .with_attribute("loadBalancerId", json!(scope_id))
                    .with_attribute("listenerPort", json!(port))
            })
            .collect();

        Ok(Page {
            items,
            next_token: str_field(&body, "NextToken"),
        })
    }
}

#[async_trait]
impl BindingUpdater for AliyunClbAdapter {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        let (lb, port) = split_listener_id(resource_id)?;
        let body = self
            .slb
            .call(
                "DescribeLoadBalancerHTTPSListenerAttribute",
                &[
                    self.region_param(),
                    ("LoadBalancerId", lb.to_string()),
                    ("ListenerPort", port.to_string()),
                ],
            )
            .await?;

        let mut descriptor = ResourceDescriptor::new(resource_id, "https")
            .with_attribute("loadBalancerId", json!(lb))
            .with_attribute("listenerPort", json!(port));
        descriptor.current_cert_id = str_field(&body, "ServerCertificateId");
        Ok(descriptor)
    }

    async fn list_extensions(
        &self,
        parent: &ResourceDescriptor,
    ) -> Result<Vec<ResourceDescriptor>, DeployError> {
        let (lb, port) = split_listener_id(&parent.id)?;
        let body = self
            .slb
            .call(
                "DescribeDomainExtensions",
                &[
                    self.region_param(),
                    ("LoadBalancerId", lb.to_string()),
                    ("ListenerPort", port.to_string()),
                ],
            )
            .await?;

        Ok(nested_array(&body, "DomainExtensions", "DomainExtension")
            .iter()
            .filter_map(|ext| {
                let id = str_field(ext, "DomainExtensionId")?;
                let mut descriptor = ResourceDescriptor::new(id, "domain_extension");
                descriptor.current_cert_id = str_field(ext, "ServerCertificateId");
                if let Some(domain) = str_field(ext, "Domain") {
                    descriptor = descriptor.with_attribute("domain", json!(domain));
                }
                Some(descriptor)
            })
            .collect())
    }

    async fn update_extension(
        &self,
        _parent: &ResourceDescriptor,
        extension: &ResourceDescriptor,
        cert_id: &str,
    ) -> Result<(), DeployError> {
        self.slb
            .call(
                "SetDomainExtensionAttribute",
                &[
                    self.region_param(),
                    ("DomainExtensionId", extension.id.clone()),
                    ("ServerCertificateId", cert_id.to_string()),
                ],
            )
            .await
            .map(drop)
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        let (lb, port) = split_listener_id(&resource.id)?;
        self.slb
            .call(
                "SetLoadBalancerHTTPSListenerAttribute",
                &[
                    self.region_param(),
                    ("LoadBalancerId", lb.to_string()),
                    ("ListenerPort", port.to_string()),
                    ("ServerCertificateId", cert_id.to_string()),
                ],
            )
            .await
            .map(drop)
    }
}
