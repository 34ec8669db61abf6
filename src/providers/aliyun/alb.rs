//! Aliyun Application Load Balancer.
//!
//! Certificates go through the certificate service (CAS); ALB references
//! them by CAS id. HTTPS and QUIC listeners both terminate TLS.

use super::{
    alb_endpoint, cas_endpoint, cas_region, upload_to_cas, RpcClient, CAS_VERSION, DEFAULT_REGION,
};
use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::AliyunAlbConfig;
use crate::credentials::AliyunAccess;
use crate::error::DeployError;
use crate::providers::http::{build_client, str_field, DEFAULT_HTTP_TIMEOUT};
use crate::types::{Page, PageRequest, ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const ALB_VERSION: &str = "2020-06-16";

pub const ALB_PROTOCOLS: &[&str] = &["HTTPS", "QUIC"];

pub struct AliyunAlbAdapter {
    alb: RpcClient,
    cas: RpcClient,
}

impl AliyunAlbAdapter {
    pub fn new(access: AliyunAccess, config: &AliyunAlbConfig) -> Result<Self, DeployError> {
        let region = config
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let http = build_client(DEFAULT_HTTP_TIMEOUT)?;

        let alb_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| alb_endpoint(&region));
        let cas_url = config
            .cas_endpoint
            .clone()
            .unwrap_or_else(|| cas_endpoint(cas_region(&region)));

        Ok(Self {
            alb: RpcClient::new(http.clone(), "alb", &alb_url, ALB_VERSION, access.clone()),
            cas: RpcClient::new(http, "cas", &cas_url, CAS_VERSION, access),
        })
    }
}

#[async_trait]
impl CertificateUploader for AliyunAlbAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        upload_to_cas(&self.cas, bundle).await
    }
}

#[async_trait]
impl ResourceEnumerator for AliyunAlbAdapter {
    async fn describe_scope(&self, scope_id: &str) -> Result<Option<Value>, DeployError> {
        let body = self
            .alb
            .call(
                "GetLoadBalancerAttribute",
                &[("LoadBalancerId", scope_id.to_string())],
            )
            .await?;
        Ok(Some(json!({
            "loadBalancerId": body.get("LoadBalancerId"),
            "loadBalancerName": body.get("LoadBalancerName"),
            "status": body.get("LoadBalancerStatus"),
            "dnsName": body.get("DNSName"),
        })))
    }

    async fn list_page(
        &self,
        scope_id: &str,
        protocol: &str,
        page: PageRequest,
    ) -> Result<Page<ResourceDescriptor>, DeployError> {
        let mut params = vec![
            ("MaxResults", page.size.to_string()),
            ("LoadBalancerIds.1", scope_id.to_string()),
            ("ListenerProtocol", protocol.to_string()),
        ];
        if let Some(token) = page.token {
            params.push(("NextToken", token));
        }

        let body = self.alb.call("ListListeners", &params).await?;
        let items = body
            .get("Listeners")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(|listener| {
                let id = str_field(listener, "ListenerId")?;
                let mut descriptor = ResourceDescriptor::new(id, protocol)
                    .with_attribute("loadBalancerId", json!(scope_id));
                if let Some(port) = listener.get("ListenerPort") {
                    descriptor = descriptor.with_attribute("listenerPort", port.clone());
                }
                Some(descriptor)
            })
            .collect();

        Ok(Page {
            items,
            next_token: str_field(&body, "NextToken"),
        })
    }
}

#[async_trait]
impl BindingUpdater for AliyunAlbAdapter {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        let body = self
            .alb
            .call(
                "GetListenerAttribute",
                &[("ListenerId", resource_id.to_string())],
            )
            .await?;

        let protocol = str_field(&body, "ListenerProtocol").unwrap_or_else(|| "HTTPS".into());
        let mut descriptor = ResourceDescriptor::new(resource_id, protocol);
        descriptor.current_cert_id = body
            .get("Certificates")
            .and_then(Value::as_array)
            .and_then(|certs| certs.first())
            .and_then(|cert| str_field(cert, "CertificateId"));
        if let Some(lb) = str_field(&body, "LoadBalancerId") {
            descriptor = descriptor.with_attribute("loadBalancerId", json!(lb));
        }
        Ok(descriptor)
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        self.alb
            .call(
                "UpdateListenerAttribute",
                &[
                    ("ListenerId", resource.id.clone()),
                    ("Certificates.1.CertificateId", cert_id.to_string()),
                ],
            )
            .await
            .map(drop)
    }
}
