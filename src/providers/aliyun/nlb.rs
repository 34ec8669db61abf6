//! Aliyun Network Load Balancer.
//!
//! Same certificate path as ALB (CAS ids), but only `TCPSSL` listeners
//! terminate TLS and the listener carries a plain list of certificate ids.

use super::{
    cas_endpoint, cas_region, nlb_endpoint, upload_to_cas, RpcClient, CAS_VERSION, DEFAULT_REGION,
};
use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::AliyunNlbConfig;
use crate::credentials::AliyunAccess;
use crate::error::DeployError;
use crate::providers::http::{build_client, str_field, DEFAULT_HTTP_TIMEOUT};
use crate::types::{Page, PageRequest, ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const NLB_VERSION: &str = "2022-04-30";

pub const NLB_PROTOCOLS: &[&str] = &["TCPSSL"];

pub struct AliyunNlbAdapter {
    nlb: RpcClient,
    cas: RpcClient,
    region: String,
}

impl AliyunNlbAdapter {
    pub fn new(access: AliyunAccess, config: &AliyunNlbConfig) -> Result<Self, DeployError> {
        let region = config
            .region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let http = build_client(DEFAULT_HTTP_TIMEOUT)?;

        let nlb_url = config
            .endpoint
            .clone()
            .unwrap_or_else(|| nlb_endpoint(&region));
        let cas_url = config
            .cas_endpoint
            .clone()
            .unwrap_or_else(|| cas_endpoint(cas_region(&region)));

        Ok(Self {
            nlb: RpcClient::new(http.clone(), "nlb", &nlb_url, NLB_VERSION, access.clone()),
            cas: RpcClient::new(http, "cas", &cas_url, CAS_VERSION, access),
            region,
        })
    }

    fn region_param(&self) -> (&'static str, String) {
        ("RegionId", self.region.clone())
    }
}

fn first_certificate(listener: &Value) -> Option<String> {
    listener
        .get("CertificateIds")
        .and_then(Value::as_array)
        .and_then(|ids| ids.first())
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[async_trait]
impl CertificateUploader for AliyunNlbAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        upload_to_cas(&self.cas, bundle).await
    }
}

#[async_trait]
impl ResourceEnumerator for AliyunNlbAdapter {
    async fn describe_scope(&self, scope_id: &str) -> Result<Option<Value>, DeployError> {
        let body = self
            .nlb
            .call(
                "GetLoadBalancerAttribute",
                &[self.region_param(), ("LoadBalancerId", scope_id.to_string())],
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
            self.region_param(),
            ("MaxResults", page.size.to_string()),
            ("LoadBalancerIds.1", scope_id.to_string()),
            ("ListenerProtocol", protocol.to_string()),
        ];
        if let Some(token) = page.token {
            params.push(("NextToken", token));
        }

        let body = self.nlb.call("ListListeners", &params).await?;
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
impl BindingUpdater for AliyunNlbAdapter {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        let body = self
            .nlb
            .call(
                "GetListenerAttribute",
                &[self.region_param(), ("ListenerId", resource_id.to_string())],
            )
            .await?;

        let protocol = str_field(&body, "ListenerProtocol").unwrap_or_else(|| "TCPSSL".into());
        let mut descriptor = ResourceDescriptor::new(resource_id, protocol);
        descriptor.current_cert_id = first_certificate(&body);
        if let Some(lb) = str_field(&body, "LoadBalancerId") {
            descriptor = descriptor.with_attribute("loadBalancerId", json!(lb));
        }
        Ok(descriptor)
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        self.nlb
            .call(
                "UpdateListenerAttribute",
                &[
                    self.region_param(),
                    ("ListenerId", resource.id.clone()),
                    ("CertificateIds.1", cert_id.to_string()),
                ],
            )
            .await
            .map(drop)
    }
}
