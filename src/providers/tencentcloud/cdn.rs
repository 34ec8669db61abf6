//! TencentCloud CDN.
//!
//! Wildcard targets are resolved from the certificate: CDN reports which
//! domains can take it, SSL reports where it is already deployed, and only
//! the difference gets a deploy call.

use super::{upload_certificate, TcClient, SSL_VERSION};
use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::TencentCloudCdnConfig;
use crate::credentials::TencentCloudAccess;
use crate::error::DeployError;
use crate::providers::http::{build_client, DEFAULT_HTTP_TIMEOUT};
use crate::types::{ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use serde_json::{json, Value};

const CDN_VERSION: &str = "2018-06-06";

pub struct TencentCloudCdnAdapter {
    ssl: TcClient,
    cdn: TcClient,
}

impl TencentCloudCdnAdapter {
    pub fn new(
        access: TencentCloudAccess,
        config: &TencentCloudCdnConfig,
    ) -> Result<Self, DeployError> {
        let http = build_client(DEFAULT_HTTP_TIMEOUT)?;
        let endpoint = config.endpoint.as_deref();
        Ok(Self {
            ssl: TcClient::new(http.clone(), "ssl", SSL_VERSION, endpoint, None, access.clone())?,
            cdn: TcClient::new(http, "cdn", CDN_VERSION, endpoint, None, access)?,
        })
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl CertificateUploader for TencentCloudCdnAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        upload_certificate(&self.ssl, bundle).await
    }
}

#[async_trait]
impl ResourceEnumerator for TencentCloudCdnAdapter {
    fn supports_domain_discovery(&self) -> bool {
        true
    }

    async fn bindable_domains(&self, cert_id: &str) -> Result<Vec<String>, DeployError> {
        let response = self
            .cdn
            .call(
                "DescribeCertDomains",
                &json!({ "CertId": cert_id, "Product": "cdn" }),
            )
            .await?;
        Ok(strings(response.get("Domains")))
    }

    async fn bound_domains(&self, cert_id: &str) -> Result<Vec<String>, DeployError> {
        let response = self
            .ssl
            .call(
                "DescribeDeployedResources",
                &json!({ "CertificateIds": [cert_id], "ResourceType": "cdn" }),
            )
            .await?;

        Ok(response
            .get("DeployedResources")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .flat_map(|deployed| strings(deployed.get("ResourceIds")))
            .collect())
    }
}

#[async_trait]
impl BindingUpdater for TencentCloudCdnAdapter {
    /// The SSL service owns the binding; there is nothing on the domain to
    /// read back beyond its name.
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        Ok(ResourceDescriptor::new(resource_id, "cdn"))
    }

    /// Deployments are tracked by the SSL service, not on the domain.
    async fn carries(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<bool, DeployError> {
        Ok(self
            .bound_domains(cert_id)
            .await?
            .iter()
            .any(|domain| domain == &resource.id))
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        self.ssl
            .call(
                "DeployCertificateInstance",
                &json!({
                    "CertificateId": cert_id,
                    "InstanceIdList": [resource.id],
                    "ResourceType": "cdn",
                    "Status": 1,
                }),
            )
            .await
            .map(drop)
    }
}
