//! Qiniu CDN.
//!
//! Certificates go to the `sslcert` store; a domain that already serves
//! HTTPS gets its certificate swapped with its flags intact, any other
//! domain is upgraded to HTTPS. Wildcard domains are spelled `.example.com`.

use crate::backend::{BindingUpdater, CertificateUploader, ResourceEnumerator};
use crate::certificate::CertificateBundle;
use crate::config::QiniuCdnConfig;
use crate::credentials::QiniuAccess;
use crate::error::DeployError;
use crate::providers::http::{base_url, build_client, read_json, send_error, str_field, DEFAULT_HTTP_TIMEOUT};
use crate::types::{ResourceDescriptor, UploadResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::{json, Value};
use sha1::Sha1;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.qiniu.com";

pub struct QiniuCdnAdapter {
    http: reqwest::Client,
    endpoint: String,
    access: QiniuAccess,
}

impl QiniuCdnAdapter {
    pub fn new(access: QiniuAccess, config: &QiniuCdnConfig) -> Result<Self, DeployError> {
        Ok(Self {
            http: build_client(DEFAULT_HTTP_TIMEOUT)?,
            endpoint: base_url(config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)),
            access,
        })
    }

    /// `QBox {ak}:{urlsafe_base64(hmac_sha1(sk, "{path}\n"))}`. JSON bodies
    /// are not part of the signature.
    fn authorization(&self, path: &str, operation: &str) -> Result<String, DeployError> {
        let mut mac = Hmac::<Sha1>::new_from_slice(self.access.secret_key.as_bytes())
            .map_err(|e| DeployError::provider(operation, format!("invalid signing key: {}", e)))?;
        mac.update(format!("{}\n", path).as_bytes());
        Ok(format!(
            "QBox {}:{}",
            self.access.access_key,
            URL_SAFE.encode(mac.finalize().into_bytes())
        ))
    }

    async fn call(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DeployError> {
        let authorization = self.authorization(path, operation)?;
        let mut request = self
            .http
            .request(method, format!("{}{}", self.endpoint, path))
            .header("Authorization", authorization);
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!(operation, path, "qiniu request");
        let response = request.send().await.map_err(|e| send_error(operation, e))?;
        read_json(operation, response).await
    }
}

#[async_trait]
impl CertificateUploader for QiniuCdnAdapter {
    async fn upload(&self, bundle: &CertificateBundle) -> Result<UploadResult, DeployError> {
        let response = self
            .call(
                "sslcert.UploadSslCert",
                Method::POST,
                "/sslcert",
                Some(json!({
                    "name": bundle.name,
                    "common_name": bundle.summary.common_name,
                    "pri": bundle.key_pem,
                    "ca": bundle.cert_pem,
                })),
            )
            .await?;

        let cert_id = str_field(&response, "certID").ok_or_else(|| {
            DeployError::provider("sslcert.UploadSslCert", "response is missing certID")
        })?;
        Ok(UploadResult {
            cert_id,
            cert_name: bundle.name.clone(),
        })
    }
}

/// Single-domain target; no enumeration.
impl ResourceEnumerator for QiniuCdnAdapter {}

#[async_trait]
impl BindingUpdater for QiniuCdnAdapter {
    async fn describe(&self, resource_id: &str) -> Result<ResourceDescriptor, DeployError> {
        let info = self
            .call(
                "cdn.GetDomainInfo",
                Method::GET,
                &format!("/domain/{}", resource_id),
                None,
            )
            .await?;

        let mut descriptor = ResourceDescriptor::new(resource_id, "cdn");
        if let Some(https) = info.get("https").filter(|v| v.is_object()) {
            descriptor.current_cert_id = str_field(https, "certId");
            for flag in ["forceHttps", "http2Enable"] {
                if let Some(value) = https.get(flag).and_then(Value::as_bool) {
                    descriptor = descriptor.with_attribute(flag, json!(value));
                }
            }
        }
        Ok(descriptor)
    }

    async fn update(&self, resource: &ResourceDescriptor, cert_id: &str) -> Result<(), DeployError> {
        let flag = |name: &str| {
            resource
                .attributes
                .get(name)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        if resource.current_cert_id.is_some() {
            self.call(
                "cdn.ModifyDomainHttpsConf",
                Method::PUT,
                &format!("/domain/{}/httpsconf", resource.id),
                Some(json!({
                    "certId": cert_id,
                    "forceHttps": flag("forceHttps"),
                    "http2Enable": flag("http2Enable"),
                })),
            )
            .await
            .map(drop)
        } else {
            self.call(
                "cdn.EnableDomainHttps",
                Method::PUT,
                &format!("/domain/{}/sslize", resource.id),
                Some(json!({
                    "certid": cert_id,
                    "forceHttps": true,
                    "http2Enable": true,
                })),
            )
            .await
            .map(drop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qbox_authorization_shape() {
        let adapter = QiniuCdnAdapter::new(
            QiniuAccess {
                access_key: "ak".into(),
                secret_key: "sk".into(),
            },
            &QiniuCdnConfig {
                domain: "cdn.example.com".into(),
                endpoint: None,
            },
        )
        .unwrap();

        let auth = adapter.authorization("/sslcert", "sslcert.UploadSslCert").unwrap();
        let token = auth.strip_prefix("QBox ak:").unwrap();
        // 20-byte digest, padded URL-safe base64.
        assert_eq!(token.len(), 28);
        assert!(!token.contains('+') && !token.contains('/'));
    }
}
