//! TencentCloud API 3.0 client.
//!
//! Every action is a JSON POST signed with TC3-HMAC-SHA256. Errors come
//! back as HTTP 200 with `Response.Error`, so the envelope is checked here.

pub mod cdn;
pub mod clb;

use crate::certificate::CertificateBundle;
use crate::credentials::TencentCloudAccess;
use crate::error::DeployError;
use crate::providers::http::{base_url, read_json, send_error, str_field};
use crate::types::UploadResult;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use time::macros::format_description;
use tracing::debug;

pub use cdn::TencentCloudCdnAdapter;
pub use clb::TencentCloudClbAdapter;

const ALGORITHM: &str = "TC3-HMAC-SHA256";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// One service (`ssl`, `clb`, `cdn`) at one API version.
#[derive(Clone)]
pub struct TcClient {
    http: reqwest::Client,
    service: &'static str,
    endpoint: String,
    host: String,
    version: &'static str,
    region: Option<String>,
    access: TencentCloudAccess,
}

impl TcClient {
    /// `endpoint` defaults to `{service}.tencentcloudapi.com`.
    pub fn new(
        http: reqwest::Client,
        service: &'static str,
        version: &'static str,
        endpoint: Option<&str>,
        region: Option<String>,
        access: TencentCloudAccess,
    ) -> Result<Self, DeployError> {
        let endpoint = match endpoint {
            Some(url) => base_url(url),
            None => format!("https://{}.tencentcloudapi.com", service),
        };
        let parsed = reqwest::Url::parse(&endpoint).map_err(|e| {
            DeployError::Configuration(format!("invalid endpoint `{}`: {}", endpoint, e))
        })?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(DeployError::Configuration(format!(
                    "endpoint `{}` has no host",
                    endpoint
                )))
            }
        };

        Ok(Self {
            http,
            service,
            endpoint,
            host,
            version,
            region: region.filter(|r| !r.is_empty()),
            access,
        })
    }

    /// Call `action`; returns the `Response` object.
    pub async fn call(&self, action: &str, payload: &Value) -> Result<Value, DeployError> {
        let operation = format!("{}.{}", self.service, action);
        let body = payload.to_string();
        let now = time::OffsetDateTime::now_utc();
        let timestamp = now.unix_timestamp();
        let date = now
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| DeployError::provider(&operation, format!("clock formatting failed: {}", e)))?;

        let authorization = self.authorization(&body, timestamp, &date, &operation)?;

        let mut request = self
            .http
            .post(format!("{}/", self.endpoint))
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", &self.host)
            .header("Authorization", authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Version", self.version)
            .header("X-TC-Timestamp", timestamp.to_string());
        if let Some(region) = &self.region {
            request = request.header("X-TC-Region", region);
        }

        debug!(operation = %operation, "tencentcloud request");
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| send_error(&operation, e))?;

        let envelope = read_json(&operation, response).await?;
        let inner = envelope
            .get("Response")
            .cloned()
            .ok_or_else(|| DeployError::provider(&operation, "response has no `Response` field"))?;

        if let Some(error) = inner.get("Error") {
            return Err(DeployError::provider(
                &operation,
                format!(
                    "[{}] {}",
                    str_field(error, "Code").unwrap_or_default(),
                    str_field(error, "Message").unwrap_or_default()
                ),
            ));
        }
        Ok(inner)
    }

    fn authorization(
        &self,
        body: &str,
        timestamp: i64,
        date: &str,
        operation: &str,
    ) -> Result<String, DeployError> {
        let canonical_request = format!(
            "POST\n/\n\ncontent-type:{}\nhost:{}\n\ncontent-type;host\n{}",
            CONTENT_TYPE,
            self.host,
            hex::encode(Sha256::digest(body.as_bytes()))
        );
        let scope = format!("{}/{}/tc3_request", date, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            timestamp,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret_date = hmac_sha256(
            format!("TC3{}", self.access.secret_key).as_bytes(),
            date,
            operation,
        )?;
        let secret_service = hmac_sha256(&secret_date, self.service, operation)?;
        let secret_signing = hmac_sha256(&secret_service, "tc3_request", operation)?;
        let signature = hex::encode(hmac_sha256(&secret_signing, &string_to_sign, operation)?);

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders=content-type;host, Signature={}",
            ALGORITHM, self.access.secret_id, scope, signature
        ))
    }
}

fn hmac_sha256(key: &[u8], message: &str, operation: &str) -> Result<Vec<u8>, DeployError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| DeployError::provider(operation, format!("invalid signing key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SSL certificate service, shared by every TencentCloud product.
pub(crate) const SSL_VERSION: &str = "2019-12-05";

/// Upload to the SSL certificate service. Identical material is not
/// duplicated: the service returns the existing id.
pub(crate) async fn upload_certificate(
    ssl: &TcClient,
    bundle: &CertificateBundle,
) -> Result<UploadResult, DeployError> {
    let response = ssl
        .call(
            "UploadCertificate",
            &json!({
                "CertificatePublicKey": bundle.cert_pem,
                "CertificatePrivateKey": bundle.key_pem,
                "CertificateType": "SVR",
                "Alias": bundle.name,
                "Repeatable": false,
            }),
        )
        .await?;

    let cert_id = str_field(&response, "CertificateId").ok_or_else(|| {
        DeployError::provider("ssl.UploadCertificate", "response is missing CertificateId")
    })?;
    Ok(UploadResult {
        cert_id,
        cert_name: bundle.name.clone(),
    })
}
