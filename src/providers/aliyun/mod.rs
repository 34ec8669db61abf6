//! Aliyun RPC-style API client.
//!
//! Signature version 1.0: sorted, RFC 3986-encoded parameters, HMAC-SHA1
//! over `{METHOD}&%2F&{canonical}` keyed with `{secret}&`. Reads go as GET;
//! uploads go as form POST so keys never land in a URL.

pub mod alb;
pub mod clb;
pub mod nlb;

use crate::credentials::AliyunAccess;
use crate::error::DeployError;
use crate::certificate::CertificateBundle;
use crate::providers::http::{base_url, read_json, send_error, str_field};
use crate::types::UploadResult;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use sha1::Sha1;
use std::collections::BTreeMap;
use time::macros::format_description;
use tracing::debug;

pub use alb::AliyunAlbAdapter;
pub use clb::AliyunClbAdapter;
pub use nlb::AliyunNlbAdapter;

/// Default region for CLB, ALB and NLB.
pub const DEFAULT_REGION: &str = "cn-hangzhou";

pub const CAS_VERSION: &str = "2020-04-07";

/// Everything except RFC 3986 unreserved characters.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// One product endpoint (`slb`, `alb`, `cas`) at one API version.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    product: &'static str,
    endpoint: String,
    version: &'static str,
    access: AliyunAccess,
}

impl RpcClient {
    pub fn new(
        http: reqwest::Client,
        product: &'static str,
        endpoint: &str,
        version: &'static str,
        access: AliyunAccess,
    ) -> Self {
        Self {
            http,
            product,
            endpoint: base_url(endpoint),
            version,
            access,
        }
    }

    /// Call `action` as a signed GET; returns the JSON body.
    pub async fn call(&self, action: &str, params: &[(&str, String)]) -> Result<Value, DeployError> {
        let operation = format!("{}.{}", self.product, action);
        let signed = self.signed("GET", action, params, &operation)?;
        let url = format!("{}/?{}", self.endpoint, signed);

        debug!(operation = %operation, "aliyun request");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error(&operation, e))?;

        // Error bodies carry `Code`/`Message`; read_json quotes them.
        read_json(&operation, response).await
    }

    /// Call `action` as a signed form POST. Key material and long chains go
    /// here so they stay out of request URLs.
    pub async fn post(&self, action: &str, params: &[(&str, String)]) -> Result<Value, DeployError> {
        let operation = format!("{}.{}", self.product, action);
        let signed = self.signed("POST", action, params, &operation)?;

        debug!(operation = %operation, "aliyun request");
        let response = self
            .http
            .post(format!("{}/", self.endpoint))
            .header("Content-Type", FORM_CONTENT_TYPE)
            .body(signed)
            .send()
            .await
            .map_err(|e| send_error(&operation, e))?;

        read_json(&operation, response).await
    }

    /// Canonical parameters plus `Signature`, encoded for a query or a body.
    fn signed(
        &self,
        method: &str,
        action: &str,
        params: &[(&str, String)],
        operation: &str,
    ) -> Result<String, DeployError> {
        let mut query: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        query.insert("Action".into(), action.into());
        query.insert("Format".into(), "JSON".into());
        query.insert("Version".into(), self.version.into());
        query.insert("AccessKeyId".into(), self.access.access_key_id.clone());
        query.insert("SignatureMethod".into(), "HMAC-SHA1".into());
        query.insert("SignatureVersion".into(), "1.0".into());
        query.insert("SignatureNonce".into(), uuid::Uuid::new_v4().to_string());
        query.insert("Timestamp".into(), timestamp(operation)?);

        let canonical = canonical_query(&query);
        let signature = sign(method, &self.access.access_key_secret, &canonical, operation)?;
        Ok(format!("{}&Signature={}", canonical, encode(&signature)))
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, RFC3986).to_string()
}

fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sign(method: &str, secret: &str, canonical: &str, operation: &str) -> Result<String, DeployError> {
    let string_to_sign = format!("{}&{}&{}", method, encode("/"), encode(canonical));
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{}&", secret).as_bytes())
        .map_err(|e| DeployError::provider(operation, format!("invalid signing key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn timestamp(operation: &str) -> Result<String, DeployError> {
    time::OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
        ))
        .map_err(|e| DeployError::provider(operation, format!("clock formatting failed: {}", e)))
}

/// CLB (SLB) endpoint; a handful of regions share the central one.
pub fn clb_endpoint(region: &str) -> String {
    match region {
        "cn-hangzhou" | "cn-hangzhou-finance" | "cn-shanghai-finance-1"
        | "cn-shenzhen-finance-1" => "slb.aliyuncs.com".to_string(),
        _ => format!("slb.{}.aliyuncs.com", region),
    }
}

pub fn alb_endpoint(region: &str) -> String {
    match region {
        "cn-hangzhou-finance" => "alb.cn-hangzhou.aliyuncs.com".to_string(),
        _ => format!("alb.{}.aliyuncs.com", region),
    }
}

pub fn nlb_endpoint(region: &str) -> String {
    format!("nlb.{}.aliyuncs.com", region)
}

/// The certificate service lives in two places: mainland and international.
pub fn cas_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "cn-hangzhou"
    } else {
        "ap-southeast-1"
    }
}

pub fn cas_endpoint(cas_region: &str) -> String {
    match cas_region {
        "cn-hangzhou" => "cas.aliyuncs.com".to_string(),
        other => format!("cas.{}.aliyuncs.com", other),
    }
}

/// Register a certificate with CAS; ALB and NLB reference it by CAS id.
pub(crate) async fn upload_to_cas(
    cas: &RpcClient,
    bundle: &CertificateBundle,
) -> Result<UploadResult, DeployError> {
    let body = cas
        .post(
            "UploadUserCertificate",
            &[
                ("Name", bundle.name.clone()),
                ("Cert", bundle.cert_pem.clone()),
                ("Key", bundle.key_pem.clone()),
            ],
        )
        .await?;

    let cert_id = str_field(&body, "CertId").ok_or_else(|| {
        DeployError::provider("cas.UploadUserCertificate", "response is missing CertId")
    })?;
    Ok(UploadResult {
        cert_id,
        cert_name: bundle.name.clone(),
    })
}

/// Split a flat JSON array out of `{Outer: {Inner: [...]}}` envelopes.
pub(crate) fn nested_array<'a>(body: &'a Value, outer: &str, inner: &str) -> &'a [Value] {
    body.get(outer)
        .and_then(|v| v.get(inner))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
