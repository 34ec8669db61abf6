//! Provider access credentials.
//!
//! Decoded from the access record's JSON. `Debug` never prints secrets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential family. One per provider, not per product.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Credentials {
    Aliyun(AliyunAccess),
    TencentCloud(TencentCloudAccess),
    Qiniu(QiniuAccess),
    Webhook(WebhookAccess),
    Local,
}

impl Credentials {
    /// Stable family name, used in mismatch errors.
    pub fn family(&self) -> &'static str {
        match self {
            Credentials::Aliyun(_) => "aliyun",
            Credentials::TencentCloud(_) => "tencentcloud",
            Credentials::Qiniu(_) => "qiniu",
            Credentials::Webhook(_) => "webhook",
            Credentials::Local => "local",
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Aliyun(a) => f
                .debug_struct("Aliyun")
                .field("access_key_id", &a.access_key_id)
                .field("access_key_secret", &"<redacted>")
                .finish(),
            Credentials::TencentCloud(a) => f
                .debug_struct("TencentCloud")
                .field("secret_id", &a.secret_id)
                .field("secret_key", &"<redacted>")
                .finish(),
            Credentials::Qiniu(a) => f
                .debug_struct("Qiniu")
                .field("access_key", &a.access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            // URLs frequently embed tokens.
            Credentials::Webhook(_) => f
                .debug_struct("Webhook")
                .field("url", &"<redacted>")
                .finish(),
            Credentials::Local => f.write_str("Local"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliyunAccess {
    pub access_key_id: String,
    pub access_key_secret: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentCloudAccess {
    pub secret_id: String,
    pub secret_key: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QiniuAccess {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAccess {
    pub url: String,
}
