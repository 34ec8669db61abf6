//! Shared HTTP plumbing for provider adapters.

use crate::error::DeployError;
use serde_json::Value;
use std::time::Duration;

/// Transport timeout for every adapter client.
pub(crate) const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

/// One client per adapter, reused for every call.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, DeployError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cert-deploy-rs/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DeployError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Read a JSON body, turning transport and HTTP failures into `Provider`
/// errors tagged with `operation`.
pub(crate) async fn read_json(
    operation: &str,
    response: reqwest::Response,
) -> Result<Value, DeployError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DeployError::provider(operation, format!("failed to read response: {}", e)))?;

    if !status.is_success() {
        return Err(DeployError::provider(
            operation,
            format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
        ));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| DeployError::provider(operation, format!("invalid JSON response: {}", e)))
}

pub(crate) fn send_error(operation: &str, e: reqwest::Error) -> DeployError {
    DeployError::provider(operation, format!("request failed: {}", e))
}

/// Strip any trailing slash so paths can be appended.
pub(crate) fn base_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// String field lookup that tolerates numbers.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("slb.aliyuncs.com"), "https://slb.aliyuncs.com");
        assert_eq!(base_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_str_field_accepts_numbers() {
        let v = json!({ "CertId": 12345, "Name": "a", "Empty": "" });
        assert_eq!(str_field(&v, "CertId").as_deref(), Some("12345"));
        assert_eq!(str_field(&v, "Name").as_deref(), Some("a"));
        assert_eq!(str_field(&v, "Empty"), None);
        assert_eq!(str_field(&v, "Missing"), None);
    }
}
