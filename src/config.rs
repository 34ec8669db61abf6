//! Target configuration.
//!
//! Every target type has one typed config struct. The flat, camelCase
//! key/value map a caller stores is decoded into it and validated before
//! anything touches the network.

use crate::error::DeployError;
use crate::types::ResourceSelector;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of deploy targets, keyed by stable tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "aliyun-clb")]
    AliyunClb,
    #[serde(rename = "aliyun-alb")]
    AliyunAlb,
    #[serde(rename = "aliyun-nlb")]
    AliyunNlb,
    #[serde(rename = "tencentcloud-clb")]
    TencentCloudClb,
    #[serde(rename = "tencentcloud-cdn")]
    TencentCloudCdn,
    #[serde(rename = "qiniu-cdn")]
    QiniuCdn,
    #[serde(rename = "webhook")]
    Webhook,
    #[serde(rename = "local")]
    Local,
}

impl TargetType {
    pub const ALL: [TargetType; 8] = [
        TargetType::AliyunClb,
        TargetType::AliyunAlb,
        TargetType::AliyunNlb,
        TargetType::TencentCloudClb,
        TargetType::TencentCloudCdn,
        TargetType::QiniuCdn,
        TargetType::Webhook,
        TargetType::Local,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::AliyunClb => "aliyun-clb",
            TargetType::AliyunAlb => "aliyun-alb",
            TargetType::AliyunNlb => "aliyun-nlb",
            TargetType::TencentCloudClb => "tencentcloud-clb",
            TargetType::TencentCloudCdn => "tencentcloud-cdn",
            TargetType::QiniuCdn => "qiniu-cdn",
            TargetType::Webhook => "webhook",
            TargetType::Local => "local",
        }
    }

    /// Credential family the target authenticates with.
    pub fn credential_family(&self) -> &'static str {
        match self {
            TargetType::AliyunClb | TargetType::AliyunAlb | TargetType::AliyunNlb => "aliyun",
            TargetType::TencentCloudClb | TargetType::TencentCloudCdn => "tencentcloud",
            TargetType::QiniuCdn => "qiniu",
            TargetType::Webhook => "webhook",
            TargetType::Local => "local",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DeployError::UnsupportedTarget(s.to_string()))
    }
}

/// What a load balancer target deploys to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Every eligible listener of the load balancer.
    Loadbalancer,
    /// One listener.
    Listener,
    /// One forwarding-rule domain beneath a listener (TencentCloud CLB).
    Ruledomain,
    /// Hand the binding to the SSL service (TencentCloud CLB).
    #[serde(rename = "ssl-deploy")]
    SslDeploy,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Loadbalancer => "loadbalancer",
            ResourceType::Listener => "listener",
            ResourceType::Ruledomain => "ruledomain",
            ResourceType::SslDeploy => "ssl-deploy",
        }
    }
}

/// Decoded configuration, one variant per target type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TargetConfig {
    #[serde(rename = "aliyun-clb")]
    AliyunClb(AliyunClbConfig),
    #[serde(rename = "aliyun-alb")]
    AliyunAlb(AliyunAlbConfig),
    #[serde(rename = "aliyun-nlb")]
    AliyunNlb(AliyunNlbConfig),
    #[serde(rename = "tencentcloud-clb")]
    TencentCloudClb(TencentCloudClbConfig),
    #[serde(rename = "tencentcloud-cdn")]
    TencentCloudCdn(TencentCloudCdnConfig),
    #[serde(rename = "qiniu-cdn")]
    QiniuCdn(QiniuCdnConfig),
    #[serde(rename = "webhook")]
    Webhook(WebhookConfig),
    #[serde(rename = "local")]
    Local(LocalConfig),
}

impl TargetConfig {
    /// Decode the flat map for `target` and validate it.
    pub fn decode(
        target: TargetType,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, DeployError> {
        let mut tagged = config.clone();
        tagged.insert("type".into(), serde_json::Value::from(target.as_str()));

        let decoded: TargetConfig = serde_json::from_value(serde_json::Value::Object(tagged))
            .map_err(|e| DeployError::Configuration(format!("invalid `{}` config: {}", target, e)))?;
        decoded.validate()?;
        Ok(decoded)
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            TargetConfig::AliyunClb(_) => TargetType::AliyunClb,
            TargetConfig::AliyunAlb(_) => TargetType::AliyunAlb,
            TargetConfig::AliyunNlb(_) => TargetType::AliyunNlb,
            TargetConfig::TencentCloudClb(_) => TargetType::TencentCloudClb,
            TargetConfig::TencentCloudCdn(_) => TargetType::TencentCloudCdn,
            TargetConfig::QiniuCdn(_) => TargetType::QiniuCdn,
            TargetConfig::Webhook(_) => TargetType::Webhook,
            TargetConfig::Local(_) => TargetType::Local,
        }
    }

    pub fn validate(&self) -> Result<(), DeployError> {
        match self {
            TargetConfig::AliyunClb(c) => c.selector().map(drop),
            TargetConfig::AliyunAlb(c) => c.selector().map(drop),
            TargetConfig::AliyunNlb(c) => c.selector().map(drop),
            TargetConfig::TencentCloudClb(c) => c.selector().map(drop),
            TargetConfig::TencentCloudCdn(c) => c.selector().map(drop),
            TargetConfig::QiniuCdn(c) => c.selector().map(drop),
            TargetConfig::Webhook(c) => required("domain", &c.domain).map(drop),
            TargetConfig::Local(c) => {
                required("certPath", &c.cert_path)?;
                required("keyPath", &c.key_path)?;
                Ok(())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// LOAD BALANCERS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliyunClbConfig {
    #[serde(default)]
    pub region: Option<String>,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub loadbalancer_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_port")]
    pub listener_port: Option<u16>,
    /// Base URL override.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl AliyunClbConfig {
    /// Listener resource ids are `{loadbalancerId}:{listenerPort}`.
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        let lb = required("loadbalancerId", &self.loadbalancer_id)?;
        match self.resource_type {
            ResourceType::Loadbalancer => Ok(ResourceSelector::load_balancer(lb)),
            ResourceType::Listener => {
                let port = self.listener_port.filter(|p| *p != 0).ok_or_else(|| {
                    DeployError::Configuration("config `listenerPort` is required".into())
                })?;
                Ok(ResourceSelector::single(format!("{}:{}", lb, port)))
            }
            other => Err(unsupported_resource(TargetType::AliyunClb, other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliyunAlbConfig {
    #[serde(default)]
    pub region: Option<String>,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub loadbalancer_id: Option<String>,
    #[serde(default)]
    pub listener_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Certificate service base URL override.
    #[serde(default)]
    pub cas_endpoint: Option<String>,
}

impl AliyunAlbConfig {
    /// ALB listener ids are globally unique, so they are the resource ids.
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        match self.resource_type {
            ResourceType::Loadbalancer => Ok(ResourceSelector::load_balancer(required(
                "loadbalancerId",
                &self.loadbalancer_id,
            )?)),
            ResourceType::Listener => Ok(ResourceSelector::single(required(
                "listenerId",
                &self.listener_id,
            )?)),
            other => Err(unsupported_resource(TargetType::AliyunAlb, other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliyunNlbConfig {
    #[serde(default)]
    pub region: Option<String>,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub loadbalancer_id: Option<String>,
    #[serde(default)]
    pub listener_id: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub cas_endpoint: Option<String>,
}

impl AliyunNlbConfig {
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        match self.resource_type {
            ResourceType::Loadbalancer => Ok(ResourceSelector::load_balancer(required(
                "loadbalancerId",
                &self.loadbalancer_id,
            )?)),
            ResourceType::Listener => Ok(ResourceSelector::single(required(
                "listenerId",
                &self.listener_id,
            )?)),
            other => Err(unsupported_resource(TargetType::AliyunNlb, other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentCloudClbConfig {
    #[serde(default)]
    pub region: Option<String>,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub loadbalancer_id: Option<String>,
    #[serde(default)]
    pub listener_id: Option<String>,
    /// Rule domain for `ruledomain`; SNI domain (optional) for `ssl-deploy`.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl TencentCloudClbConfig {
    /// Listener resource ids are `{loadbalancerId}|{listenerId}`; a rule
    /// domain appends `|{domain}`.
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        let lb = required("loadbalancerId", &self.loadbalancer_id)?;
        match self.resource_type {
            ResourceType::Loadbalancer => Ok(ResourceSelector::load_balancer(lb)),
            ResourceType::Listener => {
                let listener = required("listenerId", &self.listener_id)?;
                Ok(ResourceSelector::single(format!("{}|{}", lb, listener)))
            }
            ResourceType::Ruledomain => {
                let listener = required("listenerId", &self.listener_id)?;
                let domain = required("domain", &self.domain)?;
                Ok(ResourceSelector::single(format!("{}|{}|{}", lb, listener, domain)))
            }
            ResourceType::SslDeploy => {
                let listener = required("listenerId", &self.listener_id)?;
                match self.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                    Some(domain) => Ok(ResourceSelector::single(format!(
                        "{}|{}|{}",
                        lb, listener, domain
                    ))),
                    None => Ok(ResourceSelector::single(format!("{}|{}", lb, listener))),
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// CDNS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TencentCloudCdnConfig {
    pub domain: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl TencentCloudCdnConfig {
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        let domain = required_str("domain", &self.domain)?;
        if domain.starts_with("*.") {
            Ok(ResourceSelector::wildcard(domain))
        } else {
            Ok(ResourceSelector::single(domain))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QiniuCdnConfig {
    pub domain: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl QiniuCdnConfig {
    /// Qiniu spells wildcard domains `.example.com`; the leading `*` goes.
    pub fn selector(&self) -> Result<ResourceSelector, DeployError> {
        let domain = required_str("domain", &self.domain)?;
        Ok(ResourceSelector::single(
            domain.strip_prefix('*').unwrap_or(domain),
        ))
    }
}

// ═══════════════════════════════════════════════════════════════════
// CUSTOM TARGETS
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default)]
    pub domain: Option<String>,
    /// Extra key/values forwarded in the payload.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
    /// Runs before the files are written.
    #[serde(default)]
    pub pre_command: Option<String>,
    /// Runs after the files are written.
    #[serde(default)]
    pub command: Option<String>,
    /// Interpreter for the commands; `sh` when unset.
    #[serde(default)]
    pub shell: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════

fn required<'a>(key: &str, value: &'a Option<String>) -> Result<&'a str, DeployError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DeployError::Configuration(format!(
            "config `{}` is required",
            key
        ))),
    }
}

fn required_str<'a>(key: &str, value: &'a str) -> Result<&'a str, DeployError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DeployError::Configuration(format!(
            "config `{}` is required",
            key
        )));
    }
    Ok(value)
}

fn unsupported_resource(target: TargetType, resource_type: ResourceType) -> DeployError {
    DeployError::Configuration(format!(
        "`{}` does not support resourceType `{}`",
        target,
        resource_type.as_str()
    ))
}

/// Ports arrive as numbers or strings depending on who wrote the map.
fn lenient_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(n)) => Ok(Some(n)),
        Some(Port::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Port::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port `{}`", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_target_type_tags_roundtrip() {
        for target in TargetType::ALL {
            assert_eq!(target.as_str().parse::<TargetType>().unwrap(), target);
        }
        assert!(matches!(
            "gcp-lb".parse::<TargetType>(),
            Err(DeployError::UnsupportedTarget(tag)) if tag == "gcp-lb"
        ));
    }

    #[test]
    fn test_listener_requires_loadbalancer_id() {
        let err = TargetConfig::decode(
            TargetType::AliyunClb,
            &map(json!({ "resourceType": "listener", "listenerPort": 443 })),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DeployError::Configuration("config `loadbalancerId` is required".into())
        );
    }

    #[test]
    fn test_aliyun_clb_listener_selector() {
        let config = TargetConfig::decode(
            TargetType::AliyunClb,
            &map(json!({
                "region": "cn-shanghai",
                "resourceType": "listener",
                "loadbalancerId": "lb-123",
                "listenerPort": "8443",
            })),
        )
        .unwrap();

        let TargetConfig::AliyunClb(clb) = config else {
            panic!("wrong variant");
        };
        assert_eq!(clb.listener_port, Some(8443));
        assert_eq!(clb.selector().unwrap(), ResourceSelector::single("lb-123:8443"));
    }

    #[test]
    fn test_unknown_resource_type_is_configuration_error() {
        let err = TargetConfig::decode(
            TargetType::TencentCloudClb,
            &map(json!({ "resourceType": "cluster", "loadbalancerId": "lb-1" })),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_tencentcloud_rule_domain_selector() {
        let decode = |value| match TargetConfig::decode(TargetType::TencentCloudClb, &map(value)) {
            Ok(TargetConfig::TencentCloudClb(c)) => c.selector(),
            Ok(_) => panic!("wrong variant"),
            Err(e) => Err(e),
        };

        assert_eq!(
            decode(json!({
                "resourceType": "ruledomain",
                "loadbalancerId": "lb-1",
                "listenerId": "lbl-1",
                "domain": "www.example.com",
            }))
            .unwrap(),
            ResourceSelector::single("lb-1|lbl-1|www.example.com")
        );
        assert_eq!(
            decode(json!({ "resourceType": "ruledomain", "loadbalancerId": "lb-1", "listenerId": "lbl-1" }))
                .unwrap_err(),
            DeployError::Configuration("config `domain` is required".into())
        );
    }

    #[test]
    fn test_tencentcloud_ssl_deploy_domain_is_optional() {
        let mut config = TencentCloudClbConfig {
            region: Some("ap-guangzhou".into()),
            resource_type: ResourceType::SslDeploy,
            loadbalancer_id: Some("lb-1".into()),
            listener_id: Some("lbl-1".into()),
            domain: None,
            endpoint: None,
        };
        assert_eq!(config.selector().unwrap(), ResourceSelector::single("lb-1|lbl-1"));

        config.domain = Some("*.example.com".into());
        assert_eq!(
            config.selector().unwrap(),
            ResourceSelector::single("lb-1|lbl-1|*.example.com")
        );
    }

    #[test]
    fn test_aliyun_rejects_tencentcloud_only_resource_types() {
        let err = TargetConfig::decode(
            TargetType::AliyunNlb,
            &map(json!({ "resourceType": "ruledomain", "loadbalancerId": "nlb-1" })),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DeployError::Configuration(
                "`aliyun-nlb` does not support resourceType `ruledomain`".into()
            )
        );
    }

    #[test]
    fn test_cdn_domain_selectors() {
        let tc = TencentCloudCdnConfig {
            domain: "*.example.com".into(),
            endpoint: None,
        };
        assert_eq!(tc.selector().unwrap(), ResourceSelector::wildcard("*.example.com"));

        let qiniu = QiniuCdnConfig {
            domain: "*.example.com".into(),
            endpoint: None,
        };
        assert_eq!(qiniu.selector().unwrap(), ResourceSelector::single(".example.com"));
    }

    #[test]
    fn test_local_requires_paths() {
        let err =
            TargetConfig::decode(TargetType::Local, &map(json!({ "certPath": "/tmp/a.pem" })))
                .unwrap_err();
        assert!(err.to_string().contains("keyPath"));
    }
}
