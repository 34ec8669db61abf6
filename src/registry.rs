//! Deployer Registry
//!
//! Target-type tag in, configured deployer out. The flat config map is
//! decoded and validated, and the credentials checked against the target's
//! provider family, before any adapter or HTTP client is built.

use crate::config::{TargetConfig, TargetType};
use crate::credentials::Credentials;
use crate::deployer::Deployer;
use crate::error::DeployError;
use crate::logger::{DeployLogger, NilLogger};
use crate::workflow::OrchestratorConfig;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Label used in the deployer id when the config map carries none.
pub const DEFAULT_LABEL: &str = "default";

/// Everything a constructor gets to build one deployer.
pub struct TargetContext {
    /// `"{target-tag}-{label}"`.
    pub id: String,
    pub config: TargetConfig,
    pub credentials: Credentials,
    pub logger: Arc<dyn DeployLogger>,
    pub orchestrator: OrchestratorConfig,
}

pub type Constructor =
    Arc<dyn Fn(TargetContext) -> Result<Box<dyn Deployer>, DeployError> + Send + Sync>;

/// Maps target types to deployer constructors.
pub struct DeployerRegistry {
    constructors: BTreeMap<TargetType, Constructor>,
    logger: Arc<dyn DeployLogger>,
    orchestrator: OrchestratorConfig,
}

impl Default for DeployerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployerRegistry {
    /// An empty registry. Every tag resolves to `UnsupportedTarget` until
    /// registered.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
            logger: Arc::new(NilLogger),
            orchestrator: OrchestratorConfig::default(),
        }
    }

    /// Registry with every built-in provider adapter.
    #[cfg(feature = "providers")]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for target in TargetType::ALL {
            registry.register(target, Arc::new(builtin::construct));
        }
        registry
    }

    /// Register or replace the constructor for `target`.
    pub fn register(&mut self, target: TargetType, constructor: Constructor) -> &mut Self {
        self.constructors.insert(target, constructor);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn DeployLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_orchestrator_config(mut self, config: OrchestratorConfig) -> Self {
        self.orchestrator = config;
        self
    }

    pub fn supports(&self, target: TargetType) -> bool {
        self.constructors.contains_key(&target)
    }

    pub fn resolve(
        &self,
        tag: &str,
        config: &Map<String, Value>,
        credentials: Credentials,
    ) -> Result<Box<dyn Deployer>, DeployError> {
        let target = TargetType::from_str(tag)?;
        let constructor = self
            .constructors
            .get(&target)
            .ok_or_else(|| DeployError::UnsupportedTarget(tag.to_string()))?;

        let mut fields = config.clone();
        let label = match fields.remove("label") {
            Some(Value::String(label)) if !label.trim().is_empty() => label.trim().to_string(),
            _ => DEFAULT_LABEL.to_string(),
        };
        let typed = TargetConfig::decode(target, &fields)?;

        if credentials.family() != target.credential_family() {
            return Err(DeployError::Configuration(format!(
                "target `{}` needs `{}` credentials, got `{}`",
                target,
                target.credential_family(),
                credentials.family()
            )));
        }

        let id = format!("{}-{}", target, label);
        debug!(deployer = %id, "resolving deployer");
        constructor(TargetContext {
            id,
            config: typed,
            credentials,
            logger: self.logger.clone(),
            orchestrator: self.orchestrator.clone(),
        })
    }
}

#[cfg(feature = "providers")]
mod builtin {
    use super::TargetContext;
    use crate::config::TargetConfig;
    use crate::credentials::Credentials;
    use crate::deployer::Deployer;
    use crate::error::DeployError;
    use crate::providers::aliyun::{self, AliyunAlbAdapter, AliyunClbAdapter, AliyunNlbAdapter};
    use crate::providers::local::LocalDeployer;
    use crate::providers::qiniu::QiniuCdnAdapter;
    use crate::providers::tencentcloud::{self, TencentCloudCdnAdapter, TencentCloudClbAdapter};
    use crate::providers::webhook::WebhookDeployer;
    use crate::workflow::DeploymentOrchestrator;
    use std::sync::Arc;

    fn mismatch(ctx: &TargetContext) -> DeployError {
        DeployError::Configuration(format!(
            "target `{}` cannot use `{}` credentials",
            ctx.config.target_type(),
            ctx.credentials.family()
        ))
    }

    pub(super) fn construct(ctx: TargetContext) -> Result<Box<dyn Deployer>, DeployError> {
        let shared = Arc::new(ctx.credentials.clone());

        match (&ctx.config, &ctx.credentials) {
            (TargetConfig::AliyunClb(c), Credentials::Aliyun(access)) => {
                let adapter = AliyunClbAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_protocols(aliyun::clb::CLB_PROTOCOLS.iter().copied())
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::AliyunAlb(c), Credentials::Aliyun(access)) => {
                let adapter = AliyunAlbAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_protocols(aliyun::alb::ALB_PROTOCOLS.iter().copied())
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::AliyunNlb(c), Credentials::Aliyun(access)) => {
                let adapter = AliyunNlbAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_protocols(aliyun::nlb::NLB_PROTOCOLS.iter().copied())
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::TencentCloudClb(c), Credentials::TencentCloud(access)) => {
                let adapter = TencentCloudClbAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_protocols(tencentcloud::clb::CLB_PROTOCOLS.iter().copied())
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::TencentCloudCdn(c), Credentials::TencentCloud(access)) => {
                let adapter = TencentCloudCdnAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::QiniuCdn(c), Credentials::Qiniu(access)) => {
                let adapter = QiniuCdnAdapter::new(access.clone(), c)?;
                Ok(Box::new(
                    DeploymentOrchestrator::new(ctx.id, adapter, c.selector()?)
                        .with_credentials(shared)
                        .with_config(ctx.orchestrator)
                        .with_logger(ctx.logger),
                ))
            }
            (TargetConfig::Webhook(c), Credentials::Webhook(access)) => Ok(Box::new(
                WebhookDeployer::new(ctx.id, access.clone(), c, ctx.logger)?,
            )),
            (TargetConfig::Local(c), Credentials::Local) => {
                Ok(Box::new(LocalDeployer::new(ctx.id, c, ctx.logger)?))
            }
            _ => Err(mismatch(&ctx)),
        }
    }
}
