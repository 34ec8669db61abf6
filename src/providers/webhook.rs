//! Webhook target: POST the certificate to a URL and let the receiver
//! install it.

use crate::certificate::parse_certificate;
use crate::config::WebhookConfig;
use crate::credentials::WebhookAccess;
use crate::deployer::{single_target_result, Deployer};
use crate::error::DeployError;
use crate::logger::{AuditTrail, DeployLogger, LastRun};
use crate::providers::http::{build_client, send_error, DEFAULT_HTTP_TIMEOUT};
use crate::types::{DeploymentResult, LogEntry};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Body of the webhook call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload<'a> {
    pub domain: &'a str,
    pub certificate: &'a str,
    pub private_key: &'a str,
    pub common_name: &'a str,
    pub variables: &'a BTreeMap<String, String>,
}

pub struct WebhookDeployer {
    id: String,
    http: reqwest::Client,
    url: String,
    domain: String,
    variables: BTreeMap<String, String>,
    logger: Arc<dyn DeployLogger>,
    last_run: LastRun,
}

impl WebhookDeployer {
    pub fn new(
        id: impl Into<String>,
        access: WebhookAccess,
        config: &WebhookConfig,
        logger: Arc<dyn DeployLogger>,
    ) -> Result<Self, DeployError> {
        if access.url.trim().is_empty() {
            return Err(DeployError::Configuration(
                "webhook access `url` is required".into(),
            ));
        }
        let domain = config
            .domain
            .clone()
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| DeployError::Configuration("config `domain` is required".into()))?;

        Ok(Self {
            id: id.into(),
            http: build_client(DEFAULT_HTTP_TIMEOUT)?,
            url: access.url,
            domain,
            variables: config.variables.clone(),
            logger,
            last_run: LastRun::default(),
        })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), DeployError> {
        let response = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| send_error("webhook.Post", e))?;

        // Receivers answer with anything; only the status matters.
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeployError::provider(
            "webhook.Post",
            format!("HTTP {}: {}", status.as_u16(), body.chars().take(512).collect::<String>()),
        ))
    }
}

#[async_trait]
impl Deployer for WebhookDeployer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<DeploymentResult, DeployError> {
        let summary = parse_certificate(cert_pem)?;
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let mut trail = AuditTrail::new(self.logger.as_ref());
        let payload = WebhookPayload {
            domain: &self.domain,
            certificate: cert_pem,
            private_key: key_pem,
            common_name: &summary.common_name,
            variables: &self.variables,
        };

        let attempt = self.post(&payload).await;
        match &attempt {
            Ok(()) => {
                info!(deployer = %self.id, domain = %self.domain, "webhook delivered");
                trail.record("webhook delivered", Some(json!({ "domain": self.domain })));
            }
            Err(e) => {
                warn!(deployer = %self.id, error = %e, "webhook failed");
                trail.record(
                    "webhook failed",
                    Some(json!({ "domain": self.domain, "error": e.to_string() })),
                );
            }
        }

        let log_entries = trail.into_entries();
        self.last_run.replace(log_entries.clone());
        Ok(single_target_result(&self.domain, attempt, log_entries))
    }

    fn log_entries(&self) -> Vec<LogEntry> {
        self.last_run.get()
    }
}
