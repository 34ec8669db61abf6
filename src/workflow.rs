//! Deployment Orchestrator
//!
//! The state machine that drives one deployment. It's dumb: validate,
//! upload, resolve, bind, and call the provider adapter in between. No
//! signing, no transport, no cloud specifics. Just logic.

use crate::backend::ProviderAdapter;
use crate::binding::{rebind, RebindAck};
use crate::call::bounded;
use crate::certificate::{CertNaming, CertificateBundle};
use crate::credentials::Credentials;
use crate::deployer::Deployer;
use crate::enumerate::{strip_leading_wildcard, Enumerator};
use crate::error::DeployError;
use crate::logger::{DeployLogger, LastRun, NilLogger};
use crate::state::{DeploymentState, Step};
use crate::types::{DeploymentRequest, DeploymentResult, LogEntry, Outcome, ResourceSelector};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Listing page size.
    pub page_size: u32,
    /// Deadline for every single provider call.
    pub call_timeout: Duration,
    /// Resources rebound at once. 1 = strictly sequential.
    pub binding_concurrency: usize,
    pub naming: CertNaming,
    /// Prefix of generated certificate names.
    pub name_prefix: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            call_timeout: Duration::from_secs(60),
            binding_concurrency: 1,
            naming: CertNaming::Timestamp,
            name_prefix: "certdeploy".to_string(),
        }
    }
}

/// What resolution produced.
enum Resolved {
    Resources(Vec<String>),
    /// Nothing to bind, and that's fine.
    NothingToDo,
}

/// The deployment orchestrator.
///
/// Parameterized by the provider adapter; you bring the cloud.
pub struct DeploymentOrchestrator<P: ProviderAdapter> {
    id: String,
    provider: P,
    selector: ResourceSelector,
    protocols: BTreeSet<String>,
    credentials: Option<Arc<Credentials>>,
    config: OrchestratorConfig,
    logger: Arc<dyn DeployLogger>,
    last_run: LastRun,
}

impl<P: ProviderAdapter> DeploymentOrchestrator<P> {
    pub fn new(id: impl Into<String>, provider: P, selector: ResourceSelector) -> Self {
        Self {
            id: id.into(),
            provider,
            selector,
            protocols: BTreeSet::new(),
            credentials: None,
            config: OrchestratorConfig::default(),
            logger: Arc::new(NilLogger),
            last_run: LastRun::default(),
        }
    }

    /// Listener protocols to enumerate for load balancer selectors.
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn DeployLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn selector(&self) -> &ResourceSelector {
        &self.selector
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Assemble the immutable request for one PEM pair.
    pub fn request(&self, cert_pem: &str, key_pem: &str) -> DeploymentRequest {
        DeploymentRequest {
            certificate_pem: cert_pem.to_string(),
            private_key_pem: key_pem.to_string(),
            provider_credentials: self.credentials.clone(),
            selector: self.selector.clone(),
            protocols: self.protocols.clone(),
        }
    }

    /// Run one deployment to a terminal step.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        request: DeploymentRequest,
    ) -> Result<DeploymentResult, DeployError> {
        let mut state = DeploymentState::new(&self.id, request);
        let result = self.drive(&mut state, cancel).await;
        debug!(deployer = %self.id, step = state.step.name(), "deployment finished");

        self.last_run.replace(state.log.clone());
        result
    }

    async fn drive(
        &self,
        state: &mut DeploymentState,
        cancel: &CancellationToken,
    ) -> Result<DeploymentResult, DeployError> {
        // Pre-resolution failures never produce a result.
        let bundle = self.step_init(state, cancel).inspect_err(|e| state.fail(e.clone()))?;
        let cert_id = self
            .step_upload(state, &bundle)
            .await
            .inspect_err(|e| state.fail(e.clone()))?;

        match self.step_resolve(state, &cert_id).await {
            Ok(Resolved::Resources(resources)) => {
                self.step_bind(state, cancel, &cert_id, resources).await;
            }
            Ok(Resolved::NothingToDo) => state.transition(Step::Done(Outcome::Success)),
            Err(e) => {
                warn!(deployer = %self.id, error = %e, "resolution failed");
                self.record(state, "resolution failed", Some(json!({ "error": e.to_string() })));
                state.fail(e);
            }
        }

        Ok(state.to_result())
    }

    // ═══════════════════════════════════════════════════════════════
    // STEP IMPLEMENTATIONS
    // ═══════════════════════════════════════════════════════════════

    fn step_init(
        &self,
        state: &mut DeploymentState,
        cancel: &CancellationToken,
    ) -> Result<CertificateBundle, DeployError> {
        let request = &state.request;
        request.selector.validate()?;
        if matches!(request.selector, ResourceSelector::LoadBalancer { .. })
            && request.protocols.is_empty()
        {
            return Err(DeployError::Configuration(
                "load balancer deployment needs at least one listener protocol".into(),
            ));
        }

        let bundle = CertificateBundle::prepare(
            &request.certificate_pem,
            &request.private_key_pem,
            &self.config.name_prefix,
            self.config.naming,
        )?;

        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        debug!(
            deployer = %self.id,
            selector = request.selector.name(),
            common_name = %bundle.summary.common_name,
            "deployment initialized"
        );
        state.transition(Step::Uploading);
        Ok(bundle)
    }

    async fn step_upload(
        &self,
        state: &mut DeploymentState,
        bundle: &CertificateBundle,
    ) -> Result<String, DeployError> {
        let upload = bounded("upload", self.config.call_timeout, self.provider.upload(bundle))
            .await
            .map_err(DeployError::into_upload)?;

        info!(deployer = %self.id, cert_id = %upload.cert_id, cert_name = %upload.cert_name, "certificate uploaded");
        self.record(
            state,
            "certificate uploaded",
            Some(json!({ "certId": upload.cert_id, "certName": upload.cert_name })),
        );

        let cert_id = upload.cert_id.clone();
        state.upload = Some(upload);
        state.transition(Step::Resolving);
        Ok(cert_id)
    }

    async fn step_resolve(
        &self,
        state: &mut DeploymentState,
        cert_id: &str,
    ) -> Result<Resolved, DeployError> {
        let enumerator = Enumerator::new(
            &self.provider,
            self.config.page_size,
            self.config.call_timeout,
        );

        let resources = match state.request.selector.clone() {
            ResourceSelector::SingleResource { id } => vec![id],

            ResourceSelector::LoadBalancer { id } => {
                if let Some(description) = enumerator.describe_scope(&id).await? {
                    self.record(state, "load balancer described", Some(description));
                }
                let listed = enumerator.list(&id, &state.request.protocols).await?;
                if listed.is_empty() {
                    return Err(DeployError::ResourceNotFound(format!(
                        "no listeners speaking {:?} under load balancer `{}`",
                        state.request.protocols, id
                    )));
                }
                listed.into_iter().map(|r| r.id).collect()
            }

            ResourceSelector::WildcardDomain { pattern } => {
                if !self.provider.supports_domain_discovery() {
                    vec![strip_leading_wildcard(&pattern).to_string()]
                } else {
                    let discovery = enumerator.discover_domains(cert_id).await?;
                    self.record(
                        state,
                        "domains discovered",
                        Some(json!({
                            "bindable": discovery.bindable,
                            "bound": discovery.bound,
                        })),
                    );

                    if discovery.pending.is_empty() {
                        if discovery.bound.is_empty() {
                            return Err(DeployError::ResourceNotFound(format!(
                                "no domain can take certificate `{}` for `{}`",
                                cert_id, pattern
                            )));
                        }
                        info!(deployer = %self.id, cert_id, "every domain already carries the certificate");
                        self.record(state, "certificate already deployed", None);
                        return Ok(Resolved::NothingToDo);
                    }
                    discovery.pending
                }
            }
        };

        self.record(state, "resources discovered", Some(json!(resources)));
        state.discovered = resources.clone();
        state.transition(Step::Binding);
        Ok(Resolved::Resources(resources))
    }

    async fn step_bind(
        &self,
        state: &mut DeploymentState,
        cancel: &CancellationToken,
        cert_id: &str,
        resources: Vec<String>,
    ) {
        let provider = &self.provider;
        let call_timeout = self.config.call_timeout;

        let attempts: Vec<(String, Option<Result<RebindAck, DeployError>>)> =
            stream::iter(resources)
                .map(|resource_id| async move {
                    if cancel.is_cancelled() {
                        return (resource_id, None);
                    }
                    let result = rebind(provider, &resource_id, cert_id, call_timeout).await;
                    (resource_id, Some(result))
                })
                .buffered(self.config.binding_concurrency.max(1))
                .collect()
                .await;

        let mut skipped = Vec::new();
        for (resource_id, attempt) in attempts {
            match attempt {
                Some(Ok(ack)) => {
                    info!(deployer = %self.id, resource = %resource_id, cert_id, "resource bound");
                    let payload = match ack {
                        RebindAck::Updated { extensions } => {
                            json!({ "resourceId": resource_id, "extensions": extensions })
                        }
                        RebindAck::AlreadyBound => {
                            json!({ "resourceId": resource_id, "alreadyBound": true })
                        }
                    };
                    self.record(state, "resource bound", Some(payload));
                    state.updated.push(resource_id);
                }
                Some(Err(e)) => {
                    warn!(deployer = %self.id, resource = %resource_id, error = %e, "resource binding failed");
                    self.record(
                        state,
                        "resource binding failed",
                        Some(json!({ "resourceId": resource_id, "error": e.to_string() })),
                    );
                    state.failures.push(resource_id, e);
                }
                None => skipped.push(resource_id),
            }
        }

        if !skipped.is_empty() {
            warn!(deployer = %self.id, remaining = skipped.len(), "deployment cancelled");
            self.record(state, "deployment cancelled", Some(json!({ "skipped": skipped })));
            state.error = Some(DeployError::Cancelled);
            state.transition(Step::Done(Outcome::Cancelled));
            return;
        }

        if state.failures.is_empty() {
            state.transition(Step::Done(Outcome::Success));
            return;
        }

        let outcome = if state.updated.is_empty() {
            Outcome::Failure
        } else {
            Outcome::PartialFailure
        };
        state.error = Some(DeployError::Binding(state.failures.clone()));
        state.transition(Step::Done(outcome));
    }

    // ═══════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════

    fn record(&self, state: &mut DeploymentState, tag: &str, payload: Option<Value>) {
        self.logger.log(tag, payload.as_ref());
        state.log.push(LogEntry {
            tag: tag.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl<P: ProviderAdapter> Deployer for DeploymentOrchestrator<P> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<DeploymentResult, DeployError> {
        let request = self.request(cert_pem, key_pem);
        self.run(cancel, request).await
    }

    fn log_entries(&self) -> Vec<LogEntry> {
        self.last_run.get()
    }
}
