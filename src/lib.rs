//! Certificate Deploy Library
//!
//! Trait-based TLS certificate deployment engine: register a certificate
//! with a cloud provider, find every resource that must serve it, and rebind
//! them one by one while keeping track of what failed.
//!
//! # Design
//!
//! The orchestrator knows nothing about any cloud. You implement the three
//! capability traits ([`CertificateUploader`], [`ResourceEnumerator`],
//! [`BindingUpdater`]) for your provider, and [`DeploymentOrchestrator`]
//! handles upload, pagination, wildcard resolution, extension ordering and
//! partial-failure aggregation. Built-in adapters live under `providers`
//! (feature `providers`) and are wired up by [`DeployerRegistry`].
//!
//! # Usage
//!
//! ```ignore
//! use cert_deploy_rs::{Credentials, DeployerRegistry, TracingLogger};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = DeployerRegistry::with_builtin().with_logger(Arc::new(TracingLogger));
//!
//! let config = serde_json::from_str(r#"{
//!     "resourceType": "listener",
//!     "region": "cn-hangzhou",
//!     "loadbalancerId": "lb-bp1",
//!     "listenerPort": 443
//! }"#)?;
//! let deployer = registry.resolve("aliyun-clb", &config, credentials)?;
//!
//! let result = deployer.deploy(&CancellationToken::new(), &cert_pem, &key_pem).await?;
//! for (resource, error) in result.per_resource_errors() {
//!     eprintln!("{}: {}", resource, error);
//! }
//! ```

pub mod applicant;
pub mod backend;
pub mod binding;
pub mod cache;
mod call;
pub mod certificate;
pub mod config;
pub mod credentials;
pub mod deployer;
pub mod enumerate;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod workflow;

#[cfg(feature = "providers")]
pub mod providers;

// Re-export the main types at crate root for convenience
pub use applicant::{AccountRepository, AcmeAccount, Applicant, CachedAccountRepository, ObtainedCertificate};
pub use backend::{BindingUpdater, CertificateUploader, ProviderAdapter, ResourceEnumerator};
pub use binding::{rebind, RebindAck};
pub use cache::{AccountCache, AccountKey};
pub use certificate::{parse_certificate, CertNaming, CertificateBundle, CertificateSummary};
pub use config::{ResourceType, TargetConfig, TargetType};
pub use credentials::Credentials;
pub use deployer::Deployer;
pub use enumerate::{DomainDiscovery, Enumerator};
pub use error::{BindingFailure, BindingFailures, DeployError};
pub use logger::{DeployLogger, MemoryLogger, NilLogger, TracingLogger};
pub use pipeline::{DeployPipeline, Notifier, PipelineEntry, PipelineReport};
pub use registry::{DeployerRegistry, TargetContext};
pub use state::{DeploymentState, Step};
pub use store::{DeploymentHistoryStore, DeploymentRecord, StdoutStore};
pub use types::*;
pub use workflow::{DeploymentOrchestrator, OrchestratorConfig};
