//! Deployment history.
//!
//! This module contains:
//! - [`DeploymentHistoryStore`] trait: where pipelines write one record per deployer run
//! - [`DeploymentRecord`]: the persisted summary of a run, never carrying the private key
//! - [`StdoutStore`]: JSON-lines reference implementation

mod record;
mod store;
pub mod stdout;

pub use record::{DeploymentRecord, RecordedFailure};
pub use stdout::StdoutStore;
pub use store::DeploymentHistoryStore;
