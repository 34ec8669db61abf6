//! Stdout-based history store.
//!
//! Outputs each record as one JSON line for interoperability with external
//! tools and pipelines. Read operations always return empty (no persistence
//! across runs).

use crate::error::DeployError;
use crate::store::{DeploymentHistoryStore, DeploymentRecord};
use async_trait::async_trait;
use std::io::Write;

/// History store that writes JSON lines to stdout.
///
/// Useful for piping run summaries to other tools (`deploy | jq`) and for
/// environments without a database.
pub struct StdoutStore;

impl StdoutStore {
    pub fn new() -> Self {
        Self
    }

    /// The line written for `record`.
    pub fn render(record: &DeploymentRecord) -> Result<String, DeployError> {
        serde_json::to_string(record)
            .map_err(|e| DeployError::Storage(format!("failed to serialize record: {}", e)))
    }
}

impl Default for StdoutStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeploymentHistoryStore for StdoutStore {
    async fn save(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        let line = Self::render(record)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line).map_err(|e| DeployError::Storage(e.to_string()))
    }

    async fn list(&self, _deployer_id: &str) -> Result<Vec<DeploymentRecord>, DeployError> {
        Ok(Vec::new())
    }
}
