//! [`DeploymentHistoryStore`] trait definition.

use crate::error::DeployError;
use crate::store::DeploymentRecord;
use async_trait::async_trait;

/// Trait for persisting deployment records.
#[async_trait]
pub trait DeploymentHistoryStore: Send + Sync {
    /// Append a record.
    async fn save(&self, record: &DeploymentRecord) -> Result<(), DeployError>;

    /// Records of one deployer, oldest first. Empty if none are kept.
    async fn list(&self, deployer_id: &str) -> Result<Vec<DeploymentRecord>, DeployError>;

    /// Latest record of one deployer. Returns `None` if not found.
    async fn latest(&self, deployer_id: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        Ok(self.list(deployer_id).await?.pop())
    }
}
