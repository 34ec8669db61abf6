//! Outbound call budget.

use crate::error::DeployError;
use std::future::Future;
use std::time::Duration;

/// Run one provider call under an explicit deadline.
pub(crate) async fn bounded<T, F>(operation: &str, after: Duration, call: F) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(DeployError::Timeout {
            operation: operation.to_string(),
            after,
        }),
    }
}
