//! Per-process account cache.
//!
//! Keyed by `(issuer, identity)`. Concurrent lookups of the same key share
//! one fetch; found values are kept for a caller-supplied TTL and can be
//! invalidated explicitly. Misses and errors are never cached.

use crate::error::DeployError;
use moka::future::Cache;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey {
    /// CA directory or issuer name.
    pub issuer: String,
    /// Account email or other identity.
    pub identity: String,
}

impl AccountKey {
    pub fn new(issuer: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            identity: identity.into(),
        }
    }
}

/// Why a fetch produced no entry. Neither case is stored.
#[derive(Debug)]
enum Miss {
    NotFound,
    Failed(DeployError),
}

pub struct AccountCache<V> {
    ttl: Duration,
    entries: Cache<AccountKey, V>,
}

impl<V> AccountCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or the result of `fetch`.
    ///
    /// Callers racing on one key wait for the first caller's fetch and reuse
    /// its value.
    pub async fn get_or_fetch<F, Fut>(&self, key: &AccountKey, fetch: F) -> Result<Option<V>, DeployError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, DeployError>>,
    {
        let loaded = self
            .entries
            .try_get_with(key.clone(), async move {
                match fetch().await {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(Miss::NotFound),
                    Err(e) => Err(Miss::Failed(e)),
                }
            })
            .await;

        match loaded {
            Ok(value) => Ok(Some(value)),
            Err(miss) => match miss.as_ref() {
                Miss::NotFound => Ok(None),
                Miss::Failed(e) => Err(e.clone()),
            },
        }
    }

    /// Drop the entry for `key`; the next lookup fetches again.
    pub async fn invalidate(&self, key: &AccountKey) {
        self.entries.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Live entries. Misses never occupy a slot.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
