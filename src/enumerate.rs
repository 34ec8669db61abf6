//! Resource discovery on top of [`ResourceEnumerator`].
//!
//! Two modes: paginated listener listing under a load balancer, and
//! certificate-driven domain discovery for wildcard selectors.

use crate::backend::ResourceEnumerator;
use crate::call::bounded;
use crate::error::DeployError;
use crate::types::{PageRequest, ResourceDescriptor};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::debug;

/// Result of certificate-driven discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainDiscovery {
    pub bindable: Vec<String>,
    pub bound: Vec<String>,
    /// `bindable \ bound`, in bindable order.
    pub pending: Vec<String>,
}

/// Drives an enumerator with a fixed page size and call budget.
pub struct Enumerator<'a, E: ResourceEnumerator + ?Sized> {
    provider: &'a E,
    page_size: u32,
    call_timeout: Duration,
}

impl<'a, E: ResourceEnumerator + ?Sized> Enumerator<'a, E> {
    pub fn new(provider: &'a E, page_size: u32, call_timeout: Duration) -> Self {
        Self {
            provider,
            page_size,
            call_timeout,
        }
    }

    /// Every resource under `scope_id`, one full listing per protocol,
    /// concatenated in protocol order. Duplicates are kept.
    pub async fn list(
        &self,
        scope_id: &str,
        protocols: &BTreeSet<String>,
    ) -> Result<Vec<ResourceDescriptor>, DeployError> {
        let mut resources = Vec::new();
        for protocol in protocols {
            let listed = self.list_protocol(scope_id, protocol).await?;
            debug!(scope = scope_id, protocol = %protocol, count = listed.len(), "listed resources");
            resources.extend(listed);
        }
        Ok(resources)
    }

    /// Page through one protocol until an empty page or a missing token.
    pub async fn list_protocol(
        &self,
        scope_id: &str,
        protocol: &str,
    ) -> Result<Vec<ResourceDescriptor>, DeployError> {
        let mut resources = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = bounded(
                "list_page",
                self.call_timeout,
                self.provider.list_page(
                    scope_id,
                    protocol,
                    PageRequest {
                        token: token.clone(),
                        size: self.page_size,
                    },
                ),
            )
            .await
            .map_err(DeployError::into_enumeration)?;

            if page.items.is_empty() {
                break;
            }
            resources.extend(page.items);

            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        Ok(resources)
    }

    /// Log-only description of the scope. Errors abort enumeration.
    pub async fn describe_scope(
        &self,
        scope_id: &str,
    ) -> Result<Option<serde_json::Value>, DeployError> {
        bounded(
            "describe_scope",
            self.call_timeout,
            self.provider.describe_scope(scope_id),
        )
        .await
        .map_err(DeployError::into_enumeration)
    }

    /// Domains that can take `cert_id` but don't carry it yet.
    pub async fn discover_domains(&self, cert_id: &str) -> Result<DomainDiscovery, DeployError> {
        let bindable = bounded(
            "bindable_domains",
            self.call_timeout,
            self.provider.bindable_domains(cert_id),
        )
        .await
        .map_err(DeployError::into_enumeration)?;

        let bound = bounded(
            "bound_domains",
            self.call_timeout,
            self.provider.bound_domains(cert_id),
        )
        .await
        .map_err(DeployError::into_enumeration)?;

        let pending = difference(&bindable, &bound);
        Ok(DomainDiscovery {
            bindable,
            bound,
            pending,
        })
    }
}

/// `left \ right`, keeping `left`'s order and dropping repeats.
pub fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let exclude: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|d| !exclude.contains(d.as_str()) && seen.insert(d.as_str()))
        .cloned()
        .collect()
}

/// `*.example.com` -> `example.com`. Anything else is returned as-is.
pub fn strip_leading_wildcard(pattern: &str) -> &str {
    pattern.strip_prefix("*.").unwrap_or(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Page;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hands out fixed-size pages and records every token it was asked for.
    struct PagedLister {
        sizes: Vec<usize>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl ResourceEnumerator for PagedLister {
        async fn list_page(
            &self,
            _scope_id: &str,
            protocol: &str,
            page: PageRequest,
        ) -> Result<Page<ResourceDescriptor>, DeployError> {
            let index: usize = page.token.as_deref().map_or(0, |t| t.parse().unwrap());
            self.calls
                .lock()
                .unwrap()
                .push((protocol.to_string(), page.token.clone()));

            let size = self.sizes.get(index).copied().unwrap_or(0);
            let items = (0..size)
                .map(|i| ResourceDescriptor::new(format!("{}-{}-{}", protocol, index, i), protocol))
                .collect();
            let next_token = (index + 1 < self.sizes.len()).then(|| (index + 1).to_string());
            Ok(Page { items, next_token })
        }
    }

    fn protocols(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pagination_stops_without_token() {
        let lister = PagedLister {
            sizes: vec![100, 100, 37],
            calls: Mutex::new(Vec::new()),
        };
        let enumerator = Enumerator::new(&lister, 100, Duration::from_secs(5));

        let listed = enumerator.list("lb-1", &protocols(&["HTTPS"])).await.unwrap();
        assert_eq!(listed.len(), 237);

        let calls = lister.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[2].1.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let lister = PagedLister {
            sizes: vec![3, 0, 5],
            calls: Mutex::new(Vec::new()),
        };
        let enumerator = Enumerator::new(&lister, 100, Duration::from_secs(5));

        let listed = enumerator.list_protocol("lb-1", "HTTPS").await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(lister.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_protocols_are_unioned_in_order() {
        let lister = PagedLister {
            sizes: vec![2],
            calls: Mutex::new(Vec::new()),
        };
        let enumerator = Enumerator::new(&lister, 100, Duration::from_secs(5));

        let listed = enumerator
            .list("lb-1", &protocols(&["QUIC", "HTTPS"]))
            .await
            .unwrap();
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["HTTPS-0-0", "HTTPS-0-1", "QUIC-0-0", "QUIC-0-1"]);
    }

    #[test]
    fn test_difference_keeps_bindable_order() {
        let bindable = vec!["a".to_string(), "b".into(), "c".into(), "c".into()];
        let bound = vec!["b".to_string(), "a".into()];
        assert_eq!(difference(&bindable, &bound), vec!["c"]);
        assert!(difference(&bound, &bindable).is_empty());
    }

    #[test]
    fn test_strip_leading_wildcard() {
        assert_eq!(strip_leading_wildcard("*.example.com"), "example.com");
        assert_eq!(strip_leading_wildcard("example.com"), "example.com");
        assert_eq!(strip_leading_wildcard("*example.com"), "*example.com");
    }
}
