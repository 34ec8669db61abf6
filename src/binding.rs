//! Read-modify-write rebinding of a single resource.
//!
//! Order matters: describe, then extensions that still point at the old
//! certificate, then the parent. Extension updates always land first.

use crate::backend::BindingUpdater;
use crate::call::bounded;
use crate::error::DeployError;
use crate::types::ResourceDescriptor;
use std::time::Duration;
use tracing::debug;

/// What a successful rebind did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebindAck {
    /// Parent updated, plus `extensions` nested overrides before it.
    Updated { extensions: usize },
    /// Already pointing at the new certificate; nothing sent.
    AlreadyBound,
}

/// Repoint `resource_id` at `new_cert_id`.
pub async fn rebind<U: BindingUpdater + ?Sized>(
    updater: &U,
    resource_id: &str,
    new_cert_id: &str,
    call_timeout: Duration,
) -> Result<RebindAck, DeployError> {
    let resource = bounded("describe", call_timeout, updater.describe(resource_id)).await?;

    if bounded("carries", call_timeout, updater.carries(&resource, new_cert_id)).await? {
        debug!(resource = resource_id, cert_id = new_cert_id, "already bound");
        return Ok(RebindAck::AlreadyBound);
    }

    let stale = stale_extensions(updater, &resource, call_timeout).await?;
    for extension in &stale {
        bounded(
            "update_extension",
            call_timeout,
            updater.update_extension(&resource, extension, new_cert_id),
        )
        .await?;
        debug!(resource = resource_id, extension = %extension.id, "extension rebound");
    }

    bounded("update", call_timeout, updater.update(&resource, new_cert_id)).await?;

    Ok(RebindAck::Updated {
        extensions: stale.len(),
    })
}

/// Extensions sharing the parent's previous certificate. A parent without a
/// certificate has nothing to inherit, so nothing is stale.
async fn stale_extensions<U: BindingUpdater + ?Sized>(
    updater: &U,
    parent: &ResourceDescriptor,
    call_timeout: Duration,
) -> Result<Vec<ResourceDescriptor>, DeployError> {
    let Some(previous) = parent.current_cert_id.as_deref() else {
        return Ok(Vec::new());
    };

    let extensions = bounded(
        "list_extensions",
        call_timeout,
        updater.list_extensions(parent),
    )
    .await?;

    Ok(extensions
        .into_iter()
        .filter(|ext| ext.current_cert_id.as_deref() == Some(previous))
        .collect())
}
