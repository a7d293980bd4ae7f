//! Owner links from child objects back to their stack.

use anyhow::{Result, anyhow};
use insight_domain::{ManagedObject, ObservabilityStack};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

/// Controller reference to `stack`. Fails when the stack has not been
/// persisted yet, since a reference without a uid would never match.
pub fn owner_reference(stack: &ObservabilityStack) -> Result<OwnerReference> {
    let owner = stack
        .controller_owner_ref(&())
        .ok_or_else(|| anyhow!("stack has no name or uid; cannot own children"))?;
    if owner.uid.is_empty() {
        return Err(anyhow!("stack {} has an empty uid", owner.name));
    }
    Ok(owner)
}

/// Marks `object` as controlled by `owner`, leaving other owners intact.
pub fn bind(object: &mut ManagedObject, owner: &OwnerReference) {
    object.set_owner(owner.clone());
}
