//! Opt-in removal of objects left behind by disabled components.

use anyhow::{Context, Result};
use insight_domain::{Component, ObjectKind, StackRef};
use insight_ports::ObjectStore;

/// Deletes everything labeled for `component` on this stack and owned by
/// `owner_uid`, except storage claims. Returns how many objects went away.
pub async fn prune_component(
    store: &dyn ObjectStore,
    stack: &StackRef,
    component: Component,
    owner_uid: &str,
) -> Result<usize> {
    let labels = stack.labels(component);
    let mut removed = 0;
    for kind in ObjectKind::ALL {
        if kind == ObjectKind::PersistentVolumeClaim {
            continue;
        }
        let objects = store
            .list(kind, Some(stack.namespace()), &labels)
            .await
            .with_context(|| format!("failed to list {kind} for {component}"))?;
        for object in objects.iter().filter(|o| o.is_owned_by(owner_uid)) {
            let key = object.key();
            match store.delete(kind, &key).await {
                Ok(()) => {
                    tracing::info!(
                        stack = %stack,
                        component = %component,
                        kind = %kind,
                        name = %key,
                        "pruned"
                    );
                    removed += 1;
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to prune {kind} {key}"));
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_domain::{ManagedObject, ObjectKey};
    use insight_ports::InMemoryObjectStore;
    use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn meta(stack: &StackRef, name: &str, component: Component, uid: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(stack.namespace().to_string()),
            labels: Some(stack.labels(component)),
            owner_references: Some(vec![OwnerReference {
                uid: uid.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prune_skips_claims_and_foreign_objects() {
        let store = InMemoryObjectStore::new();
        let stack = StackRef::new("monitoring", "obs1");
        let component = Component::Dashboard;
        store.seed(ManagedObject::ConfigMap(ConfigMap {
            metadata: meta(&stack, "obs1-dashboard-config", component, "uid-1"),
            ..Default::default()
        }));
        store.seed(ManagedObject::ConfigMap(ConfigMap {
            metadata: meta(&stack, "adopted", component, "someone-else"),
            ..Default::default()
        }));
        store.seed(ManagedObject::ConfigMap(ConfigMap {
            metadata: meta(&stack, "obs1-logstore-config", Component::LogStore, "uid-1"),
            ..Default::default()
        }));
        store.seed(ManagedObject::PersistentVolumeClaim(PersistentVolumeClaim {
            metadata: meta(&stack, "obs1-dashboard-storage", component, "uid-1"),
            ..Default::default()
        }));

        let removed = prune_component(&store, &stack, component, "uid-1").await.unwrap();

        assert_eq!(removed, 1);
        let key = |name: &str| ObjectKey::namespaced("monitoring", name);
        assert!(store.object(ObjectKind::ConfigMap, &key("obs1-dashboard-config")).is_none());
        assert!(store.object(ObjectKind::ConfigMap, &key("adopted")).is_some());
        assert!(store.object(ObjectKind::ConfigMap, &key("obs1-logstore-config")).is_some());
        assert!(
            store
                .object(ObjectKind::PersistentVolumeClaim, &key("obs1-dashboard-storage"))
                .is_some()
        );
    }
}
