//! `ObjectStore` over the Kubernetes API, one typed `Api<K>` per kind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use insight_domain::{
    ManagedObject, ObjectKey, ObjectKind, ObservabilityStack, ObservabilityStackStatus, StackRef,
    label_selector,
};
use insight_ports::{ObjectStore, StoreError};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};

/// Binds `$api` to the typed API for `$kind` and `$wrap` to the matching
/// `ManagedObject` constructor, then evaluates `$call`.
macro_rules! by_kind {
    ($store:expr, $kind:expr, $namespace:expr, |$api:ident, $wrap:ident| $call:expr) => {
        match $kind {
            ObjectKind::ServiceAccount => {
                let $api: Api<ServiceAccount> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::ServiceAccount;
                $call
            }
            ObjectKind::ClusterRole => {
                let $api: Api<ClusterRole> = $store.cluster();
                #[allow(unused_variables)]
                let $wrap = ManagedObject::ClusterRole;
                $call
            }
            ObjectKind::ClusterRoleBinding => {
                let $api: Api<ClusterRoleBinding> = $store.cluster();
                #[allow(unused_variables)]
                let $wrap = ManagedObject::ClusterRoleBinding;
                $call
            }
            ObjectKind::ConfigMap => {
                let $api: Api<ConfigMap> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::ConfigMap;
                $call
            }
            ObjectKind::StatefulSet => {
                let $api: Api<StatefulSet> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::StatefulSet;
                $call
            }
            ObjectKind::Deployment => {
                let $api: Api<Deployment> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::Deployment;
                $call
            }
            ObjectKind::DaemonSet => {
                let $api: Api<DaemonSet> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::DaemonSet;
                $call
            }
            ObjectKind::Service => {
                let $api: Api<Service> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::Service;
                $call
            }
            ObjectKind::PersistentVolumeClaim => {
                let $api: Api<PersistentVolumeClaim> = $store.namespaced($namespace);
                #[allow(unused_variables)]
                let $wrap = ManagedObject::PersistentVolumeClaim;
                $call
            }
        }
    };
}

/// Same as `by_kind!`, but also binds `$inner` to the typed object held by
/// `$object`.
macro_rules! by_object {
    ($store:expr, $object:expr, |$api:ident, $inner:ident, $wrap:ident| $call:expr) => {{
        let namespace = $object.metadata().namespace.as_deref();
        match $object {
            ManagedObject::ServiceAccount($inner) => {
                let $api: Api<ServiceAccount> = $store.namespaced(namespace);
                let $wrap = ManagedObject::ServiceAccount;
                $call
            }
            ManagedObject::ClusterRole($inner) => {
                let $api: Api<ClusterRole> = $store.cluster();
                let $wrap = ManagedObject::ClusterRole;
                $call
            }
            ManagedObject::ClusterRoleBinding($inner) => {
                let $api: Api<ClusterRoleBinding> = $store.cluster();
                let $wrap = ManagedObject::ClusterRoleBinding;
                $call
            }
            ManagedObject::ConfigMap($inner) => {
                let $api: Api<ConfigMap> = $store.namespaced(namespace);
                let $wrap = ManagedObject::ConfigMap;
                $call
            }
            ManagedObject::StatefulSet($inner) => {
                let $api: Api<StatefulSet> = $store.namespaced(namespace);
                let $wrap = ManagedObject::StatefulSet;
                $call
            }
            ManagedObject::Deployment($inner) => {
                let $api: Api<Deployment> = $store.namespaced(namespace);
                let $wrap = ManagedObject::Deployment;
                $call
            }
            ManagedObject::DaemonSet($inner) => {
                let $api: Api<DaemonSet> = $store.namespaced(namespace);
                let $wrap = ManagedObject::DaemonSet;
                $call
            }
            ManagedObject::Service($inner) => {
                let $api: Api<Service> = $store.namespaced(namespace);
                let $wrap = ManagedObject::Service;
                $call
            }
            ManagedObject::PersistentVolumeClaim($inner) => {
                let $api: Api<PersistentVolumeClaim> = $store.namespaced(namespace);
                let $wrap = ManagedObject::PersistentVolumeClaim;
                $call
            }
        }
    }};
}

#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Namespaced API, or the all-namespaces API when no namespace is given.
    fn namespaced<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    fn stacks(&self, stack: &StackRef) -> Api<ObservabilityStack> {
        Api::namespaced(self.client.clone(), stack.namespace())
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_stack(&self, stack: &StackRef) -> Result<Option<ObservabilityStack>, StoreError> {
        self.stacks(stack)
            .get_opt(stack.name())
            .await
            .map_err(|err| store_error("ObservabilityStack", stack, err))
    }

    async fn update_stack_status(
        &self,
        stack: &StackRef,
        status: &ObservabilityStackStatus,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.stacks(stack)
            .patch_status(stack.name(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|err| store_error("ObservabilityStack", stack, err))
    }

    async fn get(
        &self,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, StoreError> {
        by_kind!(self, kind, key.namespace.as_deref(), |api, wrap| api
            .get_opt(&key.name)
            .await
            .map(|found| found.map(wrap))
            .map_err(|err| store_error(kind, key, err)))
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
        let (kind, key) = (object.kind(), object.key());
        let params = PostParams::default();
        by_object!(self, object, |api, inner, wrap| api
            .create(&params, inner)
            .await
            .map(wrap)
            .map_err(|err| store_error(kind, &key, err)))
    }

    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
        let (kind, key) = (object.kind(), object.key());
        let params = PostParams::default();
        by_object!(self, object, |api, inner, wrap| api
            .replace(&key.name, &params, inner)
            .await
            .map(wrap)
            .map_err(|err| store_error(kind, &key, err)))
    }

    async fn delete(&self, kind: ObjectKind, key: &ObjectKey) -> Result<(), StoreError> {
        let params = DeleteParams::background();
        by_kind!(self, kind, key.namespace.as_deref(), |api, wrap| api
            .delete(&key.name, &params)
            .await
            .map(|_| ())
            .map_err(|err| store_error(kind, key, err)))
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, StoreError> {
        let params = ListParams::default().labels(&label_selector(labels));
        let scope = namespace.unwrap_or("*");
        by_kind!(self, kind, namespace, |api, wrap| api
            .list(&params)
            .await
            .map(|list| list.items.into_iter().map(wrap).collect())
            .map_err(|err| store_error(kind, scope, err)))
    }
}

fn store_error(kind: impl ToString, key: impl ToString, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) => {
            classify(kind, key, response.code, &response.reason, response.message.clone())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Maps an API status onto the store error kinds the core distinguishes.
fn classify(
    kind: impl ToString,
    key: impl ToString,
    code: u16,
    reason: &str,
    message: String,
) -> StoreError {
    match code {
        404 => StoreError::not_found(kind, key),
        409 if reason == "AlreadyExists" => StoreError::already_exists(kind, key),
        409 => StoreError::conflict(kind, key, message),
        403 => StoreError::Forbidden(message),
        400 | 422 => StoreError::Invalid(message),
        _ => StoreError::Backend(format!("{code} {reason}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        let key = ObjectKey::namespaced("monitoring", "obs1-logstore");
        let kind = ObjectKind::StatefulSet;

        assert!(classify(kind, &key, 404, "NotFound", String::new()).is_not_found());
        assert_eq!(
            classify(kind, &key, 409, "AlreadyExists", String::new()),
            StoreError::already_exists(kind, &key)
        );
        let stale = classify(kind, &key, 409, "Conflict", "modified".to_string());
        assert!(matches!(stale, StoreError::Conflict { .. }));
        assert!(stale.is_conflict());
        assert_eq!(
            classify(kind, &key, 403, "Forbidden", "denied".to_string()),
            StoreError::Forbidden("denied".to_string())
        );
        assert!(matches!(
            classify(kind, &key, 422, "Invalid", "bad".to_string()),
            StoreError::Invalid(_)
        ));
        assert!(matches!(
            classify(kind, &key, 500, "InternalError", "boom".to_string()),
            StoreError::Backend(message) if message.contains("boom")
        ));
    }
}
