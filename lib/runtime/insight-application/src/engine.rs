//! Create-or-replace convergence of one desired object at a time.

use std::sync::Arc;

use anyhow::{Context, Result};
use insight_domain::ManagedObject;
use insight_ports::{ObjectStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergeOutcome {
    Created,
    Replaced,
    /// An existing storage claim; claims are never rewritten.
    Retained,
}

pub struct Converger {
    store: Arc<dyn ObjectStore>,
    max_attempts: u32,
}

impl Converger {
    pub fn new(store: Arc<dyn ObjectStore>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Makes the stored object match `desired`. Lost races against other
    /// writers re-read the live object and retry, up to the attempt bound.
    pub async fn converge(&self, desired: &ManagedObject) -> Result<ConvergeOutcome> {
        let kind = desired.kind();
        let key = desired.key();
        let mut attempt = 1;
        loop {
            match self.try_converge(desired).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_conflict() && attempt < self.max_attempts => {
                    tracing::warn!(
                        kind = %kind,
                        name = %key,
                        attempt,
                        error = %err,
                        "write conflict, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to converge {kind} {key} after {attempt} attempt(s)")
                    });
                }
            }
        }
    }

    async fn try_converge(&self, desired: &ManagedObject) -> Result<ConvergeOutcome, StoreError> {
        let kind = desired.kind();
        let key = desired.key();

        let Some(live) = self.store.get(kind, &key).await? else {
            self.store.create(desired).await?;
            tracing::info!(kind = %kind, name = %key, "created");
            return Ok(ConvergeOutcome::Created);
        };

        if live.is_claim() {
            tracing::debug!(kind = %kind, name = %key, "claim exists, retained");
            return Ok(ConvergeOutcome::Retained);
        }

        let mut next = desired.clone();
        next.preserve_immutable_fields(&live);
        next.preserve_foreign_metadata(&live);
        next.set_resource_version(live.resource_version().map(str::to_string));
        let stored = self.store.replace(&next).await?;
        if stored.resource_version() == live.resource_version() {
            tracing::debug!(kind = %kind, name = %key, "unchanged");
        } else {
            tracing::info!(kind = %kind, name = %key, "replaced");
        }
        Ok(ConvergeOutcome::Replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insight_domain::{
        ObjectKey, ObjectKind, ObservabilityStack, ObservabilityStackStatus, StackRef,
    };
    use insight_ports::{InMemoryObjectStore, WriteOp};
    use k8s_openapi::api::core::v1::{
        ConfigMap, PersistentVolumeClaim, PersistentVolumeClaimSpec, Service, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("monitoring".to_string()),
            ..Default::default()
        }
    }

    fn config(name: &str, value: &str) -> ManagedObject {
        ManagedObject::ConfigMap(ConfigMap {
            metadata: meta(name),
            data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
            ..Default::default()
        })
    }

    fn setup(retries: u32) -> (InMemoryObjectStore, Converger) {
        let store = InMemoryObjectStore::new();
        let converger = Converger::new(Arc::new(store.clone()), retries);
        (store, converger)
    }

    fn stored_value(store: &InMemoryObjectStore, name: &str) -> Option<String> {
        match store.object(ObjectKind::ConfigMap, &ObjectKey::namespaced("monitoring", name)) {
            Some(ManagedObject::ConfigMap(cm)) => cm.data.and_then(|d| d.get("key").cloned()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_absent_object_is_created() {
        let (store, converger) = setup(3);
        let outcome = converger.converge(&config("cm", "a")).await.unwrap();

        assert_eq!(outcome, ConvergeOutcome::Created);
        assert_eq!(stored_value(&store, "cm").as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_present_object_is_overwritten() {
        let (store, converger) = setup(3);
        store.seed(config("cm", "old"));

        let outcome = converger.converge(&config("cm", "new")).await.unwrap();
        assert_eq!(outcome, ConvergeOutcome::Replaced);
        assert_eq!(stored_value(&store, "cm").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_identical_object_writes_nothing() {
        let (store, converger) = setup(3);
        converger.converge(&config("cm", "a")).await.unwrap();
        store.clear_writes();

        converger.converge(&config("cm", "a")).await.unwrap();
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_existing_claim_is_retained() {
        let (store, converger) = setup(3);
        let claim = |class: &str| {
            ManagedObject::PersistentVolumeClaim(PersistentVolumeClaim {
                metadata: meta("data"),
                spec: Some(PersistentVolumeClaimSpec {
                    storage_class_name: Some(class.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            })
        };
        store.seed(claim("fast"));

        let outcome = converger.converge(&claim("slow")).await.unwrap();
        assert_eq!(outcome, ConvergeOutcome::Retained);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_service_keeps_allocated_address() {
        let (store, converger) = setup(3);
        let service = |ip: Option<&str>, port: i32| {
            ManagedObject::Service(Service {
                metadata: meta("svc"),
                spec: Some(ServiceSpec {
                    cluster_ip: ip.map(str::to_string),
                    ports: Some(vec![k8s_openapi::api::core::v1::ServicePort {
                        port,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            })
        };
        store.seed(service(Some("10.0.0.7"), 80));

        converger.converge(&service(None, 8080)).await.unwrap();
        let Some(ManagedObject::Service(live)) =
            store.object(ObjectKind::Service, &ObjectKey::namespaced("monitoring", "svc"))
        else {
            panic!("service missing");
        };
        let spec = live.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(spec.ports.unwrap()[0].port, 8080);
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let (store, converger) = setup(3);
        store.seed(config("cm", "old"));
        store.fail_on(
            WriteOp::Replace,
            ObjectKind::ConfigMap,
            "cm",
            StoreError::conflict("ConfigMap", "monitoring/cm", "stale"),
            2,
        );

        let outcome = converger.converge(&config("cm", "new")).await.unwrap();
        assert_eq!(outcome, ConvergeOutcome::Replaced);
        assert_eq!(stored_value(&store, "cm").as_deref(), Some("new"));
    }

    /// Lets a rival writer win the first create: the rival's object lands in
    /// the store and the create reports that it already exists.
    struct RacingStore {
        inner: InMemoryObjectStore,
        rival: Mutex<Option<ManagedObject>>,
    }

    #[async_trait]
    impl ObjectStore for RacingStore {
        async fn get_stack(
            &self,
            stack: &StackRef,
        ) -> Result<Option<ObservabilityStack>, StoreError> {
            self.inner.get_stack(stack).await
        }

        async fn update_stack_status(
            &self,
            stack: &StackRef,
            status: &ObservabilityStackStatus,
        ) -> Result<(), StoreError> {
            self.inner.update_stack_status(stack, status).await
        }

        async fn get(
            &self,
            kind: ObjectKind,
            key: &ObjectKey,
        ) -> Result<Option<ManagedObject>, StoreError> {
            self.inner.get(kind, key).await
        }

        async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
            let rival = self.rival.lock().ok().and_then(|mut rival| rival.take());
            if let Some(rival) = rival {
                self.inner.create(&rival).await?;
                return Err(StoreError::already_exists(object.kind(), object.key()));
            }
            self.inner.create(object).await
        }

        async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
            self.inner.replace(object).await
        }

        async fn delete(&self, kind: ObjectKind, key: &ObjectKey) -> Result<(), StoreError> {
            self.inner.delete(kind, key).await
        }

        async fn list(
            &self,
            kind: ObjectKind,
            namespace: Option<&str>,
            labels: &BTreeMap<String, String>,
        ) -> Result<Vec<ManagedObject>, StoreError> {
            self.inner.list(kind, namespace, labels).await
        }
    }

    #[tokio::test]
    async fn test_create_race_falls_back_to_replace() {
        let inner = InMemoryObjectStore::new();
        let racing = RacingStore {
            inner: inner.clone(),
            rival: Mutex::new(Some(config("cm", "rival"))),
        };
        let converger = Converger::new(Arc::new(racing), 3);

        let outcome = converger.converge(&config("cm", "ours")).await.unwrap();

        assert_eq!(outcome, ConvergeOutcome::Replaced);
        assert_eq!(stored_value(&inner, "cm").as_deref(), Some("ours"));
        let ops: Vec<WriteOp> = inner.writes().iter().map(|w| w.op).collect();
        assert_eq!(ops, vec![WriteOp::Create, WriteOp::Replace]);
    }

    #[tokio::test]
    async fn test_conflict_retries_are_bounded() {
        let (store, converger) = setup(3);
        store.seed(config("cm", "old"));
        store.fail_on(
            WriteOp::Replace,
            ObjectKind::ConfigMap,
            "cm",
            StoreError::conflict("ConfigMap", "monitoring/cm", "stale"),
            10,
        );

        let err = converger.converge(&config("cm", "new")).await.unwrap_err();
        let store_err = err.downcast_ref::<StoreError>().unwrap();
        assert!(store_err.is_conflict());
        assert!(format!("{err:#}").contains("after 3 attempt(s)"));
        assert_eq!(stored_value(&store, "cm").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let (store, converger) = setup(5);
        store.fail_on(
            WriteOp::Create,
            ObjectKind::ConfigMap,
            "cm",
            StoreError::Forbidden("denied".to_string()),
            1,
        );

        let err = converger.converge(&config("cm", "a")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Forbidden(_))
        ));
    }
}
