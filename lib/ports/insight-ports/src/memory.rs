use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use insight_domain::{
    ManagedObject, ObjectKey, ObjectKind, ObservabilityStack, ObservabilityStackStatus, StackRef,
};

use crate::{ObjectStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Replace,
    Delete,
}

/// A write that changed stored state. No-op replaces are not recorded, the
/// same way the API server does not bump versions for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub kind: ObjectKind,
    pub key: ObjectKey,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    op: WriteOp,
    kind: ObjectKind,
    name: String,
    error: StoreError,
    remaining: usize,
}

#[derive(Debug, Default)]
struct State {
    stacks: BTreeMap<(String, String), ObservabilityStack>,
    objects: BTreeMap<(ObjectKind, ObjectKey), ManagedObject>,
    next_version: u64,
    writes: Vec<WriteRecord>,
    status_writes: usize,
    failures: Vec<InjectedFailure>,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version = self.next_version.saturating_add(1);
        self.next_version.to_string()
    }

    fn take_failure(&mut self, op: WriteOp, kind: ObjectKind, name: &str) -> Option<StoreError> {
        let failure = self
            .failures
            .iter_mut()
            .find(|f| f.op == op && f.kind == kind && f.name == name && f.remaining > 0)?;
        failure.remaining -= 1;
        Some(failure.error.clone())
    }
}

/// Object store double with optimistic versioning and failure injection.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    /// Stores a stack, assigning a uid and generation when missing.
    pub fn insert_stack(&self, mut stack: ObservabilityStack) {
        let namespace = stack.metadata.namespace.clone().unwrap_or_default();
        let name = stack.metadata.name.clone().unwrap_or_default();
        stack
            .metadata
            .uid
            .get_or_insert_with(|| format!("uid-{namespace}-{name}"));
        stack.metadata.generation.get_or_insert(1);
        if let Ok(mut state) = self.state() {
            state.stacks.insert((namespace, name), stack);
        }
    }

    pub fn remove_stack(&self, stack: &StackRef) {
        if let Ok(mut state) = self.state() {
            state
                .stacks
                .remove(&(stack.namespace().to_string(), stack.name().to_string()));
        }
    }

    pub fn stack(&self, stack: &StackRef) -> Option<ObservabilityStack> {
        self.state().ok().and_then(|state| {
            state
                .stacks
                .get(&(stack.namespace().to_string(), stack.name().to_string()))
                .cloned()
        })
    }

    /// Places an object directly, bypassing the write log.
    pub fn seed(&self, mut object: ManagedObject) {
        if let Ok(mut state) = self.state() {
            let version = state.bump_version();
            object.set_resource_version(Some(version));
            state.objects.insert((object.kind(), object.key()), object);
        }
    }

    /// Fails the next `times` matching writes with `error`.
    pub fn fail_on(
        &self,
        op: WriteOp,
        kind: ObjectKind,
        name: impl Into<String>,
        error: StoreError,
        times: usize,
    ) {
        if let Ok(mut state) = self.state() {
            state.failures.push(InjectedFailure {
                op,
                kind,
                name: name.into(),
                error,
                remaining: times,
            });
        }
    }

    pub fn object(&self, kind: ObjectKind, key: &ObjectKey) -> Option<ManagedObject> {
        self.state()
            .ok()
            .and_then(|state| state.objects.get(&(kind, key.clone())).cloned())
    }

    pub fn objects(&self) -> Vec<ManagedObject> {
        self.state()
            .map(|state| state.objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state()
            .map(|state| state.writes.clone())
            .unwrap_or_default()
    }

    pub fn clear_writes(&self) {
        if let Ok(mut state) = self.state() {
            state.writes.clear();
            state.status_writes = 0;
        }
    }

    pub fn status_writes(&self) -> usize {
        self.state().map(|state| state.status_writes).unwrap_or_default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_stack(&self, stack: &StackRef) -> Result<Option<ObservabilityStack>, StoreError> {
        let state = self.state()?;
        Ok(state
            .stacks
            .get(&(stack.namespace().to_string(), stack.name().to_string()))
            .cloned())
    }

    async fn update_stack_status(
        &self,
        stack: &StackRef,
        status: &ObservabilityStackStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let key = (stack.namespace().to_string(), stack.name().to_string());
        let stored = state
            .stacks
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found("ObservabilityStack", stack))?;
        stored.status = Some(status.clone());
        state.status_writes += 1;
        Ok(())
    }

    async fn get(
        &self,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, StoreError> {
        let state = self.state()?;
        Ok(state.objects.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
        let mut state = self.state()?;
        let (kind, key) = (object.kind(), object.key());
        if let Some(error) = state.take_failure(WriteOp::Create, kind, &key.name) {
            return Err(error);
        }
        if state.objects.contains_key(&(kind, key.clone())) {
            return Err(StoreError::already_exists(kind, &key));
        }
        let mut stored = object.clone();
        let version = state.bump_version();
        stored.set_resource_version(Some(version));
        state.objects.insert((kind, key.clone()), stored.clone());
        state.writes.push(WriteRecord {
            op: WriteOp::Create,
            kind,
            key,
        });
        Ok(stored)
    }

    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError> {
        let mut state = self.state()?;
        let (kind, key) = (object.kind(), object.key());
        if let Some(error) = state.take_failure(WriteOp::Replace, kind, &key.name) {
            return Err(error);
        }
        let live = state
            .objects
            .get(&(kind, key.clone()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(kind, &key))?;
        if object.resource_version() != live.resource_version() {
            return Err(StoreError::conflict(
                kind,
                &key,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }
        if object.same_content(&live) {
            return Ok(live);
        }
        let mut stored = object.clone();
        let version = state.bump_version();
        stored.set_resource_version(Some(version));
        state.objects.insert((kind, key.clone()), stored.clone());
        state.writes.push(WriteRecord {
            op: WriteOp::Replace,
            kind,
            key,
        });
        Ok(stored)
    }

    async fn delete(&self, kind: ObjectKind, key: &ObjectKey) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if let Some(error) = state.take_failure(WriteOp::Delete, kind, &key.name) {
            return Err(error);
        }
        state
            .objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| StoreError::not_found(kind, key))?;
        state.writes.push(WriteRecord {
            op: WriteOp::Delete,
            kind,
            key: key.clone(),
        });
        Ok(())
    }

    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, StoreError> {
        let state = self.state()?;
        Ok(state
            .objects
            .iter()
            .filter(|((stored_kind, key), _)| {
                *stored_kind == kind
                    && (kind.is_cluster_scoped() || namespace.is_none()
                        || key.namespace.as_deref() == namespace)
            })
            .filter(|(_, object)| {
                let stored = object.metadata().labels.as_ref();
                labels
                    .iter()
                    .all(|(k, v)| stored.and_then(|l| l.get(k)) == Some(v))
            })
            .map(|(_, object)| object.clone())
            .collect())
    }
}
