//! Port traits the reconciliation core depends on, plus in-memory doubles.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use insight_domain::{
    ManagedObject, ObjectKey, ObjectKind, ObservabilityStack, ObservabilityStackStatus, StackRef,
};

pub mod memory;

pub use memory::{InMemoryObjectStore, WriteOp, WriteRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },
    #[error("conflict writing {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: String,
        message: String,
    },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: impl ToString, key: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(kind: impl ToString, key: impl ToString, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.to_string(),
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn already_exists(kind: impl ToString, key: impl ToString) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    /// Stale-version replaces and racing creates are both resolved by
    /// re-reading and applying again.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Typed access to the cluster object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_stack(&self, stack: &StackRef) -> Result<Option<ObservabilityStack>, StoreError>;

    async fn update_stack_status(
        &self,
        stack: &StackRef,
        status: &ObservabilityStackStatus,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        kind: ObjectKind,
        key: &ObjectKey,
    ) -> Result<Option<ManagedObject>, StoreError>;

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError>;

    /// Full replace; rejected with `Conflict` when the object's resource
    /// version is stale.
    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, StoreError>;

    async fn delete(&self, kind: ObjectKind, key: &ObjectKey) -> Result<(), StoreError>;

    /// Objects of `kind` carrying every label in `labels`. `namespace` is
    /// ignored for cluster-scoped kinds.
    async fn list(
        &self,
        kind: ObjectKind,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ManagedObject>, StoreError>;
}
