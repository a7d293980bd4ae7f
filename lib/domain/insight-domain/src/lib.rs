//! Domain models and invariants for observability stacks.

pub mod component;
pub mod condition;
pub mod config;
pub mod error;
pub mod labels;
pub mod naming;
pub mod objects;
pub mod quantity;
pub mod stack;

pub use component::Component;
pub use condition::{
    ConditionStatus, READY_CONDITION, StackCondition, StackPhase, next_transition_time,
    upsert_condition,
};
pub use config::{ImageSet, OperatorConfig};
pub use error::DomainError;
pub use labels::{
    COMPONENT_LABEL, INSTANCE_LABEL, MANAGED_BY, MANAGED_BY_LABEL, label_selector,
};
pub use naming::StackRef;
pub use objects::{ManagedObject, ObjectKey, ObjectKind};
pub use quantity::parse_quantity;
pub use stack::{
    DashboardServiceSpec, DataSourceKind, ExtraDataSource, LogCollectorSpec, LogStoreSpec,
    MetricsStoreSpec, NodeToleration, ObservabilityStack, ObservabilityStackSpec,
    ObservabilityStackStatus, ResourceSpec, ServiceExposureMode, TraceStoreSpec,
};
