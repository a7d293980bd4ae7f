//! Reconciliation of observability stacks against an object store.

pub mod components;
pub mod dispatcher;
pub mod engine;
pub mod manifests;
pub mod ownership;
pub mod prune;
pub mod status;

pub use components::ComponentReport;
pub use dispatcher::{PassOutcome, PassReport, StackReconciler};
pub use engine::{ConvergeOutcome, Converger};
pub use manifests::{BuildContext, ComponentPlan, build_plan};
pub use status::StatusReporter;
