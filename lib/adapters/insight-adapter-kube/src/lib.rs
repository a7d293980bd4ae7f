//! Kubernetes adapters: the API-backed object store and the controller loop.

pub mod controller;
pub mod store;

pub use controller::{ControllerError, run};
pub use store::KubeObjectStore;
