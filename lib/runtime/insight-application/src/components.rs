//! The step sequence every component goes through in a pass.

use anyhow::{Context, Result};
use insight_domain::{Component, ObservabilityStackSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::engine::{ConvergeOutcome, Converger};
use crate::manifests::{BuildContext, ComponentPlan, build_plan};
use crate::ownership;

/// Counts of what one component's convergence did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentReport {
    pub created: usize,
    pub replaced: usize,
    pub retained: usize,
}

impl ComponentReport {
    fn record(&mut self, outcome: ConvergeOutcome) {
        match outcome {
            ConvergeOutcome::Created => self.created += 1,
            ConvergeOutcome::Replaced => self.replaced += 1,
            ConvergeOutcome::Retained => self.retained += 1,
        }
    }
}

/// Builds the whole plan before touching the store, so malformed input
/// fails the component without any partial writes.
pub async fn reconcile_component(
    converger: &Converger,
    component: Component,
    spec: &ObservabilityStackSpec,
    ctx: &BuildContext<'_>,
    owner: &OwnerReference,
) -> Result<ComponentReport> {
    let plan = build_plan(component, spec, ctx)
        .with_context(|| format!("invalid {component} settings"))?;
    converge_plan(converger, plan, owner).await
}

pub async fn converge_plan(
    converger: &Converger,
    plan: ComponentPlan,
    owner: &OwnerReference,
) -> Result<ComponentReport> {
    let component = plan.component;
    let mut report = ComponentReport::default();
    for mut object in plan.into_objects() {
        ownership::bind(&mut object, owner);
        let outcome = converger
            .converge(&object)
            .await
            .with_context(|| format!("component {component}"))?;
        report.record(outcome);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_domain::{ImageSet, ObjectKind, StackRef};
    use insight_ports::{InMemoryObjectStore, StoreError, WriteOp};
    use std::sync::Arc;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "monitoring.example.com/v1alpha1".to_string(),
            kind: "ObservabilityStack".to_string(),
            name: "obs1".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[tokio::test]
    async fn test_objects_are_written_in_dependency_order() {
        let store = InMemoryObjectStore::new();
        let converger = Converger::new(Arc::new(store.clone()), 3);
        let stack = StackRef::new("monitoring", "obs1");
        let images = ImageSet::default();
        let ctx = BuildContext::new(&stack, &images);
        let mut spec = ObservabilityStackSpec::default();
        spec.log_collector.enabled = true;

        let report = reconcile_component(&converger, Component::LogCollector, &spec, &ctx, &owner())
            .await
            .unwrap();

        assert_eq!(report.created, 6);
        let order: Vec<ObjectKind> = store.writes().iter().map(|w| w.kind).collect();
        assert_eq!(
            order,
            vec![
                ObjectKind::ServiceAccount,
                ObjectKind::ClusterRole,
                ObjectKind::ClusterRoleBinding,
                ObjectKind::ConfigMap,
                ObjectKind::DaemonSet,
                ObjectKind::Service,
            ]
        );
        assert!(store.objects().iter().all(|o| o.is_owned_by("uid-1")));
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_component() {
        let store = InMemoryObjectStore::new();
        let converger = Converger::new(Arc::new(store.clone()), 3);
        let stack = StackRef::new("monitoring", "obs1");
        let images = ImageSet::default();
        let ctx = BuildContext::new(&stack, &images);
        store.fail_on(
            WriteOp::Create,
            ObjectKind::ConfigMap,
            "obs1-logstore-config",
            StoreError::Forbidden("configmaps is forbidden".to_string()),
            1,
        );

        let err = reconcile_component(
            &converger,
            Component::LogStore,
            &ObservabilityStackSpec::default(),
            &ctx,
            &owner(),
        )
        .await
        .unwrap_err();

        assert!(format!("{err:#}").contains("component logstore"));
        assert!(store.writes().is_empty());
    }
}
