//! Pure builders from a stack spec to the objects each component needs.

mod common;
pub mod dashboard;
pub mod exporters;
pub mod log_collector;
pub mod log_store;
pub mod metrics_store;
pub mod trace_store;

use insight_domain::{
    Component, DomainError, ImageSet, ManagedObject, ObservabilityStackSpec, StackRef,
};

/// Naming and image inputs shared by every builder.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub stack: &'a StackRef,
    pub images: &'a ImageSet,
}

impl<'a> BuildContext<'a> {
    pub fn new(stack: &'a StackRef, images: &'a ImageSet) -> Self {
        Self { stack, images }
    }
}

/// The desired object graph of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPlan {
    pub component: Component,
    /// Service identity, permission grant and grant binding, when needed.
    pub rbac: Vec<ManagedObject>,
    pub config: Option<ManagedObject>,
    pub workload: ManagedObject,
    pub exposure: ManagedObject,
    /// Standalone claim; stores use claim templates on the workload instead.
    pub claim: Option<ManagedObject>,
}

impl ComponentPlan {
    /// Objects in convergence order: identity and configuration precede the
    /// workload that references them by name.
    pub fn objects(&self) -> impl Iterator<Item = &ManagedObject> {
        self.rbac
            .iter()
            .chain(self.config.iter())
            .chain(std::iter::once(&self.workload))
            .chain(std::iter::once(&self.exposure))
            .chain(self.claim.iter())
    }

    pub fn into_objects(self) -> Vec<ManagedObject> {
        let mut objects = self.rbac;
        objects.extend(self.config);
        objects.push(self.workload);
        objects.push(self.exposure);
        objects.extend(self.claim);
        objects
    }
}

pub fn build_plan(
    component: Component,
    spec: &ObservabilityStackSpec,
    ctx: &BuildContext<'_>,
) -> Result<ComponentPlan, DomainError> {
    match component {
        Component::MetricsStore => metrics_store::plan(ctx, &spec.metrics_store),
        Component::NodeCollector => Ok(exporters::node_collector_plan(ctx)),
        Component::StateExporter => Ok(exporters::state_exporter_plan(ctx)),
        Component::Dashboard => dashboard::plan(ctx, &spec.dashboard_service),
        Component::LogStore => log_store::plan(ctx, &spec.log_store),
        Component::LogCollector => log_collector::plan(ctx, &spec.log_collector),
        Component::TraceStore => trace_store::plan(ctx, &spec.trace_store),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use insight_domain::{ManagedObject, ObjectKind};
    use k8s_openapi::api::core::v1::{ConfigMap, PodSpec, Service};

    pub fn stack() -> StackRef {
        StackRef::new("monitoring", "obs1")
    }

    pub fn config_text(plan: &ComponentPlan, key: &str) -> String {
        match plan.config.as_ref() {
            Some(ManagedObject::ConfigMap(ConfigMap { data: Some(data), .. })) => {
                data.get(key).cloned().unwrap_or_default()
            }
            other => panic!("expected config map, got {other:?}"),
        }
    }

    pub fn service(plan: &ComponentPlan) -> &Service {
        match &plan.exposure {
            ManagedObject::Service(service) => service,
            other => panic!("expected service, got {:?}", other.kind()),
        }
    }

    pub fn service_ports(plan: &ComponentPlan) -> Vec<i32> {
        service(plan)
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| ports.iter().map(|p| p.port).collect())
            .unwrap_or_default()
    }

    pub fn pod_spec(plan: &ComponentPlan) -> &PodSpec {
        let template = match &plan.workload {
            ManagedObject::StatefulSet(sts) => sts.spec.as_ref().map(|s| &s.template),
            ManagedObject::Deployment(deploy) => deploy.spec.as_ref().map(|s| &s.template),
            ManagedObject::DaemonSet(ds) => ds.spec.as_ref().map(|s| &s.template),
            other => panic!("expected workload, got {:?}", other.kind()),
        };
        template
            .and_then(|t| t.spec.as_ref())
            .expect("workload has a pod spec")
    }

    pub fn kinds(plan: &ComponentPlan) -> Vec<ObjectKind> {
        plan.objects().map(ManagedObject::kind).collect()
    }
}
