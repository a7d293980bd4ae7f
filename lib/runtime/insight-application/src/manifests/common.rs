use std::collections::BTreeMap;

use insight_domain::{Component, DomainError, ManagedObject, ResourceSpec, parse_quantity};
use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, DeploymentStrategy, StatefulSet,
    StatefulSetSpec,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, ContainerPort, EmptyDirVolumeSource, HTTPGetAction,
    HostPathVolumeSource, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    Service, ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;

use super::BuildContext;

pub(crate) const CONFIG_VOLUME: &str = "config";
pub(crate) const STORAGE_VOLUME: &str = "storage";

pub(crate) fn object_meta(ctx: &BuildContext<'_>, component: Component, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(ctx.stack.namespace().to_string()),
        labels: Some(ctx.stack.labels(component)),
        ..Default::default()
    }
}

fn cluster_meta(ctx: &BuildContext<'_>, component: Component) -> ObjectMeta {
    ObjectMeta {
        name: Some(ctx.stack.cluster_object_name(component)),
        labels: Some(ctx.stack.labels(component)),
        ..Default::default()
    }
}

/// Serializes a generated configuration document.
pub(crate) fn yaml<T: Serialize>(document: &'static str, value: &T) -> Result<String, DomainError> {
    serde_yaml::to_string(value).map_err(|err| DomainError::Render {
        document,
        message: err.to_string(),
    })
}

pub(crate) fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(strings(api_groups)),
        resources: Some(strings(resources)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

pub(crate) fn non_resource_rule(urls: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        non_resource_urls: Some(strings(urls)),
        verbs: strings(verbs),
        ..Default::default()
    }
}

/// Service identity plus a cluster-wide grant bound to it.
pub(crate) fn rbac(
    ctx: &BuildContext<'_>,
    component: Component,
    rules: Vec<PolicyRule>,
) -> Vec<ManagedObject> {
    let account = ctx.stack.object_name(component);
    let role_name = ctx.stack.cluster_object_name(component);

    let service_account = ServiceAccount {
        metadata: object_meta(ctx, component, account.clone()),
        ..Default::default()
    };
    let role = ClusterRole {
        metadata: cluster_meta(ctx, component),
        rules: Some(rules),
        ..Default::default()
    };
    let binding = ClusterRoleBinding {
        metadata: cluster_meta(ctx, component),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: account,
            namespace: Some(ctx.stack.namespace().to_string()),
            ..Default::default()
        }]),
    };

    vec![
        ManagedObject::ServiceAccount(service_account),
        ManagedObject::ClusterRole(role),
        ManagedObject::ClusterRoleBinding(binding),
    ]
}

pub(crate) fn config_map(
    ctx: &BuildContext<'_>,
    component: Component,
    data: BTreeMap<String, String>,
) -> ManagedObject {
    ManagedObject::ConfigMap(ConfigMap {
        metadata: object_meta(ctx, component, ctx.stack.suffixed_name(component, "config")),
        data: Some(data),
        ..Default::default()
    })
}

pub(crate) fn service(
    ctx: &BuildContext<'_>,
    component: Component,
    service_type: &str,
    ports: &[(&str, i32)],
) -> ManagedObject {
    let ports = ports
        .iter()
        .map(|(name, port)| ServicePort {
            name: Some(name.to_string()),
            port: *port,
            protocol: Some("TCP".to_string()),
            target_port: Some(IntOrString::String(name.to_string())),
            ..Default::default()
        })
        .collect();

    ManagedObject::Service(Service {
        metadata: object_meta(ctx, component, ctx.stack.object_name(component)),
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            selector: Some(ctx.stack.labels(component)),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub(crate) fn container_ports(ports: &[(&str, i32)]) -> Vec<ContainerPort> {
    ports
        .iter()
        .map(|(name, port)| ContainerPort {
            name: Some(name.to_string()),
            container_port: *port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect()
}

pub(crate) fn http_probe(path: &str, port: i32, initial_delay: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(5),
        ..Default::default()
    }
}

pub(crate) fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

pub(crate) fn config_volume(ctx: &BuildContext<'_>, component: Component) -> Volume {
    Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: ctx.stack.suffixed_name(component, "config").into(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

pub(crate) fn host_path(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn claim_volume(name: &str, claim_name: String) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name,
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn storage_size(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<Quantity>, DomainError> {
    raw.map(|raw| parse_quantity(field, raw)).transpose()
}

fn claim_spec(size: Quantity) -> PersistentVolumeClaimSpec {
    PersistentVolumeClaimSpec {
        access_modes: Some(vec!["ReadWriteOnce".to_string()]),
        resources: Some(VolumeResourceRequirements {
            requests: Some(BTreeMap::from([("storage".to_string(), size)])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn standalone_claim(
    ctx: &BuildContext<'_>,
    component: Component,
    size: Quantity,
) -> ManagedObject {
    ManagedObject::PersistentVolumeClaim(PersistentVolumeClaim {
        metadata: object_meta(ctx, component, ctx.stack.suffixed_name(component, STORAGE_VOLUME)),
        spec: Some(claim_spec(size)),
        ..Default::default()
    })
}

pub(crate) fn resource_requirements(
    spec: &ResourceSpec,
) -> Result<ResourceRequirements, DomainError> {
    let requests = BTreeMap::from([
        ("cpu".to_string(), parse_quantity("cpuRequest", &spec.cpu_request)?),
        ("memory".to_string(), parse_quantity("memoryRequest", &spec.memory_request)?),
    ]);
    let limits = BTreeMap::from([
        ("cpu".to_string(), parse_quantity("cpuLimit", &spec.cpu_limit)?),
        ("memory".to_string(), parse_quantity("memoryLimit", &spec.memory_limit)?),
    ]);
    Ok(ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    })
}

fn selector(ctx: &BuildContext<'_>, component: Component) -> LabelSelector {
    LabelSelector {
        match_labels: Some(ctx.stack.labels(component)),
        ..Default::default()
    }
}

fn pod_template(ctx: &BuildContext<'_>, component: Component, spec: PodSpec) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(ctx.stack.labels(component)),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

/// Single-replica stateful store. With a size the data lives on a claim
/// template named `storage`; without one it lives in scratch space.
pub(crate) fn stateful_set(
    ctx: &BuildContext<'_>,
    component: Component,
    mut pod: PodSpec,
    storage: Option<Quantity>,
) -> ManagedObject {
    let claim_templates = match storage {
        Some(size) => Some(vec![PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(STORAGE_VOLUME.to_string()),
                labels: Some(ctx.stack.labels(component)),
                ..Default::default()
            },
            spec: Some(claim_spec(size)),
            ..Default::default()
        }]),
        None => {
            pod.volumes
                .get_or_insert_with(Vec::new)
                .push(empty_dir(STORAGE_VOLUME));
            None
        }
    };

    ManagedObject::StatefulSet(StatefulSet {
        metadata: object_meta(ctx, component, ctx.stack.object_name(component)),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            service_name: ctx.stack.object_name(component).into(),
            selector: selector(ctx, component),
            template: pod_template(ctx, component, pod),
            volume_claim_templates: claim_templates,
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub(crate) fn deployment(
    ctx: &BuildContext<'_>,
    component: Component,
    pod: PodSpec,
    strategy: Option<&str>,
) -> ManagedObject {
    ManagedObject::Deployment(Deployment {
        metadata: object_meta(ctx, component, ctx.stack.object_name(component)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: selector(ctx, component),
            template: pod_template(ctx, component, pod),
            strategy: strategy.map(|kind| DeploymentStrategy {
                type_: Some(kind.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub(crate) fn daemon_set(ctx: &BuildContext<'_>, component: Component, pod: PodSpec) -> ManagedObject {
    ManagedObject::DaemonSet(DaemonSet {
        metadata: object_meta(ctx, component, ctx.stack.object_name(component)),
        spec: Some(DaemonSetSpec {
            selector: selector(ctx, component),
            template: pod_template(ctx, component, pod),
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub(crate) fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
