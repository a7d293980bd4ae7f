//! Child objects a stack owns, as one closed set of kinds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    ConfigMap, EmptyDirVolumeSource, PersistentVolumeClaim, PodSpec, Service, ServiceAccount,
    Volume,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    StatefulSet,
    Deployment,
    DaemonSet,
    Service,
    PersistentVolumeClaim,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::ServiceAccount,
        ObjectKind::ClusterRole,
        ObjectKind::ClusterRoleBinding,
        ObjectKind::ConfigMap,
        ObjectKind::StatefulSet,
        ObjectKind::Deployment,
        ObjectKind::DaemonSet,
        ObjectKind::Service,
        ObjectKind::PersistentVolumeClaim,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::ServiceAccount => "ServiceAccount",
            ObjectKind::ClusterRole => "ClusterRole",
            ObjectKind::ClusterRoleBinding => "ClusterRoleBinding",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::DaemonSet => "DaemonSet",
            ObjectKind::Service => "Service",
            ObjectKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        }
    }

    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, ObjectKind::ClusterRole | ObjectKind::ClusterRoleBinding)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup key; `namespace` is `None` for cluster-scoped kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManagedObject {
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    ConfigMap(ConfigMap),
    StatefulSet(StatefulSet),
    Deployment(Deployment),
    DaemonSet(DaemonSet),
    Service(Service),
    PersistentVolumeClaim(PersistentVolumeClaim),
}

/// Applies one expression to whichever typed object the variant holds.
#[macro_export]
macro_rules! with_object {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            $crate::objects::ManagedObject::ServiceAccount($inner) => $body,
            $crate::objects::ManagedObject::ClusterRole($inner) => $body,
            $crate::objects::ManagedObject::ClusterRoleBinding($inner) => $body,
            $crate::objects::ManagedObject::ConfigMap($inner) => $body,
            $crate::objects::ManagedObject::StatefulSet($inner) => $body,
            $crate::objects::ManagedObject::Deployment($inner) => $body,
            $crate::objects::ManagedObject::DaemonSet($inner) => $body,
            $crate::objects::ManagedObject::Service($inner) => $body,
            $crate::objects::ManagedObject::PersistentVolumeClaim($inner) => $body,
        }
    };
}

impl ManagedObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ManagedObject::ServiceAccount(_) => ObjectKind::ServiceAccount,
            ManagedObject::ClusterRole(_) => ObjectKind::ClusterRole,
            ManagedObject::ClusterRoleBinding(_) => ObjectKind::ClusterRoleBinding,
            ManagedObject::ConfigMap(_) => ObjectKind::ConfigMap,
            ManagedObject::StatefulSet(_) => ObjectKind::StatefulSet,
            ManagedObject::Deployment(_) => ObjectKind::Deployment,
            ManagedObject::DaemonSet(_) => ObjectKind::DaemonSet,
            ManagedObject::Service(_) => ObjectKind::Service,
            ManagedObject::PersistentVolumeClaim(_) => ObjectKind::PersistentVolumeClaim,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        with_object!(self, object => &object.metadata)
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        with_object!(self, object => &mut object.metadata)
    }

    pub fn key(&self) -> ObjectKey {
        let metadata = self.metadata();
        ObjectKey {
            namespace: if self.kind().is_cluster_scoped() {
                None
            } else {
                metadata.namespace.clone()
            },
            name: metadata.name.clone().unwrap_or_default(),
        }
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    pub fn set_resource_version(&mut self, version: Option<String>) {
        self.metadata_mut().resource_version = version;
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        self.metadata().owner_references.as_deref().unwrap_or_default()
    }

    /// Installs `owner` as the single reference to that owner's uid.
    pub fn set_owner(&mut self, owner: OwnerReference) {
        let references = self
            .metadata_mut()
            .owner_references
            .get_or_insert_with(Vec::new);
        references.retain(|existing| existing.uid != owner.uid);
        references.push(owner);
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_references().iter().any(|owner| owner.uid == uid)
    }

    pub fn is_claim(&self) -> bool {
        self.kind() == ObjectKind::PersistentVolumeClaim
    }

    /// Copies fields the API server refuses to change after creation from the
    /// live object onto this desired one.
    pub fn preserve_immutable_fields(&mut self, live: &ManagedObject) {
        match (self, live) {
            (ManagedObject::Service(desired), ManagedObject::Service(live)) => {
                if let (Some(desired), Some(live)) = (desired.spec.as_mut(), live.spec.as_ref()) {
                    if desired.cluster_ip.is_none() {
                        desired.cluster_ip = live.cluster_ip.clone();
                    }
                    if desired.cluster_ips.is_none() {
                        desired.cluster_ips = live.cluster_ips.clone();
                    }
                }
            }
            (ManagedObject::StatefulSet(desired), ManagedObject::StatefulSet(live)) => {
                if let (Some(desired), Some(live)) = (desired.spec.as_mut(), live.spec.as_ref()) {
                    desired.service_name = live.service_name.clone();
                    desired.volume_claim_templates = live.volume_claim_templates.clone();
                    if let Some(pod) = desired.template.spec.as_mut() {
                        reconcile_claim_volumes(pod, desired.volume_claim_templates.as_deref());
                    }
                }
            }
            _ => {}
        }
    }

    /// Keeps labels, annotations and finalizers that other writers put on the
    /// live object. Keys this object sets itself win.
    pub fn preserve_foreign_metadata(&mut self, live: &ManagedObject) {
        let live = live.metadata();
        let desired = self.metadata_mut();
        merge_missing(&mut desired.labels, live.labels.as_ref());
        merge_missing(&mut desired.annotations, live.annotations.as_ref());
        if desired.finalizers.is_none() {
            desired.finalizers = live.finalizers.clone();
        }
    }

    /// Equality that ignores the server-assigned resource version.
    pub fn same_content(&self, other: &ManagedObject) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        left.set_resource_version(None);
        right.set_resource_version(None);
        left == right
    }
}

fn merge_missing(
    desired: &mut Option<BTreeMap<String, String>>,
    live: Option<&BTreeMap<String, String>>,
) {
    let Some(live) = live.filter(|live| !live.is_empty()) else {
        return;
    };
    let desired = desired.get_or_insert_with(BTreeMap::new);
    for (key, value) in live {
        desired.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Claim templates are fixed at creation, so the pod volumes have to follow
/// whichever templates the live object kept: a volume shadowing a template is
/// dropped and a mount left without any source falls back to scratch space.
fn reconcile_claim_volumes(pod: &mut PodSpec, templates: Option<&[PersistentVolumeClaim]>) {
    let claimed: BTreeSet<&str> = templates
        .unwrap_or_default()
        .iter()
        .filter_map(|t| t.metadata.name.as_deref())
        .collect();
    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|v| !claimed.contains(v.name.as_str()));

    let mounted: BTreeSet<String> = pod
        .init_containers
        .iter()
        .flatten()
        .chain(pod.containers.iter())
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .map(|m| m.name.clone())
        .collect();
    for name in mounted {
        if claimed.contains(name.as_str()) || volumes.iter().any(|v| v.name == name) {
            continue;
        }
        volumes.push(Volume {
            name,
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }
    if volumes.is_empty() {
        pod.volumes = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::StatefulSetSpec;
    use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, ServiceSpec, VolumeMount};

    fn owner(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "monitoring.example.com/v1alpha1".to_string(),
            kind: "ObservabilityStack".to_string(),
            name: "obs1".to_string(),
            uid: uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn service(name: &str, cluster_ip: Option<&str>) -> ManagedObject {
        ManagedObject::Service(Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: cluster_ip.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_set_owner_is_idempotent() {
        let mut object = service("obs1-logstore", None);
        object.set_owner(owner("uid-1"));
        object.set_owner(owner("uid-1"));
        assert_eq!(object.owner_references().len(), 1);
        assert!(object.is_owned_by("uid-1"));
        assert!(!object.is_owned_by("uid-2"));
    }

    #[test]
    fn test_cluster_scoped_key_drops_namespace() {
        let role = ManagedObject::ClusterRole(ClusterRole {
            metadata: ObjectMeta {
                name: Some("monitoring-obs1-metricsstore".to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(role.key(), ObjectKey::cluster("monitoring-obs1-metricsstore"));
        assert_eq!(
            service("obs1-logstore", None).key().to_string(),
            "monitoring/obs1-logstore"
        );
    }

    #[test]
    fn test_service_keeps_allocated_cluster_ip() {
        let mut desired = service("obs1-logstore", None);
        desired.preserve_immutable_fields(&service("obs1-logstore", Some("10.0.0.7")));
        match desired {
            ManagedObject::Service(svc) => {
                assert_eq!(
                    svc.spec.and_then(|s| s.cluster_ip).as_deref(),
                    Some("10.0.0.7")
                );
            }
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_same_content_ignores_resource_version() {
        let mut left = service("obs1-logstore", None);
        let right = service("obs1-logstore", None);
        left.set_resource_version(Some("42".to_string()));
        assert!(left.same_content(&right));
        assert_ne!(left, right);
    }

    #[test]
    fn test_foreign_metadata_survives_and_own_keys_win() {
        let mut live = service("obs1-logstore", None);
        let meta = live.metadata_mut();
        meta.labels = Some(BTreeMap::from([
            ("app".to_string(), "stale".to_string()),
            ("team".to_string(), "infra".to_string()),
        ]));
        meta.annotations = Some(BTreeMap::from([(
            "deployment.kubernetes.io/revision".to_string(),
            "3".to_string(),
        )]));
        meta.finalizers = Some(vec!["service.kubernetes.io/load-balancer-cleanup".to_string()]);

        let mut desired = service("obs1-logstore", None);
        desired.metadata_mut().labels =
            Some(BTreeMap::from([("app".to_string(), "logstore".to_string())]));
        desired.preserve_foreign_metadata(&live);

        let meta = desired.metadata();
        let labels = meta.labels.clone().unwrap_or_default();
        assert_eq!(labels.get("app").map(String::as_str), Some("logstore"));
        assert_eq!(labels.get("team").map(String::as_str), Some("infra"));
        assert_eq!(
            meta.annotations
                .as_ref()
                .and_then(|a| a.get("deployment.kubernetes.io/revision"))
                .map(String::as_str),
            Some("3")
        );
        assert_eq!(meta.finalizers.as_ref().map(Vec::len), Some(1));
    }

    fn store(volumes: Vec<Volume>, templates: Option<Vec<&str>>) -> ManagedObject {
        ManagedObject::StatefulSet(StatefulSet {
            metadata: ObjectMeta {
                name: Some("obs1-metricsstore".to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "server".to_string(),
                            volume_mounts: Some(vec![
                                VolumeMount {
                                    name: "config".to_string(),
                                    mount_path: "/etc/config".to_string(),
                                    ..Default::default()
                                },
                                VolumeMount {
                                    name: "storage".to_string(),
                                    mount_path: "/data".to_string(),
                                    ..Default::default()
                                },
                            ]),
                            ..Default::default()
                        }],
                        volumes: Some(volumes),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                volume_claim_templates: templates.map(|names| {
                    names
                        .into_iter()
                        .map(|name| PersistentVolumeClaim {
                            metadata: ObjectMeta {
                                name: Some(name.to_string()),
                                ..Default::default()
                            },
                            ..Default::default()
                        })
                        .collect()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn scratch(name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }
    }

    fn pod_volumes(object: &ManagedObject) -> Vec<String> {
        match object {
            ManagedObject::StatefulSet(sts) => sts
                .spec
                .as_ref()
                .and_then(|s| s.template.spec.as_ref())
                .and_then(|p| p.volumes.as_ref())
                .map(|v| v.iter().map(|v| v.name.clone()).collect())
                .unwrap_or_default(),
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn test_sizing_an_unsized_store_keeps_scratch_volume() {
        let live = store(vec![scratch("config"), scratch("storage")], None);
        let mut desired = store(vec![scratch("config")], Some(vec!["storage"]));

        desired.preserve_immutable_fields(&live);

        assert_eq!(pod_volumes(&desired), vec!["config", "storage"]);
        assert!(desired.same_content(&live));
    }

    #[test]
    fn test_unsizing_a_sized_store_drops_shadowing_volume() {
        let live = store(vec![scratch("config")], Some(vec!["storage"]));
        let mut desired = store(vec![scratch("config"), scratch("storage")], None);

        desired.preserve_immutable_fields(&live);

        assert_eq!(pod_volumes(&desired), vec!["config"]);
        assert!(desired.same_content(&live));
    }
}
