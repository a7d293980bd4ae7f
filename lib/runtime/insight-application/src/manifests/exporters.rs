//! Node collector and state exporter, the metrics store's scrape targets.

use insight_domain::Component;
use k8s_openapi::api::core::v1::{Container, PodSpec};

use super::common::{
    container_ports, daemon_set, deployment, host_path, http_probe, mount, rbac, rule, service,
};
use super::{BuildContext, ComponentPlan};

pub const NODE_PORT: i32 = 9100;
pub const STATE_METRICS_PORT: i32 = 8080;
pub const STATE_TELEMETRY_PORT: i32 = 8081;

const MOUNT_POINTS_EXCLUDE: &str =
    "--collector.filesystem.mount-points-exclude=^/(dev|proc|sys|var/lib/docker/.+|var/lib/kubelet/.+)($|/)";

/// Per-node host metrics. Runs in the host network and process namespaces.
pub fn node_collector_plan(ctx: &BuildContext<'_>) -> ComponentPlan {
    let component = Component::NodeCollector;
    let container = Container {
        name: "node-exporter".to_string(),
        image: Some(ctx.images.node_collector.clone()),
        args: Some(vec![
            "--path.procfs=/host/proc".to_string(),
            "--path.sysfs=/host/sys".to_string(),
            MOUNT_POINTS_EXCLUDE.to_string(),
        ]),
        ports: Some(container_ports(&[("metrics", NODE_PORT)])),
        volume_mounts: Some(vec![
            mount("proc", "/host/proc", true),
            mount("sys", "/host/sys", true),
        ]),
        ..Default::default()
    };
    let pod = PodSpec {
        host_network: Some(true),
        host_pid: Some(true),
        containers: vec![container],
        volumes: Some(vec![host_path("proc", "/proc"), host_path("sys", "/sys")]),
        ..Default::default()
    };

    ComponentPlan {
        component,
        rbac: Vec::new(),
        config: None,
        workload: daemon_set(ctx, component, pod),
        exposure: service(ctx, component, "ClusterIP", &[("metrics", NODE_PORT)]),
        claim: None,
    }
}

/// Cluster object-state metrics. Needs read access to most built-in kinds.
pub fn state_exporter_plan(ctx: &BuildContext<'_>) -> ComponentPlan {
    let component = Component::StateExporter;
    let ports = [
        ("http-metrics", STATE_METRICS_PORT),
        ("telemetry", STATE_TELEMETRY_PORT),
    ];
    let container = Container {
        name: "kube-state-metrics".to_string(),
        image: Some(ctx.images.state_exporter.clone()),
        ports: Some(container_ports(&ports)),
        liveness_probe: Some(http_probe("/healthz", STATE_METRICS_PORT, 5)),
        readiness_probe: Some(http_probe("/", STATE_TELEMETRY_PORT, 5)),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(ctx.stack.object_name(component)),
        containers: vec![container],
        ..Default::default()
    };

    let list_watch = ["list", "watch"];
    let rules = vec![
        rule(
            &[""],
            &[
                "configmaps",
                "secrets",
                "nodes",
                "pods",
                "services",
                "resourcequotas",
                "replicationcontrollers",
                "limitranges",
                "persistentvolumeclaims",
                "persistentvolumes",
                "namespaces",
                "endpoints",
            ],
            &list_watch,
        ),
        rule(
            &["apps"],
            &["statefulsets", "daemonsets", "deployments", "replicasets"],
            &list_watch,
        ),
        rule(&["batch"], &["cronjobs", "jobs"], &list_watch),
        rule(&["autoscaling"], &["horizontalpodautoscalers"], &list_watch),
    ];

    ComponentPlan {
        component,
        rbac: rbac(ctx, component, rules),
        config: None,
        workload: deployment(ctx, component, pod, None),
        exposure: service(ctx, component, "ClusterIP", &ports),
        claim: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifests::testing::*;
    use insight_domain::{ImageSet, ManagedObject, ObjectKind};

    #[test]
    fn test_node_collector_uses_host_namespaces() {
        let stack = stack();
        let images = ImageSet::default();
        let plan = node_collector_plan(&BuildContext::new(&stack, &images));

        assert_eq!(kinds(&plan), vec![ObjectKind::DaemonSet, ObjectKind::Service]);
        let pod = pod_spec(&plan);
        assert_eq!(pod.host_network, Some(true));
        assert_eq!(pod.host_pid, Some(true));
        let volumes = pod.volumes.as_ref().unwrap();
        assert_eq!(
            volumes[0].host_path.as_ref().map(|h| h.path.as_str()),
            Some("/proc")
        );
        assert_eq!(service_ports(&plan), vec![9100]);
        assert_eq!(plan.workload.key().name, "obs1-nodecollector");
    }

    #[test]
    fn test_state_exporter_has_read_only_grant() {
        let stack = stack();
        let images = ImageSet::default();
        let plan = state_exporter_plan(&BuildContext::new(&stack, &images));

        assert_eq!(
            kinds(&plan),
            vec![
                ObjectKind::ServiceAccount,
                ObjectKind::ClusterRole,
                ObjectKind::ClusterRoleBinding,
                ObjectKind::Deployment,
                ObjectKind::Service,
            ]
        );
        let ManagedObject::ClusterRole(role) = &plan.rbac[1] else {
            panic!("expected cluster role");
        };
        for rule in role.rules.as_ref().unwrap() {
            assert_eq!(rule.verbs, vec!["list".to_string(), "watch".to_string()]);
        }
        assert_eq!(service_ports(&plan), vec![8080, 8081]);
    }
}
