//! Log collector: a per-node agent shipping pod logs to the log store.

use std::collections::BTreeMap;

use insight_domain::{Component, DomainError, LogCollectorSpec, NodeToleration, StackRef};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, EnvVarSource, ObjectFieldSelector, PodSecurityContext,
    PodSpec, SecurityContext, Toleration,
};

use super::common::{
    CONFIG_VOLUME, config_map, config_volume, container_ports, daemon_set, empty_dir, host_path,
    http_probe, mount, rbac, resource_requirements, rule, service,
};
use super::{BuildContext, ComponentPlan};

pub const PORT: i32 = 9080;
const CONFIG_KEY: &str = "promtail.yaml";

const POD_LOGS_JOB: &str = r#"  - job_name: kubernetes-pods
    kubernetes_sd_configs:
      - role: pod
    relabel_configs:
      - source_labels:
          - __meta_kubernetes_pod_controller_name
        regex: ([0-9a-z-.]+?)(-[0-9a-f]{8,10})?
        action: replace
        target_label: __tmp_controller_name
      - source_labels:
          - __meta_kubernetes_pod_label_app_kubernetes_io_name
          - __meta_kubernetes_pod_label_app
          - __tmp_controller_name
          - __meta_kubernetes_pod_name
        regex: ^;*([^;]+)(;.*)?$
        action: replace
        target_label: app
      - source_labels:
          - __meta_kubernetes_pod_node_name
        action: replace
        target_label: node_name
      - source_labels:
          - __meta_kubernetes_namespace
        action: replace
        target_label: namespace
      - source_labels:
          - __meta_kubernetes_pod_name
        action: replace
        target_label: pod
      - source_labels:
          - __meta_kubernetes_pod_container_name
        action: replace
        target_label: container
      - action: labelmap
        regex: __meta_kubernetes_pod_label_(.+)
      - replacement: /var/log/pods/*$1/*.log
        separator: /
        source_labels:
          - __meta_kubernetes_pod_uid
          - __meta_kubernetes_pod_container_name
        target_label: __path__
"#;

pub fn plan(ctx: &BuildContext<'_>, spec: &LogCollectorSpec) -> Result<ComponentPlan, DomainError> {
    let component = Component::LogCollector;
    let resources = resource_requirements(&spec.resources)?;

    let mut args = vec![
        format!("-config.file=/etc/promtail/{CONFIG_KEY}"),
        "-client.external-labels=cluster=$(CLUSTER_NAME)".to_string(),
    ];
    args.extend(spec.extra_args.iter().cloned());

    let container = Container {
        name: "promtail".to_string(),
        image: Some(ctx.images.log_collector.clone()),
        args: Some(args),
        env: Some(vec![
            EnvVar {
                name: "HOSTNAME".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: "CLUSTER_NAME".to_string(),
                value: Some(ctx.stack.name().to_string()),
                ..Default::default()
            },
        ]),
        ports: Some(container_ports(&[("http-metrics", PORT)])),
        resources: Some(resources),
        security_context: Some(SecurityContext {
            read_only_root_filesystem: Some(true),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, "/etc/promtail", true),
            mount("run", "/run/promtail", false),
            mount("pods", "/var/log/pods", true),
            mount("containers", "/var/lib/docker/containers", true),
        ]),
        readiness_probe: Some(http_probe("/ready", PORT, 10)),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(ctx.stack.object_name(component)),
        security_context: Some(PodSecurityContext {
            run_as_user: Some(0),
            run_as_group: Some(0),
            ..Default::default()
        }),
        tolerations: Some(tolerations(&spec.node_tolerations)),
        containers: vec![container],
        volumes: Some(vec![
            config_volume(ctx, component),
            empty_dir("run"),
            host_path("pods", "/var/log/pods"),
            host_path("containers", "/var/lib/docker/containers"),
        ]),
        ..Default::default()
    };

    let rules = vec![rule(
        &[""],
        &["nodes", "nodes/proxy", "services", "endpoints", "pods", "namespaces"],
        &["get", "list", "watch"],
    )];

    Ok(ComponentPlan {
        component,
        rbac: rbac(ctx, component, rules),
        config: Some(config_map(
            ctx,
            component,
            BTreeMap::from([(
                CONFIG_KEY.to_string(),
                render_config(ctx.stack, spec.scrape_cluster_logs),
            )]),
        )),
        workload: daemon_set(ctx, component, pod),
        exposure: service(ctx, component, "ClusterIP", &[("http-metrics", PORT)]),
        claim: None,
    })
}

/// Agent configuration pushing to the same stack's log store. With cluster
/// log scraping off the agent runs with no jobs.
pub fn render_config(stack: &StackRef, scrape_cluster_logs: bool) -> String {
    let push_url = format!(
        "{}/loki/api/v1/push",
        stack.service_url(Component::LogStore, super::log_store::PORT as u16)
    );
    let mut config = format!(
        "server:\n  http_listen_port: {PORT}\n  grpc_listen_port: 0\n\npositions:\n  filename: /run/promtail/positions.yaml\n\nclients:\n  - url: {push_url}\n\n"
    );
    if scrape_cluster_logs {
        config.push_str("scrape_configs:\n");
        config.push_str(POD_LOGS_JOB);
    } else {
        config.push_str("scrape_configs: []\n");
    }
    config
}

/// Without explicit tolerations the agent runs on every node, tainted or not.
fn tolerations(requested: &[NodeToleration]) -> Vec<Toleration> {
    if requested.is_empty() {
        return vec![Toleration {
            operator: Some("Exists".to_string()),
            ..Default::default()
        }];
    }
    requested
        .iter()
        .map(|t| Toleration {
            key: t.key.clone(),
            operator: t.operator.clone(),
            value: t.value.clone(),
            effect: t.effect.clone(),
            toleration_seconds: t.toleration_seconds,
        })
        .collect()
}
