//! Trace store: accepts spans over the common collector protocols.

use std::collections::BTreeMap;

use insight_domain::{Component, DomainError, TraceStoreSpec};
use k8s_openapi::api::core::v1::{Container, PodSecurityContext, PodSpec};

use super::common::{
    CONFIG_VOLUME, STORAGE_VOLUME, config_map, config_volume, container_ports, http_probe, mount,
    resource_requirements, service, stateful_set, storage_size,
};
use super::{BuildContext, ComponentPlan};

pub const PORT: i32 = 3200;
const CONFIG_KEY: &str = "tempo.yaml";

const PORTS: [(&str, i32); 6] = [
    ("http", PORT),
    ("grpc", 9095),
    ("jaeger-grpc", 14250),
    ("jaeger-http", 14268),
    ("otlp-grpc", 4317),
    ("otlp-http", 4318),
];

pub fn plan(ctx: &BuildContext<'_>, spec: &TraceStoreSpec) -> Result<ComponentPlan, DomainError> {
    let component = Component::TraceStore;
    let storage = storage_size("traceStore.storageSize", spec.storage_size.as_deref())?;
    let resources = resource_requirements(&spec.resources)?;

    let container = Container {
        name: "tempo".to_string(),
        image: Some(ctx.images.trace_store.clone()),
        args: Some(vec![format!("-config.file=/etc/tempo/{CONFIG_KEY}")]),
        ports: Some(container_ports(&PORTS)),
        resources: Some(resources),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, "/etc/tempo", true),
            mount(STORAGE_VOLUME, "/var/tempo", false),
        ]),
        liveness_probe: Some(http_probe("/ready", PORT, 30)),
        readiness_probe: Some(http_probe("/ready", PORT, 15)),
        ..Default::default()
    };
    let pod = PodSpec {
        security_context: Some(PodSecurityContext {
            fs_group: Some(10001),
            ..Default::default()
        }),
        containers: vec![container],
        volumes: Some(vec![config_volume(ctx, component)]),
        ..Default::default()
    };

    Ok(ComponentPlan {
        component,
        rbac: Vec::new(),
        config: Some(config_map(
            ctx,
            component,
            BTreeMap::from([(CONFIG_KEY.to_string(), render_config(spec.retention_days))]),
        )),
        workload: stateful_set(ctx, component, pod, storage),
        exposure: service(ctx, component, "ClusterIP", &PORTS),
        claim: None,
    })
}

/// Block retention is expressed in hours.
pub fn render_config(retention_days: u32) -> String {
    let retention_hours = u64::from(retention_days) * 24;
    format!(
        r#"server:
  http_listen_port: {PORT}

distributor:
  receivers:
    jaeger:
      protocols:
        grpc:
          endpoint: 0.0.0.0:14250
        thrift_http:
          endpoint: 0.0.0.0:14268
    otlp:
      protocols:
        grpc:
          endpoint: 0.0.0.0:4317
        http:
          endpoint: 0.0.0.0:4318

ingester:
  max_block_duration: 5m

compactor:
  compaction:
    block_retention: {retention_hours}h

storage:
  trace:
    backend: local
    wal:
      path: /var/tempo/wal
    local:
      path: /var/tempo/blocks
"#
    )
}
