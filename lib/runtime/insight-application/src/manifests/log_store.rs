//! Log store: single-binary, filesystem-backed log aggregation.

use std::collections::BTreeMap;

use insight_domain::{Component, DomainError, LogStoreSpec};
use k8s_openapi::api::core::v1::{Container, PodSecurityContext, PodSpec};

use super::common::{
    CONFIG_VOLUME, STORAGE_VOLUME, config_map, config_volume, container_ports, http_probe, mount,
    service, stateful_set, storage_size,
};
use super::{BuildContext, ComponentPlan};

pub const PORT: i32 = 3100;
const GRPC_PORT: i32 = 9096;
const CONFIG_KEY: &str = "loki.yaml";

pub fn plan(ctx: &BuildContext<'_>, spec: &LogStoreSpec) -> Result<ComponentPlan, DomainError> {
    let component = Component::LogStore;
    let storage = storage_size("logStore.storageSize", spec.storage_size.as_deref())?;
    let ports = [("http", PORT), ("grpc", GRPC_PORT)];

    let container = Container {
        name: "loki".to_string(),
        image: Some(ctx.images.log_store.clone()),
        args: Some(vec![format!("-config.file=/etc/loki/{CONFIG_KEY}")]),
        ports: Some(container_ports(&ports)),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, "/etc/loki", true),
            mount(STORAGE_VOLUME, "/loki", false),
        ]),
        readiness_probe: Some(http_probe("/ready", PORT, 15)),
        liveness_probe: Some(http_probe("/ready", PORT, 45)),
        ..Default::default()
    };
    let pod = PodSpec {
        security_context: Some(PodSecurityContext {
            fs_group: Some(10001),
            run_as_user: Some(10001),
            run_as_group: Some(10001),
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
        exposure: service(ctx, component, "ClusterIP", &ports),
        claim: None,
    })
}

pub fn render_config(retention_days: u32) -> String {
    format!(
        r#"auth_enabled: false

server:
  http_listen_port: {PORT}
  grpc_listen_port: {GRPC_PORT}

common:
  path_prefix: /loki
  storage:
    filesystem:
      chunks_directory: /loki/chunks
      rules_directory: /loki/rules
  replication_factor: 1
  ring:
    instance_addr: 127.0.0.1
    kvstore:
      store: inmemory

schema_config:
  configs:
    - from: 2020-10-24
      store: boltdb-shipper
      object_store: filesystem
      schema: v11
      index:
        prefix: index_
        period: 24h

limits_config:
  retention_period: {retention_days}d

table_manager:
  retention_deletes_enabled: true
  retention_period: {retention_days}d
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifests::testing::*;
    use insight_domain::{ImageSet, ManagedObject, ObjectKind};

    #[test]
    fn test_default_log_store_is_sized_with_retention() {
        let stack = stack();
        let images = ImageSet::default();
        let spec = LogStoreSpec {
            enabled: true,
            ..Default::default()
        };
        let plan = plan(&BuildContext::new(&stack, &images), &spec).unwrap();

        assert_eq!(
            kinds(&plan),
            vec![ObjectKind::ConfigMap, ObjectKind::StatefulSet, ObjectKind::Service]
        );
        let text = config_text(&plan, CONFIG_KEY);
        assert!(text.contains("retention_period: 14d"));
        let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed["server"]["http_listen_port"].as_u64(), Some(3100));

        let ManagedObject::StatefulSet(sts) = &plan.workload else {
            panic!("expected stateful set");
        };
        let templates = sts.spec.as_ref().unwrap().volume_claim_templates.as_ref();
        assert_eq!(templates.map(Vec::len), Some(1));
        assert_eq!(service_ports(&plan), vec![3100, 9096]);
    }

    #[test]
    fn test_retention_days_flow_into_config() {
        let text = render_config(30);
        assert_eq!(text.matches("retention_period: 30d").count(), 2);
    }
}
