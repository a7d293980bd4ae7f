//! Metrics store: a single-replica scraping time-series database.

use std::collections::BTreeMap;

use insight_domain::{Component, DomainError, MetricsStoreSpec, StackRef};
use k8s_openapi::api::core::v1::{Container, PodSecurityContext, PodSpec};
use serde::Serialize;

use super::common::{
    CONFIG_VOLUME, STORAGE_VOLUME, config_map, config_volume, container_ports, http_probe, mount,
    non_resource_rule, rbac, rule, service, stateful_set, storage_size, yaml,
};
use super::{BuildContext, ComponentPlan};

pub const PORT: i32 = 9090;
const CONFIG_KEY: &str = "prometheus.yml";

pub fn plan(ctx: &BuildContext<'_>, spec: &MetricsStoreSpec) -> Result<ComponentPlan, DomainError> {
    let component = Component::MetricsStore;
    let storage = storage_size("metricsStore.storageSize", spec.storage_size.as_deref())?;

    let container = Container {
        name: "prometheus".to_string(),
        image: Some(ctx.images.metrics_store.clone()),
        args: Some(vec![
            format!("--config.file=/etc/prometheus/{CONFIG_KEY}"),
            "--storage.tsdb.path=/prometheus".to_string(),
            format!("--storage.tsdb.retention.time={}", spec.retention_window),
        ]),
        ports: Some(container_ports(&[("web", PORT)])),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, "/etc/prometheus", true),
            mount(STORAGE_VOLUME, "/prometheus", false),
        ]),
        readiness_probe: Some(http_probe("/-/ready", PORT, 10)),
        liveness_probe: Some(http_probe("/-/healthy", PORT, 30)),
        ..Default::default()
    };
    let pod = PodSpec {
        service_account_name: Some(ctx.stack.object_name(component)),
        security_context: Some(PodSecurityContext {
            fs_group: Some(65534),
            ..Default::default()
        }),
        containers: vec![container],
        volumes: Some(vec![config_volume(ctx, component)]),
        ..Default::default()
    };

    let rules = vec![
        rule(
            &[""],
            &["nodes", "nodes/proxy", "nodes/metrics", "services", "endpoints", "pods"],
            &["get", "list", "watch"],
        ),
        rule(&[""], &["configmaps"], &["get"]),
        non_resource_rule(&["/metrics", "/api", "/api/*"], &["get"]),
    ];

    Ok(ComponentPlan {
        component,
        rbac: rbac(ctx, component, rules),
        config: Some(config_map(
            ctx,
            component,
            BTreeMap::from([(CONFIG_KEY.to_string(), render_config(ctx.stack, spec)?)]),
        )),
        workload: stateful_set(ctx, component, pod, storage),
        exposure: service(ctx, component, "ClusterIP", &[("web", PORT)]),
        claim: None,
    })
}

#[derive(Serialize)]
struct ScrapeDocument<'a> {
    global: GlobalSettings<'a>,
    scrape_configs: Vec<ScrapeJob>,
}

#[derive(Serialize)]
struct GlobalSettings<'a> {
    scrape_interval: &'a str,
    evaluation_interval: &'a str,
}

#[derive(Serialize)]
struct ScrapeJob {
    job_name: &'static str,
    static_configs: Vec<StaticTargets>,
}

#[derive(Serialize)]
struct StaticTargets {
    targets: Vec<String>,
}

impl ScrapeJob {
    fn single(job_name: &'static str, target: String) -> Self {
        Self {
            job_name,
            static_configs: vec![StaticTargets {
                targets: vec![target],
            }],
        }
    }
}

/// Scrape configuration. The store always scrapes itself; an exporter job is
/// listed only while that exporter is enabled, never as a fixed target set.
pub fn render_config(stack: &StackRef, spec: &MetricsStoreSpec) -> Result<String, DomainError> {
    let mut jobs = vec![ScrapeJob::single("prometheus", format!("localhost:{PORT}"))];
    if spec.node_collector_enabled {
        jobs.push(ScrapeJob::single(
            "node-exporter",
            format!("{}:{}", stack.object_name(Component::NodeCollector), super::exporters::NODE_PORT),
        ));
    }
    if spec.state_exporter_enabled {
        jobs.push(ScrapeJob::single(
            "kube-state-metrics",
            format!(
                "{}:{}",
                stack.object_name(Component::StateExporter),
                super::exporters::STATE_METRICS_PORT
            ),
        ));
    }
    yaml(
        CONFIG_KEY,
        &ScrapeDocument {
            global: GlobalSettings {
                scrape_interval: &spec.scrape_interval,
                evaluation_interval: &spec.scrape_interval,
            },
            scrape_configs: jobs,
        },
    )
}
