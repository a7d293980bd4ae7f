//! Dashboard service with generated data-source provisioning.

use std::collections::BTreeMap;

use insight_domain::{
    Component, DashboardServiceSpec, DataSourceKind, DomainError, ExtraDataSource, StackRef,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, KeyToPath, PodSecurityContext, PodSpec, Volume,
};
use serde::Serialize;

use super::common::{
    CONFIG_VOLUME, STORAGE_VOLUME, claim_volume, config_map, container_ports, deployment,
    empty_dir, http_probe, mount, service, standalone_claim, storage_size, yaml,
};
use super::{BuildContext, ComponentPlan};

pub const PORT: i32 = 3000;
const GRAFANA_UID: i64 = 472;
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DASHBOARDS_PATH: &str = "/var/lib/grafana/dashboards";

const INI_KEY: &str = "grafana.ini";
const DATASOURCES_KEY: &str = "datasources.yaml";
const DASHBOARDS_KEY: &str = "dashboards.yaml";

pub fn plan(
    ctx: &BuildContext<'_>,
    spec: &DashboardServiceSpec,
) -> Result<ComponentPlan, DomainError> {
    let component = Component::Dashboard;
    let storage = storage_size("dashboardService.storageSize", spec.storage_size.as_deref())?;

    let mut data = BTreeMap::from([
        (INI_KEY.to_string(), render_ini(spec)),
        (DATASOURCES_KEY.to_string(), render_datasources(ctx.stack, &spec.extra_data_sources)?),
    ]);
    let mut items = vec![
        key_to_path(INI_KEY, INI_KEY),
        key_to_path(DATASOURCES_KEY, "provisioning/datasources/datasources.yaml"),
    ];
    if spec.provision_default_dashboards {
        data.insert(DASHBOARDS_KEY.to_string(), render_dashboard_provider()?);
        items.push(key_to_path(DASHBOARDS_KEY, "provisioning/dashboards/dashboards.yaml"));
    }

    let (storage_volume, claim) = match storage {
        Some(size) => (
            claim_volume(STORAGE_VOLUME, ctx.stack.suffixed_name(component, STORAGE_VOLUME)),
            Some(standalone_claim(ctx, component, size)),
        ),
        None => (empty_dir(STORAGE_VOLUME), None),
    };
    let config_volume = Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: ctx.stack.suffixed_name(component, "config").into(),
            items: Some(items),
            ..Default::default()
        }),
        ..Default::default()
    };

    let init = Container {
        name: "init-storage".to_string(),
        image: Some(ctx.images.dashboard_init.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("chown -R {GRAFANA_UID}:{GRAFANA_UID} /var/lib/grafana"),
        ]),
        volume_mounts: Some(vec![mount(STORAGE_VOLUME, "/var/lib/grafana", false)]),
        ..Default::default()
    };
    let container = Container {
        name: "grafana".to_string(),
        image: Some(ctx.images.dashboard.clone()),
        env: Some(vec![
            env("GF_PATHS_CONFIG", "/etc/grafana/grafana.ini"),
            env("GF_PATHS_PROVISIONING", "/etc/grafana/provisioning"),
        ]),
        ports: Some(container_ports(&[("http", PORT)])),
        volume_mounts: Some(vec![
            mount(CONFIG_VOLUME, "/etc/grafana", true),
            mount(STORAGE_VOLUME, "/var/lib/grafana", false),
        ]),
        readiness_probe: Some(http_probe("/api/health", PORT, 10)),
        liveness_probe: Some(http_probe("/api/health", PORT, 60)),
        ..Default::default()
    };
    let pod = PodSpec {
        security_context: Some(PodSecurityContext {
            fs_group: Some(GRAFANA_UID),
            ..Default::default()
        }),
        init_containers: Some(vec![init]),
        containers: vec![container],
        volumes: Some(vec![config_volume, storage_volume]),
        ..Default::default()
    };

    // A single-writer claim cannot be attached by old and new pods at once.
    let strategy = claim.as_ref().map(|_| "Recreate");

    Ok(ComponentPlan {
        component,
        rbac: Vec::new(),
        config: Some(config_map(ctx, component, data)),
        workload: deployment(ctx, component, pod, strategy),
        exposure: service(
            ctx,
            component,
            spec.service_exposure_mode.as_str(),
            &[("http", PORT)],
        ),
        claim,
    })
}

/// Grafana reads `#` and `;` as comment markers, so the password is always
/// triple-quoted.
fn render_ini(spec: &DashboardServiceSpec) -> String {
    let password = spec
        .admin_secret
        .as_deref()
        .unwrap_or(DEFAULT_ADMIN_PASSWORD);
    format!(
        "[auth.anonymous]\nenabled = false\n\n[security]\nadmin_user = admin\nadmin_password = \"\"\"{password}\"\"\"\n\n[paths]\nprovisioning = /etc/grafana/provisioning\n"
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceDocument<'a> {
    api_version: u32,
    datasources: Vec<DataSourceEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    access: &'static str,
    url: &'a str,
    is_default: bool,
    editable: bool,
}

impl<'a> DataSourceEntry<'a> {
    fn new(name: &'a str, kind: DataSourceKind, url: &'a str, is_default: bool) -> Self {
        Self {
            name,
            kind: kind.as_str(),
            access: "proxy",
            url,
            is_default,
            editable: true,
        }
    }
}

/// Data sources: the stack's own metrics store first, then user additions.
/// At most one source is marked default; the first user source claiming it
/// wins over the built-in one.
pub fn render_datasources(stack: &StackRef, extra: &[ExtraDataSource]) -> Result<String, DomainError> {
    let user_default = extra.iter().position(|source| source.is_default);
    let metrics_url = stack.service_url(Component::MetricsStore, super::metrics_store::PORT as u16);
    let mut datasources = vec![DataSourceEntry::new(
        "Prometheus",
        DataSourceKind::Prometheus,
        &metrics_url,
        user_default.is_none(),
    )];
    datasources.extend(extra.iter().enumerate().map(|(index, source)| {
        DataSourceEntry::new(&source.name, source.kind, &source.url, user_default == Some(index))
    }));
    yaml(
        DATASOURCES_KEY,
        &DataSourceDocument {
            api_version: 1,
            datasources,
        },
    )
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderDocument {
    api_version: u32,
    providers: Vec<DashboardProvider>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardProvider {
    name: &'static str,
    org_id: u32,
    folder: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    disable_deletion: bool,
    options: ProviderOptions,
}

#[derive(Serialize)]
struct ProviderOptions {
    path: &'static str,
}

fn render_dashboard_provider() -> Result<String, DomainError> {
    yaml(
        DASHBOARDS_KEY,
        &ProviderDocument {
            api_version: 1,
            providers: vec![DashboardProvider {
                name: "default",
                org_id: 1,
                folder: "",
                kind: "file",
                disable_deletion: false,
                options: ProviderOptions {
                    path: DASHBOARDS_PATH,
                },
            }],
        },
    )
}

fn key_to_path(key: &str, path: &str) -> KeyToPath {
    KeyToPath {
        key: key.to_string(),
        path: path.to_string(),
        ..Default::default()
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
