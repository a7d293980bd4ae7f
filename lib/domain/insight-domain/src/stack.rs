//! The `ObservabilityStack` custom resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::StackCondition;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "monitoring.example.com",
    version = "v1alpha1",
    kind = "ObservabilityStack",
    namespaced,
    status = "ObservabilityStackStatus",
    shortname = "obs",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityStackSpec {
    #[serde(default)]
    pub metrics_store: MetricsStoreSpec,
    #[serde(default)]
    pub dashboard_service: DashboardServiceSpec,
    #[serde(default)]
    pub log_store: LogStoreSpec,
    #[serde(default)]
    pub log_collector: LogCollectorSpec,
    #[serde(default)]
    pub trace_store: TraceStoreSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityStackStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StackCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsStoreSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
    #[serde(default = "default_retention_window")]
    pub retention_window: String,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,
    #[serde(default)]
    pub node_collector_enabled: bool,
    #[serde(default)]
    pub state_exporter_enabled: bool,
}

impl Default for MetricsStoreSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_size: None,
            retention_window: default_retention_window(),
            scrape_interval: default_scrape_interval(),
            node_collector_enabled: false,
            state_exporter_enabled: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardServiceSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_secret: Option<String>,
    #[serde(default)]
    pub service_exposure_mode: ServiceExposureMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
    #[serde(default)]
    pub provision_default_dashboards: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_data_sources: Vec<ExtraDataSource>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ServiceExposureMode {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceExposureMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceExposureMode::ClusterIP => "ClusterIP",
            ServiceExposureMode::NodePort => "NodePort",
            ServiceExposureMode::LoadBalancer => "LoadBalancer",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtraDataSource {
    pub name: String,
    pub kind: DataSourceKind,
    pub url: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Prometheus,
    Loki,
    Tempo,
}

impl DataSourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSourceKind::Prometheus => "prometheus",
            DataSourceKind::Loki => "loki",
            DataSourceKind::Tempo => "tempo",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogStoreSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_store_size")]
    pub storage_size: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LogStoreSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_size: default_store_size(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectorSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_tolerations: Vec<NodeToleration>,
    #[serde(default = "default_true")]
    pub scrape_cluster_logs: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for LogCollectorSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            resources: ResourceSpec::default(),
            node_tolerations: Vec::new(),
            scrape_cluster_logs: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraceStoreSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_store_size")]
    pub storage_size: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub resources: ResourceSpec,
}

impl Default for TraceStoreSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_size: default_store_size(),
            retention_days: default_retention_days(),
            resources: ResourceSpec::default(),
        }
    }
}

/// Container requests and limits, as quantity strings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(default = "default_cpu_request")]
    pub cpu_request: String,
    #[serde(default = "default_memory_request")]
    pub memory_request: String,
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu_request: default_cpu_request(),
            memory_request: default_memory_request(),
            cpu_limit: default_cpu_limit(),
            memory_limit: default_memory_limit(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeToleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

fn default_true() -> bool {
    true
}

fn default_retention_window() -> String {
    "15d".to_string()
}

fn default_scrape_interval() -> String {
    "15s".to_string()
}

fn default_store_size() -> Option<String> {
    Some("10Gi".to_string())
}

fn default_retention_days() -> u32 {
    14
}

fn default_cpu_request() -> String {
    "100m".to_string()
}

fn default_memory_request() -> String {
    "128Mi".to_string()
}

fn default_cpu_limit() -> String {
    "200m".to_string()
}

fn default_memory_limit() -> String {
    "256Mi".to_string()
}
