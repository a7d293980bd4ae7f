use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Attempts per object before a version conflict is surfaced.
    pub conflict_retries: u32,
    pub reconcile_timeout_secs: u64,
    pub requeue_after_secs: u64,
    pub error_requeue_secs: u64,
    pub prune_disabled_components: bool,
    pub watch_namespace: Option<String>,
    pub images: ImageSet,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 5,
            reconcile_timeout_secs: 30,
            requeue_after_secs: 300,
            error_requeue_secs: 15,
            prune_disabled_components: false,
            watch_namespace: None,
            images: ImageSet::default(),
        }
    }
}

impl OperatorConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read operator config at {}", path.display()))?;
        let config: OperatorConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse operator config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.conflict_retries == 0 {
            return Err(DomainError::InvalidConfig(
                "conflictRetries must be at least 1".to_string(),
            ));
        }
        if self.reconcile_timeout_secs == 0 {
            return Err(DomainError::InvalidConfig(
                "reconcileTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_secs)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSet {
    pub metrics_store: String,
    pub node_collector: String,
    pub state_exporter: String,
    pub dashboard: String,
    pub dashboard_init: String,
    pub log_store: String,
    pub log_collector: String,
    pub trace_store: String,
}

impl Default for ImageSet {
    fn default() -> Self {
        Self {
            metrics_store: "prom/prometheus:v2.45.0".to_string(),
            node_collector: "prom/node-exporter:v1.7.0".to_string(),
            state_exporter: "registry.k8s.io/kube-state-metrics/kube-state-metrics:v2.10.1"
                .to_string(),
            dashboard: "grafana/grafana:10.2.0".to_string(),
            dashboard_init: "busybox:1.36".to_string(),
            log_store: "grafana/loki:2.9.2".to_string(),
            log_collector: "grafana/promtail:2.8.4".to_string(),
            trace_store: "grafana/tempo:2.3.1".to_string(),
        }
    }
}
