use std::fmt;

use crate::stack::ObservabilityStackSpec;

/// Observability sub-systems managed for a stack, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    MetricsStore,
    NodeCollector,
    StateExporter,
    Dashboard,
    LogStore,
    LogCollector,
    TraceStore,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::MetricsStore,
        Component::NodeCollector,
        Component::StateExporter,
        Component::Dashboard,
        Component::LogStore,
        Component::LogCollector,
        Component::TraceStore,
    ];

    /// Segment used in object names and the component label.
    pub fn as_str(self) -> &'static str {
        match self {
            Component::MetricsStore => "metricsstore",
            Component::NodeCollector => "nodecollector",
            Component::StateExporter => "stateexporter",
            Component::Dashboard => "dashboard",
            Component::LogStore => "logstore",
            Component::LogCollector => "logcollector",
            Component::TraceStore => "tracestore",
        }
    }

    /// The exporters only run alongside an enabled metrics store.
    pub fn is_enabled(self, spec: &ObservabilityStackSpec) -> bool {
        match self {
            Component::MetricsStore => spec.metrics_store.enabled,
            Component::NodeCollector => {
                spec.metrics_store.enabled && spec.metrics_store.node_collector_enabled
            }
            Component::StateExporter => {
                spec.metrics_store.enabled && spec.metrics_store.state_exporter_enabled
            }
            Component::Dashboard => spec.dashboard_service.enabled,
            Component::LogStore => spec.log_store.enabled,
            Component::LogCollector => spec.log_collector.enabled,
            Component::TraceStore => spec.trace_store.enabled,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
