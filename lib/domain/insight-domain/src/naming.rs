use std::collections::BTreeMap;
use std::fmt;

use kube::ResourceExt;

use crate::component::Component;
use crate::error::DomainError;
use crate::labels::component_labels;
use crate::stack::ObservabilityStack;

/// Identity of a stack; every child object name is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackRef {
    namespace: String,
    name: String,
}

impl StackRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_stack(stack: &ObservabilityStack) -> Result<Self, DomainError> {
        let namespace = stack
            .namespace()
            .ok_or(DomainError::MissingIdentity("metadata.namespace"))?;
        let name = stack
            .metadata
            .name
            .clone()
            .ok_or(DomainError::MissingIdentity("metadata.name"))?;
        Ok(Self { namespace, name })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_name(&self, component: Component) -> String {
        format!("{}-{}", self.name, component)
    }

    pub fn suffixed_name(&self, component: Component, suffix: &str) -> String {
        format!("{}-{}-{}", self.name, component, suffix)
    }

    /// Cluster-scoped objects share one namespace-less name space, so the
    /// stack namespace is folded into the name.
    pub fn cluster_object_name(&self, component: Component) -> String {
        format!("{}-{}-{}", self.namespace, self.name, component)
    }

    /// In-namespace address of a component's exposure object.
    pub fn service_url(&self, component: Component, port: u16) -> String {
        format!("http://{}:{}", self.object_name(component), port)
    }

    pub fn labels(&self, component: Component) -> BTreeMap<String, String> {
        component_labels(&self.name, component)
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_object_names_are_deterministic() {
        let stack = StackRef::new("monitoring", "obs1");
        assert_eq!(stack.object_name(Component::MetricsStore), "obs1-metricsstore");
        assert_eq!(
            stack.suffixed_name(Component::MetricsStore, "config"),
            "obs1-metricsstore-config"
        );
        assert_eq!(
            stack.cluster_object_name(Component::MetricsStore),
            "monitoring-obs1-metricsstore"
        );
        assert_eq!(
            stack.service_url(Component::LogStore, 3100),
            "http://obs1-logstore:3100"
        );
        assert_eq!(
            StackRef::new("monitoring", "obs1").object_name(Component::TraceStore),
            stack.object_name(Component::TraceStore)
        );
    }

    #[test]
    fn test_distinct_stacks_never_collide() {
        let stacks = [
            StackRef::new("monitoring", "obs1"),
            StackRef::new("monitoring", "obs2"),
            StackRef::new("other", "obs1"),
        ];
        let mut namespaced = HashSet::new();
        let mut cluster = HashSet::new();
        for stack in &stacks {
            for component in Component::ALL {
                namespaced.insert((stack.namespace().to_string(), stack.object_name(component)));
                cluster.insert(stack.cluster_object_name(component));
            }
        }
        assert_eq!(namespaced.len(), stacks.len() * Component::ALL.len());
        assert_eq!(cluster.len(), stacks.len() * Component::ALL.len());
    }

    #[test]
    fn test_from_stack_requires_namespace() {
        let mut stack = ObservabilityStack::new("obs1", Default::default());
        assert_eq!(
            StackRef::from_stack(&stack),
            Err(DomainError::MissingIdentity("metadata.namespace"))
        );
        stack.metadata.namespace = Some("monitoring".to_string());
        assert_eq!(
            StackRef::from_stack(&stack),
            Ok(StackRef::new("monitoring", "obs1"))
        );
    }
}
