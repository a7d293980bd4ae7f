//! One reconcile pass over one stack.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use insight_domain::{Component, ObservabilityStack, OperatorConfig, StackRef};
use insight_ports::ObjectStore;

use crate::components::{ComponentReport, reconcile_component};
use crate::engine::Converger;
use crate::manifests::BuildContext;
use crate::ownership;
use crate::prune::prune_component;
use crate::status::StatusReporter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The stack no longer exists; its children are left to the platform's
    /// cascading collector.
    Absent,
    Reconciled(PassReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub components: Vec<(Component, ComponentReport)>,
    pub pruned: usize,
}

impl PassReport {
    pub fn writes(&self) -> usize {
        self.components
            .iter()
            .map(|(_, r)| r.created + r.replaced)
            .sum::<usize>()
            + self.pruned
    }
}

/// Drives stacks towards their spec. The store is injected so the same pass
/// runs against a live cluster or an in-memory double.
pub struct StackReconciler {
    store: Arc<dyn ObjectStore>,
    config: OperatorConfig,
    converger: Converger,
    status: StatusReporter,
}

impl StackReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, config: OperatorConfig) -> Self {
        Self {
            converger: Converger::new(store.clone(), config.conflict_retries),
            status: StatusReporter::new(store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Fetches the stack and converges every enabled component in order,
    /// stopping at the first failure. The outcome is recorded on the stack's
    /// status either way.
    pub async fn reconcile(&self, stack: &StackRef) -> Result<PassOutcome> {
        let Some(current) = self
            .store
            .get_stack(stack)
            .await
            .with_context(|| format!("failed to fetch stack {stack}"))?
        else {
            tracing::debug!(stack = %stack, "stack not found, nothing to do");
            return Ok(PassOutcome::Absent);
        };

        let generation = current.metadata.generation;
        let mut status = current.status.clone().unwrap_or_default();
        self.status.begin(stack, generation, &mut status).await?;

        let deadline = self.config.reconcile_timeout();
        let result = match tokio::time::timeout(deadline, self.run_pass(stack, &current)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("reconcile pass exceeded {}s deadline", deadline.as_secs())),
        };

        match &result {
            Ok(report) => tracing::info!(
                stack = %stack,
                components = report.components.len(),
                writes = report.writes(),
                "reconcile pass complete"
            ),
            Err(err) => tracing::error!(stack = %stack, error = %format!("{err:#}"), "reconcile pass failed"),
        }

        let recorded = self
            .status
            .finish(stack, generation, &mut status, result.as_ref().err())
            .await;
        match (result, recorded) {
            (Ok(report), Ok(_)) => Ok(PassOutcome::Reconciled(report)),
            (Ok(_), Err(status_err)) => Err(status_err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(status_err)) => {
                tracing::warn!(stack = %stack, error = %format!("{status_err:#}"), "could not record failure");
                Err(err)
            }
        }
    }

    async fn run_pass(&self, stack: &StackRef, current: &ObservabilityStack) -> Result<PassReport> {
        let owner = ownership::owner_reference(current)?;
        let ctx = BuildContext::new(stack, &self.config.images);
        let spec = &current.spec;
        let mut report = PassReport::default();

        for component in Component::ALL {
            if !component.is_enabled(spec) {
                if self.config.prune_disabled_components {
                    report.pruned +=
                        prune_component(self.store.as_ref(), stack, component, &owner.uid).await?;
                }
                continue;
            }
            tracing::info!(stack = %stack, component = %component, "reconciling component");
            let outcome = reconcile_component(&self.converger, component, spec, &ctx, &owner).await?;
            report.components.push((component, outcome));
        }
        Ok(report)
    }
}
