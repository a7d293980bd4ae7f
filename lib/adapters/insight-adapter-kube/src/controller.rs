//! Watch loop: one reconcile pass per stack change, owned-object change or
//! requeue timer.

use std::sync::Arc;

use anyhow::Context as _;
use futures::StreamExt;
use insight_application::StackReconciler;
use insight_domain::{DomainError, ObservabilityStack, OperatorConfig, StackRef};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::api::ListParams;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, Resource};
use thiserror::Error;

use crate::store::KubeObjectStore;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Identity(#[from] DomainError),
    #[error("{0:#}")]
    Reconcile(anyhow::Error),
}

pub struct ControllerContext {
    reconciler: StackReconciler,
}

/// Runs the controller until a termination signal arrives.
pub async fn run(client: Client, config: OperatorConfig) -> anyhow::Result<()> {
    let stacks: Api<ObservabilityStack> = scoped(&client, config.watch_namespace.as_deref());
    stacks
        .list(&ListParams::default().limit(1))
        .await
        .context("ObservabilityStack resources are not listable; is the CRD installed?")?;

    tracing::info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        prune = config.prune_disabled_components,
        "starting stack controller"
    );

    let watch = watcher::Config::default();
    let namespace = config.watch_namespace.clone();
    let store = Arc::new(KubeObjectStore::new(client.clone()));
    let context = Arc::new(ControllerContext {
        reconciler: StackReconciler::new(store, config),
    });

    Controller::new(stacks, watch.clone())
        .owns(scoped::<ServiceAccount>(&client, namespace.as_deref()), watch.clone())
        .owns(scoped::<ConfigMap>(&client, namespace.as_deref()), watch.clone())
        .owns(scoped::<StatefulSet>(&client, namespace.as_deref()), watch.clone())
        .owns(scoped::<Deployment>(&client, namespace.as_deref()), watch.clone())
        .owns(scoped::<DaemonSet>(&client, namespace.as_deref()), watch.clone())
        .owns(scoped::<Service>(&client, namespace.as_deref()), watch)
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((stack, _)) => tracing::debug!(stack = %stack, "reconciled"),
                Err(err) => tracing::warn!(error = %err, "reconcile failed"),
            }
        })
        .await;

    tracing::info!("stack controller stopped");
    Ok(())
}

fn scoped<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

async fn reconcile(
    stack: Arc<ObservabilityStack>,
    context: Arc<ControllerContext>,
) -> Result<Action, ControllerError> {
    let stack_ref = StackRef::from_stack(&stack)?;
    context
        .reconciler
        .reconcile(&stack_ref)
        .await
        .map_err(ControllerError::Reconcile)?;
    Ok(Action::requeue(context.reconciler.config().requeue_after()))
}

fn error_policy(
    stack: Arc<ObservabilityStack>,
    err: &ControllerError,
    context: Arc<ControllerContext>,
) -> Action {
    let delay = context.reconciler.config().error_requeue();
    tracing::warn!(
        stack = ?stack.metadata.name,
        namespace = ?stack.metadata.namespace,
        error = %err,
        retry_in_secs = delay.as_secs(),
        "scheduling retry"
    );
    Action::requeue(delay)
}
