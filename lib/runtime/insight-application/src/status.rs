//! Records the outcome of each pass as the stack's `Ready` condition.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use insight_domain::{
    ConditionStatus, ObservabilityStackStatus, READY_CONDITION, StackCondition, StackRef,
    next_transition_time, upsert_condition,
};
use insight_ports::ObjectStore;

pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_FAILED: &str = "ReconcileFailed";

pub struct StatusReporter {
    store: Arc<dyn ObjectStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Marks a stack that has never been reported on as reconciling.
    pub async fn begin(
        &self,
        stack: &StackRef,
        generation: Option<i64>,
        status: &mut ObservabilityStackStatus,
    ) -> Result<bool> {
        if ready(status).is_some() {
            return Ok(false);
        }
        self.apply(
            stack,
            status,
            ConditionStatus::Unknown,
            REASON_RECONCILING,
            "reconciliation in progress".to_string(),
            generation,
        )
        .await
    }

    /// Records a finished pass. `failure` carries the aborting error chain.
    pub async fn finish(
        &self,
        stack: &StackRef,
        generation: Option<i64>,
        status: &mut ObservabilityStackStatus,
        failure: Option<&anyhow::Error>,
    ) -> Result<bool> {
        let (state, reason, message) = match failure {
            None => (
                ConditionStatus::True,
                REASON_RECONCILED,
                "all enabled components converged".to_string(),
            ),
            Some(err) => (ConditionStatus::False, REASON_FAILED, format!("{err:#}")),
        };
        self.apply(stack, status, state, reason, message, generation)
            .await
    }

    /// Writes only when the observation differs from the recorded one.
    async fn apply(
        &self,
        stack: &StackRef,
        status: &mut ObservabilityStackStatus,
        state: ConditionStatus,
        reason: &str,
        message: String,
        generation: Option<i64>,
    ) -> Result<bool> {
        let previous = ready(status);
        let mut condition = StackCondition {
            type_: READY_CONDITION.to_string(),
            status: state,
            reason: reason.to_string(),
            message,
            last_transition_time: Utc::now(),
            observed_generation: generation,
        };
        if previous.is_some_and(|p| p.same_observation(&condition)) {
            return Ok(false);
        }
        condition.last_transition_time = next_transition_time(
            previous.map(|p| p.last_transition_time),
            condition.last_transition_time,
        );
        upsert_condition(&mut status.conditions, condition);
        self.store
            .update_stack_status(stack, status)
            .await
            .with_context(|| format!("failed to update status of {stack}"))?;
        tracing::debug!(stack = %stack, reason, "status updated");
        Ok(true)
    }
}

fn ready(status: &ObservabilityStackStatus) -> Option<&StackCondition> {
    status
        .conditions
        .iter()
        .find(|c| c.type_ == READY_CONDITION)
}
