//! Status conditions recorded on a stack.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY_CONDITION: &str = "Ready";

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl StackCondition {
    /// True when both entries describe the same observation, ignoring time.
    pub fn same_observation(&self, other: &StackCondition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }
}

/// Lifecycle of a stack as seen through its `Ready` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    Unknown,
    Reconciling,
    Ready,
    Degraded,
}

impl StackPhase {
    pub fn from_conditions(conditions: &[StackCondition]) -> Self {
        match conditions.iter().find(|c| c.type_ == READY_CONDITION) {
            None => StackPhase::Unknown,
            Some(c) => match c.status {
                ConditionStatus::True => StackPhase::Ready,
                ConditionStatus::False => StackPhase::Degraded,
                ConditionStatus::Unknown => StackPhase::Reconciling,
            },
        }
    }
}

/// Replaces the entry of the same type, or appends a new one.
pub fn upsert_condition(conditions: &mut Vec<StackCondition>, condition: StackCondition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

/// Keeps transition timestamps strictly increasing at the second granularity
/// the API server persists.
pub fn next_transition_time(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now < prev + Duration::seconds(1) => prev + Duration::seconds(1),
        _ => now,
    }
}
