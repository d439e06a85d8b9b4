//! Engine-wide control state.

use crate::name::{StageName, StepName};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Workflow-level flags, failure payload and pending branch override.
///
/// Any of the three flags halts the stage loop once a step or hook raises it.
/// A new run clears them before the first stage, so a snapshot's flags always
/// describe how the previous run ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_failed: bool,
    /// Structured payload for compensation routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<StageName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepName>,
}

impl WorkflowState {
    /// Returns `true` if any halting flag is raised.
    pub fn is_halted(&self) -> bool {
        self.is_suspended || self.is_completed || self.is_failed
    }

    /// Clears the halting flags. The error text and payload are kept for
    /// compensation steps.
    pub fn clear_flags(&mut self) {
        self.is_suspended = false;
        self.is_completed = false;
        self.is_failed = false;
    }

    /// Sets the branch override. Traversal skips ahead until it reaches the
    /// target, then clears it.
    pub fn branch_to(&mut self, stage: Option<StageName>, step: Option<StepName>) {
        self.next_stage = stage;
        self.next_step = step;
    }

    /// Returns `true` if a branch override is pending.
    pub fn has_branch(&self) -> bool {
        self.next_stage.is_some() || self.next_step.is_some()
    }

    /// Records a failure the way the engine does before calling the
    /// on-failure hook.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.is_failed = true;
        self.error = Some(error.into());
    }
}
