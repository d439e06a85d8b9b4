//! The unit of persistence and resumption.

use crate::error::WorkflowError;
use crate::state::StepStateData;
use crate::workflow_state::WorkflowState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All step states plus the workflow-level state.
///
/// Hosts store this after every step, keyed by the business entity being
/// processed, and hand it back before the next run.
///
/// ```
/// use waypoint_core::{Snapshot, StepState, WorkflowError};
///
/// let state = StepState::new("withdraw", "send");
/// state.set_arg("tx_hash", "0xabc").expect("serializable");
///
/// let snapshot = Snapshot::new(vec![state.data()], Default::default());
/// let json = snapshot.to_json()?;
/// let loaded = Snapshot::from_json(&json)?;
///
/// assert_eq!(loaded.get_arg_as::<String>("send", "tx_hash")?, "0xabc");
/// assert!(matches!(
///     loaded.get_arg("send", "fee"),
///     Err(WorkflowError::ArgNotFound { .. })
/// ));
/// # Ok::<(), WorkflowError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub steps_states: Vec<StepStateData>,
    #[serde(default)]
    pub workflow_state: WorkflowState,
}

impl Snapshot {
    /// Creates a snapshot from its parts.
    pub fn new(steps_states: Vec<StepStateData>, workflow_state: WorkflowState) -> Self {
        Self {
            steps_states,
            workflow_state,
        }
    }

    /// Finds the entry for a stage/step pair.
    pub fn step_state(&self, stage: &str, step: &str) -> Option<&StepStateData> {
        self.steps_states
            .iter()
            .find(|s| s.current_stage == stage && s.current_step == step)
    }

    /// Looks up `key` in the args of the step called `step`.
    ///
    /// When several stages declare a step with that name, the latest one
    /// holding the key wins.
    pub fn get_arg(&self, step: &str, key: &str) -> Result<&Value, WorkflowError> {
        self.steps_states
            .iter()
            .rev()
            .filter(|s| s.current_step == step)
            .find_map(|s| s.args.get(key))
            .ok_or_else(|| WorkflowError::ArgNotFound {
                step: step.into(),
                key: key.to_string(),
            })
    }

    /// Like [`Snapshot::get_arg`], restricted to one stage.
    pub fn get_stage_arg(&self, stage: &str, step: &str, key: &str) -> Result<&Value, WorkflowError> {
        self.step_state(stage, step)
            .and_then(|s| s.args.get(key))
            .ok_or_else(|| WorkflowError::ArgNotFound {
                step: step.into(),
                key: key.to_string(),
            })
    }

    /// Looks up and deserializes an argument.
    pub fn get_arg_as<T: DeserializeOwned>(&self, step: &str, key: &str) -> Result<T, WorkflowError> {
        let value = self.get_arg(step, key)?;
        Ok(T::deserialize(value)?)
    }

    /// Encodes as a JSON string.
    pub fn to_json(&self) -> Result<String, WorkflowError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Encodes as JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, WorkflowError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes a JSON string.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decodes JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
