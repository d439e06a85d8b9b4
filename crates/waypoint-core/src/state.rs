//! Per-step execution state.

use crate::name::{StageName, StepName};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Free-form results written by a step body.
pub type Args = serde_json::Map<String, Value>;

/// Lifecycle of one step.
///
/// `Unknown` is the state of a step that has never been touched; it is
/// eligible to run like `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// No execution recorded yet.
    #[default]
    Unknown,
    /// Queued for execution in the current run.
    Pending,
    /// The body is running or waiting to retry.
    Processing,
    /// The body succeeded.
    Completed,
    /// Attempts exhausted or a hook failed.
    Failed,
    /// Waiting for an external event; halts the run on replay.
    Suspended,
    /// Passed over by a control signal or a branch.
    Skipped,
}

impl StepStatus {
    /// Returns `true` for states that must never be re-invoked on replay.
    pub fn is_done(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Unknown => "unknown",
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Suspended => "suspended",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable copy of a [`StepState`], the per-step entry of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_stage: Option<StageName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_step: Option<StepName>,
    /// Stage owning the step.
    pub current_stage: StageName,
    /// The step itself.
    pub current_step: StepName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<StageName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<StepName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub args: Args,
}

#[derive(Debug, Clone, Default)]
struct Record {
    previous_stage: Option<StageName>,
    previous_step: Option<StepName>,
    current_stage: StageName,
    current_step: StepName,
    next_stage: Option<StageName>,
    next_step: Option<StepName>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    status: StepStatus,
    error: Option<String>,
}

/// Execution record of one step.
///
/// Shared behind an `Arc` between the engine, the step body, and anyone
/// holding a handle. `Args` sit behind their own lock so that sub-tasks
/// spawned by one step body can write results concurrently.
///
/// ```
/// use waypoint_core::{StepState, StepStatus};
///
/// let state = StepState::new("withdraw", "send");
/// state.set_arg("tx_hash", "0xabc").expect("serializable");
///
/// assert_eq!(state.status(), StepStatus::Unknown);
/// assert_eq!(state.arg_as::<String>("tx_hash").ok().flatten().as_deref(), Some("0xabc"));
/// ```
#[derive(Debug, Default)]
pub struct StepState {
    record: RwLock<Record>,
    args: RwLock<Args>,
}

impl StepState {
    /// Creates an untouched state for the given stage/step pair.
    pub fn new(stage: impl Into<StageName>, step: impl Into<StepName>) -> Self {
        let state = Self::default();
        state.stamp(stage, step);
        state
    }

    /// Sets the current stage/step pointers.
    pub fn stamp(&self, stage: impl Into<StageName>, step: impl Into<StepName>) {
        let mut record = self.record.write();
        record.current_stage = stage.into();
        record.current_step = step.into();
    }

    /// Returns a serializable copy.
    pub fn data(&self) -> StepStateData {
        let record = self.record.read().clone();
        StepStateData {
            previous_stage: record.previous_stage,
            previous_step: record.previous_step,
            current_stage: record.current_stage,
            current_step: record.current_step,
            next_stage: record.next_stage,
            next_step: record.next_step,
            start_time: record.start_time,
            end_time: record.end_time,
            status: record.status,
            error: record.error,
            args: self.args.read().clone(),
        }
    }

    /// Overwrites this state with a persisted copy.
    pub fn restore(&self, data: StepStateData) {
        *self.record.write() = Record {
            previous_stage: data.previous_stage,
            previous_step: data.previous_step,
            current_stage: data.current_stage,
            current_step: data.current_step,
            next_stage: data.next_stage,
            next_step: data.next_step,
            start_time: data.start_time,
            end_time: data.end_time,
            status: data.status,
            error: data.error,
        };
        *self.args.write() = data.args;
    }

    /// Current lifecycle status.
    pub fn status(&self) -> StepStatus {
        self.record.read().status
    }

    /// Overwrites the status without touching timestamps.
    pub fn set_status(&self, status: StepStatus) {
        self.record.write().status = status;
    }

    /// Error text of the last failed execution.
    pub fn error(&self) -> Option<String> {
        self.record.read().error.clone()
    }

    /// Stage owning the step.
    pub fn current_stage(&self) -> StageName {
        self.record.read().current_stage.clone()
    }

    /// Name of the step.
    pub fn current_step(&self) -> StepName {
        self.record.read().current_step.clone()
    }

    /// Stage of the step that ran before this one.
    pub fn previous_stage(&self) -> Option<StageName> {
        self.record.read().previous_stage.clone()
    }

    /// The step that ran before this one.
    pub fn previous_step(&self) -> Option<StepName> {
        self.record.read().previous_step.clone()
    }

    /// When the last execution began.
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.record.read().start_time
    }

    /// When the last execution ended.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.record.read().end_time
    }

    /// Requests a jump once this step finishes. The engine consumes the
    /// pointers and moves them to the workflow-level override.
    pub fn set_next(&self, stage: Option<StageName>, step: Option<StepName>) {
        let mut record = self.record.write();
        record.next_stage = stage;
        record.next_step = step;
    }

    /// Takes the pending jump, leaving both pointers empty.
    pub fn take_next(&self) -> (Option<StageName>, Option<StepName>) {
        let mut record = self.record.write();
        (record.next_stage.take(), record.next_step.take())
    }

    /// Marks the start of an execution: `Pending`, then `Processing`.
    pub fn begin(&self, previous: Option<(StageName, StepName)>) {
        let mut record = self.record.write();
        record.status = StepStatus::Pending;
        let (stage, step) = previous.unzip();
        record.previous_stage = stage;
        record.previous_step = step;
        record.start_time = Some(Utc::now());
        record.end_time = None;
        record.status = StepStatus::Processing;
    }

    /// Marks success and clears the error.
    pub fn complete(&self) {
        let mut record = self.record.write();
        record.status = StepStatus::Completed;
        record.error = None;
        record.end_time = Some(Utc::now());
    }

    /// Marks failure and records the error text.
    pub fn fail(&self, error: impl Into<String>) {
        let mut record = self.record.write();
        record.status = StepStatus::Failed;
        record.error = Some(error.into());
        record.end_time = Some(Utc::now());
    }

    /// Marks the step skipped.
    pub fn skip(&self) {
        let mut record = self.record.write();
        record.status = StepStatus::Skipped;
        record.end_time = Some(Utc::now());
    }

    /// Marks the step suspended. Only step bodies do this; the engine never does.
    pub fn suspend(&self) {
        self.record.write().status = StepStatus::Suspended;
    }

    /// Clears status, timestamps and error so the step runs again. Args are kept.
    pub fn reset(&self) {
        let mut record = self.record.write();
        record.status = StepStatus::Unknown;
        record.error = None;
        record.start_time = None;
        record.end_time = None;
    }

    /// Stores a raw value.
    pub fn insert_arg(&self, key: impl Into<String>, value: Value) {
        self.args.write().insert(key.into(), value);
    }

    /// Serializes and stores a value.
    pub fn set_arg<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.insert_arg(key, value);
        Ok(())
    }

    /// Returns a raw value.
    pub fn arg(&self, key: &str) -> Option<Value> {
        self.args.read().get(key).cloned()
    }

    /// Reads and deserializes a value. `Ok(None)` when the key is absent.
    pub fn arg_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.arg(key).map(serde_json::from_value).transpose()
    }

    /// Removes and returns a value.
    pub fn remove_arg(&self, key: &str) -> Option<Value> {
        self.args.write().remove(key)
    }

    /// Returns a copy of all values.
    pub fn args(&self) -> Args {
        self.args.read().clone()
    }
}
