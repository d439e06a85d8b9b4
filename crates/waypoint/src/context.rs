//! Handles passed to step bodies and hooks.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use waypoint_core::{Snapshot, StageName, StepName, StepState, WorkflowState};

/// Cooperative stop flag raised when the caller cancels a run.
#[derive(Debug, Clone)]
pub(crate) struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    pub(crate) fn raise(&self) {
        self.0.send_replace(true);
    }

    pub(crate) fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is raised.
    pub(crate) async fn raised(&self) {
        let mut rx = self.0.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Shared view of a running workflow.
///
/// Cloning is cheap. The state lock is never held across an `.await`; all
/// access goes through short closures.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    state: Arc<Mutex<WorkflowState>>,
    steps: Arc<[Arc<StepState>]>,
    stop: StopSignal,
}

impl WorkflowHandle {
    pub(crate) fn new(
        state: Arc<Mutex<WorkflowState>>,
        steps: Vec<Arc<StepState>>,
        stop: StopSignal,
    ) -> Self {
        Self {
            state,
            steps: steps.into(),
            stop,
        }
    }

    /// Returns a copy of the workflow state.
    pub fn state(&self) -> WorkflowState {
        self.state.lock().clone()
    }

    /// Mutates the workflow state.
    ///
    /// ```
    /// # fn demo(handle: &waypoint::WorkflowHandle) {
    /// handle.update(|state| {
    ///     state.custom_error = Some(serde_json::json!({ "code": "NO_ENERGY" }));
    ///     state.next_stage = Some("compensate".into());
    /// });
    /// # }
    /// ```
    pub fn update<R>(&self, f: impl FnOnce(&mut WorkflowState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Captures every step state plus the workflow state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.steps.iter().map(|s| s.data()).collect(),
            self.state(),
        )
    }

    /// Returns the live state of a step.
    pub fn step_state(&self, stage: &str, step: &str) -> Option<Arc<StepState>> {
        self.steps
            .iter()
            .find(|s| s.current_stage() == stage && s.current_step() == step)
            .cloned()
    }

    /// Returns `true` once the caller has cancelled the run.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_raised()
    }

    pub(crate) fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }
}

/// What a stage hook receives.
#[derive(Debug, Clone)]
pub struct StageContext {
    workflow: WorkflowHandle,
    stage: StageName,
}

impl StageContext {
    pub(crate) fn new(workflow: WorkflowHandle, stage: StageName) -> Self {
        Self { workflow, stage }
    }

    pub fn workflow(&self) -> &WorkflowHandle {
        &self.workflow
    }

    pub fn stage(&self) -> &StageName {
        &self.stage
    }
}

/// What a step body or step hook receives.
#[derive(Debug, Clone)]
pub struct StepContext {
    workflow: WorkflowHandle,
    stage: StageName,
    step: StepName,
    kind: Option<String>,
    state: Arc<StepState>,
    attempt: u32,
}

impl StepContext {
    pub(crate) fn new(
        workflow: WorkflowHandle,
        stage: StageName,
        step: StepName,
        kind: Option<String>,
        state: Arc<StepState>,
    ) -> Self {
        Self {
            workflow,
            stage,
            step,
            kind,
            state,
            attempt: 0,
        }
    }

    pub(crate) fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }

    pub fn workflow(&self) -> &WorkflowHandle {
        &self.workflow
    }

    pub fn stage(&self) -> &StageName {
        &self.stage
    }

    /// Name of the running step.
    pub fn step(&self) -> &StepName {
        &self.step
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The step's own state. Clone the `Arc` to hand it to sub-tasks.
    pub fn state(&self) -> &Arc<StepState> {
        &self.state
    }

    /// Zero-based attempt number within the current retry loop.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn set_arg<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), serde_json::Error> {
        self.state.set_arg(key, value)
    }

    /// Returns a raw value stored by this step.
    pub fn arg(&self, key: &str) -> Option<Value> {
        self.state.arg(key)
    }

    pub fn arg_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.state.arg_as(key)
    }

    /// Reads an argument stored by another step of this workflow.
    pub fn step_arg(&self, stage: &str, step: &str, key: &str) -> Option<Value> {
        self.workflow.step_state(stage, step)?.arg(key)
    }

    /// Suspends the step and halts the run once the body returns.
    pub fn suspend(&self) {
        self.state.suspend();
        self.workflow.update(|s| s.is_suspended = true);
    }

    /// Asks the engine to jump to `stage`/`step` after this step finishes.
    pub fn branch_to(&self, stage: Option<StageName>, step: Option<StepName>) {
        self.state.set_next(stage, step);
    }

    pub fn is_stopping(&self) -> bool {
        self.workflow.is_stopping()
    }
}
