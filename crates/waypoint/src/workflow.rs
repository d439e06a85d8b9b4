//! Workflow driver: stage loop, lifecycle hooks and cancellation.

use crate::config::WorkflowConfig;
use crate::context::{StageContext, StepContext, StopSignal, WorkflowHandle};
use crate::hooks::{FailureDisposition, NoHooks, WorkflowHooks};
use crate::retry::execute_with_retry;
use crate::stage::Stage;
use crate::step::Step;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use waypoint_core::{
    Control, HookType, Snapshot, StageName, StepError, StepName, StepState, StepStatus,
    WorkflowError, WorkflowState,
};

/// Ordered stages plus the state and hooks that drive them.
///
/// A workflow is built once per run. To resume, rebuild the same stage graph,
/// [`restore`](Workflow::restore) the last snapshot and call
/// [`run`](Workflow::run) again: completed and skipped steps are not invoked.
pub struct Workflow {
    stages: Vec<Stage>,
    state: Arc<Mutex<WorkflowState>>,
    hooks: Arc<dyn WorkflowHooks>,
    config: WorkflowConfig,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("stages", &self.stages)
            .field("state", &*self.state.lock())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            state: Arc::new(Mutex::new(WorkflowState::default())),
            hooks: Arc::new(NoHooks),
            config: WorkflowConfig::default(),
        }
    }
}

impl Workflow {
    /// Creates a workflow with no stages and no hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    /// Appends a stage. Names are validated when the run initializes.
    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Replaces the workflow hooks.
    pub fn with_hooks(mut self, hooks: impl WorkflowHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Declared stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> impl Iterator<Item = &StageName> {
        self.stages.iter().map(Stage::name)
    }

    /// Number of declared stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total number of steps across all stages.
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(|s| s.steps.len()).sum()
    }

    /// Returns a copy of the workflow state.
    pub fn state(&self) -> WorkflowState {
        self.state.lock().clone()
    }

    /// Returns the live state of a declared step.
    pub fn step_state(&self, stage: &str, step: &str) -> Option<Arc<StepState>> {
        self.find_step(stage, step).map(|s| s.state.clone())
    }

    /// Captures every declared step state plus the workflow state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.steps().map(|s| s.state.data()).collect(),
            self.state(),
        )
    }

    /// Loads a snapshot into the declared steps.
    ///
    /// Entries are matched by stage and step name; entries with no declared
    /// counterpart are ignored.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        for data in &snapshot.steps_states {
            match self.find_step(data.current_stage.as_str(), data.current_step.as_str()) {
                Some(step) => step.state.restore(data.clone()),
                None => debug!(
                    "Ignoring snapshot entry for undeclared step '{}/{}'",
                    data.current_stage, data.current_step
                ),
            }
        }
        *self.state.lock() = snapshot.workflow_state.clone();
    }

    /// Decodes and loads a JSON snapshot.
    pub fn restore_json(&mut self, json: &str) -> Result<(), WorkflowError> {
        let snapshot = Snapshot::from_json(json)?;
        self.restore(&snapshot);
        Ok(())
    }

    /// Runs the workflow to completion or interruption.
    pub async fn run(&mut self) -> Result<(), WorkflowError> {
        self.run_until_shutdown(std::future::pending()).await
    }

    /// Runs the workflow, cancelling it when `shutdown` resolves.
    ///
    /// After cancellation the run gets [`WorkflowConfig::shutdown_grace`] to
    /// observe the stop request. Past that window the execution task is
    /// aborted and [`WorkflowError::ShutdownTimeout`] is returned.
    ///
    /// Step and hook failures are passed to [`WorkflowHooks::on_failure`]
    /// before being returned.
    pub async fn run_until_shutdown<F>(&mut self, shutdown: F) -> Result<(), WorkflowError>
    where
        F: Future<Output = ()>,
    {
        let stop = StopSignal::new();
        let handle = WorkflowHandle::new(
            self.state.clone(),
            self.steps().map(|s| s.state.clone()).collect(),
            stop.clone(),
        );
        let runner = Runner {
            hooks: self.hooks.clone(),
            handle: handle.clone(),
            config: self.config.clone(),
            previous: None,
        };
        let grace = self.config.shutdown_grace;
        let mut task = tokio::spawn(runner.execute(self.stages.clone()));

        let joined = tokio::select! {
            joined = &mut task => joined,
            () = shutdown => {
                info!("Shutdown requested, waiting up to {:?} for the workflow to stop", grace);
                stop.raise();
                match tokio::time::timeout(grace, &mut task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        task.abort();
                        error!("Workflow did not stop within {:?}, abandoning it", grace);
                        return Err(WorkflowError::ShutdownTimeout(grace));
                    }
                }
            }
        };

        match joined.map_err(|e| WorkflowError::Task(e.to_string()))? {
            Err(error) if error.is_execution_failure() => self.handle_failure(&handle, error).await,
            result => result,
        }
    }

    async fn handle_failure(
        &self,
        handle: &WorkflowHandle,
        error: WorkflowError,
    ) -> Result<(), WorkflowError> {
        if error.is_no_console() {
            debug!("Workflow paused: {}", error);
        } else {
            error!("Workflow failed: {}", error);
            handle.update(|s| s.mark_failed(error.to_string()));
        }

        match self.hooks.on_failure(handle, &error).await {
            FailureDisposition::Propagate => Err(error),
            FailureDisposition::Suppress => {
                info!("Failure suppressed by on_failure hook: {}", error);
                Ok(())
            }
        }
    }

    fn steps(&self) -> impl Iterator<Item = &Step> {
        self.stages.iter().flat_map(|s| s.steps.iter())
    }

    fn find_step(&self, stage: &str, step: &str) -> Option<&Step> {
        self.stages
            .iter()
            .filter(|s| s.name == *stage)
            .flat_map(|s| s.steps.iter())
            .find(|s| s.name == *step)
    }
}

/// Builder for constructing [`Workflow`] instances.
///
/// ```
/// use waypoint::prelude::*;
///
/// let result = Workflow::builder()
///     .stage(
///         Stage::new("withdraw")
///             .step(Step::new("send").func(|_ctx: StepContext| async { Ok(()) }))
///             .step(Step::new("send").func(|_ctx: StepContext| async { Ok(()) })),
///     )
///     .build();
///
/// assert!(matches!(result, Err(WorkflowError::Configuration(_))));
/// ```
#[derive(Default)]
pub struct WorkflowBuilder {
    stages: Vec<Stage>,
    hooks: Option<Arc<dyn WorkflowHooks>>,
    config: WorkflowConfig,
}

impl WorkflowBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the workflow hooks.
    pub fn hooks(mut self, hooks: impl WorkflowHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Sets the engine configuration.
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the declaration and builds the workflow.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        validate(&self.stages)?;
        Ok(Workflow {
            stages: self.stages,
            state: Arc::new(Mutex::new(WorkflowState::default())),
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
            config: self.config,
        })
    }
}

fn validate(stages: &[Stage]) -> Result<(), WorkflowError> {
    let mut stage_names = HashSet::new();
    for (position, stage) in stages.iter().enumerate() {
        if stage.name.as_str().is_empty() {
            return Err(WorkflowError::Configuration(format!(
                "stage at position {position} has an empty name"
            )));
        }
        if !stage_names.insert(stage.name.as_str()) {
            return Err(WorkflowError::Configuration(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }

        let mut step_names = HashSet::new();
        for step in &stage.steps {
            if step.name.as_str().is_empty() {
                return Err(WorkflowError::Configuration(format!(
                    "stage '{}' has a step with an empty name",
                    stage.name
                )));
            }
            if !step_names.insert(step.name.as_str()) {
                return Err(WorkflowError::Configuration(format!(
                    "duplicate step name '{}' in stage '{}'",
                    step.name, stage.name
                )));
            }
            if step.func.is_none() {
                return Err(WorkflowError::Configuration(format!(
                    "step '{}/{}' has no function",
                    stage.name, step.name
                )));
            }
        }
    }
    Ok(())
}

/// How the stage loop proceeds after a unit finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    SkipStage,
    Break,
    Exit,
}

impl From<Control> for Flow {
    fn from(control: Control) -> Self {
        match control {
            Control::SkipStep => Flow::Next,
            Control::SkipStage => Flow::SkipStage,
            Control::BreakStages => Flow::Break,
            Control::ExitWorkflow => Flow::Exit,
        }
    }
}

enum Failure {
    Body(StepError),
    Hook(HookType, StepError),
}

impl Failure {
    fn error(&self) -> &StepError {
        match self {
            Failure::Body(e) | Failure::Hook(_, e) => e,
        }
    }

    fn into_workflow_error(self, stage: &StageName, step: &StepName) -> WorkflowError {
        match self {
            Failure::Body(e) if e.is_interrupted() => WorkflowError::Cancelled,
            Failure::Body(source) => WorkflowError::StepFailed {
                stage: stage.clone(),
                step: step.clone(),
                source,
            },
            Failure::Hook(hook_type, source) => WorkflowError::HookFailed {
                hook_type,
                location: format!("{stage}/{step}"),
                source,
            },
        }
    }
}

/// Splits a hook result into a control signal or a failure.
fn hook_result(
    result: Result<(), StepError>,
    hook_type: HookType,
    location: &str,
) -> Result<Option<Control>, WorkflowError> {
    match result {
        Ok(()) => Ok(None),
        Err(e) => match e.control() {
            Some(control) => Ok(Some(control)),
            None => Err(WorkflowError::HookFailed {
                hook_type,
                location: location.to_string(),
                source: e,
            }),
        },
    }
}

/// Marks steps that never ran as skipped. Failed and finished steps keep their record.
fn skip_untouched(stage: &StageName, steps: &[Step]) {
    for step in steps {
        let status = step.state.status();
        if !status.is_done() && status != StepStatus::Failed {
            step.state.skip();
            debug!("Step '{}/{}' skipped", stage, step.name);
        }
    }
}

/// Execution half of a run, owned by the spawned task.
struct Runner {
    hooks: Arc<dyn WorkflowHooks>,
    handle: WorkflowHandle,
    config: WorkflowConfig,
    previous: Option<(StageName, StepName)>,
}

impl Runner {
    async fn execute(mut self, mut stages: Vec<Stage>) -> Result<(), WorkflowError> {
        self.init(&mut stages)?;
        let result = self.run_stages(&stages).await;

        if let Err(e) = self.hooks.after_workflow(&self.handle).await {
            warn!("Hook '{}' failed: {}", HookType::AfterWorkflow, e);
        }
        result
    }

    fn init(&self, stages: &mut [Stage]) -> Result<(), WorkflowError> {
        validate(stages)?;
        for stage in stages.iter_mut() {
            for step in stage.steps.iter_mut() {
                step.timeout.get_or_insert(self.config.default_step_timeout);
                step.state.stamp(stage.name.clone(), step.name.clone());
            }
        }
        self.handle.update(WorkflowState::clear_flags);
        debug!("Workflow initialized with {} stage(s)", stages.len());
        Ok(())
    }

    async fn run_stages(&mut self, stages: &[Stage]) -> Result<(), WorkflowError> {
        let before = self.hooks.before_workflow(&self.handle).await;
        match hook_result(before, HookType::BeforeWorkflow, "workflow")?.map(Flow::from) {
            Some(Flow::Break | Flow::Exit) => {
                info!("Workflow stopped by '{}' hook", HookType::BeforeWorkflow);
                return Ok(());
            }
            _ => {}
        }

        for stage in stages {
            if self.handle.is_stopping() {
                info!("Stop requested before stage '{}'", stage.name);
                return Err(WorkflowError::Cancelled);
            }
            if self.handle.state().is_halted() {
                info!("Workflow halted before stage '{}'", stage.name);
                return Ok(());
            }

            match self.run_stage(stage).await? {
                Flow::Next | Flow::SkipStage => {}
                Flow::Break => {
                    info!("Stage loop stopped at stage '{}'", stage.name);
                    return Ok(());
                }
                Flow::Exit => {
                    info!("Workflow exited at stage '{}'", stage.name);
                    return Ok(());
                }
            }
        }

        let state = self.handle.state();
        if state.has_branch() {
            warn!(
                "Branch target {:?}/{:?} was never reached",
                state.next_stage, state.next_step
            );
        }
        self.handle.update(|s| s.is_completed = true);
        info!("Workflow completed");
        Ok(())
    }

    async fn run_stage(&mut self, stage: &Stage) -> Result<Flow, WorkflowError> {
        if let Some(target) = self.handle.state().next_stage {
            if target != stage.name {
                debug!("Stage '{}' skipped, branching to '{}'", stage.name, target);
                skip_untouched(&stage.name, &stage.steps);
                return Ok(Flow::Next);
            }
            self.handle.update(|s| s.next_stage = None);
            debug!("Branch target stage '{}' reached", stage.name);
        }

        if stage.is_empty() {
            warn!("Stage '{}' has no steps, skipping", stage.name);
            return Ok(Flow::Next);
        }

        info!("Stage '{}' started", stage.name);
        if let Some(hook) = &stage.before {
            let result = hook
                .call(StageContext::new(self.handle.clone(), stage.name.clone()))
                .await;
            match hook_result(result, HookType::BeforeStage, stage.name.as_str())?.map(Flow::from) {
                None => {}
                Some(Flow::Next | Flow::SkipStage) => {
                    skip_untouched(&stage.name, &stage.steps);
                    return self.finish_stage(stage).await;
                }
                Some(flow) => return Ok(flow),
            }
        }

        for (index, step) in stage.steps.iter().enumerate() {
            if self.handle.is_stopping() {
                info!("Stop requested before step '{}/{}'", stage.name, step.name);
                return Err(WorkflowError::Cancelled);
            }
            if let Some(target) = self.handle.state().next_step {
                if target != step.name {
                    skip_untouched(&stage.name, std::slice::from_ref(step));
                    continue;
                }
                self.handle.update(|s| s.next_step = None);
                debug!("Branch target step '{}/{}' reached", stage.name, step.name);
            }

            let rest = &stage.steps[index + 1..];
            match self.run_step(stage, step).await? {
                Flow::Next => {}
                Flow::SkipStage => {
                    skip_untouched(&stage.name, rest);
                    break;
                }
                flow @ (Flow::Break | Flow::Exit) => return Ok(flow),
            }

            if self.handle.state().is_halted() {
                info!("Workflow halted after step '{}/{}'", stage.name, step.name);
                return Ok(Flow::Break);
            }
            if let Some(target) = self.handle.state().next_stage {
                if target != stage.name {
                    skip_untouched(&stage.name, rest);
                    break;
                }
                self.handle.update(|s| s.next_stage = None);
            }
        }

        self.finish_stage(stage).await
    }

    async fn finish_stage(&self, stage: &Stage) -> Result<Flow, WorkflowError> {
        if let Some(hook) = &stage.after {
            let result = hook
                .call(StageContext::new(self.handle.clone(), stage.name.clone()))
                .await;
            match hook_result(result, HookType::AfterStage, stage.name.as_str())?.map(Flow::from) {
                Some(flow @ (Flow::Break | Flow::Exit)) => return Ok(flow),
                _ => {}
            }
        }
        info!("Stage '{}' finished", stage.name);
        Ok(Flow::Next)
    }

    async fn run_step(&mut self, stage: &Stage, step: &Step) -> Result<Flow, WorkflowError> {
        let state = &step.state;
        match state.status() {
            status @ (StepStatus::Completed | StepStatus::Skipped) => {
                debug!("Step '{}/{}' already {}, skipping", stage.name, step.name, status);
                return Ok(Flow::Next);
            }
            StepStatus::Suspended => {
                info!("Step '{}/{}' is suspended, halting workflow", stage.name, step.name);
                self.handle.update(|s| s.is_suspended = true);
                return Ok(Flow::Break);
            }
            _ => {}
        }

        state.begin(self.previous.replace((stage.name.clone(), step.name.clone())));
        let ctx = StepContext::new(
            self.handle.clone(),
            stage.name.clone(),
            step.name.clone(),
            step.kind.clone(),
            state.clone(),
        );
        info!("Step '{}/{}' started", stage.name, step.name);

        let outcome = match self.hooks.before_each_step(&ctx).await {
            Ok(()) => self.execute_step(step, &ctx).await,
            Err(e) => Err(Failure::Hook(HookType::BeforeEachStep, e)),
        };

        let mut result = match outcome {
            Ok(()) if state.status() == StepStatus::Suspended => {
                info!("Step '{}/{}' suspended", stage.name, step.name);
                self.handle.update(|s| s.is_suspended = true);
                Ok(Flow::Break)
            }
            Ok(()) => {
                state.complete();
                info!("Step '{}/{}' completed successfully", stage.name, step.name);
                Ok(Flow::Next)
            }
            Err(failure) => match failure.error().control() {
                Some(control) => {
                    if state.status() != StepStatus::Suspended {
                        state.skip();
                    }
                    debug!("Step '{}/{}' signalled {}", stage.name, step.name, control);
                    Ok(Flow::from(control))
                }
                None => {
                    state.fail(failure.error().to_string());
                    Err(failure.into_workflow_error(&stage.name, &step.name))
                }
            },
        };

        let (next_stage, next_step) = state.take_next();
        if next_stage.is_some() || next_step.is_some() {
            debug!(
                "Step '{}/{}' branches to {:?}/{:?}",
                stage.name, step.name, next_stage, next_step
            );
            self.handle.update(|s| s.branch_to(next_stage, next_step));
        }

        let after = self.hooks.after_each_step(&ctx).await;
        if result.is_err() {
            if let Err(e) = after {
                warn!(
                    "Hook '{}' failed for '{}/{}': {}",
                    HookType::AfterEachStep,
                    stage.name,
                    step.name,
                    e
                );
            }
        } else {
            let location = format!("{}/{}", stage.name, step.name);
            if let Some(control) = hook_result(after, HookType::AfterEachStep, &location)? {
                if matches!(result, Ok(Flow::Next)) {
                    result = Ok(Flow::from(control));
                }
            }
        }

        if step.finish_workflow && matches!(result, Ok(Flow::Next)) {
            info!("Step '{}/{}' finishes the workflow", stage.name, step.name);
            result = Ok(Flow::Break);
        }
        result
    }

    async fn execute_step(&self, step: &Step, ctx: &StepContext) -> Result<(), Failure> {
        if let Some(before) = &step.before {
            before
                .call(ctx.clone())
                .await
                .map_err(|e| Failure::Hook(HookType::BeforeStep, e))?;
        }

        let Some(func) = step.func.as_deref() else {
            return Err(Failure::Body(StepError::failed("step has no function")));
        };
        let timeout = step.timeout.unwrap_or(self.config.default_step_timeout);
        execute_with_retry(step.retry_policy, func, ctx, timeout, step.max_retries)
            .await
            .map_err(Failure::Body)?;

        if let Some(after) = &step.after {
            after
                .call(ctx.clone())
                .await
                .map_err(|e| Failure::Hook(HookType::AfterStep, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_step(name: &str) -> Step {
        Step::new(name).func(|_ctx: StepContext| async { Ok(()) })
    }

    fn counting_step(name: &str, calls: Arc<AtomicU32>) -> Step {
        Step::new(name).func(move |_ctx: StepContext| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn test_builder_rejects_duplicate_stage() {
        let result = Workflow::builder()
            .stage(Stage::new("withdraw").step(ok_step("send")))
            .stage(Stage::new("withdraw").step(ok_step("confirm")))
            .build();
        assert!(
            matches!(result, Err(WorkflowError::Configuration(msg)) if msg.contains("duplicate stage"))
        );
    }

    #[test]
    fn test_builder_rejects_missing_function() {
        let result = Workflow::builder()
            .stage(Stage::new("withdraw").step(Step::new("send")))
            .build();
        assert!(
            matches!(result, Err(WorkflowError::Configuration(msg)) if msg.contains("withdraw/send"))
        );
    }

    #[test]
    fn test_builder_rejects_empty_names() {
        let result = Workflow::builder()
            .stage(Stage::new("").step(ok_step("send")))
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));

        let result = Workflow::builder()
            .stage(Stage::new("withdraw").step(ok_step("")))
            .build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[test]
    fn test_introspection() {
        let workflow = Workflow::builder()
            .stage(Stage::new("withdraw").step(ok_step("validate")).step(ok_step("send")))
            .stage(Stage::new("confirm").step(ok_step("wait")))
            .build()
            .expect("valid workflow");

        assert_eq!(workflow.stage_count(), 2);
        assert_eq!(workflow.step_count(), 3);
        let names: Vec<_> = workflow.stage_names().map(StageName::as_str).collect();
        assert_eq!(names, ["withdraw", "confirm"]);
        assert!(workflow.step_state("confirm", "wait").is_some());
        assert!(workflow.step_state("withdraw", "wait").is_none());
    }

    #[test]
    fn test_restore_ignores_unmatched_entries() {
        let mut workflow = Workflow::builder()
            .stage(Stage::new("withdraw").step(ok_step("send")))
            .build()
            .expect("valid workflow");

        let known = StepState::new("withdraw", "send");
        known.complete();
        let unknown = StepState::new("legacy", "send");
        unknown.complete();
        let workflow_state = WorkflowState {
            next_stage: Some("compensate".into()),
            ..WorkflowState::default()
        };

        workflow.restore(&Snapshot::new(vec![known.data(), unknown.data()], workflow_state));

        let state = workflow.step_state("withdraw", "send").expect("declared");
        assert_eq!(state.status(), StepStatus::Completed);
        assert_eq!(workflow.snapshot().steps_states.len(), 1);
        assert_eq!(workflow.state().next_stage.as_ref().map(StageName::as_str), Some("compensate"));
    }

    #[test]
    fn test_restore_json_rejects_garbage() {
        let mut workflow = Workflow::new();
        assert!(matches!(
            workflow.restore_json("{not json"),
            Err(WorkflowError::Snapshot(_))
        ));
    }

    #[tokio::test]
    async fn test_run_completes_and_links_previous() {
        let mut workflow = Workflow::builder()
            .stage(Stage::new("withdraw").step(ok_step("validate")).step(ok_step("send")))
            .build()
            .expect("valid workflow");

        workflow.run().await.expect("run succeeds");

        assert!(workflow.state().is_completed);
        let send = workflow.step_state("withdraw", "send").expect("declared");
        assert_eq!(send.status(), StepStatus::Completed);
        assert_eq!(send.previous_step().as_ref().map(StepName::as_str), Some("validate"));
        assert!(send.end_time().is_some());
    }

    #[tokio::test]
    async fn test_skip_stage_marks_rest_skipped() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut workflow = Workflow::builder()
            .stage(
                Stage::new("delegate")
                    .step(Step::new("check").func(|_ctx: StepContext| async {
                        Err(StepError::SKIP_STAGE)
                    }))
                    .step(counting_step("freeze", calls.clone())),
            )
            .stage(Stage::new("send").step(counting_step("broadcast", calls.clone())))
            .build()
            .expect("valid workflow");

        workflow.run().await.expect("run succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let check = workflow.step_state("delegate", "check").expect("declared");
        let freeze = workflow.step_state("delegate", "freeze").expect("declared");
        assert_eq!(check.status(), StepStatus::Skipped);
        assert_eq!(freeze.status(), StepStatus::Skipped);
        assert!(workflow.state().is_completed);
    }

    #[tokio::test]
    async fn test_exit_workflow_is_success_without_completion() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut workflow = Workflow::builder()
            .stage(
                Stage::new("withdraw")
                    .step(Step::new("noop").func(|_ctx: StepContext| async {
                        Err(StepError::EXIT_WORKFLOW)
                    }))
                    .step(counting_step("send", calls.clone())),
            )
            .build()
            .expect("valid workflow");

        workflow.run().await.expect("exit is not an error");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let state = workflow.state();
        assert!(!state.is_completed);
        assert!(!state.is_failed);
    }

    #[tokio::test]
    async fn test_suspended_step_halts_on_replay() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut workflow = Workflow::builder()
            .stage(
                Stage::new("confirm")
                    .step(counting_step("wait", calls.clone()))
                    .step(counting_step("notify", calls.clone())),
            )
            .build()
            .expect("valid workflow");

        let wait = workflow.step_state("confirm", "wait").expect("declared");
        wait.suspend();

        workflow.run().await.expect("suspension is not an error");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(workflow.state().is_suspended);
        assert!(!workflow.state().is_completed);
    }

    #[tokio::test]
    async fn test_stage_hook_failure_is_hook_failed() {
        let mut workflow = Workflow::builder()
            .stage(
                Stage::new("withdraw")
                    .before(|_ctx: StageContext| async { Err(StepError::failed("locked")) })
                    .step(ok_step("send")),
            )
            .build()
            .expect("valid workflow");

        let err = workflow.run().await.expect_err("hook fails the run");
        assert!(matches!(
            err,
            WorkflowError::HookFailed { hook_type: HookType::BeforeStage, ref location, .. }
                if location == "withdraw"
        ));
        assert!(workflow.state().is_failed);
        assert_eq!(
            workflow.step_state("withdraw", "send").map(|s| s.status()),
            Some(StepStatus::Unknown)
        );
    }
}
