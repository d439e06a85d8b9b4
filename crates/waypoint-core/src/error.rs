//! Control signals and error types.
//!
//! Step bodies and hooks return [`StepError`]. Four of its variants are not
//! failures but traversal signals ([`Control`]); two are wrappers that tag a
//! failure as an expected pause. The engine reports to its caller with
//! [`WorkflowError`].

use crate::name::{StageName, StepName};
use std::time::Duration;
use thiserror::Error;

/// Traversal signals carried by [`StepError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Mark the current step skipped and continue with the next one.
    SkipStep,
    /// Mark the rest of the current stage skipped and continue with the next stage.
    SkipStage,
    /// Stop the stage loop. The run ends without error and without completion.
    BreakStages,
    /// Stop everything and report success.
    ExitWorkflow,
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::SkipStep => write!(f, "skip step"),
            Control::SkipStage => write!(f, "skip stage"),
            Control::BreakStages => write!(f, "break stages"),
            Control::ExitWorkflow => write!(f, "exit workflow"),
        }
    }
}

/// Outcome of a step body or hook other than plain success.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use waypoint_core::{Control, StepError};
///
/// let err = StepError::failed("tx not yet confirmed").snooze(Duration::from_secs(30));
/// assert!(err.is_no_console());
/// assert_eq!(err.snooze_delay(), Some(Duration::from_secs(30)));
///
/// // Signals are recognised through any number of wrappers.
/// let signal = StepError::from(Control::SkipStage).no_console();
/// assert_eq!(signal.control(), Some(Control::SkipStage));
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StepError {
    /// Traversal signal, see [`Control`].
    #[error("{0}")]
    Control(Control),

    /// An expected, non-exceptional failure. Retries still count it, but it is
    /// not logged as an error.
    #[error(transparent)]
    NoConsole(Box<StepError>),

    /// A no-console failure asking the outer scheduler to re-run the workflow
    /// after `delay`.
    #[error("{source} (snooze for {delay:?})")]
    Snooze {
        /// Requested delay before the next run.
        delay: Duration,
        /// The wrapped failure.
        source: Box<StepError>,
    },

    /// A failure described by a message.
    #[error("{0}")]
    Failed(String),

    /// A failure raised by a domain service.
    #[error("{0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The workflow was asked to stop while the step was waiting to retry.
    #[error("interrupted by workflow shutdown")]
    Interrupted,
}

impl StepError {
    /// Skip the current step.
    pub const SKIP_STEP: StepError = StepError::Control(Control::SkipStep);
    /// Skip the rest of the current stage.
    pub const SKIP_STAGE: StepError = StepError::Control(Control::SkipStage);
    /// Stop the stage loop.
    pub const BREAK_STAGES: StepError = StepError::Control(Control::BreakStages);
    /// Stop the workflow successfully.
    pub const EXIT_WORKFLOW: StepError = StepError::Control(Control::ExitWorkflow);

    /// Creates a failure from a message.
    pub fn failed(msg: impl Into<String>) -> Self {
        StepError::Failed(msg.into())
    }

    /// Wraps a domain error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StepError::Source(Box::new(err))
    }

    /// Tags this error as no-console.
    pub fn no_console(self) -> Self {
        StepError::NoConsole(Box::new(self))
    }

    /// Tags this error as snoozable with the requested delay.
    pub fn snooze(self, delay: Duration) -> Self {
        StepError::Snooze {
            delay,
            source: Box::new(self),
        }
    }

    /// Returns the traversal signal carried by this error, looking through
    /// no-console and snooze wrappers and any domain error chain.
    pub fn control(&self) -> Option<Control> {
        match self {
            StepError::Control(c) => Some(*c),
            _ => self.wrapped().and_then(StepError::control),
        }
    }

    /// Returns `true` if this error is a traversal signal rather than a failure.
    pub fn is_control(&self) -> bool {
        self.control().is_some()
    }

    /// Returns `true` if diagnostic logging should be suppressed.
    pub fn is_no_console(&self) -> bool {
        match self {
            StepError::NoConsole(_) | StepError::Snooze { .. } => true,
            _ => self.wrapped().is_some_and(StepError::is_no_console),
        }
    }

    /// Returns `true` if this is a failure rather than a signal or an interruption.
    pub fn is_failure(&self) -> bool {
        !self.is_control() && !self.is_interrupted()
    }

    /// Returns the requested snooze delay, if any wrapper carries one.
    pub fn snooze_delay(&self) -> Option<Duration> {
        match self {
            StepError::Snooze { delay, .. } => Some(*delay),
            _ => self.wrapped().and_then(StepError::snooze_delay),
        }
    }

    /// Returns `true` if the step was interrupted by a shutdown.
    pub fn is_interrupted(&self) -> bool {
        match self {
            StepError::Interrupted => true,
            _ => self.wrapped().is_some_and(StepError::is_interrupted),
        }
    }

    /// The next `StepError` down the wrapping chain. For `Source` this is the
    /// first `StepError` found by walking `Error::source()`.
    fn wrapped(&self) -> Option<&StepError> {
        match self {
            StepError::NoConsole(inner) => Some(&**inner),
            StepError::Snooze { source, .. } => Some(&**source),
            StepError::Source(err) => {
                let first: &(dyn std::error::Error + 'static) = &**err;
                let mut next = Some(first);
                while let Some(err) = next {
                    if let Some(step_error) = err.downcast_ref::<StepError>() {
                        return Some(step_error);
                    }
                    next = err.source();
                }
                None
            }
            _ => None,
        }
    }
}

impl From<Control> for StepError {
    fn from(c: Control) -> Self {
        StepError::Control(c)
    }
}

impl From<String> for StepError {
    fn from(msg: String) -> Self {
        StepError::Failed(msg)
    }
}

impl From<&str> for StepError {
    fn from(msg: &str) -> Self {
        StepError::Failed(msg.to_string())
    }
}

/// The hook that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookType {
    /// Runs once before the first stage.
    BeforeWorkflow,
    /// Runs once after the stage loop.
    AfterWorkflow,
    /// Runs before a stage's steps.
    BeforeStage,
    /// Runs after a stage's steps.
    AfterStage,
    /// A step's own `before` hook.
    BeforeStep,
    /// A step's own `after` hook.
    AfterStep,
    /// The workflow-wide hook that runs before every step.
    BeforeEachStep,
    /// The workflow-wide hook that runs after every step.
    AfterEachStep,
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookType::BeforeWorkflow => write!(f, "before_workflow"),
            HookType::AfterWorkflow => write!(f, "after_workflow"),
            HookType::BeforeStage => write!(f, "before_stage"),
            HookType::AfterStage => write!(f, "after_stage"),
            HookType::BeforeStep => write!(f, "before_step"),
            HookType::AfterStep => write!(f, "after_step"),
            HookType::BeforeEachStep => write!(f, "before_each_step"),
            HookType::AfterEachStep => write!(f, "after_each_step"),
        }
    }
}

/// Errors reported by the engine.
///
/// ```
/// use waypoint_core::{StepError, WorkflowError};
///
/// fn handle(error: WorkflowError) {
///     match error {
///         WorkflowError::StepFailed { stage, step, source } => {
///             if let Some(delay) = source.snooze_delay() {
///                 eprintln!("{stage}/{step} asked to run again in {delay:?}");
///             }
///         }
///         WorkflowError::Configuration(msg) => eprintln!("bad workflow: {msg}"),
///         WorkflowError::ShutdownTimeout(grace) => eprintln!("stuck for {grace:?}"),
///         other => eprintln!("error: {other}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A step failed after all retry attempts.
    #[error("Step '{stage}/{step}' failed: {source}")]
    StepFailed {
        /// Stage owning the step.
        stage: StageName,
        /// The failed step.
        step: StepName,
        /// The last error returned by the step body.
        source: StepError,
    },

    /// A lifecycle hook failed.
    #[error("Hook '{hook_type}' failed in '{location}': {source}")]
    HookFailed {
        /// Which hook failed.
        hook_type: HookType,
        /// `workflow`, the stage name, or `stage/step`.
        location: String,
        /// The error returned by the hook.
        source: StepError,
    },

    /// The stage/step declaration is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    /// A persisted snapshot could not be decoded.
    #[error("Invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The run did not observe the stop request within the grace window.
    #[error("Workflow did not stop within the {0:?} shutdown grace window")]
    ShutdownTimeout(Duration),

    /// The run observed the stop request and exited.
    #[error("Workflow cancelled")]
    Cancelled,

    /// The requested step/key pair is not in the snapshot.
    #[error("Argument '{key}' not found for step '{step}'")]
    ArgNotFound {
        /// Step that was expected to store the argument.
        step: StepName,
        /// The missing key.
        key: String,
    },

    /// The execution task ended abnormally.
    #[error("Workflow task aborted: {0}")]
    Task(String),
}

impl WorkflowError {
    /// Returns the step or hook error behind this failure.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            WorkflowError::StepFailed { source, .. } | WorkflowError::HookFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Returns `true` for step and hook failures, the errors that reach the
    /// on-failure hook.
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            WorkflowError::StepFailed { .. } | WorkflowError::HookFailed { .. }
        )
    }

    /// Returns `true` if the underlying step error is tagged no-console.
    pub fn is_no_console(&self) -> bool {
        self.step_error().is_some_and(StepError::is_no_console)
    }

    /// Returns the delay a snoozed step asked for.
    pub fn snooze_delay(&self) -> Option<Duration> {
        self.step_error().and_then(StepError::snooze_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_seen_through_wrappers() {
        let err = StepError::BREAK_STAGES.no_console();
        assert_eq!(err.control(), Some(Control::BreakStages));

        let err = StepError::from(Control::ExitWorkflow).snooze(Duration::from_secs(5));
        assert_eq!(err.control(), Some(Control::ExitWorkflow));

        assert_eq!(StepError::failed("boom").control(), None);
    }

    #[derive(Debug, Error)]
    #[error("rpc call failed")]
    struct RpcError {
        #[source]
        cause: StepError,
    }

    #[test]
    fn test_signals_seen_through_domain_errors() {
        let direct = StepError::other(StepError::SKIP_STEP);
        assert_eq!(direct.control(), Some(Control::SkipStep));
        assert!(!direct.is_failure());

        let chained = StepError::other(RpcError {
            cause: StepError::failed("pending").no_console(),
        });
        assert!(chained.is_no_console());
        assert_eq!(chained.control(), None);

        let chained = StepError::other(RpcError {
            cause: StepError::failed("unconfirmed").snooze(Duration::from_secs(30)),
        });
        assert_eq!(chained.snooze_delay(), Some(Duration::from_secs(30)));

        let chained = StepError::other(RpcError {
            cause: StepError::Interrupted,
        });
        assert!(chained.is_interrupted());
    }

    #[test]
    fn test_plain_domain_error_is_a_failure() {
        let err = StepError::other(std::io::Error::other("connection reset"));
        assert_eq!(err.control(), None);
        assert!(!err.is_no_console());
        assert!(err.is_failure());
    }

    #[test]
    fn test_no_console_and_snooze() {
        let err = StepError::failed("pending confirmation");
        assert!(!err.is_no_console());

        let err = err.no_console();
        assert!(err.is_no_console());
        assert_eq!(err.snooze_delay(), None);
        assert_eq!(err.to_string(), "pending confirmation");

        let err = StepError::failed("pending confirmation")
            .snooze(Duration::from_secs(60))
            .no_console();
        assert_eq!(err.snooze_delay(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_error_display() {
        let error = WorkflowError::StepFailed {
            stage: StageName::new("withdraw"),
            step: StepName::new("send"),
            source: StepError::failed("insufficient energy"),
        };
        assert_eq!(
            error.to_string(),
            "Step 'withdraw/send' failed: insufficient energy"
        );

        let error = WorkflowError::ArgNotFound {
            step: StepName::new("send"),
            key: "tx_hash".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Argument 'tx_hash' not found for step 'send'"
        );
    }

    #[test]
    fn test_hook_error_display() {
        let error = WorkflowError::HookFailed {
            hook_type: HookType::AfterEachStep,
            location: "withdraw/send".to_string(),
            source: StepError::failed("store unavailable"),
        };
        assert_eq!(
            error.to_string(),
            "Hook 'after_each_step' failed in 'withdraw/send': store unavailable"
        );
    }

    #[test]
    fn test_workflow_error_snooze_delay() {
        let error = WorkflowError::StepFailed {
            stage: StageName::new("confirm"),
            step: StepName::new("wait"),
            source: StepError::failed("unconfirmed").snooze(Duration::from_secs(120)),
        };
        assert!(error.is_execution_failure());
        assert!(error.is_no_console());
        assert_eq!(error.snooze_delay(), Some(Duration::from_secs(120)));

        assert!(!WorkflowError::Cancelled.is_execution_failure());
        assert_eq!(WorkflowError::Cancelled.snooze_delay(), None);
    }
}
