//! Workflow lifecycle hooks.

use crate::context::{StepContext, WorkflowHandle};
use async_trait::async_trait;
use std::sync::Arc;
use waypoint_core::{StepError, WorkflowError};

/// What `Run` should report after the on-failure hook has seen an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureDisposition {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Return `Ok(())`. Use once the failure and its compensation route have
    /// been recorded durably.
    Suppress,
}

/// Workflow-wide callbacks, injected at construction.
///
/// Every method has a no-op default. The every-step hooks are where hosts
/// persist [`WorkflowHandle::snapshot`] so progress survives a restart.
///
/// # Examples
///
/// ```
/// use waypoint::prelude::*;
/// use async_trait::async_trait;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct SnapshotLog {
///     saved: Mutex<Vec<String>>,
/// }
///
/// #[async_trait]
/// impl WorkflowHooks for SnapshotLog {
///     async fn after_each_step(&self, ctx: &StepContext) -> Result<(), StepError> {
///         let json = ctx.workflow().snapshot().to_json().map_err(StepError::other)?;
///         self.saved.lock().map_err(|e| StepError::failed(e.to_string()))?.push(json);
///         Ok(())
///     }
///
///     async fn on_failure(
///         &self,
///         workflow: &WorkflowHandle,
///         _error: &WorkflowError,
///     ) -> FailureDisposition {
///         workflow.update(|s| s.next_stage = Some("compensate".into()));
///         FailureDisposition::Suppress
///     }
/// }
/// ```
#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    /// Runs once before the first stage. A failure ends the run.
    async fn before_workflow(&self, _workflow: &WorkflowHandle) -> Result<(), StepError> {
        Ok(())
    }

    /// Runs once after the stage loop, whatever its outcome. Failures are logged only.
    async fn after_workflow(&self, _workflow: &WorkflowHandle) -> Result<(), StepError> {
        Ok(())
    }

    /// Runs before every step that is not short-circuited.
    async fn before_each_step(&self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    /// Runs after every executed step, including failed ones.
    async fn after_each_step(&self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    /// Sees step and hook failures once the run has ended. May rewrite the
    /// workflow state to route a later run into a compensation branch.
    async fn on_failure(
        &self,
        _workflow: &WorkflowHandle,
        _error: &WorkflowError,
    ) -> FailureDisposition {
        FailureDisposition::Propagate
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl WorkflowHooks for NoHooks {}

#[async_trait]
impl<T: WorkflowHooks + ?Sized> WorkflowHooks for Arc<T> {
    async fn before_workflow(&self, workflow: &WorkflowHandle) -> Result<(), StepError> {
        (**self).before_workflow(workflow).await
    }

    async fn after_workflow(&self, workflow: &WorkflowHandle) -> Result<(), StepError> {
        (**self).after_workflow(workflow).await
    }

    async fn before_each_step(&self, ctx: &StepContext) -> Result<(), StepError> {
        (**self).before_each_step(ctx).await
    }

    async fn after_each_step(&self, ctx: &StepContext) -> Result<(), StepError> {
        (**self).after_each_step(ctx).await
    }

    async fn on_failure(
        &self,
        workflow: &WorkflowHandle,
        error: &WorkflowError,
    ) -> FailureDisposition {
        (**self).on_failure(workflow, error).await
    }
}
