//! Stage declaration.

use crate::context::StageContext;
use crate::step::Step;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use waypoint_core::{StageName, StepError};

/// A stage `before`/`after` hook.
#[async_trait]
pub trait StageHook: Send + Sync {
    async fn call(&self, ctx: StageContext) -> Result<(), StepError>;
}

#[async_trait]
impl<F, Fut> StageHook for F
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    async fn call(&self, ctx: StageContext) -> Result<(), StepError> {
        (self)(ctx).await
    }
}

/// A named, ordered group of steps.
///
/// ```
/// use waypoint::prelude::*;
///
/// let stage = Stage::new("withdraw")
///     .step(Step::new("validate").func(|_ctx: StepContext| async { Ok(()) }))
///     .step(Step::new("send").func(|_ctx: StepContext| async { Ok(()) }));
///
/// assert_eq!(stage.step_names().count(), 2);
/// assert_eq!(stage.steps()[1].state().current_stage(), "withdraw");
/// ```
#[derive(Clone)]
pub struct Stage {
    pub(crate) name: StageName,
    pub(crate) steps: Vec<Step>,
    pub(crate) before: Option<Arc<dyn StageHook>>,
    pub(crate) after: Option<Arc<dyn StageHook>>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("has_before", &self.before.is_some())
            .field("has_after", &self.after.is_some())
            .finish()
    }
}

impl Stage {
    /// Creates an empty stage.
    pub fn new(name: impl Into<StageName>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            before: None,
            after: None,
        }
    }

    /// Appends a step. Name clashes are reported when the workflow initializes.
    pub fn step(mut self, step: Step) -> Self {
        self.add_step(step);
        self
    }

    /// Appends a step in place.
    pub fn add_step(&mut self, step: Step) {
        step.state.stamp(self.name.clone(), step.name.clone());
        self.steps.push(step);
    }

    /// Sets the hook that runs before the stage's steps.
    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    /// Sets the hook that runs after the stage's steps.
    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    /// Stage name.
    pub fn name(&self) -> &StageName {
        &self.name
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// Returns `true` if the stage has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
