//! Step declaration.

use crate::context::StepContext;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use waypoint_core::{RetryPolicy, StepError, StepName, StepState};

/// The body of a step, or one of its `before`/`after` hooks.
///
/// Closures `Fn(StepContext) -> impl Future<Output = Result<(), StepError>>`
/// implement it; implement it by hand for steps bound to domain services.
///
/// # Examples
///
/// ```
/// use waypoint::prelude::*;
/// use async_trait::async_trait;
///
/// struct CheckBalance {
///     minimum: u64,
/// }
///
/// #[async_trait]
/// impl StepFn for CheckBalance {
///     async fn call(&self, ctx: StepContext) -> Result<(), StepError> {
///         let balance: u64 = ctx.arg_as("balance").ok().flatten().unwrap_or(0);
///         if balance < self.minimum {
///             return Err(StepError::failed("balance too low").no_console());
///         }
///         Ok(())
///     }
/// }
///
/// let step = Step::new("check_balance").handler(CheckBalance { minimum: 10 });
/// assert_eq!(step.name(), "check_balance");
/// ```
#[async_trait]
pub trait StepFn: Send + Sync {
    async fn call(&self, ctx: StepContext) -> Result<(), StepError>;
}

#[async_trait]
impl<F, Fut> StepFn for F
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StepError>> + Send,
{
    async fn call(&self, ctx: StepContext) -> Result<(), StepError> {
        (self)(ctx).await
    }
}

/// A named unit of work.
///
/// Fields left unset are defaulted when the workflow initializes: the
/// timeout comes from [`WorkflowConfig`](crate::WorkflowConfig), the retry
/// policy is [`RetryPolicy::Linear`]. A step without a function fails
/// initialization.
///
/// `max_retries` is the attempt budget: `0` is coerced to a single attempt,
/// a negative value retries until success or cancellation.
///
/// ```
/// use std::time::Duration;
/// use waypoint::prelude::*;
///
/// let step = Step::new("send")
///     .with_kind("tron")
///     .with_max_retries(3)
///     .with_timeout(Duration::from_millis(10))
///     .with_retry_policy(RetryPolicy::Backoff)
///     .func(|ctx: StepContext| async move {
///         ctx.set_arg("tx_hash", "0xabc").map_err(StepError::other)?;
///         Ok(())
///     });
///
/// assert_eq!(step.max_retries(), 3);
/// ```
#[derive(Clone)]
pub struct Step {
    pub(crate) name: StepName,
    pub(crate) kind: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_retries: i32,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) func: Option<Arc<dyn StepFn>>,
    pub(crate) before: Option<Arc<dyn StepFn>>,
    pub(crate) after: Option<Arc<dyn StepFn>>,
    pub(crate) finish_workflow: bool,
    pub(crate) state: Arc<StepState>,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_policy", &self.retry_policy)
            .field("has_func", &self.func.is_some())
            .field("finish_workflow", &self.finish_workflow)
            .field("status", &self.state.status())
            .finish()
    }
}

impl Step {
    /// Declares a step. Its function is set with [`Step::func`] or [`Step::handler`].
    pub fn new(name: impl Into<StepName>) -> Self {
        let name = name.into();
        let state = Arc::new(StepState::default());
        state.stamp("", name.clone());
        Self {
            name,
            kind: None,
            timeout: None,
            max_retries: 0,
            retry_policy: RetryPolicy::default(),
            func: None,
            before: None,
            after: None,
            finish_workflow: false,
            state,
        }
    }

    /// Sets the body from a closure.
    pub fn func<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.func = Some(Arc::new(f));
        self
    }

    /// Sets the body from a [`StepFn`] implementation.
    pub fn handler(mut self, f: impl StepFn + 'static) -> Self {
        self.func = Some(Arc::new(f));
        self
    }

    /// Sets the classification tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Delay between retry attempts under the linear policy.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the attempt budget. `0` means one attempt, negative means unlimited.
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Runs once before the first attempt of the body.
    pub fn before<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    /// Runs once after the body succeeds.
    pub fn after<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.after = Some(Arc::new(f));
        self
    }

    /// Ends the stage loop after this step succeeds.
    pub fn finish_workflow(mut self) -> Self {
        self.finish_workflow = true;
        self
    }

    /// Step name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Classification tag.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Delay between linear retries; `None` until defaulted at init.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attempt budget as declared.
    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    /// Retry policy, `Linear` unless set.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Returns `true` if success stops the stage loop.
    pub fn finishes_workflow(&self) -> bool {
        self.finish_workflow
    }

    /// The live state, shared with every clone of this step.
    pub fn state(&self) -> &Arc<StepState> {
        &self.state
    }
}
