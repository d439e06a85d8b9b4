//! A durable stage/step execution engine.
//!
//! Workflows are ordered [`Stage`]s of ordered [`Step`]s. Each step body runs
//! through its [`RetryPolicy`]; progress is captured as a [`Snapshot`] that a
//! host persists from its [`WorkflowHooks`] and restores before the next run.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use waypoint::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WorkflowError> {
//!     let mut workflow = Workflow::builder()
//!         .stage(
//!             Stage::new("withdraw")
//!                 .step(Step::new("validate").func(|ctx: StepContext| async move {
//!                     ctx.set_arg("amount", 25).map_err(StepError::other)?;
//!                     Ok(())
//!                 }))
//!                 .step(
//!                     Step::new("send")
//!                         .with_max_retries(3)
//!                         .with_timeout(Duration::from_millis(10))
//!                         .func(|ctx: StepContext| async move {
//!                             ctx.set_arg("tx_hash", "0xabc").map_err(StepError::other)?;
//!                             Ok(())
//!                         }),
//!                 ),
//!         )
//!         .build()?;
//!
//!     workflow.run().await?;
//!
//!     let snapshot = workflow.snapshot();
//!     let hash: String = snapshot.get_arg_as("send", "tx_hash")?;
//!     assert_eq!(hash, "0xabc");
//!     assert!(snapshot.workflow_state.is_completed);
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod hooks;
mod retry;
mod stage;
mod step;
mod workflow;

// Re-export core types
pub use waypoint_core::*;

pub use config::{WorkflowConfig, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STEP_TIMEOUT};
pub use context::{StageContext, StepContext, WorkflowHandle};
pub use hooks::{FailureDisposition, NoHooks, WorkflowHooks};
pub use stage::{Stage, StageHook};
pub use step::{Step, StepFn};
pub use workflow::{Workflow, WorkflowBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Control, FailureDisposition, HookType, RetryPolicy, Snapshot, Stage, StageContext,
        StageName, Step, StepContext, StepError, StepFn, StepName, StepStatus, Workflow,
        WorkflowBuilder, WorkflowConfig, WorkflowError, WorkflowHandle, WorkflowHooks,
        WorkflowState,
    };
}
