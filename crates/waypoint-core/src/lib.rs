//! Core types for the waypoint stage/step engine.
//!
//! This crate has no runtime dependencies. It holds everything that crosses
//! the persistence boundary and the error vocabulary shared by step bodies
//! and the engine.
//!
//! # Core Types
//!
//! - [`StepState`] - Lock-protected execution record of one step, with [`Args`]
//! - [`WorkflowState`] - Halt flags, failure payload and branch override
//! - [`Snapshot`] - Serializable capture of both, the unit of resumption
//! - [`StepError`] - What step bodies and hooks return, including [`Control`] signals
//! - [`WorkflowError`] - What the engine returns
//! - [`RetryPolicy`] - Delay shape between attempts

mod error;
mod name;
mod retry;
mod snapshot;
mod state;
mod workflow_state;

pub use error::{Control, HookType, StepError, WorkflowError};
pub use name::{StageName, StepName};
pub use retry::{attempt_limit, RetryPolicy, BACKOFF_BASE};
pub use snapshot::Snapshot;
pub use state::{Args, StepState, StepStateData, StepStatus};
pub use workflow_state::WorkflowState;
