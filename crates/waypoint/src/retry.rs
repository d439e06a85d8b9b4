//! Retry loop shared by both policies.

use crate::context::StepContext;
use crate::step::StepFn;
use std::time::Duration;
use tracing::{debug, info, warn};
use waypoint_core::{attempt_limit, RetryPolicy, StepError};

/// Invokes `func` until it succeeds, returns a control signal, or the
/// attempt budget is spent.
///
/// The pause between attempts is interrupted by the workflow stop signal,
/// in which case [`StepError::Interrupted`] is returned.
pub(crate) async fn execute_with_retry(
    policy: RetryPolicy,
    func: &dyn StepFn,
    ctx: &StepContext,
    timeout: Duration,
    max_retries: i32,
) -> Result<(), StepError> {
    let limit = attempt_limit(max_retries);
    let mut attempt: u32 = 0;

    loop {
        let error = match func.call(ctx.with_attempt(attempt)).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_control() => return Err(e),
            Err(e) => e,
        };
        attempt = attempt.saturating_add(1);

        if limit.is_some_and(|limit| attempt >= limit) {
            if error.is_no_console() {
                debug!(
                    "Step '{}/{}' gave up after {} attempt(s): {}",
                    ctx.stage(),
                    ctx.step(),
                    attempt,
                    error
                );
            } else {
                warn!(
                    "Step '{}/{}' failed after {} attempt(s): {}",
                    ctx.stage(),
                    ctx.step(),
                    attempt,
                    error
                );
            }
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt - 1, timeout);
        if error.is_no_console() {
            debug!(
                "Step '{}/{}' not ready, retrying in {:?} ({} policy, attempt {})",
                ctx.stage(),
                ctx.step(),
                delay,
                policy,
                attempt
            );
        } else {
            info!(
                "Step '{}/{}' failed: {}, retrying in {:?} ({} policy, attempt {})",
                ctx.stage(),
                ctx.step(),
                error,
                delay,
                policy,
                attempt
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.workflow().stop_signal().raised() => {
                info!("Step '{}/{}' retry interrupted by shutdown", ctx.stage(), ctx.step());
                return Err(StepError::Interrupted);
            }
        }
    }
}
