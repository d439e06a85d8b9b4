//! Retry policy shapes.

use std::fmt;
use std::time::Duration;

/// First delay of [`RetryPolicy::Backoff`].
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// How a step is re-invoked after a failed attempt.
///
/// The attempt budget comes from the step (see [`attempt_limit`]); the policy
/// only decides the pause between attempts.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use waypoint_core::RetryPolicy;
///
/// let timeout = Duration::from_millis(10);
///
/// // Linear: always the step timeout.
/// assert_eq!(RetryPolicy::Linear.delay_for_attempt(0, timeout), timeout);
/// assert_eq!(RetryPolicy::Linear.delay_for_attempt(5, timeout), timeout);
///
/// // Backoff: 1s, 2s, 4s, ... regardless of the timeout.
/// assert_eq!(RetryPolicy::Backoff.delay_for_attempt(0, timeout), Duration::from_secs(1));
/// assert_eq!(RetryPolicy::Backoff.delay_for_attempt(3, timeout), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Fixed delay equal to the step timeout.
    #[default]
    Linear,
    /// Delay starts at [`BACKOFF_BASE`] and doubles after every failure.
    /// No jitter and no ceiling.
    Backoff,
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32, timeout: Duration) -> Duration {
        match self {
            RetryPolicy::Linear => timeout,
            RetryPolicy::Backoff => 2_u32
                .checked_pow(attempt)
                .and_then(|factor| BACKOFF_BASE.checked_mul(factor))
                .unwrap_or(Duration::MAX),
        }
    }

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryPolicy::Linear => "linear",
            RetryPolicy::Backoff => "backoff",
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of attempts allowed by a step's `max_retries`.
///
/// `0` means a single attempt, a negative value means no limit (`None`).
///
/// ```
/// use waypoint_core::attempt_limit;
///
/// assert_eq!(attempt_limit(0), Some(1));
/// assert_eq!(attempt_limit(3), Some(3));
/// assert_eq!(attempt_limit(-1), None);
/// ```
pub fn attempt_limit(max_retries: i32) -> Option<u32> {
    match max_retries {
        n if n < 0 => None,
        0 => Some(1),
        n => Some(n.unsigned_abs()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delay_is_constant() {
        let timeout = Duration::from_secs(3);
        for attempt in [0, 1, 10, 1000] {
            assert_eq!(RetryPolicy::Linear.delay_for_attempt(attempt, timeout), timeout);
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let delays: Vec<_> = (0..5)
            .map(|a| RetryPolicy::Backoff.delay_for_attempt(a, Duration::ZERO))
            .collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        assert_eq!(
            RetryPolicy::Backoff.delay_for_attempt(200, Duration::ZERO),
            Duration::MAX
        );
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::Linear);
        assert_eq!(RetryPolicy::Backoff.to_string(), "backoff");
    }
}
