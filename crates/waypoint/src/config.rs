//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Grace window granted to a cancelled run before it is abandoned.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(9);

/// Step timeout applied when a step does not set one.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`Workflow`](crate::Workflow).
///
/// Durations are expressed in milliseconds when (de)serialized, so the
/// struct can be embedded in a host's own configuration file.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use waypoint::WorkflowConfig;
///
/// let config = WorkflowConfig::default();
/// assert_eq!(config.shutdown_grace, Duration::from_secs(9));
/// assert_eq!(config.default_step_timeout, Duration::from_secs(1));
///
/// let config: WorkflowConfig =
///     serde_json::from_str(r#"{"default_step_timeout": 250}"#).expect("valid config");
/// assert_eq!(config.default_step_timeout, Duration::from_millis(250));
/// assert_eq!(config.shutdown_grace, Duration::from_secs(9));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// How long a cancelled run may take to observe the stop request.
    /// Default: 9 seconds.
    #[serde(with = "millis")]
    pub shutdown_grace: Duration,
    /// Delay between retry attempts for steps without an explicit timeout.
    /// Default: 1 second.
    #[serde(with = "millis")]
    pub default_step_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            default_step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
