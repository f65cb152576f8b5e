use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Default number of items that may wait in the intake queue.
pub const DEFAULT_PENDING_CAPACITY: usize = 100;

/// Tuning of an [`Engine`](super::engine::Engine).
///
/// The configuration is frozen once the engine is started. At least one of
/// `max_batch_size` and `batch_timeout` must be non-zero, otherwise batches would
/// only ever be flushed by `stop`.
///
/// It can be embedded in an application's own configuration file:
///
/// ```rust
/// use batch_muster::core::config::EngineConfig;
/// use std::time::Duration;
///
/// let config: EngineConfig = serde_json::from_str(
///     r#"{ "max_batch_size": 50, "batch_timeout_ms": 250 }"#,
/// ).unwrap();
///
/// assert_eq!(config.max_batch_size, 50);
/// assert_eq!(config.batch_timeout, Duration::from_millis(250));
/// assert_eq!(config.pending_capacity, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of items that fires a batch. `0` disables the size trigger.
    pub max_batch_size: usize,
    /// Age of a batch, measured from its first item, that fires it.
    /// `Duration::ZERO` disables the time trigger.
    ///
    /// Serialized as whole milliseconds: a timeout with a sub-millisecond
    /// part fails to serialize instead of being rounded.
    #[serde(rename = "batch_timeout_ms", with = "millis")]
    pub batch_timeout: Duration,
    /// Capacity of the intake queue; `add` waits while it is full.
    pub pending_capacity: usize,
    /// Maximum number of batches being fired at once. `None` means unbounded.
    pub max_concurrent_batches: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 0,
            batch_timeout: Duration::ZERO,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            max_concurrent_batches: None,
        }
    }
}

impl EngineConfig {
    pub fn size_trigger(&self) -> Option<usize> {
        (self.max_batch_size > 0).then_some(self.max_batch_size)
    }

    pub fn time_trigger(&self) -> Option<Duration> {
        (!self.batch_timeout.is_zero()).then_some(self.batch_timeout)
    }

    /// Checks that the engine could ever fire a batch on its own.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.size_trigger().is_none() && self.time_trigger().is_none() {
            return Err(BatchError::NoTrigger);
        }
        Ok(())
    }

    /// Capacity actually given to the intake channel.
    ///
    /// Tokio channels need room for at least one item, so a capacity of `0`
    /// behaves like `1`.
    pub(crate) fn channel_capacity(&self) -> usize {
        self.pending_capacity.max(1)
    }

    /// Number of dispatch slots, `0` being treated as `1`.
    pub(crate) fn dispatch_slots(&self) -> Option<usize> {
        self.max_concurrent_batches.map(|slots| slots.max(1))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, ser::Error};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() % 1_000_000 != 0 {
            return Err(S::Error::custom(format!(
                "batch timeout {duration:?} is not a whole number of milliseconds"
            )));
        }
        let millis = u64::try_from(duration.as_millis()).map_err(|_| {
            S::Error::custom(format!("batch timeout {duration:?} overflows u64 milliseconds"))
        })?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
