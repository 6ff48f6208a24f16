//! Configuration schema definitions.
//!
//! Two kinds of configuration live here: the hot-reloadable filter file
//! ([`FilterConfig`], JSON) and the watcher tuning ([`WatcherSettings`]) that is
//! fixed at startup from the command line.

use std::time::Duration;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

/// Default path of the filter file.
pub const DEFAULT_CONFIG_FILE: &str = "./visor.conf";

/// Wire representation of the filter file.
///
/// ```json
/// { "addresses_filter": ["f01234", "f05678"] }
/// ```
///
/// Unknown fields are ignored. A missing or `null` list deserializes to an empty
/// list, which produces a deny-all filter.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FilterConfig {
    #[serde(deserialize_with = "null_as_empty")]
    pub addresses_filter: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Tuning for the config watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Interval of the reconciliation reload, independent of file events.
    pub reconcile_interval: Duration,

    /// Base delay before re-creating a failed file watch (ms).
    pub restart_base_ms: u64,

    /// Upper bound for the re-creation delay (ms).
    pub restart_max_ms: u64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5 * 60),
            restart_base_ms: 500,
            restart_max_ms: 30_000,
        }
    }
}

impl WatcherSettings {
    /// Delay before the `attempt`-th re-creation of a failed watch (1-based).
    ///
    /// Doubles from `restart_base_ms` per attempt up to `restart_max_ms`, then
    /// adds up to 10% random jitter so several watchers do not retry in step.
    /// Attempt 0 means nothing failed yet and yields no delay.
    pub fn restart_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let doublings = (attempt - 1).min(32);
        let capped = self
            .restart_base_ms
            .saturating_mul(1u64 << doublings)
            .min(self.restart_max_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 10);
        Duration::from_millis(capped + jitter)
    }
}
