//! Reconnect delay policy.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long the channel waits before the next connection attempt.
///
/// `attempt` counts consecutive failed or dropped connections since the last
/// successful one, starting at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// Constant interval.
    Fixed { interval_ms: u64 },
    /// Doubling from `initial_ms`, capped at `max_ms`.
    Exponential { initial_ms: u64, max_ms: u64 },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed { interval_ms: 3_000 }
    }
}

impl Backoff {
    pub fn fixed(interval: Duration) -> Self {
        Backoff::Fixed {
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { interval_ms } => Duration::from_millis(interval_ms),
            Backoff::Exponential { initial_ms, max_ms } => {
                let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(max_ms))
            }
        }
    }
}
