//! Bounded polling with jittered exponential backoff.
//!
//! Provisioning frequently waits on something outside the engine: a
//! resource coming up, a host accepting connections, a cloud API catching
//! up. [`poll_until`] turns those waits into bounded loops that give up
//! with [`EngineError::Timeout`] once the configured deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use berth_core::BerthConfig;
use berth_core::config::{DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_INTERVAL};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// First delay between probes.
    pub interval: Duration,
    /// Backoff ceiling.
    pub max_interval: Duration,
    /// Total wall-clock budget.
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_POLL_MAX_INTERVAL,
            deadline: DEFAULT_POLL_DEADLINE,
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &BerthConfig) -> anyhow::Result<Self> {
        let (interval, max_interval, deadline) = config.poll_settings()?;
        Ok(Self {
            interval,
            max_interval: max_interval.max(interval),
            deadline,
        })
    }

    /// Delay to use after `current`, before jitter.
    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Scale `delay` by a random factor in `[0.5, 1.5)`.
fn jitter(delay: Duration) -> Duration {
    delay.mul_f64(0.5 + fastrand::f64())
}

/// Repeatedly await `probe` until it yields a value.
///
/// `Ok(Some(v))` finishes the wait, `Ok(None)` means "not yet" and any
/// error aborts immediately. `what` names the wait in logs and errors.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, what: &str, mut probe: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<Option<T>>>,
{
    let started = Instant::now();
    let mut interval = config.interval;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(value) = probe().await? {
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= config.deadline {
            return Err(EngineError::Timeout(format!(
                "{what} after {attempts} attempts ({elapsed:?})"
            )));
        }

        let delay = jitter(interval).min(config.deadline - elapsed);
        trace!(what, attempts, ?delay, "not ready, backing off");
        tokio::time::sleep(delay).await;
        interval = config.next_interval(interval);
    }
}
