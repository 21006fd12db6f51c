//! Expired-row sweeping.
//!
//! Two strategies are available and can be combined:
//!
//! - **Inline**: [`CleaningPolicy`] fires on roughly one write in `factor`,
//!   and the backend runs `clean(CleanMode::Old)` before that write. The cost
//!   lands on the unlucky writer, and no scheduler is needed.
//! - **Background**: [`spawn_sweeper`] runs `clean(CleanMode::Old)` on a fixed
//!   interval from a tokio task. Set `cleaning_factor` to `0` to rely on it
//!   alone.

use crate::backend::{CacheBackend, CleanMode};
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shortest interval [`spawn_sweeper`] accepts; shorter ones are raised to it.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Probabilistic trigger for inline sweeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleaningPolicy {
    factor: i64,
}

impl CleaningPolicy {
    /// `factor <= 0` disables the trigger.
    pub fn new(factor: i64) -> Self {
        CleaningPolicy { factor }
    }

    pub fn disabled() -> Self {
        CleaningPolicy { factor: 0 }
    }

    pub fn factor(&self) -> i64 {
        self.factor
    }

    pub fn is_enabled(&self) -> bool {
        self.factor > 0
    }

    /// Draw uniformly from `1..=factor`; fire when the draw is `1`.
    pub fn should_clean(&self) -> bool {
        self.is_enabled() && rand::rng().random_range(1..=self.factor) == 1
    }
}

/// Spawn a background task that sweeps expired rows every `interval`.
///
/// Sweep failures are logged and the task keeps running. Abort the returned
/// handle to stop it. Intervals below [`MIN_SWEEP_INTERVAL`], zero included,
/// are raised to it.
///
/// # Example
///
/// ```ignore
/// let handle = spawn_sweeper(backend.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweeper<B>(backend: B, interval: Duration) -> JoinHandle<()>
where
    B: CacheBackend + 'static,
{
    let interval = interval.max(MIN_SWEEP_INTERVAL);

    tokio::spawn(async move {
        info!(
            "Starting cache sweeper with interval of {:?}",
            interval
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match backend.clean(CleanMode::Old).await {
                Ok(0) => debug!("Cache sweep: no expired rows found"),
                Ok(removed) => info!("Cache sweep: removed {} expired rows", removed),
                Err(e) => warn!("Cache sweep failed: {}", e),
            }
        }
    })
}
