use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rocket::Shutdown;
use sqlx::SqlitePool;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, instrument};

use crate::db::deactivate_expired_memberships;
use crate::error::AppError;

/// Periodically deactivates members whose package term has lapsed.
pub struct ExpirySweeper {
    pool: SqlitePool,
    interval: Duration,
    running: AtomicBool,
}

/// Clears the running flag however the sweep ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ExpirySweeper {
    pub fn new(pool: SqlitePool, interval: Duration) -> Self {
        Self {
            pool,
            interval,
            running: AtomicBool::new(false),
        }
    }

    /// Runs one sweep. Returns `None` without touching the database when a
    /// sweep is already in progress, otherwise the number of members deactivated.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<Option<u64>, AppError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Expiry sweep already running, skipping tick");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        let deactivated = deactivate_expired_memberships(&self.pool, Utc::now().naive_utc()).await?;
        if deactivated > 0 {
            info!(deactivated, "Deactivated lapsed memberships");
        }

        Ok(Some(deactivated))
    }

    /// Ticks every `interval` until Rocket shuts down. The first sweep happens
    /// one interval after start.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        e.log_and_record("Membership expiry sweep");
                    }
                }
                _ = &mut shutdown => {
                    info!("Expiry sweeper stopping");
                    break;
                }
            }
        }
    }
}
