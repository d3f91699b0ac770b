use super::checker::CheckOutcome;
use super::service::UpdateService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Shortest period the timer loop accepts
const MIN_INTERVAL: Duration = Duration::from_secs(1);
/// Stand-in deadline when the startup delay overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Drives the checker on a timer and applies detected updates after the
/// wait window.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    service: Arc<UpdateService>,
}

impl UpdateScheduler {
    /// Creates a scheduler for `service`.
    #[must_use]
    pub const fn new(service: Arc<UpdateService>) -> Self {
        Self { service }
    }

    /// Runs one check and, if it found an update, schedules the apply.
    ///
    /// Returns the check outcome and the handle of the scheduled apply.
    pub async fn tick(&self) -> (CheckOutcome, Option<JoinHandle<()>>) {
        let outcome = self.service.check_for_updates().await;
        debug!("Update check finished: {:?}", outcome);
        let apply = matches!(outcome, CheckOutcome::UpdateAvailable { .. })
            .then(|| self.schedule_apply());
        (outcome, apply)
    }

    /// Applies the pending update once the wait window has passed.
    pub fn schedule_apply(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let wait = service.settings().wait;
        info!("Update will be applied in {}s", wait.as_secs());
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            let outcome = service.apply_update().await;
            info!("Update apply finished: {:?}", outcome);
        })
    }

    /// Starts the timer loop: one check after the startup delay, then one per
    /// interval. Returns `None` when auto-update is disabled.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        let settings = self.service.settings().clone();
        if !settings.enabled {
            info!("Auto-update disabled");
            return None;
        }

        info!(
            "Auto-update enabled: checking every {}s, applying after {}s",
            settings.interval.as_secs(),
            settings.wait.as_secs()
        );
        let interval = if settings.interval < MIN_INTERVAL {
            warn!(
                "Update interval {:?} is too short, using {:?}",
                settings.interval, MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            settings.interval
        };

        Some(tokio::spawn(async move {
            let now = Instant::now();
            let start = now
                .checked_add(settings.startup_delay)
                .unwrap_or_else(|| now + FAR_FUTURE);
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        }))
    }
}
