//! Periodic archival sweep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rmadesk_common::ArchivalConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between sweeps (default: 24 hours).
    pub archival_interval: Duration,
    /// Upper bound for a single sweep (default: 10 minutes).
    pub sweep_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            archival_interval: Duration::from_secs(86400),
            sweep_timeout: Duration::from_secs(600),
        }
    }
}

impl From<&ArchivalConfig> for SchedulerConfig {
    fn from(config: &ArchivalConfig) -> Self {
        Self {
            archival_interval: config.interval(),
            sweep_timeout: config.sweep_timeout(),
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Archive shipped tickets past the retention window.
    async fn archive_shipped_tickets(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}

/// Clears the running flag when a sweep ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawn [`run_archival_scheduler`] onto the runtime.
pub fn spawn_archival_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_archival_scheduler(config, executor, shutdown))
}

/// Run the archival sweep immediately and then every `archival_interval`
/// until `shutdown` flips to `true` or its sender is dropped.
///
/// A tick that fires while the previous sweep is still in flight is skipped.
/// Failures and timeouts are logged; the timer keeps running.
pub async fn run_archival_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
    mut shutdown: watch::Receiver<bool>,
) {
    let running = Arc::new(AtomicBool::new(false));
    let mut in_flight: Option<JoinHandle<()>> = None;

    let period = if config.archival_interval.is_zero() {
        tracing::warn!("Archival interval is zero, falling back to the default");
        SchedulerConfig::default().archival_interval
    } else {
        config.archival_interval
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = period.as_secs(),
        timeout_secs = config.sweep_timeout.as_secs(),
        "Archival scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        if running.swap(true, Ordering::AcqRel) {
            tracing::warn!("Previous archival sweep still running, skipping this tick");
            continue;
        }

        let guard = RunningGuard(running.clone());
        let executor = executor.clone();
        let timeout = config.sweep_timeout;

        in_flight = Some(tokio::spawn(async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, executor.archive_shipped_tickets()).await {
                Ok(Ok(count)) => {
                    if count > 0 {
                        tracing::info!(count, "Archival sweep finished");
                    } else {
                        tracing::debug!("Archival sweep found nothing to archive");
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Archival sweep failed");
                }
                Err(_) => {
                    tracing::error!(
                        timeout_secs = timeout.as_secs(),
                        "Archival sweep timed out"
                    );
                }
            }
        }));
    }

    if let Some(handle) = in_flight {
        if !handle.is_finished() {
            tracing::info!("Waiting for the running archival sweep to finish");
        }
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Archival sweep task panicked");
        }
    }

    tracing::info!("Archival scheduler stopped");
}
