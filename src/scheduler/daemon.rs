use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::refresh::RefreshCoordinator;
use crate::util::time::{Clock, system_clock};

use super::cadence::DailyCadence;

/// Periodic refresh. The first tick fires immediately, so the cache is
/// filled at startup. Shutdown does not wait for a run in flight.
pub struct RefreshDaemon {
    coordinator: Arc<RefreshCoordinator>,
    period: Duration,
}

impl RefreshDaemon {
    #[must_use]
    pub fn new(coordinator: Arc<RefreshCoordinator>, period: Duration) -> Self {
        Self {
            coordinator,
            period,
        }
    }

    #[must_use]
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(self, cancel_token: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "refresh daemon started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("refresh daemon received shutdown signal, stopping");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        () = cancel_token.cancelled() => {
                            info!("refresh daemon stopping while a run is in flight");
                            break;
                        }
                        report = self.coordinator.trigger() => {
                            if let Some(err) = &report.error {
                                error!(error = %err, "scheduled refresh did not complete");
                            }
                        }
                    }
                }
            }
        }
    }
}

/// What a backup pass promoted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub promoted: Vec<NaiveDate>,
    pub missing: Vec<NaiveDate>,
    pub failed: Vec<NaiveDate>,
}

/// Refreshes, then copies the live record of every retained date into the
/// backup tier.
pub async fn run_backup_pass(coordinator: &RefreshCoordinator, now: DateTime<Utc>) -> BackupSummary {
    let report = coordinator.trigger_at(now).await;
    if let Some(err) = &report.error {
        warn!(error = %err, "refresh before backup did not complete, promoting cached records");
    }

    let orchestrator = coordinator.orchestrator();
    let calendar = orchestrator.calendar();
    let store = orchestrator.store();
    let retained = store
        .retained_dates(calendar.reference_day(now), calendar.window_size())
        .await;

    let mut summary = BackupSummary::default();
    for date in retained {
        match store.promote_to_backup(date).await {
            Ok(true) => summary.promoted.push(date),
            Ok(false) => summary.missing.push(date),
            Err(err) => {
                error!(%date, error = %err, "backup promotion failed");
                summary.failed.push(date);
            }
        }
    }
    info!(
        promoted = ?summary.promoted,
        missing = ?summary.missing,
        failed = ?summary.failed,
        "backup pass finished"
    );
    summary
}

/// Daily backup pass at a local hour.
pub struct BackupDaemon {
    coordinator: Arc<RefreshCoordinator>,
    cadence: DailyCadence,
    clock: Clock,
}

impl BackupDaemon {
    #[must_use]
    pub fn new(coordinator: Arc<RefreshCoordinator>, cadence: DailyCadence) -> Self {
        Self {
            coordinator,
            cadence,
            clock: system_clock(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel_token).await })
    }

    async fn run(self, cancel_token: CancellationToken) {
        let mut last_run: Option<DateTime<Utc>> = None;
        loop {
            let now = (self.clock)();
            // Never fire twice for the same trigger instant.
            let from = match last_run {
                Some(last) if last >= now => last + chrono::Duration::seconds(1),
                _ => now,
            };
            let next = self.cadence.next_run_from(from);
            let wait = duration_until(next, now);
            info!(
                next_run_utc = %next.to_rfc3339(),
                next_run_local = %next.with_timezone(&self.cadence.timezone()).to_rfc3339(),
                wait_seconds = wait.as_secs(),
                "scheduled daily backup"
            );

            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!("backup daemon received shutdown signal, stopping");
                    break;
                }
                () = sleep(wait) => {
                    last_run = Some(next);
                    tokio::select! {
                        () = cancel_token.cancelled() => {
                            info!("backup daemon stopping while a pass is in flight");
                            break;
                        }
                        _ = run_backup_pass(&self.coordinator, (self.clock)()) => {}
                    }
                }
            }
        }
    }
}

fn duration_until(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
