use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::observability::metrics::Metrics;
use crate::store::RefreshTrigger;
use crate::util::time::{Clock, system_clock};

use super::{RefreshOrchestrator, RefreshReport};

type InFlight = Shared<BoxFuture<'static, Arc<RefreshReport>>>;

/// Single-flight guard around [`RefreshOrchestrator`].
///
/// At most one run exists at a time. Triggers that arrive while a run is in
/// flight attach to it and resolve with the same report.
pub struct RefreshCoordinator {
    orchestrator: Arc<RefreshOrchestrator>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    metrics: Arc<Metrics>,
    clock: Clock,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(orchestrator: Arc<RefreshOrchestrator>, metrics: Arc<Metrics>) -> Self {
        Self {
            orchestrator,
            in_flight: Arc::new(Mutex::new(None)),
            metrics,
            clock: system_clock(),
        }
    }

    /// Replaces the clock that [`Self::trigger`] reads.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<RefreshOrchestrator> {
        &self.orchestrator
    }

    /// Starts a run for the current time, or joins the one in flight.
    pub async fn trigger(&self) -> Arc<RefreshReport> {
        self.trigger_at((self.clock)()).await
    }

    /// Starts a run for `now`, or joins the one in flight (whose own start
    /// time then applies).
    pub async fn trigger_at(&self, now: DateTime<Utc>) -> Arc<RefreshReport> {
        let run = self.attach_or_start(now);
        run.await
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn attach_or_start(&self, now: DateTime<Utc>) -> InFlight {
        let mut slot = self.in_flight.lock();
        if let Some(run) = slot.as_ref() {
            self.metrics.refresh_joined.inc();
            debug!("refresh already in flight, attaching");
            return run.clone();
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let release = ReleaseOnDrop(Arc::clone(&self.in_flight));
        let handle = tokio::spawn(async move {
            let _release = release;
            Arc::new(orchestrator.run(now).await)
        });

        let run: InFlight = async move {
            match handle.await {
                Ok(report) => report,
                Err(err) => {
                    error!(error = %err, "refresh task terminated abnormally");
                    Arc::new(RefreshReport::aborted(now, err.to_string()))
                }
            }
        }
        .boxed()
        .shared();
        *slot = Some(run.clone());
        run
    }
}

#[async_trait]
impl RefreshTrigger for RefreshCoordinator {
    async fn refresh(&self) {
        self.trigger().await;
    }
}

/// Clears the in-flight slot when the run task ends, including by panic.
struct ReleaseOnDrop(Arc<Mutex<Option<InFlight>>>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}
