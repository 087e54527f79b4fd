use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::calendar::SchoolCalendar;
use crate::domain::{DateKey, ScrapedRecord};
use crate::fetcher::{FetchError, FetchedPage, PageFetcher};
use crate::observability::metrics::Metrics;
use crate::store::CacheStore;
use crate::util::retry::RetryPolicy;

use super::{RefreshReport, SlotOutcome, SlotReport};

/// Source views and fetch bounds of a refresh run.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// One URL per window slot: today, +1, +2, ... school days ahead.
    pub slot_urls: Vec<String>,
    pub retry: RetryPolicy,
    /// Upper bound of a single fetch attempt.
    pub attempt_timeout: Duration,
}

/// Fetches every slot in parallel, keys each page by the date it shows,
/// persists the accepted records and evicts what fell out of the window.
pub struct RefreshOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<CacheStore>,
    calendar: SchoolCalendar,
    settings: RefreshSettings,
    metrics: Arc<Metrics>,
}

impl RefreshOrchestrator {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<CacheStore>,
        calendar: SchoolCalendar,
        settings: RefreshSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fetcher,
            store,
            calendar,
            settings,
            metrics,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    #[must_use]
    pub fn calendar(&self) -> &SchoolCalendar {
        &self.calendar
    }

    /// Runs one refresh cycle for the window around `now`.
    ///
    /// Persistence starts only after every slot fetch has settled.
    pub async fn run(&self, now: DateTime<Utc>) -> RefreshReport {
        let started = Instant::now();
        let reference_day = self.calendar.reference_day(now);
        let window = self.calendar.window(now);
        self.metrics.refresh_runs.inc();
        info!(
            %reference_day,
            window = ?window,
            slots = self.settings.slot_urls.len(),
            "refresh run started"
        );

        let fetches = self
            .settings
            .slot_urls
            .iter()
            .enumerate()
            .map(|(slot, url)| self.fetch_slot(slot, url));
        let results = join_all(fetches).await;

        let mut slots = Vec::with_capacity(results.len());
        let mut written: HashMap<NaiveDate, usize> = HashMap::new();
        for (slot, result) in results.into_iter().enumerate() {
            let url = self.settings.slot_urls[slot].clone();
            let requested = window.get(slot).copied();
            let outcome = match result {
                Ok(page) => {
                    self.persist(slot, requested, page, now, &mut written)
                        .await
                }
                Err(error) => {
                    self.metrics.slot_fetch_failures.inc();
                    warn!(slot, url = %url, error = %error, "slot skipped this cycle");
                    SlotOutcome::FetchFailed { error }
                }
            };
            slots.push(SlotReport { slot, url, outcome });
        }

        let evicted = self.evict(reference_day).await;

        let elapsed = started.elapsed();
        self.metrics.refresh_duration.observe(elapsed.as_secs_f64());
        let report = RefreshReport {
            started_at: now,
            reference_day: Some(reference_day),
            window,
            slots,
            evicted,
            error: None,
        };
        info!(
            stored = ?report.stored_dates(),
            failed_slots = report.failed_slots(),
            evicted = ?report.evicted,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "refresh run finished"
        );
        report
    }

    async fn fetch_slot(&self, slot: usize, url: &str) -> Result<FetchedPage, FetchError> {
        let attempt_timeout = self.settings.attempt_timeout;
        let operation = format!("fetch slot {slot}");
        self.settings
            .retry
            .run(&operation, |attempt| async move {
                debug!(slot, url, attempt, "fetching slot");
                match timeout(attempt_timeout, self.fetcher.fetch(url)).await {
                    Ok(result) => result.and_then(FetchedPage::validate),
                    Err(_) => Err(FetchError::Timeout(attempt_timeout)),
                }
            })
            .await
    }

    async fn persist(
        &self,
        slot: usize,
        requested: Option<NaiveDate>,
        page: FetchedPage,
        now: DateTime<Utc>,
        written: &mut HashMap<NaiveDate, usize>,
    ) -> SlotOutcome {
        let actual_date = match DateKey::from_label(page.date_label.as_deref()) {
            DateKey::Keyed { actual_date } => actual_date,
            DateKey::Unkeyed { reason } => {
                self.metrics.slots_unkeyed.inc();
                warn!(
                    slot,
                    label = ?page.date_label,
                    error = %reason,
                    "discarding page without a usable date"
                );
                return SlotOutcome::Unkeyed { reason };
            }
        };

        if requested.is_some_and(|requested| requested != actual_date) {
            info!(slot, ?requested, %actual_date, "source shows a different day than the calendar slot");
        }
        if let Some(previous) = written.insert(actual_date, slot) {
            // Two slots showing the same day: the later slot wins.
            warn!(slot, previous_slot = previous, %actual_date, "date written twice in one run");
        }

        let readiness = page.readiness;
        let record = ScrapedRecord::from_rows(page.rows, page.date_label, now);
        let rows = record.rows().len();
        match self.store.put(actual_date, &record).await {
            Ok(_) => {
                debug!(slot, %actual_date, rows, readiness = readiness.as_str(), "record stored");
                SlotOutcome::Stored { actual_date, rows }
            }
            Err(err) => {
                error!(slot, %actual_date, error = %err, "failed to store record");
                SlotOutcome::StoreFailed {
                    actual_date,
                    error: err.to_string(),
                }
            }
        }
    }

    async fn evict(&self, reference_day: NaiveDate) -> Vec<NaiveDate> {
        let retained = self
            .store
            .retained_dates(reference_day, self.calendar.window_size())
            .await;
        match self.store.evict_outside_window(&retained).await {
            Ok(report) => report.evicted_dates,
            Err(err) => {
                error!(error = %err, "eviction pass failed");
                Vec::new()
            }
        }
    }
}
