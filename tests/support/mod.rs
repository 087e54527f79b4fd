#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use substitution_worker::calendar::SchoolCalendar;
use substitution_worker::domain::SubstitutionEntry;
use substitution_worker::fetcher::{FetchError, FetchedPage, PageFetcher, Readiness};
use substitution_worker::observability::metrics::Metrics;
use substitution_worker::reader::ScheduleReader;
use substitution_worker::refresh::{RefreshCoordinator, RefreshOrchestrator, RefreshSettings};
use substitution_worker::store::CacheStore;
use substitution_worker::util::retry::RetryPolicy;
use substitution_worker::util::time::fixed_clock;

pub const SLOT_URLS: [&str; 4] = [
    "https://monitor.test/today",
    "https://monitor.test/plus1",
    "https://monitor.test/plus2",
    "https://monitor.test/plus3",
];

/// What a scripted slot answers.
#[derive(Clone)]
pub enum Script {
    Page(FetchedPage),
    /// Fails `failures` times, then answers the page.
    FlakyPage { failures: usize, page: FetchedPage },
    Fail(FetchError),
}

/// Counting fake source; every URL answers according to its script.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: AtomicUsize,
    calls_per_url: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            calls_per_url: Mutex::new(HashMap::new()),
            delay,
        }
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts.lock().insert(url.to_string(), script);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls_per_url.lock().get(url).copied().unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut per_url = self.calls_per_url.lock();
            let count = per_url.entry(url.to_string()).or_default();
            *count += 1;
            *count
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let script = self.scripts.lock().get(url).cloned();
        match script {
            Some(Script::Page(page)) => Ok(page),
            Some(Script::FlakyPage { failures, page }) => {
                if attempt <= failures {
                    Err(FetchError::Unreachable(format!("flaky attempt {attempt}")))
                } else {
                    Ok(page)
                }
            }
            Some(Script::Fail(err)) => Err(err),
            None => Err(FetchError::Unreachable(format!("no script for {url}"))),
        }
    }
}

pub fn entry(course: &str) -> SubstitutionEntry {
    SubstitutionEntry::new(course, "3", "R12", "Schmidt", "Vertretung", "")
}

pub fn page(label: &str, courses: &[&str]) -> FetchedPage {
    FetchedPage::new(
        courses.iter().map(|c| entry(c)).collect(),
        Some(label.to_string()),
        Readiness::RowsDetected,
    )
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

pub fn utc(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .expect("valid datetime")
        .with_timezone(&Utc)
}

/// Friday 2025-12-19, 09:00 in Berlin: reference day is that Friday.
pub fn friday_morning() -> DateTime<Utc> {
    utc("2025-12-19T08:00:00Z")
}

/// Pages for the four slots as the monitor shows them on Friday morning.
pub fn script_regular_week(fetcher: &ScriptedFetcher) {
    fetcher.script(SLOT_URLS[0], Script::Page(page("Freitag, 19.12.2025", &["10A"])));
    fetcher.script(SLOT_URLS[1], Script::Page(page("Montag, 22.12.2025", &["7B", "5C"])));
    fetcher.script(SLOT_URLS[2], Script::Page(page("Dienstag, 23.12.2025", &["9D"])));
    fetcher.script(SLOT_URLS[3], Script::Page(page("Mittwoch, 24.12.2025", &["11E"])));
}

pub struct Harness {
    pub dir: TempDir,
    pub fetcher: Arc<ScriptedFetcher>,
    pub metrics: Arc<Metrics>,
    pub store: Arc<CacheStore>,
    pub calendar: SchoolCalendar,
    pub coordinator: Arc<RefreshCoordinator>,
    pub reader: ScheduleReader,
}

impl Harness {
    pub async fn new(fetch_delay: Duration) -> Self {
        let dir = TempDir::new().expect("tempdir");
        Self::in_dir(dir, fetch_delay).await
    }

    pub async fn in_dir(dir: TempDir, fetch_delay: Duration) -> Self {
        let fetcher = Arc::new(ScriptedFetcher::new(fetch_delay));
        let metrics = Arc::new(Metrics::standalone().expect("metrics"));
        let store = Arc::new(
            CacheStore::open(dir.path(), Arc::clone(&metrics))
                .await
                .expect("open store"),
        );
        let calendar = SchoolCalendar::new(chrono_tz::Europe::Berlin, 17, 4);
        let settings = RefreshSettings {
            slot_urls: SLOT_URLS.iter().map(|url| (*url).to_string()).collect(),
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            attempt_timeout: Duration::from_secs(5),
        };
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::clone(&store),
            calendar,
            settings,
            Arc::clone(&metrics),
        ));
        let coordinator = Arc::new(
            RefreshCoordinator::new(orchestrator, Arc::clone(&metrics))
                .with_clock(fixed_clock(friday_morning())),
        );
        let reader = ScheduleReader::new(Arc::clone(&store), Arc::clone(&coordinator), calendar);
        Self {
            dir,
            fetcher,
            metrics,
            store,
            calendar,
            coordinator,
            reader,
        }
    }
}
