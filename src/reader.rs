//! Read side of the cache, shaped for the HTTP clients.
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::calendar::SchoolCalendar;
use crate::domain::{CacheRecordView, ScrapedRecord, SubstitutionEntry};
use crate::refresh::RefreshCoordinator;
use crate::store::CacheStore;

/// A row of the merged window, tagged with the day it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatedEntry {
    #[serde(flatten)]
    pub entry: SubstitutionEntry,
    pub datum: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayLabel {
    pub date: NaiveDate,
    #[serde(rename = "dateText")]
    pub date_text: Option<String>,
}

/// The retention window as one payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowView {
    pub entries: Vec<CacheRecordView>,
    pub dates: Vec<DayLabel>,
    pub data: Vec<DatedEntry>,
    pub courses: Vec<String>,
}

impl WindowView {
    fn from_days(days: Vec<(NaiveDate, CacheRecordView)>) -> Self {
        let mut view = Self::default();
        let mut courses = BTreeSet::new();
        for (date, day) in days {
            view.dates.push(DayLabel {
                date,
                date_text: day.date_text.clone(),
            });
            view.data.extend(day.data.iter().cloned().map(|entry| DatedEntry {
                entry,
                datum: date,
            }));
            courses.extend(day.courses.iter().cloned());
            view.entries.push(day);
        }
        view.courses = courses.into_iter().collect();
        view
    }
}

#[derive(Clone)]
pub struct ScheduleReader {
    store: Arc<CacheStore>,
    coordinator: Arc<RefreshCoordinator>,
    calendar: SchoolCalendar,
}

impl ScheduleReader {
    #[must_use]
    pub fn new(
        store: Arc<CacheStore>,
        coordinator: Arc<RefreshCoordinator>,
        calendar: SchoolCalendar,
    ) -> Self {
        Self {
            store,
            coordinator,
            calendar,
        }
    }

    #[must_use]
    pub fn calendar(&self) -> &SchoolCalendar {
        &self.calendar
    }

    /// The record of one date, refreshing once on a miss.
    pub async fn get_for_date(&self, date: NaiveDate) -> CacheRecordView {
        let record = self.store.get(date, self.coordinator.as_ref()).await;
        CacheRecordView::from(&record)
    }

    /// The record of the reference day at `now`.
    pub async fn get_current(&self, now: DateTime<Utc>) -> CacheRecordView {
        self.get_for_date(self.calendar.reference_day(now)).await
    }

    /// Up to window-size retained days from the reference day on.
    ///
    /// An empty index triggers one refresh. If it stays empty, the computed
    /// window is answered from whatever files exist, without further
    /// refreshes.
    pub async fn get_window(&self, now: DateTime<Utc>) -> WindowView {
        let reference_day = self.calendar.reference_day(now);
        let limit = self.calendar.window_size();

        let mut dates = self.store.retained_dates(reference_day, limit).await;
        if dates.is_empty() {
            info!(%reference_day, "no indexed days, refreshing before answering");
            self.coordinator.trigger_at(now).await;
            dates = self.store.retained_dates(reference_day, limit).await;
        }
        if dates.is_empty() {
            dates = self.calendar.window(now);
        }

        let mut days = Vec::with_capacity(dates.len());
        for date in dates {
            days.push((date, CacheRecordView::from(&self.lookup_only(date).await)));
        }
        WindowView::from_days(days)
    }

    async fn lookup_only(&self, date: NaiveDate) -> ScrapedRecord {
        match self.store.lookup(date).await {
            Ok(Some(record)) => record,
            Ok(None) => ScrapedRecord::empty(),
            Err(err) => {
                warn!(%date, error = %err, "cache read failed, serving empty day");
                ScrapedRecord::empty()
            }
        }
    }
}
