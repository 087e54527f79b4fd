use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::DateLabelError;
use crate::fetcher::FetchError;

/// How one window slot ended in a refresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// Record written under the date printed on the page.
    Stored { actual_date: NaiveDate, rows: usize },
    /// Fetched, but the page date could not be determined; nothing written.
    Unkeyed { reason: DateLabelError },
    /// All fetch attempts failed; the cached record stays as it was.
    FetchFailed { error: FetchError },
    /// Fetched and keyed, but the write failed.
    StoreFailed { actual_date: NaiveDate, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotReport {
    pub slot: usize,
    pub url: String,
    pub outcome: SlotOutcome,
}

/// Result of one refresh run, shared by every trigger that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub reference_day: Option<NaiveDate>,
    pub window: Vec<NaiveDate>,
    pub slots: Vec<SlotReport>,
    pub evicted: Vec<NaiveDate>,
    /// Set when the run did not complete.
    pub error: Option<String>,
}

impl RefreshReport {
    #[must_use]
    pub fn aborted(started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            started_at,
            reference_day: None,
            window: Vec::new(),
            slots: Vec::new(),
            evicted: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Actual dates written in this run, in slot order.
    #[must_use]
    pub fn stored_dates(&self) -> Vec<NaiveDate> {
        self.slots
            .iter()
            .filter_map(|slot| match slot.outcome {
                SlotOutcome::Stored { actual_date, .. } => Some(actual_date),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn failed_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !matches!(slot.outcome, SlotOutcome::Stored { .. }))
            .count()
    }
}
