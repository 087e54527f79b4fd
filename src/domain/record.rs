use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SubstitutionEntry;

/// The scraped schedule of one day, as persisted in a cache record file.
///
/// Records are never mutated after construction; a later scrape of the same
/// day replaces the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    #[serde(rename = "data", default)]
    rows: Vec<SubstitutionEntry>,
    #[serde(default)]
    courses: BTreeSet<String>,
    #[serde(rename = "dateText", default)]
    date_label: Option<String>,
    #[serde(rename = "scrapedAt", default, skip_serializing_if = "Option::is_none")]
    scraped_at: Option<DateTime<Utc>>,
}

impl ScrapedRecord {
    /// Builds a record from extracted rows, dropping rows without a course
    /// and deriving the course set.
    #[must_use]
    pub fn from_rows(
        rows: Vec<SubstitutionEntry>,
        date_label: Option<String>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let rows: Vec<SubstitutionEntry> = rows
            .into_iter()
            .filter_map(SubstitutionEntry::normalized)
            .collect();
        let courses = rows.iter().map(|row| row.course.clone()).collect();
        Self {
            rows,
            courses,
            date_label,
            scraped_at: Some(scraped_at),
        }
    }

    /// The record served when nothing is cached for a date.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rows(&self) -> &[SubstitutionEntry] {
        &self.rows
    }

    #[must_use]
    pub fn courses(&self) -> &BTreeSet<String> {
        &self.courses
    }

    #[must_use]
    pub fn date_label(&self) -> Option<&str> {
        self.date_label.as_deref()
    }

    #[must_use]
    pub fn scraped_at(&self) -> Option<DateTime<Utc>> {
        self.scraped_at
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Client-facing shape of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheRecordView {
    pub data: Vec<SubstitutionEntry>,
    pub courses: Vec<String>,
    #[serde(rename = "dateText")]
    pub date_text: Option<String>,
}

impl From<&ScrapedRecord> for CacheRecordView {
    fn from(record: &ScrapedRecord) -> Self {
        // Files written by older versions may still hold blank courses.
        let data = record
            .rows()
            .iter()
            .filter(|row| row.has_course())
            .cloned()
            .collect();
        let courses = record
            .courses()
            .iter()
            .map(|course| course.trim())
            .filter(|course| !course.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            data,
            courses,
            date_text: record.date_label().map(str::to_string),
        }
    }
}
