use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::StorageError;
use super::cache::write_atomic;

/// Where the record of one actual date lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub actual_date: NaiveDate,
    #[serde(default)]
    pub date_text: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

/// In-memory mirror of `index.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheIndex {
    #[serde(default)]
    index: BTreeMap<NaiveDate, IndexEntry>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

impl CacheIndex {
    /// Reads the index file. A missing file yields an empty index; a corrupt
    /// one is logged and replaced by an empty index.
    pub async fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(StorageError::io(path, err)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(index) => Ok(index),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache index unreadable, starting empty");
                Ok(Self::default())
            }
        }
    }

    pub async fn persist(&mut self, path: &Path, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.last_updated = Some(now);
        let bytes = serde_json::to_vec_pretty(&*self).map_err(|err| StorageError::serde(path, err))?;
        write_atomic(path, &bytes).await
    }

    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&IndexEntry> {
        self.index.get(&date)
    }

    /// Inserts or replaces the entry for its actual date.
    pub fn upsert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.index.insert(entry.actual_date, entry)
    }

    /// Drops every entry whose date is not in `retained`, returning them.
    pub fn retain_dates(&mut self, retained: &[NaiveDate]) -> Vec<IndexEntry> {
        let stale: Vec<NaiveDate> = self
            .index
            .keys()
            .filter(|date| !retained.contains(date))
            .copied()
            .collect();
        stale
            .into_iter()
            .filter_map(|date| self.index.remove(&date))
            .collect()
    }

    /// Entries in date order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.index.values()
    }

    /// Indexed dates on or after `from`, earliest `limit` of them.
    #[must_use]
    pub fn dates_from(&self, from: NaiveDate, limit: usize) -> Vec<NaiveDate> {
        self.index.range(from..).map(|(date, _)| *date).take(limit).collect()
    }

    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).expect("date")
    }

    fn entry(day: u32) -> IndexEntry {
        IndexEntry {
            actual_date: date(day),
            date_text: Some(format!("Montag, {day:02}.12.2025")),
            filename: format!("temp_2025-12-{day:02}.json"),
            scraped_at: None,
        }
    }

    #[test]
    fn serializes_in_the_documented_shape() {
        let mut index = CacheIndex::default();
        index.upsert(entry(19));
        let json = serde_json::to_value(&index).expect("serialize");
        assert_eq!(json["index"]["2025-12-19"]["actualDate"], "2025-12-19");
        assert_eq!(json["index"]["2025-12-19"]["filename"], "temp_2025-12-19.json");
        assert!(json.get("lastUpdated").is_some());
    }

    #[test]
    fn dates_from_skips_past_and_limits() {
        let mut index = CacheIndex::default();
        for day in [15, 16, 17, 18, 19, 22] {
            index.upsert(entry(day));
        }
        assert_eq!(
            index.dates_from(date(16), 4),
            vec![date(16), date(17), date(18), date(19)]
        );
    }

    #[test]
    fn retain_dates_returns_removed_entries() {
        let mut index = CacheIndex::default();
        index.upsert(entry(15));
        index.upsert(entry(16));
        let removed = index.retain_dates(&[date(16)]);
        assert_eq!(removed, vec![entry(15)]);
        assert_eq!(index.len(), 1);
        assert!(index.retain_dates(&[date(16)]).is_empty());
    }

    #[tokio::test]
    async fn load_tolerates_missing_and_corrupt_files() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("index.json");
        assert!(CacheIndex::load(&path).await.expect("missing").is_empty());

        tokio::fs::write(&path, b"{ not json").await.expect("write");
        assert!(CacheIndex::load(&path).await.expect("corrupt").is_empty());
    }

    #[tokio::test]
    async fn persist_then_load_keeps_entries() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("index.json");
        let mut index = CacheIndex::default();
        index.upsert(entry(19));
        index.persist(&path, Utc::now()).await.expect("persist");

        let loaded = CacheIndex::load(&path).await.expect("load");
        assert_eq!(loaded.get(date(19)), Some(&entry(19)));
        assert!(loaded.last_updated().is_some());
    }
}
