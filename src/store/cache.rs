use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::ScrapedRecord;
use crate::observability::metrics::Metrics;
use crate::util::time;

use super::{CacheIndex, INDEX_FILE, IndexEntry, RefreshTrigger, StorageError, Tier};

const TMP_SUFFIX: &str = ".tmp";

/// What one eviction pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted_dates: Vec<NaiveDate>,
    pub files_removed: usize,
}

impl EvictionReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.evicted_dates.is_empty() && self.files_removed == 0
    }
}

/// Two-tier record cache plus its index.
///
/// Readers hold the index read lock while touching record files; eviction
/// holds the write lock across the index update and the file removal, so no
/// reader ever follows an entry to a deleted file.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    index: RwLock<CacheIndex>,
    metrics: Arc<Metrics>,
}

impl CacheStore {
    /// Opens (and creates if needed) the cache directory and loads its index.
    ///
    /// Readable live files the index does not know about (written before the
    /// index existed, or left behind by a corrupt index) are indexed under
    /// their file-name date, so eviction treats them like any other record.
    pub async fn open(dir: impl Into<PathBuf>, metrics: Arc<Metrics>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| StorageError::io(&dir, err))?;
        let index_path = dir.join(INDEX_FILE);
        let mut index = CacheIndex::load(&index_path).await?;
        let adopted = adopt_unindexed_live_files(&dir, &mut index).await?;
        if !adopted.is_empty() {
            index.persist(&index_path, time::now()).await?;
            info!(dates = ?adopted, "indexed live records found on disk");
        }
        info!(dir = %dir.display(), entries = index.len(), "cache store opened");
        Ok(Self {
            dir,
            index: RwLock::new(index),
            metrics,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn record_path(&self, tier: Tier, date: NaiveDate) -> PathBuf {
        self.dir.join(tier.file_name(date))
    }

    /// Reads the record for `date` without triggering a refresh.
    ///
    /// The indexed file comes first, then `temp_<date>.json`, then
    /// `data_<date>.json`. A malformed file is skipped in favour of the next
    /// tier; the error surfaces only when no tier yields a record.
    pub async fn lookup(&self, date: NaiveDate) -> Result<Option<ScrapedRecord>, StorageError> {
        let index = self.index.read().await;

        let mut candidates: Vec<(Tier, PathBuf)> = Vec::with_capacity(3);
        if let Some(entry) = index.get(date) {
            let tier = if Tier::Backup.parse_file_name(&entry.filename).is_some() {
                Tier::Backup
            } else {
                Tier::Live
            };
            candidates.push((tier, self.dir.join(&entry.filename)));
        }
        for tier in [Tier::Live, Tier::Backup] {
            let path = self.record_path(tier, date);
            if !candidates.iter().any(|(_, known)| known == &path) {
                candidates.push((tier, path));
            }
        }

        let mut last_error = None;
        for (tier, path) in candidates {
            match read_record(&path).await {
                Ok(record) => {
                    self.metrics
                        .cache_reads
                        .with_label_values(&[tier.as_str()])
                        .inc();
                    debug!(%date, %tier, "served cached record");
                    return Ok(Some(record));
                }
                Err(StorageError::NotFound(_)) => {}
                Err(err) => {
                    warn!(%date, %tier, error = %err, "unreadable cache record, trying next tier");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// Reads `date`, refreshing once on a miss. Never fails: an unreadable or
    /// still-missing record is served as an empty one.
    pub async fn get(&self, date: NaiveDate, trigger: &dyn RefreshTrigger) -> ScrapedRecord {
        if let Some(record) = self.lookup_or_log(date).await {
            return record;
        }

        info!(%date, "cache miss, refreshing before retrying lookup");
        trigger.refresh().await;

        if let Some(record) = self.lookup_or_log(date).await {
            return record;
        }
        self.metrics.cache_misses.inc();
        ScrapedRecord::empty()
    }

    async fn lookup_or_log(&self, date: NaiveDate) -> Option<ScrapedRecord> {
        match self.lookup(date).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%date, error = %err, "cache read failed");
                None
            }
        }
    }

    /// Writes the live-tier record for `actual_date` and indexes it,
    /// replacing any earlier record of that date.
    pub async fn put(
        &self,
        actual_date: NaiveDate,
        record: &ScrapedRecord,
    ) -> Result<IndexEntry, StorageError> {
        let path = self.record_path(Tier::Live, actual_date);
        let bytes =
            serde_json::to_vec_pretty(record).map_err(|err| StorageError::serde(&path, err))?;
        let now = time::now();

        let mut index = self.index.write().await;
        write_atomic(&path, &bytes).await?;
        let entry = IndexEntry {
            actual_date,
            date_text: record.date_label().map(str::to_string),
            filename: Tier::Live.file_name(actual_date),
            scraped_at: Some(record.scraped_at().unwrap_or(now)),
        };
        if index.upsert(entry.clone()).is_some() {
            debug!(%actual_date, "replaced earlier record");
        }
        index.persist(&self.index_path(), now).await?;
        self.metrics.records_written.inc();
        Ok(entry)
    }

    /// Copies the live record of `date` into the backup tier. Returns
    /// `false` when there is no live record to copy.
    pub async fn promote_to_backup(&self, date: NaiveDate) -> Result<bool, StorageError> {
        let _index = self.index.read().await;
        let live = self.record_path(Tier::Live, date);
        let bytes = match fs::read(&live).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(StorageError::io(&live, err)),
        };
        write_atomic(&self.record_path(Tier::Backup, date), &bytes).await?;
        self.metrics.backups_promoted.inc();
        info!(%date, "promoted live record to backup");
        Ok(true)
    }

    /// Drops index entries and live-tier files outside `retained`, plus
    /// orphaned live files and leftover temporary files. Backup files stay.
    pub async fn evict_outside_window(
        &self,
        retained: &[NaiveDate],
    ) -> Result<EvictionReport, StorageError> {
        let mut index = self.index.write().await;

        let evicted = index.retain_dates(retained);
        if !evicted.is_empty() {
            index.persist(&self.index_path(), time::now()).await?;
        }

        let mut report = EvictionReport {
            evicted_dates: evicted.iter().map(|entry| entry.actual_date).collect(),
            files_removed: 0,
        };
        for entry in &evicted {
            if Tier::Live.parse_file_name(&entry.filename).is_some()
                && remove_if_exists(&self.dir.join(&entry.filename)).await?
            {
                report.files_removed += 1;
            }
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|err| StorageError::io(&self.dir, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| StorageError::io(&self.dir, err))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let orphan = match Tier::Live.parse_file_name(name) {
                Some(date) => !retained.contains(&date),
                None => name.ends_with(TMP_SUFFIX),
            };
            if orphan && remove_if_exists(&entry.path()).await? {
                debug!(file = name, "removed orphaned cache file");
                report.files_removed += 1;
            }
        }

        if !report.is_noop() {
            self.metrics.records_evicted.inc_by(report.evicted_dates.len() as f64);
            info!(
                evicted = ?report.evicted_dates,
                files_removed = report.files_removed,
                "evicted records outside the retention window"
            );
        }
        Ok(report)
    }

    /// Indexed dates on or after `from`, earliest `limit` of them.
    pub async fn retained_dates(&self, from: NaiveDate, limit: usize) -> Vec<NaiveDate> {
        self.index.read().await.dates_from(from, limit)
    }

    /// Index entries on or after `from`, earliest `limit` of them.
    pub async fn indexed_entries(&self, from: NaiveDate, limit: usize) -> Vec<IndexEntry> {
        let index = self.index.read().await;
        index
            .dates_from(from, limit)
            .into_iter()
            .filter_map(|date| index.get(date).cloned())
            .collect()
    }

    pub async fn index_snapshot(&self) -> CacheIndex {
        self.index.read().await.clone()
    }
}

async fn read_record(path: &Path) -> Result<ScrapedRecord, StorageError> {
    let bytes = fs::read(path)
        .await
        .map_err(|err| StorageError::io(path, err))?;
    serde_json::from_slice(&bytes).map_err(|err| StorageError::serde(path, err))
}

async fn adopt_unindexed_live_files(
    dir: &Path,
    index: &mut CacheIndex,
) -> Result<Vec<NaiveDate>, StorageError> {
    let mut adopted = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| StorageError::io(dir, err))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| StorageError::io(dir, err))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(date) = Tier::Live.parse_file_name(name) else { continue };
        if index.get(date).is_some() {
            continue;
        }
        match read_record(&entry.path()).await {
            Ok(record) => {
                index.upsert(IndexEntry {
                    actual_date: date,
                    date_text: record.date_label().map(str::to_string),
                    filename: name.to_string(),
                    scraped_at: record.scraped_at(),
                });
                adopted.push(date);
            }
            Err(err) => warn!(file = name, error = %err, "skipping unreadable live record"),
        }
    }
    adopted.sort_unstable();
    Ok(adopted)
}

async fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StorageError::io(path, err)),
    }
}

/// Writes `bytes` next to `path` and renames it into place.
pub(super) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .await
        .map_err(|err| StorageError::io(&tmp, err))?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StorageError::io(path, err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubstitutionEntry;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, day).expect("date")
    }

    fn record(course: &str, label: &str) -> ScrapedRecord {
        ScrapedRecord::from_rows(
            vec![SubstitutionEntry::new(course, "3", "R12", "Schmidt", "Vertretung", "")],
            Some(label.to_string()),
            Utc.with_ymd_and_hms(2025, 12, 18, 12, 0, 0).single().expect("ts"),
        )
    }

    async fn open(dir: &TempDir) -> CacheStore {
        let metrics = Arc::new(Metrics::standalone().expect("metrics"));
        CacheStore::open(dir.path(), metrics).await.expect("open store")
    }

    fn write_raw(dir: &TempDir, name: &str, record: &ScrapedRecord) {
        let json = serde_json::to_vec(record).expect("serialize");
        std::fs::write(dir.path().join(name), json).expect("write raw");
    }

    #[derive(Default)]
    struct CountingTrigger {
        calls: AtomicUsize,
        writes: Option<(PathBuf, ScrapedRecord)>,
    }

    #[async_trait]
    impl RefreshTrigger for CountingTrigger {
        async fn refresh(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((path, record)) = &self.writes {
                let json = serde_json::to_vec(record).expect("serialize");
                std::fs::write(path, json).expect("write");
            }
        }
    }

    #[tokio::test]
    async fn put_then_lookup_round_trips() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        let rec = record("10A", "Freitag, 19.12.2025");

        let entry = store.put(date(19), &rec).await.expect("put");

        assert_eq!(entry.filename, "temp_2025-12-19.json");
        assert_eq!(entry.date_text.as_deref(), Some("Freitag, 19.12.2025"));
        assert_eq!(entry.scraped_at, rec.scraped_at());
        let read = store.lookup(date(19)).await.expect("lookup").expect("present");
        assert_eq!(read, rec);
        assert!(dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let store = open(&dir).await;
            store.put(date(19), &record("10A", "Freitag, 19.12.2025")).await.expect("put");
        }
        let store = open(&dir).await;
        assert_eq!(store.retained_dates(date(1), 4).await, vec![date(19)]);
    }

    #[tokio::test]
    async fn live_tier_wins_over_backup() {
        let dir = TempDir::new().expect("tempdir");
        write_raw(&dir, "data_2025-12-19.json", &record("OLD", "Freitag, 19.12.2025"));
        let store = open(&dir).await;
        store.put(date(19), &record("NEW", "Freitag, 19.12.2025")).await.expect("put");

        let read = store.lookup(date(19)).await.expect("lookup").expect("present");
        assert!(read.courses().contains("NEW"));
    }

    #[tokio::test]
    async fn unindexed_files_are_found_by_convention() {
        let dir = TempDir::new().expect("tempdir");
        write_raw(&dir, "data_2025-12-22.json", &record("7B", "Montag, 22.12.2025"));
        let store = open(&dir).await;

        let read = store.lookup(date(22)).await.expect("lookup").expect("present");
        assert!(read.courses().contains("7B"));
    }

    #[tokio::test]
    async fn open_indexes_live_files_missing_from_the_index() {
        let dir = TempDir::new().expect("tempdir");
        write_raw(&dir, "temp_2025-12-22.json", &record("7B", "Montag, 22.12.2025"));
        std::fs::write(dir.path().join("temp_2025-12-23.json"), b"{ truncated").expect("write");
        std::fs::write(dir.path().join("index.json"), b"not json").expect("write");

        let store = open(&dir).await;

        let entry = store
            .index_snapshot()
            .await
            .get(date(22))
            .cloned()
            .expect("adopted");
        assert_eq!(entry.filename, "temp_2025-12-22.json");
        assert_eq!(entry.date_text.as_deref(), Some("Montag, 22.12.2025"));
        assert_eq!(store.retained_dates(date(19), 4).await, vec![date(22)]);

        let report = store
            .evict_outside_window(&store.retained_dates(date(19), 4).await)
            .await
            .expect("evict");
        assert!(report.evicted_dates.is_empty());
        assert!(dir.path().join("temp_2025-12-22.json").exists());

        let reopened = open(&dir).await;
        assert_eq!(reopened.index_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn legacy_record_without_timestamp_loads() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join("temp_2025-12-22.json"),
            r#"{"data":[{"kurs":"5C","stunde":"1"}],"courses":["5C"]}"#,
        )
        .expect("write");
        let store = open(&dir).await;

        let read = store.lookup(date(22)).await.expect("lookup").expect("present");
        assert_eq!(read.rows()[0].course, "5C");
        assert!(read.scraped_at().is_none());
        assert!(read.date_label().is_none());
    }

    #[tokio::test]
    async fn malformed_live_file_falls_back_to_backup() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("temp_2025-12-22.json"), b"{ truncated").expect("write");
        write_raw(&dir, "data_2025-12-22.json", &record("7B", "Montag, 22.12.2025"));
        let store = open(&dir).await;

        let read = store.lookup(date(22)).await.expect("lookup").expect("present");
        assert!(read.courses().contains("7B"));
    }

    #[tokio::test]
    async fn get_refreshes_once_on_miss_and_retries() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        let trigger = CountingTrigger {
            calls: AtomicUsize::new(0),
            writes: Some((
                dir.path().join("temp_2025-12-22.json"),
                record("9D", "Montag, 22.12.2025"),
            )),
        };

        let read = store.get(date(22), &trigger).await;

        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
        assert!(read.courses().contains("9D"));
    }

    #[tokio::test]
    async fn get_returns_empty_record_when_still_missing() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        let trigger = CountingTrigger::default();

        let read = store.get(date(22), &trigger).await;

        assert_eq!(trigger.calls.load(Ordering::SeqCst), 1);
        assert!(read.is_empty());
        assert!(read.date_label().is_none());
    }

    #[tokio::test]
    async fn get_hit_does_not_refresh() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        store.put(date(19), &record("10A", "Freitag, 19.12.2025")).await.expect("put");
        let trigger = CountingTrigger::default();

        let read = store.get(date(19), &trigger).await;

        assert_eq!(trigger.calls.load(Ordering::SeqCst), 0);
        assert!(!read.is_empty());
    }

    #[tokio::test]
    async fn eviction_removes_stale_live_files_and_keeps_backups() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        for day in [15, 16, 17] {
            store.put(date(day), &record("10A", "Montag, 15.12.2025")).await.expect("put");
        }
        assert!(store.promote_to_backup(date(15)).await.expect("promote"));
        write_raw(&dir, "temp_2025-12-01.json", &record("X", "Montag, 01.12.2025"));
        std::fs::write(dir.path().join("temp_2025-12-17.json.tmp"), b"partial").expect("tmp");

        let first = store
            .evict_outside_window(&[date(16), date(17)])
            .await
            .expect("evict");

        assert_eq!(first.evicted_dates, vec![date(15)]);
        assert_eq!(first.files_removed, 3);
        assert!(!dir.path().join("temp_2025-12-15.json").exists());
        assert!(!dir.path().join("temp_2025-12-01.json").exists());
        assert!(!dir.path().join("temp_2025-12-17.json.tmp").exists());
        assert!(dir.path().join("temp_2025-12-16.json").exists());
        assert!(dir.path().join("data_2025-12-15.json").exists());
        assert_eq!(store.retained_dates(date(1), 4).await, vec![date(16), date(17)]);

        let second = store
            .evict_outside_window(&[date(16), date(17)])
            .await
            .expect("evict again");
        assert!(second.is_noop());
        assert_eq!(store.retained_dates(date(1), 4).await, vec![date(16), date(17)]);
    }

    #[tokio::test]
    async fn evicted_date_is_still_served_from_backup() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        store.put(date(15), &record("10A", "Montag, 15.12.2025")).await.expect("put");
        store.promote_to_backup(date(15)).await.expect("promote");
        store.evict_outside_window(&[]).await.expect("evict");

        let read = store.lookup(date(15)).await.expect("lookup").expect("backup");
        assert!(read.courses().contains("10A"));
    }

    #[tokio::test]
    async fn promote_without_live_record_is_a_noop() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        assert!(!store.promote_to_backup(date(19)).await.expect("promote"));
        assert!(!dir.path().join("data_2025-12-19.json").exists());
    }

    #[tokio::test]
    async fn put_replaces_earlier_record_of_same_date() {
        let dir = TempDir::new().expect("tempdir");
        let store = open(&dir).await;
        store.put(date(19), &record("OLD", "Freitag, 19.12.2025")).await.expect("put");
        store.put(date(19), &record("NEW", "Freitag, 19.12.2025")).await.expect("put");

        let read = store.lookup(date(19)).await.expect("lookup").expect("present");
        assert_eq!(read.courses().iter().collect::<Vec<_>>(), vec!["NEW"]);
        assert_eq!(store.index_snapshot().await.len(), 1);
    }
}
