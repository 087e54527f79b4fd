//! Date-indexed, two-tier record cache on local disk.
//!
//! Live records are `temp_<YYYY-MM-DD>.json`, backup records
//! `data_<YYYY-MM-DD>.json`, and `index.json` maps actual dates to live
//! records. All writers go through [`CacheStore`].

mod cache;
mod error;
mod index;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;

pub use cache::{CacheStore, EvictionReport};
pub use error::StorageError;
pub use index::{CacheIndex, IndexEntry};

pub(crate) const INDEX_FILE: &str = "index.json";

/// Storage tier of a record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Live,
    Backup,
}

impl Tier {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Live => "temp_",
            Self::Backup => "data_",
        }
    }

    #[must_use]
    pub fn file_name(self, date: NaiveDate) -> String {
        format!("{}{}.json", self.prefix(), date.format("%Y-%m-%d"))
    }

    /// Parses the date out of a record file name of this tier.
    #[must_use]
    pub fn parse_file_name(self, name: &str) -> Option<NaiveDate> {
        let stem = name.strip_prefix(self.prefix())?.strip_suffix(".json")?;
        NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Backup => "backup",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Starts (or joins) a refresh run and waits for it to settle.
///
/// A cache miss calls this before retrying its lookup once.
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn refresh(&self);
}
