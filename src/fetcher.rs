//! Boundary to the page-rendering source.
//!
//! The refresh logic only depends on [`PageFetcher`]; how a page is loaded
//! and turned into rows is an adapter concern.

pub mod extract;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::SubstitutionEntry;

pub use http::{HttpFetcherConfig, HttpPageFetcher};

/// Transient failures of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    Unreachable(String),
    #[error("redirected to unexpected page {0}")]
    Redirected(String),
    #[error("fetch attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("page showed substitution rows but none could be extracted")]
    Incomplete,
}

/// What the page showed when it was considered ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Substitution rows are present.
    RowsDetected,
    /// A table is rendered without body rows.
    EmptyTable,
    /// The page shows a recognised "no data" marker.
    EmptyIndicator,
    /// Nothing conclusive appeared within the readiness budget.
    Undetermined,
}

impl Readiness {
    /// Whether the page affirmatively has nothing to show.
    #[must_use]
    pub fn is_empty_signal(self) -> bool {
        matches!(self, Self::EmptyTable | Self::EmptyIndicator)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RowsDetected => "rows-detected",
            Self::EmptyTable => "empty-table",
            Self::EmptyIndicator => "empty-indicator",
            Self::Undetermined => "undetermined",
        }
    }
}

/// Rows and date label extracted from one source page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub rows: Vec<SubstitutionEntry>,
    pub date_label: Option<String>,
    pub readiness: Readiness,
}

impl FetchedPage {
    #[must_use]
    pub fn new(
        rows: Vec<SubstitutionEntry>,
        date_label: Option<String>,
        readiness: Readiness,
    ) -> Self {
        Self {
            rows,
            date_label,
            readiness,
        }
    }

    /// A page that affirmatively shows no substitutions.
    #[must_use]
    pub fn empty(date_label: Option<String>, readiness: Readiness) -> Self {
        Self::new(Vec::new(), date_label, readiness)
    }

    /// Accepts rows, an affirmative empty signal, or an undetermined page
    /// (served as empty). Rejects pages that showed rows but yielded none.
    pub fn validate(self) -> Result<Self, FetchError> {
        if self.rows.is_empty() && self.readiness == Readiness::RowsDetected {
            return Err(FetchError::Incomplete);
        }
        Ok(self)
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Loads `url` and extracts its substitution rows and date label.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_empty_signal() {
        let page = FetchedPage::empty(None, Readiness::EmptyIndicator);
        assert!(page.validate().is_ok());
    }

    #[test]
    fn validate_accepts_undetermined_as_empty() {
        let page = FetchedPage::empty(None, Readiness::Undetermined);
        let page = page.validate().expect("undetermined is not an error");
        assert!(page.rows.is_empty());
    }

    #[test]
    fn validate_rejects_rows_detected_without_rows() {
        let page = FetchedPage::empty(None, Readiness::RowsDetected);
        assert_eq!(page.validate(), Err(FetchError::Incomplete));
    }
}
