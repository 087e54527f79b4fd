use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// `<weekday>, DD.MM.YYYY`, e.g. `Freitag, 19.12.2025`.
static DATE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\p{L}+),\s*(\d{1,2})\.(\d{1,2})\.(\d{4})").expect("date label regex compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateLabelError {
    #[error("page carried no date label")]
    Missing,
    #[error("date label {0:?} does not match \"<weekday>, DD.MM.YYYY\"")]
    Unrecognized(String),
    #[error("date label {0:?} names a day that does not exist")]
    InvalidDate(String),
}

/// Parses the actual date out of a scraped date label.
pub fn parse_actual_date(label: &str) -> Result<NaiveDate, DateLabelError> {
    let caps = DATE_LABEL_RE
        .captures(label)
        .ok_or_else(|| DateLabelError::Unrecognized(label.to_string()))?;
    let number = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
    let (Some(day), Some(month), Some(year)) = (number(2), number(3), number(4)) else {
        return Err(DateLabelError::Unrecognized(label.to_string()));
    };
    let year = i32::try_from(year).map_err(|_| DateLabelError::InvalidDate(label.to_string()))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DateLabelError::InvalidDate(label.to_string()))
}

/// Finds the first date label in free page text.
#[must_use]
pub fn find_date_label(text: &str) -> Option<String> {
    DATE_LABEL_RE
        .find(text)
        .map(|m| m.as_str().trim().to_string())
}

/// Storage key of a scraped page.
///
/// Only the date printed on the page decides where a record is stored; a page
/// whose label cannot be parsed is `Unkeyed` and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateKey {
    Keyed { actual_date: NaiveDate },
    Unkeyed { reason: DateLabelError },
}

impl DateKey {
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(parse_actual_date) {
            Some(Ok(actual_date)) => Self::Keyed { actual_date },
            Some(Err(reason)) => Self::Unkeyed { reason },
            None => Self::Unkeyed {
                reason: DateLabelError::Missing,
            },
        }
    }
}
