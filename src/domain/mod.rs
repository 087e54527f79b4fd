mod date_label;
mod entry;
mod record;

pub use date_label::{DateKey, DateLabelError, find_date_label, parse_actual_date};
pub use entry::SubstitutionEntry;
pub use record::{CacheRecordView, ScrapedRecord};
