use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of "now" for request handling. Tests pin it to a fixed instant.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[must_use]
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `instant`.
#[must_use]
pub fn fixed_clock(instant: DateTime<Utc>) -> Clock {
    Arc::new(move || instant)
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}
