//! Timers that drive refresh runs: a fixed-interval refresh and a daily
//! backup pass at a local hour. Both go through the same coordinator as
//! request-triggered refreshes.

pub mod cadence;
mod daemon;

pub use cadence::DailyCadence;
pub use daemon::{BackupDaemon, BackupSummary, RefreshDaemon, run_backup_pass};
