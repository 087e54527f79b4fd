//! Refreshing the retention window from the source pages.

mod coordinator;
mod orchestrator;
mod report;

pub use coordinator::RefreshCoordinator;
pub use orchestrator::{RefreshOrchestrator, RefreshSettings};
pub use report::{RefreshReport, SlotOutcome, SlotReport};
