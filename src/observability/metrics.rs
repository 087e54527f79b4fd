//! Prometheus counters of the worker.
use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, Histogram, Registry, register_counter_vec_with_registry,
    register_counter_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub refresh_runs: Counter,
    pub refresh_joined: Counter,
    pub slot_fetch_failures: Counter,
    pub slots_unkeyed: Counter,
    pub records_written: Counter,
    pub records_evicted: Counter,
    pub backups_promoted: Counter,
    /// Served reads, labelled by the tier the record came from.
    pub cache_reads: CounterVec,
    pub cache_misses: Counter,
    pub refresh_duration: Histogram,
}

impl Metrics {
    /// # Errors
    /// Fails when a metric with the same name is already registered.
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            refresh_runs: register_counter_with_registry!(
                "substitution_refresh_runs_total",
                "Refresh runs started",
                registry
            )?,
            refresh_joined: register_counter_with_registry!(
                "substitution_refresh_joined_total",
                "Refresh triggers that attached to an in-flight run",
                registry
            )?,
            slot_fetch_failures: register_counter_with_registry!(
                "substitution_slot_fetch_failures_total",
                "Slots skipped after exhausting fetch attempts",
                registry
            )?,
            slots_unkeyed: register_counter_with_registry!(
                "substitution_slots_unkeyed_total",
                "Slots discarded because their date label could not be parsed",
                registry
            )?,
            records_written: register_counter_with_registry!(
                "substitution_records_written_total",
                "Records written to the live tier",
                registry
            )?,
            records_evicted: register_counter_with_registry!(
                "substitution_records_evicted_total",
                "Live-tier records removed by eviction",
                registry
            )?,
            backups_promoted: register_counter_with_registry!(
                "substitution_backups_promoted_total",
                "Live-tier records copied into the backup tier",
                registry
            )?,
            cache_reads: register_counter_vec_with_registry!(
                "substitution_cache_reads_total",
                "Cache reads served, by tier",
                &["tier"],
                registry
            )?,
            cache_misses: register_counter_with_registry!(
                "substitution_cache_misses_total",
                "Reads answered with an empty record",
                registry
            )?,
            refresh_duration: register_histogram_with_registry!(
                "substitution_refresh_duration_seconds",
                "Wall time of a refresh run",
                vec![1.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 320.0],
                registry
            )?,
        })
    }

    /// Metrics on a private registry, for components used outside the app.
    ///
    /// # Errors
    /// See [`Metrics::new`].
    pub fn standalone() -> Result<Self, prometheus::Error> {
        Self::new(Arc::new(Registry::new()))
    }
}
