//! Allocator observability metrics
//!
//! Provides Prometheus-compatible metrics for the allocation engine:
//! - Fan-out duration and per-node failures
//! - Allocation outcomes (assigned/forced/ignored) per shard role
//! - Cache invalidations and purges

use std::time::Duration;

/// Record the duration of a node-listing fan-out
pub fn record_fetch_duration(kind: &'static str, duration: Duration) {
    metrics::histogram!(
        "sextant_allocation_fetch_duration_seconds",
        "kind" => kind,
    )
    .record(duration.as_secs_f64());
}

/// Record a per-node fan-out failure
pub fn record_fetch_failure(kind: &'static str, error_type: &'static str) {
    metrics::counter!(
        "sextant_allocation_fetch_failures_total",
        "kind" => kind,
        "error_type" => error_type,
    )
    .increment(1);
}

/// Record an allocation outcome for an unassigned shard
pub fn record_allocation(role: &'static str, outcome: &'static str) {
    metrics::counter!(
        "sextant_allocation_decisions_total",
        "role" => role,
        "outcome" => outcome,
    )
    .increment(1);
}

/// Record a cache entry dropped by a shard lifecycle event
pub fn record_cache_invalidation(kind: &'static str) {
    metrics::counter!(
        "sextant_allocation_cache_invalidations_total",
        "kind" => kind,
    )
    .increment(1);
}

/// Record cached per-node entries purged because the node left the cluster
pub fn record_cache_purge(kind: &'static str, count: u64) {
    metrics::counter!(
        "sextant_allocation_cache_purged_nodes_total",
        "kind" => kind,
    )
    .increment(count);
}
