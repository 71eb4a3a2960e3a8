//! Per-shard caches over the node-listing fan-outs
//!
//! Listing every data node is the expensive part of a reroute, so answers
//! are memoized per shard id until a lifecycle event invalidates them:
//!
//! ```text
//! fetch(shard): purge entries for departed nodes
//!               fan out to live nodes missing from the entry
//!               merge successes, return the full per-node map
//! invalidate(shard): drop the entry (shard started or failed)
//! ```
//!
//! Negative answers are as expensive to obtain as positive ones and are
//! cached alike. A node that failed to answer is simply absent and will be
//! asked again on the next reroute.

mod stores;
mod versions;

pub use stores::NodeStoreCache;
pub use versions::{NodeVersionCache, NO_COPY_VERSION};

use crate::error::{AllocationError, Result};
use crate::fetch::NodeFailure;
use crate::metrics;
use crate::routing::{DiscoveryNode, NodeId, ShardId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Concurrent shard-id-keyed map of per-node values.
///
/// Insertions and removals are atomic at map level; the reroute loop is the
/// only compound writer, so no wider locking is needed. The lock is never
/// held across an await: miss lists are computed under it, the fan-out runs
/// outside it, and results are merged under it again.
pub(crate) struct ShardCache<V> {
    kind: &'static str,
    entries: RwLock<HashMap<ShardId, HashMap<NodeId, V>>>,
}

impl<V: Clone> ShardCache<V> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Purge cached entries for nodes no longer in the cluster and return
    /// the live nodes the cache holds no answer for.
    pub(crate) fn missing_nodes(
        &self,
        shard_id: &ShardId,
        live_nodes: &[&DiscoveryNode],
    ) -> Vec<NodeId> {
        let mut entries = self.entries.write();
        let entry = entries.entry(shard_id.clone()).or_default();

        let before = entry.len();
        entry.retain(|id, _| live_nodes.iter().any(|node| node.id == *id));
        let purged = before - entry.len();
        if purged > 0 {
            debug!(
                "Purged {} cached {} entries for {} after node departures",
                purged, self.kind, shard_id
            );
            metrics::record_cache_purge(self.kind, purged as u64);
        }

        live_nodes
            .iter()
            .filter(|node| !entry.contains_key(&node.id))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Merge fan-out answers into the shard's entry
    pub(crate) fn insert(&self, shard_id: &ShardId, values: Vec<(NodeId, V)>) {
        let mut entries = self.entries.write();
        let entry = entries.entry(shard_id.clone()).or_default();
        for (node_id, value) in values {
            entry.insert(node_id, value);
        }
    }

    /// Clone the shard's full per-node map
    pub(crate) fn snapshot(&self, shard_id: &ShardId) -> HashMap<NodeId, V> {
        self.entries
            .read()
            .get(shard_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the shard's entry; returns whether one existed
    pub(crate) fn invalidate(&self, shard_id: &ShardId) -> bool {
        let existed = self.entries.write().remove(shard_id).is_some();
        if existed {
            debug!("Invalidated cached {} for {}", self.kind, shard_id);
            metrics::record_cache_invalidation(self.kind);
        }
        existed
    }

    /// Clone the shard's entry without touching it, if one exists
    pub(crate) fn peek(&self, shard_id: &ShardId) -> Option<HashMap<NodeId, V>> {
        self.entries.read().get(shard_id).cloned()
    }
}

/// Run a listing fan-out under the configured hard bound and record its
/// duration. The same budget is passed through for the adapter's per-node
/// waits; an adapter that overruns it is cut off here.
pub(crate) async fn bounded_fan_out<T, F>(
    kind: &'static str,
    shard_id: &ShardId,
    timeout: Duration,
    fan_out: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, fan_out).await;
    metrics::record_fetch_duration(kind, started.elapsed());
    match result {
        Ok(response) => response,
        Err(_) => Err(AllocationError::Timeout(format!(
            "listing {} for {} timed out after {:?}",
            kind, shard_id, timeout
        ))),
    }
}

/// Log per-node fan-out failures. Connection failures are routine while
/// nodes cycle and stay at debug; everything else is warned.
pub(crate) fn log_fetch_failures(
    kind: &'static str,
    shard_id: &ShardId,
    failures: &[NodeFailure],
) {
    for failure in failures {
        metrics::record_fetch_failure(kind, failure.error.error_type());
        if failure.error.is_connection() {
            debug!(
                "Failed to list {} for {} on {}: {}",
                kind, shard_id, failure.node_id, failure.error
            );
        } else {
            warn!(
                "Failed to list {} for {} on {}: {}",
                kind, shard_id, failure.node_id, failure.error
            );
        }
    }
}
