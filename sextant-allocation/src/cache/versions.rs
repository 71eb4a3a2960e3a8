//! Cache of on-disk shard versions per node

use super::{bounded_fan_out, log_fetch_failures, ShardCache};
use crate::error::Result;
use crate::fetch::StartedShardLister;
use crate::routing::{DiscoveryNode, NodeId, ShardId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Version reported by a node holding no on-disk copy of a shard
pub const NO_COPY_VERSION: i64 = -1;

const KIND: &str = "shard_versions";

/// Memoizes, per shard, the on-disk version each data node reported.
///
/// `NO_COPY_VERSION` answers are kept: knowing a node has nothing is as
/// expensive to learn as knowing what it has.
pub struct NodeVersionCache {
    lister: Arc<dyn StartedShardLister>,
    timeout: Duration,
    cache: ShardCache<i64>,
}

impl NodeVersionCache {
    pub fn new(lister: Arc<dyn StartedShardLister>, timeout: Duration) -> Self {
        Self {
            lister,
            timeout,
            cache: ShardCache::new(KIND),
        }
    }

    /// Return the per-node version map for a shard, fanning out to any live
    /// data node the cache has no answer for.
    pub async fn fetch(
        &self,
        shard_id: &ShardId,
        index_uuid: &str,
        live_nodes: &[&DiscoveryNode],
    ) -> Result<HashMap<NodeId, i64>> {
        let missing = self.cache.missing_nodes(shard_id, live_nodes);
        if missing.is_empty() {
            return Ok(self.cache.snapshot(shard_id));
        }

        debug!(
            "Listing on-disk versions of {} on {} nodes",
            shard_id,
            missing.len()
        );
        let response = bounded_fan_out(
            KIND,
            shard_id,
            self.timeout,
            self.lister
                .list_started_shards(shard_id, index_uuid, &missing, self.timeout),
        )
        .await?;

        log_fetch_failures(KIND, shard_id, &response.failures);
        self.cache.insert(shard_id, response.responses);
        Ok(self.cache.snapshot(shard_id))
    }

    /// Drop the shard's cached answers after a lifecycle event
    pub fn invalidate(&self, shard_id: &ShardId) {
        self.cache.invalidate(shard_id);
    }

    /// Inspect the cached entry without fetching
    pub fn peek(&self, shard_id: &ShardId) -> Option<HashMap<NodeId, i64>> {
        self.cache.peek(shard_id)
    }
}
