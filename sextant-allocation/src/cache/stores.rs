//! Cache of store file listings per node

use super::{bounded_fan_out, log_fetch_failures, ShardCache};
use crate::error::Result;
use crate::fetch::StoreMetadataLister;
use crate::routing::{DiscoveryNode, NodeId, ShardId};
use crate::store::StoreFilesMetadata;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const KIND: &str = "store_metadata";

/// Memoizes, per shard, the store listing each data node reported.
///
/// Nodes already hosting a live copy come back as `None` so replica
/// placement can rule them out without another fan-out. Nodes that failed
/// to answer are not inserted at all and get asked again next reroute.
pub struct NodeStoreCache {
    lister: Arc<dyn StoreMetadataLister>,
    timeout: Duration,
    cache: ShardCache<Option<StoreFilesMetadata>>,
}

impl NodeStoreCache {
    pub fn new(lister: Arc<dyn StoreMetadataLister>, timeout: Duration) -> Self {
        Self {
            lister,
            timeout,
            cache: ShardCache::new(KIND),
        }
    }

    /// Return the per-node store map for a shard, fanning out to any live
    /// data node the cache has no answer for.
    pub async fn fetch(
        &self,
        shard_id: &ShardId,
        live_nodes: &[&DiscoveryNode],
    ) -> Result<HashMap<NodeId, Option<StoreFilesMetadata>>> {
        let missing = self.cache.missing_nodes(shard_id, live_nodes);
        if missing.is_empty() {
            return Ok(self.cache.snapshot(shard_id));
        }

        debug!(
            "Listing store metadata of {} on {} nodes",
            shard_id,
            missing.len()
        );
        // Allocated copies are included so the active primary's store shows
        // up for byte-level comparison.
        let response = bounded_fan_out(
            KIND,
            shard_id,
            self.timeout,
            self.lister
                .list_store_metadata(shard_id, true, &missing, self.timeout),
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
    pub fn peek(&self, shard_id: &ShardId) -> Option<HashMap<NodeId, Option<StoreFilesMetadata>>> {
        self.cache.peek(shard_id)
    }
}
