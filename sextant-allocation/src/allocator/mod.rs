//! The unassigned-shard allocation engine
//!
//! Invoked synchronously by the routing service on every reroute. A reroute
//! runs in two strict phases: primaries first, then replicas. Primaries go
//! to the node holding the freshest on-disk copy, gated by a configurable
//! quorum of discovered copies; replicas go where existing on-disk data
//! shortens recovery. Both phases consult the decider chain before touching
//! the routing table.
//!
//! The engine owns the two per-shard fan-out caches and drops their entries
//! when the shard lifecycle moves (started/failed), which the routing
//! service reports through [`UnassignedAllocator::apply_started_shards`] and
//! [`UnassignedAllocator::apply_failed_shards`].

mod primary;
mod replica;

pub use primary::PrimaryShardAllocator;
pub use replica::ReplicaShardAllocator;

use crate::cache::{NodeStoreCache, NodeVersionCache};
use crate::config::{GatewaySettings, Settings};
use crate::error::Result;
use crate::fetch::{StartedShardLister, StoreMetadataLister};
use crate::routing::{NodeId, RoutingAllocation, ShardRouting};
use std::sync::Arc;

/// Where one unassigned shard ends up within a reroute
pub(crate) enum Placement {
    /// Assign to `node`; primaries stamp the highest discovered version
    Assign {
        node: NodeId,
        version: Option<i64>,
        forced: bool,
    },
    /// Give up for this reroute
    Ignore,
    /// Leave unassigned; the next reroute retries
    Defer,
}

/// Allocation engine for unassigned shards
pub struct UnassignedAllocator {
    primaries: PrimaryShardAllocator,
    replicas: ReplicaShardAllocator,
    versions: Arc<NodeVersionCache>,
    stores: Arc<NodeStoreCache>,
}

impl UnassignedAllocator {
    pub fn new(
        settings: &Settings,
        shard_lister: Arc<dyn StartedShardLister>,
        store_lister: Arc<dyn StoreMetadataLister>,
    ) -> Self {
        let gateway = GatewaySettings::from_settings(settings);
        let versions = Arc::new(NodeVersionCache::new(shard_lister, gateway.list_timeout));
        let stores = Arc::new(NodeStoreCache::new(store_lister, gateway.list_timeout));
        Self {
            primaries: PrimaryShardAllocator::new(Arc::clone(&versions), gateway),
            replicas: ReplicaShardAllocator::new(Arc::clone(&stores)),
            versions,
            stores,
        }
    }

    /// Assign as many unassigned shards as possible, primaries before
    /// replicas. Returns whether the routing changed.
    pub async fn allocate_unassigned(&self, allocation: &mut RoutingAllocation) -> Result<bool> {
        let mut changed = self.primaries.allocate(allocation).await?;
        changed |= self.replicas.allocate(allocation).await?;
        Ok(changed)
    }

    /// Drop cached fan-out answers for shards that just started
    pub fn apply_started_shards(&self, shards: &[ShardRouting]) {
        for shard in shards {
            self.versions.invalidate(&shard.shard_id);
            self.stores.invalidate(&shard.shard_id);
        }
    }

    /// Drop cached fan-out answers for shards that just failed
    pub fn apply_failed_shards(&self, shards: &[ShardRouting]) {
        for shard in shards {
            self.versions.invalidate(&shard.shard_id);
            self.stores.invalidate(&shard.shard_id);
        }
    }

    /// The on-disk version cache, for inspection
    pub fn version_cache(&self) -> &NodeVersionCache {
        &self.versions
    }

    /// The store metadata cache, for inspection
    pub fn store_cache(&self) -> &NodeStoreCache {
        &self.stores
    }
}
