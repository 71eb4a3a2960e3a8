//! Replica placement policy
//!
//! A replica recovers by copying segments from the active primary, so the
//! best home is the node whose leftover on-disk data overlaps the primary's
//! store the most. Matching sync ids prove the stores are segment-identical
//! and beat any byte count. The store-listing fan-out is expensive, so the
//! deciders are asked first whether any node could take the replica at all.

use super::Placement;
use crate::cache::NodeStoreCache;
use crate::decider::Verdict;
use crate::error::Result;
use crate::metrics;
use crate::routing::{NodeId, RoutingAllocation, ShardRouting};
use crate::store::StoreFilesMetadata;
use std::sync::Arc;
use tracing::debug;

/// Placements with matching sync ids need no byte copy at all
const SYNC_ID_MATCH_SCORE: u64 = u64::MAX;

/// Places unassigned replica shard copies near reusable on-disk data
pub struct ReplicaShardAllocator {
    cache: Arc<NodeStoreCache>,
}

impl ReplicaShardAllocator {
    pub fn new(cache: Arc<NodeStoreCache>) -> Self {
        Self { cache }
    }

    /// Run the replica phase over the unassigned list. Returns whether any
    /// shard was assigned.
    pub async fn allocate(&self, allocation: &mut RoutingAllocation) -> Result<bool> {
        let mut changed = false;
        let mut index = 0;
        while index < allocation.unassigned().len() {
            if allocation.unassigned()[index].primary {
                index += 1;
                continue;
            }

            let shard = allocation.take_unassigned(index);
            let placement = match self.place(&shard, allocation).await {
                Ok(placement) => placement,
                Err(err) => {
                    allocation.restore_unassigned(index, shard);
                    return Err(err);
                }
            };
            match placement {
                Placement::Assign { node, version, .. } => {
                    debug!("Allocating replica {} to {}", shard.shard_id, node);
                    metrics::record_allocation("replica", "assigned");
                    allocation.assign(shard, node, version);
                    changed = true;
                }
                Placement::Ignore => {
                    metrics::record_allocation("replica", "ignored");
                    allocation.ignore_unassigned(shard);
                }
                Placement::Defer => {
                    allocation.restore_unassigned(index, shard);
                    index += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn place(
        &self,
        shard: &ShardRouting,
        allocation: &RoutingAllocation,
    ) -> Result<Placement> {
        let data_nodes = allocation.data_nodes();

        // Cheap pre-pass: if no node may take the replica there is no point
        // paying for the store listing. Caller-ignored nodes are ruled out
        // here too, since the scoring loop below will never pick them.
        let allocatable_somewhere = data_nodes
            .iter()
            .filter(|node| !allocation.should_ignore(&shard.shard_id, &node.id))
            .any(|node| allocation.decide(shard, node).verdict == Verdict::Yes);
        if !allocatable_somewhere {
            debug!(
                "No node may take replica {}, skipping store listing",
                shard.shard_id
            );
            return Ok(Placement::Defer);
        }

        let stores = self.cache.fetch(&shard.shard_id, &data_nodes).await?;

        let Some(primary) = allocation.table().active_primary(&shard.shard_id) else {
            debug!(
                "No active primary for {}, cannot size replica recovery",
                shard.shard_id
            );
            return Ok(Placement::Defer);
        };
        let Some(primary_store) = stores.get(&primary.node).and_then(|meta| meta.as_ref()) else {
            debug!(
                "Store listing for primary of {} on {} unavailable",
                shard.shard_id, primary.node
            );
            return Ok(Placement::Defer);
        };

        // Scan in node-id order so ties resolve the same way every reroute.
        let mut entries: Vec<(&NodeId, &Option<StoreFilesMetadata>)> = stores.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut best_node: Option<NodeId> = None;
        let mut best_score: u64 = 0;
        for (node_id, meta) in entries {
            let Some(meta) = meta else { continue };
            if meta.allocated {
                continue;
            }
            if allocation.should_ignore(&shard.shard_id, node_id) {
                continue;
            }
            let Some(node) = allocation.node(node_id) else {
                continue;
            };
            // THROTTLE stays in the running; the final consultation below
            // turns it into a delay rather than a rejection.
            if allocation.decide(shard, node).verdict == Verdict::No {
                continue;
            }

            let score = if primary_store.sync_id_matches(meta) {
                SYNC_ID_MATCH_SCORE
            } else {
                meta.matching_bytes(primary_store)
            };
            if score > best_score {
                best_score = score;
                best_node = Some(node_id.clone());
            }
        }

        let Some(node_id) = best_node else {
            debug!("No reusable store found for replica {}", shard.shard_id);
            return Ok(Placement::Defer);
        };
        let Some(node) = allocation.node(&node_id) else {
            return Ok(Placement::Defer);
        };

        let decision = allocation.decide(shard, node);
        match decision.verdict {
            Verdict::Yes => {
                debug!(
                    "Node {} can reuse {} bytes of {} ({})",
                    node_id, best_score, shard.shard_id, decision.reason
                );
                Ok(Placement::Assign {
                    node: node_id,
                    version: None,
                    forced: false,
                })
            }
            Verdict::Throttle => {
                debug!(
                    "Allocation of replica {} to {} throttled, delaying",
                    shard.shard_id, node_id
                );
                Ok(Placement::Ignore)
            }
            Verdict::No => Ok(Placement::Defer),
        }
    }
}
