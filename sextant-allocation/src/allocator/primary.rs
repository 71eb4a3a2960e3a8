//! Primary placement policy
//!
//! A primary must recover from the freshest on-disk copy. The policy fans
//! out for per-node versions (cached), requires a configurable quorum of
//! discovered copies, and prefers the nodes tied at the highest version.
//! Deciders are consulted in that order; when every candidate refuses, the
//! primary is forced onto one of them anyway, because an unallocated
//! primary is unavailable data.

use super::Placement;
use crate::cache::{NodeVersionCache, NO_COPY_VERSION};
use crate::config::GatewaySettings;
use crate::decider::Verdict;
use crate::error::Result;
use crate::metrics;
use crate::routing::{NodeId, RoutingAllocation, ShardRouting};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Places unassigned primary shard copies
pub struct PrimaryShardAllocator {
    cache: Arc<NodeVersionCache>,
    settings: GatewaySettings,
}

impl PrimaryShardAllocator {
    pub fn new(cache: Arc<NodeVersionCache>, settings: GatewaySettings) -> Self {
        Self { cache, settings }
    }

    /// Run the primary phase over the unassigned list. Returns whether any
    /// shard was assigned.
    pub async fn allocate(&self, allocation: &mut RoutingAllocation) -> Result<bool> {
        let mut changed = false;
        let mut index = 0;
        while index < allocation.unassigned().len() {
            let eligible = {
                let shard = &allocation.unassigned()[index];
                shard.primary && shard.allocated_post_api
            };
            if !eligible {
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
                Placement::Assign {
                    node,
                    version,
                    forced,
                } => {
                    if forced {
                        info!(
                            "Forcing allocation of primary {} to {} despite decider refusal",
                            shard.shard_id, node
                        );
                        metrics::record_allocation("primary", "forced");
                    } else {
                        debug!(
                            "Allocating primary {} to {} with version {:?}",
                            shard.shard_id, node, version
                        );
                        metrics::record_allocation("primary", "assigned");
                    }
                    allocation.assign(shard, node, version);
                    changed = true;
                }
                Placement::Ignore => {
                    metrics::record_allocation("primary", "ignored");
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
        let Some(index_meta) = allocation.index(shard.shard_id.index()) else {
            warn!(
                "No metadata for index {:?}, leaving {} unassigned",
                shard.shard_id.index(),
                shard.shard_id
            );
            return Ok(Placement::Defer);
        };

        let data_nodes = allocation.data_nodes();
        let versions = self
            .cache
            .fetch(&shard.shard_id, &index_meta.uuid, &data_nodes)
            .await?;
        let versions: Vec<(NodeId, i64)> = versions
            .into_iter()
            .filter(|(node_id, _)| !allocation.should_ignore(&shard.shard_id, node_id))
            .collect();

        // On a shared filesystem every node can recover the copy, so the
        // reported version only matters for logging.
        let recover_anywhere = index_meta.shared_filesystem() && index_meta.recover_on_any_node();

        let (found, highest_version, mut candidates) = if recover_anywhere {
            let highest = versions
                .iter()
                .map(|(_, version)| *version)
                .max()
                .unwrap_or(NO_COPY_VERSION);
            (versions.len(), highest, versions)
        } else {
            let with_copy: Vec<(NodeId, i64)> = versions
                .into_iter()
                .filter(|(_, version)| *version != NO_COPY_VERSION)
                .collect();
            let found = with_copy.len();
            let highest = with_copy
                .iter()
                .map(|(_, version)| *version)
                .max()
                .unwrap_or(NO_COPY_VERSION);
            let candidates = with_copy
                .into_iter()
                .filter(|(_, version)| *version == highest)
                .collect();
            (found, highest, candidates)
        };

        // A shard being restored from a repository needs no quorum; the
        // repository is authoritative.
        if shard.restore_source.is_none() {
            let initial = self.settings.initial_shards_for(index_meta);
            let required = initial.required_copies(index_meta.number_of_replicas);
            if found < required {
                debug!(
                    "Found {} on-disk copies of {} ({} required), delaying allocation",
                    found, shard.shard_id, required
                );
                return Ok(Placement::Ignore);
            }
        }

        if candidates.is_empty() {
            debug!("No on-disk copy of {} found on any node", shard.shard_id);
            return Ok(Placement::Defer);
        }

        // Freshest copy first; ties break by node id so a reroute over the
        // same inputs picks the same node.
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut throttled: Vec<NodeId> = Vec::new();
        let mut refused: Vec<NodeId> = Vec::new();
        for (node_id, version) in &candidates {
            let Some(node) = allocation.node(node_id) else {
                continue;
            };
            let decision = allocation.decide(shard, node);
            match decision.verdict {
                Verdict::Yes => {
                    debug!(
                        "Node {} holds version {} of {} and may take it: {}",
                        node_id, version, shard.shard_id, decision.reason
                    );
                    return Ok(Placement::Assign {
                        node: node_id.clone(),
                        version: Some(highest_version),
                        forced: false,
                    });
                }
                Verdict::Throttle => throttled.push(node_id.clone()),
                Verdict::No => refused.push(node_id.clone()),
            }
        }

        if !throttled.is_empty() {
            debug!(
                "Allocation of primary {} throttled on {:?}, delaying",
                shard.shard_id, throttled
            );
            return Ok(Placement::Ignore);
        }

        // Every candidate said no. The on-disk copies are the only data
        // this shard has; refusing them all would risk losing it, so the
        // deciders are overridden for primaries.
        if let Some(node_id) = refused.first() {
            return Ok(Placement::Assign {
                node: node_id.clone(),
                version: Some(highest_version),
                forced: true,
            });
        }

        Ok(Placement::Defer)
    }
}
