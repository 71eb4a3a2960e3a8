//! Fan-out contracts for querying data nodes
//!
//! The allocator never talks to the transport directly; it goes through two
//! listing capabilities implemented by the node client. A fan-out in which
//! some nodes fail is still a successful call: per-node failures ride along
//! in the response. Only a totally unavailable transport surfaces as `Err`,
//! which aborts the current reroute.

use crate::error::{AllocationError, Result};
use crate::routing::{NodeId, ShardId};
use crate::store::StoreFilesMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A node that failed to answer a fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node_id: NodeId,
    pub error: AllocationError,
}

/// Per-node fan-out results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesResponse<T> {
    /// One entry per node that answered
    pub responses: Vec<(NodeId, T)>,

    /// Nodes that did not answer, with the reason
    pub failures: Vec<NodeFailure>,
}

impl<T> Default for NodesResponse<T> {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Lists the on-disk shard version held by each queried node.
///
/// A version of `-1` means the node has no copy. On a shared filesystem
/// nodes report `0` even for shards they never opened, since every copy is
/// recoverable there.
#[async_trait]
pub trait StartedShardLister: Send + Sync {
    async fn list_started_shards(
        &self,
        shard_id: &ShardId,
        index_uuid: &str,
        nodes: &[NodeId],
        timeout: Duration,
    ) -> Result<NodesResponse<i64>>;
}

/// Lists store file metadata for a shard on each queried node.
///
/// A `None` entry means the node produced no usable store listing, e.g.
/// because a started copy already lives there; such nodes are never
/// placement candidates. With `include_unallocated` unset, only nodes
/// without a live copy are asked.
#[async_trait]
pub trait StoreMetadataLister: Send + Sync {
    async fn list_store_metadata(
        &self,
        shard_id: &ShardId,
        include_unallocated: bool,
        nodes: &[NodeId],
        timeout: Duration,
    ) -> Result<NodesResponse<Option<StoreFilesMetadata>>>;
}
