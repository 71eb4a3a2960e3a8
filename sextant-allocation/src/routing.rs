//! The cluster-state slice the allocator consumes
//!
//! These types mirror what the routing service hands to the allocator on a
//! reroute: the live node set, per-index metadata, the assigned routing
//! table, and the list of shard copies still waiting for a home. The
//! allocator mutates the [`RoutingAllocation`] it is given; publishing the
//! resulting cluster state is the caller's concern.

use crate::config::{self, Settings};
use crate::decider::{AllocationDecider, Decision};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifies one shard of one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardId {
    index: String,
    shard: u32,
}

impl ShardId {
    pub fn new(index: impl Into<String>, shard: u32) -> Self {
        Self {
            index: index.into(),
            shard,
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.shard)
    }
}

/// Opaque node identifier, stable until the node leaves the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cluster node as seen by the allocator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryNode {
    /// Unique node identifier
    pub id: NodeId,

    /// Human-readable node name
    pub name: String,

    /// Whether the node stores shard data; only data nodes participate in
    /// allocation
    pub data: bool,
}

impl DiscoveryNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, data: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data,
        }
    }
}

/// An unassigned shard copy waiting for a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardRouting {
    /// Which shard this is a copy of
    pub shard_id: ShardId,

    /// Primary copy or replica
    pub primary: bool,

    /// Set when the copy will be restored from a repository; the repository
    /// is authoritative, so on-disk quorum rules do not apply
    pub restore_source: Option<String>,

    /// Whether any primary copy of this shard was ever live in the cluster.
    /// A shard that never held data has nothing on disk to recover from and
    /// is not this allocator's job.
    pub allocated_post_api: bool,
}

impl ShardRouting {
    /// An unassigned primary copy
    pub fn primary(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            primary: true,
            restore_source: None,
            allocated_post_api: true,
        }
    }

    /// An unassigned replica copy
    pub fn replica(shard_id: ShardId) -> Self {
        Self {
            shard_id,
            primary: false,
            restore_source: None,
            allocated_post_api: true,
        }
    }

    /// Builder-style restore source
    pub fn with_restore_source(mut self, repository: impl Into<String>) -> Self {
        self.restore_source = Some(repository.into());
        self
    }
}

/// Per-index metadata relevant to allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Index UUID, distinguishing reincarnations of the same index name
    pub uuid: String,

    /// Configured replica count (copies beyond the primary)
    pub number_of_replicas: u32,

    /// Index-level settings bag
    pub settings: Settings,
}

impl IndexMetadata {
    pub fn new(number_of_replicas: u32) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            number_of_replicas,
            settings: Settings::new(),
        }
    }

    /// Builder-style settings
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Whether the index lives on a filesystem all data nodes share
    pub fn shared_filesystem(&self) -> bool {
        self.settings
            .bool_first(&[config::INDEX_SHARED_FILESYSTEM], false)
    }

    /// Whether a shared-filesystem primary may recover on any node
    pub fn recover_on_any_node(&self) -> bool {
        self.settings
            .bool_first(&[config::INDEX_SHARED_FS_RECOVER_ANY], false)
    }
}

/// Lifecycle state of an assigned shard copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingState {
    /// Recovery in progress
    Initializing,
    /// Live and serving
    Started,
    /// Live but moving to another node
    Relocating,
}

impl RoutingState {
    /// Whether the copy holds authoritative data right now
    pub fn is_active(&self) -> bool {
        matches!(self, RoutingState::Started | RoutingState::Relocating)
    }
}

/// A shard copy assigned to a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedShard {
    pub shard_id: ShardId,
    pub node: NodeId,
    pub primary: bool,
    pub state: RoutingState,

    /// On-disk version stamped by primary allocation; replicas carry none
    pub version: Option<i64>,
}

/// The assigned half of the routing table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingTable {
    assigned: HashMap<ShardId, Vec<AssignedShard>>,
}

impl RoutingTable {
    pub fn add(&mut self, shard: AssignedShard) {
        self.assigned
            .entry(shard.shard_id.clone())
            .or_default()
            .push(shard);
    }

    /// All assigned copies of a shard
    pub fn shards(&self, shard_id: &ShardId) -> &[AssignedShard] {
        self.assigned
            .get(shard_id)
            .map(|copies| copies.as_slice())
            .unwrap_or(&[])
    }

    /// The live primary copy of a shard, if one exists
    pub fn active_primary(&self, shard_id: &ShardId) -> Option<&AssignedShard> {
        self.shards(shard_id)
            .iter()
            .find(|copy| copy.primary && copy.state.is_active())
    }
}

/// Mutable allocation context for one reroute
///
/// Owned by the routing service and lent to the allocator. Holds the live
/// node set, index metadata, the routing table, the decider chain, and the
/// unassigned list the allocator consumes.
pub struct RoutingAllocation {
    nodes: Vec<DiscoveryNode>,
    indices: HashMap<String, IndexMetadata>,
    table: RoutingTable,
    deciders: Arc<dyn AllocationDecider>,
    unassigned: Vec<ShardRouting>,
    ignored: Vec<ShardRouting>,
    ignored_nodes: HashMap<ShardId, HashSet<NodeId>>,
}

impl RoutingAllocation {
    pub fn new(
        nodes: Vec<DiscoveryNode>,
        indices: HashMap<String, IndexMetadata>,
        table: RoutingTable,
        deciders: Arc<dyn AllocationDecider>,
    ) -> Self {
        Self {
            nodes,
            indices,
            table,
            deciders,
            unassigned: Vec::new(),
            ignored: Vec::new(),
            ignored_nodes: HashMap::new(),
        }
    }

    /// Queue a shard copy for allocation
    pub fn add_unassigned(&mut self, shard: ShardRouting) {
        self.unassigned.push(shard);
    }

    /// Shards still waiting for a node, in reroute order
    pub fn unassigned(&self) -> &[ShardRouting] {
        &self.unassigned
    }

    /// Shards set aside for this reroute; they return to the unassigned
    /// list on the next one
    pub fn ignored(&self) -> &[ShardRouting] {
        &self.ignored
    }

    /// Give up on a shard for this reroute
    pub fn ignore_unassigned(&mut self, shard: ShardRouting) {
        self.ignored.push(shard);
    }

    pub(crate) fn take_unassigned(&mut self, index: usize) -> ShardRouting {
        self.unassigned.remove(index)
    }

    pub(crate) fn restore_unassigned(&mut self, index: usize, shard: ShardRouting) {
        self.unassigned.insert(index, shard);
    }

    /// All live nodes
    pub fn nodes(&self) -> &[DiscoveryNode] {
        &self.nodes
    }

    /// Live data-bearing nodes
    pub fn data_nodes(&self) -> Vec<&DiscoveryNode> {
        self.nodes.iter().filter(|node| node.data).collect()
    }

    /// Look up a live node by id
    pub fn node(&self, id: &NodeId) -> Option<&DiscoveryNode> {
        self.nodes.iter().find(|node| node.id == *id)
    }

    /// Metadata for an index, if the caller supplied it
    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Consult the decider chain about one (shard, node) pairing
    pub fn decide(&self, shard: &ShardRouting, node: &DiscoveryNode) -> Decision {
        self.deciders.can_allocate(shard, node, self)
    }

    /// Mark a node as off-limits for a shard during this reroute
    pub fn ignore_shard_on(&mut self, shard_id: ShardId, node: NodeId) {
        self.ignored_nodes.entry(shard_id).or_default().insert(node);
    }

    /// Whether the caller ruled this node out for this shard
    pub fn should_ignore(&self, shard_id: &ShardId, node: &NodeId) -> bool {
        self.ignored_nodes
            .get(shard_id)
            .is_some_and(|nodes| nodes.contains(node))
    }

    /// Assign a shard copy to a node, moving it into the routing table in
    /// the initializing state
    pub fn assign(&mut self, shard: ShardRouting, node: NodeId, version: Option<i64>) {
        self.table.add(AssignedShard {
            shard_id: shard.shard_id,
            node,
            primary: shard.primary,
            state: RoutingState::Initializing,
            version,
        });
    }
}
