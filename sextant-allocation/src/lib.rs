//! Sextant Allocation - placement of unassigned shards after node restarts
//!
//! When a cluster (re)forms, shard copies exist only as on-disk data spread
//! across the data nodes. This crate decides, on every reroute, which node
//! should host each unassigned shard copy:
//!
//! - **Driver**: two-phase loop over the unassigned list, primaries first
//! - **Primary policy**: freshest on-disk copy wins, behind a configurable
//!   quorum of discovered copies; deciders can be overridden for primaries
//!   because refusing the only copy risks losing it
//! - **Replica policy**: place where leftover on-disk data overlaps the
//!   active primary's store, so recovery copies fewer bytes; matching sync
//!   ids prove the stores identical and skip the copy entirely
//! - **Caches**: the per-node fan-outs feeding both policies are memoized
//!   per shard and dropped on shard lifecycle events
//! - **Fan-out contracts**: listing RPCs are consumed through two traits;
//!   the transport behind them lives elsewhere
//!
//! The decider chain is pluggable: concrete allocation policies implement
//! [`AllocationDecider`] and vote YES/NO/THROTTLE per (shard, node) pair.

pub mod allocator;
pub mod cache;
pub mod config;
pub mod decider;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod routing;
pub mod store;

pub use allocator::{PrimaryShardAllocator, ReplicaShardAllocator, UnassignedAllocator};
pub use cache::{NodeStoreCache, NodeVersionCache, NO_COPY_VERSION};
pub use config::{GatewaySettings, InitialShards, Settings};
pub use decider::{AllocationDecider, Decision, DeciderChain, Verdict};
pub use error::{AllocationError, Result};
pub use fetch::{NodeFailure, NodesResponse, StartedShardLister, StoreMetadataLister};
pub use routing::{
    AssignedShard, DiscoveryNode, IndexMetadata, NodeId, RoutingAllocation, RoutingState,
    RoutingTable, ShardId, ShardRouting,
};
pub use store::{StoreFileMetadata, StoreFilesMetadata};
