//! Allocation deciders
//!
//! Deciders vote on placing a specific shard on a specific node. The
//! allocator consults them but does not implement any: concrete policies
//! (disk watermarks, awareness, throttling) plug in through
//! [`AllocationDecider`] and are combined by [`DeciderChain`].

use crate::routing::{DiscoveryNode, RoutingAllocation, ShardRouting};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tri-state decider verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The shard may be allocated on the node
    Yes,
    /// The shard must not be allocated on the node
    No,
    /// Allocation is allowed in principle but must wait (e.g. too many
    /// concurrent recoveries); retry on a later reroute
    Throttle,
}

impl Verdict {
    /// Get the verdict as a string for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "yes",
            Verdict::No => "no",
            Verdict::Throttle => "throttle",
        }
    }
}

/// A verdict with a human-readable reason, surfaced in allocation
/// explanations and logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
}

impl Decision {
    pub fn yes(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Yes,
            reason: reason.into(),
        }
    }

    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::No,
            reason: reason.into(),
        }
    }

    pub fn throttle(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Throttle,
            reason: reason.into(),
        }
    }
}

/// A single allocation policy: shard × node × allocation context → verdict
pub trait AllocationDecider: Send + Sync {
    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &DiscoveryNode,
        allocation: &RoutingAllocation,
    ) -> Decision;
}

/// Combines deciders with the canonical merge: any NO wins, else any
/// THROTTLE wins, else YES.
#[derive(Default)]
pub struct DeciderChain {
    deciders: Vec<Arc<dyn AllocationDecider>>,
}

impl DeciderChain {
    pub fn new(deciders: Vec<Arc<dyn AllocationDecider>>) -> Self {
        Self { deciders }
    }

    /// Builder-style append
    pub fn add(mut self, decider: Arc<dyn AllocationDecider>) -> Self {
        self.deciders.push(decider);
        self
    }
}

impl AllocationDecider for DeciderChain {
    fn can_allocate(
        &self,
        shard: &ShardRouting,
        node: &DiscoveryNode,
        allocation: &RoutingAllocation,
    ) -> Decision {
        let mut throttled: Option<Decision> = None;
        for decider in &self.deciders {
            let decision = decider.can_allocate(shard, node, allocation);
            match decision.verdict {
                Verdict::No => return decision,
                Verdict::Throttle => throttled = Some(decision),
                Verdict::Yes => {}
            }
        }
        throttled.unwrap_or_else(|| Decision::yes("all deciders permit allocation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{NodeId, RoutingTable, ShardId};
    use std::collections::HashMap;

    struct Fixed(Verdict);

    impl AllocationDecider for Fixed {
        fn can_allocate(
            &self,
            _shard: &ShardRouting,
            _node: &DiscoveryNode,
            _allocation: &RoutingAllocation,
        ) -> Decision {
            Decision {
                verdict: self.0,
                reason: format!("fixed {}", self.0.as_str()),
            }
        }
    }

    fn merge(verdicts: &[Verdict]) -> Verdict {
        let chain = DeciderChain::new(
            verdicts
                .iter()
                .map(|v| Arc::new(Fixed(*v)) as Arc<dyn AllocationDecider>)
                .collect(),
        );
        let allocation = RoutingAllocation::new(
            vec![DiscoveryNode::new("node-1", "node-1", true)],
            HashMap::new(),
            RoutingTable::default(),
            Arc::new(DeciderChain::default()),
        );
        let shard = ShardRouting::primary(ShardId::new("idx", 0));
        let node = DiscoveryNode::new(NodeId::new("node-1"), "node-1", true);
        chain.can_allocate(&shard, &node, &allocation).verdict
    }

    #[test]
    fn test_empty_chain_permits() {
        assert_eq!(merge(&[]), Verdict::Yes);
    }

    #[test]
    fn test_no_dominates() {
        assert_eq!(merge(&[Verdict::Yes, Verdict::No, Verdict::Throttle]), Verdict::No);
        assert_eq!(merge(&[Verdict::Throttle, Verdict::No]), Verdict::No);
    }

    #[test]
    fn test_throttle_beats_yes() {
        assert_eq!(merge(&[Verdict::Yes, Verdict::Throttle, Verdict::Yes]), Verdict::Throttle);
    }

    #[test]
    fn test_all_yes() {
        assert_eq!(merge(&[Verdict::Yes, Verdict::Yes]), Verdict::Yes);
    }
}
