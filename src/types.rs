//! Core type definitions for the simulator.
//!
//! This module defines the fundamental types used throughout the simulation
//! kernel: the cycle counter, channel handles, and the tagged node identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Simulation time in cycles.
///
/// Every event, channel release time and tick boundary uses the same
/// `Cycle` representation, giving the whole network a unified timeline.
pub type Cycle = u64;

/// Handle of a channel in the simulation's channel arena.
///
/// The router ↔ channel ↔ router graph is cyclic, so channels are stored in
/// an arena owned by the driver and addressed by stable indices; nodes hold
/// `ChannelId`s rather than references.
pub type ChannelId = usize;

/// Identity of a node in the network.
///
/// A node is either a traffic source, a router, or a traffic destination.
/// Sources and destinations are terminal nodes with a single port; routers
/// have `radix` ports.
///
/// The derived ordering is total and deterministic: first by variant
/// (sources, then routers, then destinations), then by index.
///
/// # Example
///
/// ```
/// use nocsim::types::NodeId;
///
/// assert!(NodeId::Source(3) < NodeId::Router(0));
/// assert_eq!(NodeId::Router(1).to_string(), "Rtr 1");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// A traffic generator attached to the router with the same index.
    Source(usize),
    /// A pipelined wormhole router.
    Router(usize),
    /// A traffic sink attached to the router with the same index.
    Destination(usize),
}

impl NodeId {
    /// Returns the index within the node's kind.
    pub fn index(&self) -> usize {
        match *self {
            NodeId::Source(i) | NodeId::Router(i) | NodeId::Destination(i) => i,
        }
    }

    /// Returns true if this is a source node.
    pub fn is_source(&self) -> bool {
        matches!(self, NodeId::Source(_))
    }

    /// Returns true if this is a router node.
    pub fn is_router(&self) -> bool {
        matches!(self, NodeId::Router(_))
    }

    /// Returns true if this is a destination node.
    pub fn is_destination(&self) -> bool {
        matches!(self, NodeId::Destination(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            NodeId::Source(i) => write!(f, "Src {}", i),
            NodeId::Router(i) => write!(f, "Rtr {}", i),
            NodeId::Destination(i) => write!(f, "Dst {}", i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering() {
        // Variant first, then index.
        assert!(NodeId::Source(99) < NodeId::Router(0));
        assert!(NodeId::Router(99) < NodeId::Destination(0));
        assert!(NodeId::Router(1) < NodeId::Router(2));
    }

    #[test]
    fn test_node_id_kind_predicates() {
        assert!(NodeId::Source(0).is_source());
        assert!(NodeId::Router(0).is_router());
        assert!(NodeId::Destination(0).is_destination());
        assert!(!NodeId::Source(0).is_router());
        assert_eq!(NodeId::Destination(7).index(), 7);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::Source(0).to_string(), "Src 0");
        assert_eq!(NodeId::Router(12).to_string(), "Rtr 12");
        assert_eq!(NodeId::Destination(3).to_string(), "Dst 3");
    }

    #[test]
    fn test_node_id_serialization() {
        let id = NodeId::Router(5);
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
