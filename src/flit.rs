//! Flit and credit encoding.
//!
//! A flit (flow-control digit) is the unit of buffering and transport in the
//! network. A packet is one `Head` flit, a run of `Body` flits and one
//! `Tail` flit sharing a single virtual-channel allocation; the head carries
//! the source route for the whole packet.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a flit within its packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlitType {
    /// Leading flit; carries the route and claims the VC at each hop.
    Head,
    /// Payload flit; follows the head through the allocated VC.
    Body,
    /// Trailing flit; releases the VC allocation at each hop.
    Tail,
}

impl FlitType {
    /// Returns true for tail flits.
    pub fn is_tail(&self) -> bool {
        matches!(self, FlitType::Tail)
    }
}

/// Routing state carried by a flit.
///
/// `path` is the source-computed sequence of output ports and is populated
/// only on the head flit; body and tail flits of the same packet follow the
/// head through the VC the head allocated. `idx` is the next hop to read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Index of the source terminal.
    pub src: usize,
    /// Index of the destination terminal.
    pub dst: usize,
    /// Output port to take at each hop; the final entry ejects to a terminal.
    pub path: Vec<usize>,
    /// Position of the next unread hop in `path`.
    pub idx: usize,
}

/// A single flow-control digit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flit {
    /// Head, body or tail.
    pub kind: FlitType,
    /// Route state; the path is only populated on head flits.
    pub route_info: RouteInfo,
    /// Sequence number within the packet, for tracing.
    pub payload: u64,
}

impl Flit {
    /// Creates a flit with an empty path.
    pub fn new(kind: FlitType, src: usize, dst: usize, payload: u64) -> Self {
        Self {
            kind,
            route_info: RouteInfo {
                src,
                dst,
                path: Vec::new(),
                idx: 0,
            },
            payload,
        }
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}.p{}}}", self.route_info.src, self.payload)
    }
}

/// A flow-control credit: one free slot in the downstream input buffer.
///
/// There is exactly one VC per physical channel, so the credit carries no
/// VC field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Credit;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flit_creation() {
        let flit = Flit::new(FlitType::Head, 0, 2, 0);
        assert_eq!(flit.kind, FlitType::Head);
        assert_eq!(flit.route_info.src, 0);
        assert_eq!(flit.route_info.dst, 2);
        assert!(flit.route_info.path.is_empty());
        assert_eq!(flit.route_info.idx, 0);
    }

    #[test]
    fn test_flit_display() {
        let flit = Flit::new(FlitType::Body, 1, 3, 2);
        assert_eq!(flit.to_string(), "{1.p2}");
    }

    #[test]
    fn test_tail_predicate() {
        assert!(FlitType::Tail.is_tail());
        assert!(!FlitType::Head.is_tail());
        assert!(!FlitType::Body.is_tail());
    }
}
