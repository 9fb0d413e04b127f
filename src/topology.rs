//! Topology connectivity and source routing.
//!
//! A [`Topology`] encodes channel connectivity as a bidirectional map of
//! `(node, port)` pairs and checks for wiring conflicts at construction
//! time. The only fully supported shape is the ring; a torus constructor is
//! reserved, and explicit connection lists allow hand-built fabrics.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::NodeId;

/// Router port used to reach the attached terminal nodes.
pub const TERMINAL_PORT: usize = 0;
/// Router port facing the counter-clockwise ring neighbor.
pub const CCW_PORT: usize = 1;
/// Router port facing the clockwise ring neighbor.
pub const CW_PORT: usize = 2;

/// One endpoint of a channel: a node and one of its ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouterPortPair {
    /// The node this endpoint belongs to.
    pub node: NodeId,
    /// The port index on that node.
    pub port: usize,
}

impl RouterPortPair {
    /// Creates a port pair.
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for RouterPortPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, p{})", self.node, self.port)
    }
}

/// A directed channel connection between two ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// The out-side endpoint (the flit producer).
    pub src: RouterPortPair,
    /// The in-side endpoint (the flit consumer).
    pub dst: RouterPortPair,
    /// Insertion index, unique per topology.
    pub uniq: usize,
}

/// Errors raised while building a topology.
#[derive(Error, Debug)]
pub enum TopologyError {
    /// One of the two ports of a requested connection is already wired.
    #[error("connectivity conflict: {src} -> {dst} (a port is already bound)")]
    PortAlreadyBound {
        /// Requested out-side endpoint.
        src: RouterPortPair,
        /// Requested in-side endpoint.
        dst: RouterPortPair,
    },

    /// The requested topology shape cannot be built.
    #[error("unsupported topology: {0}")]
    Unsupported(String),
}

/// Declarative topology selection, as it appears in configuration files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TopologyConfig {
    /// A unidirectional-port ring of `size` routers, each with an attached
    /// source/destination pair.
    Ring {
        /// Number of routers (and terminal pairs).
        size: usize,
    },
    /// A k-ary r-dimensional torus. Reserved; not implemented yet.
    Torus {
        /// Side length per dimension.
        k: usize,
        /// Number of dimensions.
        r: usize,
    },
    /// An explicit list of directed `(src, dst)` port connections.
    Explicit {
        /// Connections to wire, in order.
        connections: Vec<(RouterPortPair, RouterPortPair)>,
    },
}

impl Default for TopologyConfig {
    fn default() -> Self {
        TopologyConfig::Ring { size: 4 }
    }
}

/// Channel connectivity as a bidirectional `(node, port)` map.
///
/// Every port appears at most once on the out side and at most once on the
/// in side; [`connect`](Self::connect) refuses conflicting wiring.
///
/// # Example
///
/// ```
/// use nocsim::topology::{RouterPortPair, Topology};
/// use nocsim::types::NodeId;
///
/// let mut top = Topology::new();
/// let a = RouterPortPair::new(NodeId::Router(0), 2);
/// let b = RouterPortPair::new(NodeId::Router(1), 1);
///
/// assert!(top.connect(a, b));
/// // A port can only be wired once.
/// assert!(!top.connect(a, b));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Topology {
    forward: HashMap<RouterPortPair, Connection>,
    reverse: HashMap<RouterPortPair, Connection>,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires a directed channel from `src` to `dst`.
    ///
    /// Returns `false` and leaves the maps unchanged if either side is
    /// already bound.
    pub fn connect(&mut self, src: RouterPortPair, dst: RouterPortPair) -> bool {
        if self.forward.contains_key(&src) || self.reverse.contains_key(&dst) {
            return false;
        }
        let conn = Connection {
            src,
            dst,
            uniq: self.forward.len(),
        };
        self.forward.insert(src, conn);
        self.reverse.insert(dst, conn);
        true
    }

    /// Looks up the connection leaving `out_port`.
    pub fn find_forward(&self, out_port: RouterPortPair) -> Option<Connection> {
        self.forward.get(&out_port).copied()
    }

    /// Looks up the connection entering `in_port`.
    pub fn find_reverse(&self, in_port: RouterPortPair) -> Option<Connection> {
        self.reverse.get(&in_port).copied()
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Returns true if nothing is wired.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// All connections in insertion order.
    pub fn connections_in_order(&self) -> Vec<Connection> {
        let mut conns: Vec<Connection> = self.forward.values().copied().collect();
        conns.sort_by_key(|c| c.uniq);
        conns
    }

    /// Builds the topology described by `config`.
    pub fn build(config: &TopologyConfig) -> Result<Self, TopologyError> {
        match config {
            TopologyConfig::Ring { size } => Self::ring(*size),
            TopologyConfig::Torus { k, r } => Err(TopologyError::Unsupported(format!(
                "{}-ary {}-dimensional torus is not implemented",
                k, r
            ))),
            TopologyConfig::Explicit { connections } => {
                let mut top = Topology::new();
                for &(src, dst) in connections {
                    if !top.connect(src, dst) {
                        return Err(TopologyError::PortAlreadyBound { src, dst });
                    }
                }
                Ok(top)
            }
        }
    }

    /// Builds a ring of `n` routers with terminal pairs.
    ///
    /// Port usage per router: 0 terminal, 1 counter-clockwise neighbor,
    /// 2 clockwise neighbor. Each router's terminal port is wired to the
    /// source and destination sharing the router's index.
    pub fn ring(n: usize) -> Result<Self, TopologyError> {
        if n == 0 {
            return Err(TopologyError::Unsupported(
                "ring needs at least one router".to_string(),
            ));
        }
        let ids: Vec<usize> = (0..n).collect();
        let mut top = Topology::new();
        top.connect_ring(&ids)?;
        top.connect_terminals(&ids)?;
        Ok(top)
    }

    /// Wires the inter-router ring channels, both directions.
    fn connect_ring(&mut self, ids: &[usize]) -> Result<(), TopologyError> {
        for i in 0..ids.len() {
            let l = ids[i];
            let r = ids[(i + 1) % ids.len()];
            let lport = RouterPortPair::new(NodeId::Router(l), CW_PORT);
            let rport = RouterPortPair::new(NodeId::Router(r), CCW_PORT);

            self.try_connect(lport, rport)?;
            self.try_connect(rport, lport)?;
        }
        Ok(())
    }

    /// Wires each router's terminal port to its source and destination.
    fn connect_terminals(&mut self, ids: &[usize]) -> Result<(), TopologyError> {
        for &id in ids {
            let src_port = RouterPortPair::new(NodeId::Source(id), 0);
            let dst_port = RouterPortPair::new(NodeId::Destination(id), 0);
            let rtr_port = RouterPortPair::new(NodeId::Router(id), TERMINAL_PORT);

            self.try_connect(src_port, rtr_port)?;
            self.try_connect(rtr_port, dst_port)?;
        }
        Ok(())
    }

    fn try_connect(
        &mut self,
        src: RouterPortPair,
        dst: RouterPortPair,
    ) -> Result<(), TopologyError> {
        if self.connect(src, dst) {
            Ok(())
        } else {
            Err(TopologyError::PortAlreadyBound { src, dst })
        }
    }
}

/// Computes the whole route for a packet at the source, for a ring of
/// `ring_size` routers.
///
/// Takes the shorter way around: `d` clockwise hops when the clockwise
/// distance `d` is at most half the ring, otherwise `ring_size - d`
/// counter-clockwise hops. Ties go clockwise. The trailing terminal-port
/// entry ejects the packet at the destination router.
///
/// # Example
///
/// ```
/// use nocsim::topology::source_route_compute;
///
/// // Self-addressed traffic ejects immediately.
/// assert_eq!(source_route_compute(4, 1, 1), vec![0]);
/// // Two clockwise hops, then eject.
/// assert_eq!(source_route_compute(4, 0, 2), vec![2, 2, 0]);
/// // One counter-clockwise hop, then eject.
/// assert_eq!(source_route_compute(4, 0, 3), vec![1, 0]);
/// ```
pub fn source_route_compute(ring_size: usize, src: usize, dst: usize) -> Vec<usize> {
    let k = ring_size;
    let cw_dist = (dst + k - src) % k;
    let mut path = Vec::new();
    if cw_dist <= k / 2 {
        path.extend(std::iter::repeat(CW_PORT).take(cw_dist));
    } else {
        path.extend(std::iter::repeat(CCW_PORT).take(k - cw_dist));
    }
    path.push(TERMINAL_PORT);
    debug!("source route computation: {} -> {} : {:?}", src, dst, path);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_conflict_leaves_map_unchanged() {
        let mut top = Topology::new();
        let a = RouterPortPair::new(NodeId::Router(0), 2);
        let b = RouterPortPair::new(NodeId::Router(1), 1);

        assert!(top.connect(a, b));
        assert_eq!(top.len(), 1);
        let before = top.find_forward(a).unwrap();

        assert!(!top.connect(a, b));
        assert_eq!(top.len(), 1);
        assert_eq!(top.find_forward(a).unwrap(), before);
    }

    #[test]
    fn test_connect_rejects_reused_in_side() {
        let mut top = Topology::new();
        let a = RouterPortPair::new(NodeId::Router(0), 2);
        let b = RouterPortPair::new(NodeId::Router(1), 1);
        let c = RouterPortPair::new(NodeId::Router(2), 2);

        assert!(top.connect(a, b));
        // Different out side, same in side: still a conflict.
        assert!(!top.connect(c, b));
    }

    #[test]
    fn test_ring_connectivity() {
        let top = Topology::ring(4).unwrap();
        // 8 inter-router (two directions) + 8 terminal connections.
        assert_eq!(top.len(), 16);

        // Router 0's clockwise port reaches router 1's counter-clockwise
        // port.
        let conn = top
            .find_forward(RouterPortPair::new(NodeId::Router(0), CW_PORT))
            .unwrap();
        assert_eq!(conn.dst, RouterPortPair::new(NodeId::Router(1), CCW_PORT));

        // The wrap-around link closes the ring.
        let conn = top
            .find_forward(RouterPortPair::new(NodeId::Router(3), CW_PORT))
            .unwrap();
        assert_eq!(conn.dst, RouterPortPair::new(NodeId::Router(0), CCW_PORT));

        // Terminal wiring: source feeds the router, router feeds the
        // destination.
        let conn = top
            .find_reverse(RouterPortPair::new(NodeId::Router(2), TERMINAL_PORT))
            .unwrap();
        assert_eq!(conn.src, RouterPortPair::new(NodeId::Source(2), 0));
        let conn = top
            .find_forward(RouterPortPair::new(NodeId::Router(2), TERMINAL_PORT))
            .unwrap();
        assert_eq!(conn.dst, RouterPortPair::new(NodeId::Destination(2), 0));
    }

    #[test]
    fn test_ring_of_zero_fails() {
        assert!(Topology::ring(0).is_err());
    }

    #[test]
    fn test_torus_is_unsupported() {
        let err = Topology::build(&TopologyConfig::Torus { k: 4, r: 2 }).unwrap_err();
        assert!(matches!(err, TopologyError::Unsupported(_)));
    }

    #[test]
    fn test_explicit_build_reports_conflict() {
        let a = RouterPortPair::new(NodeId::Router(0), 2);
        let b = RouterPortPair::new(NodeId::Router(1), 1);
        let config = TopologyConfig::Explicit {
            connections: vec![(a, b), (a, b)],
        };
        let err = Topology::build(&config).unwrap_err();
        assert!(matches!(err, TopologyError::PortAlreadyBound { .. }));
    }

    #[test]
    fn test_connections_in_order() {
        let top = Topology::ring(3).unwrap();
        let conns = top.connections_in_order();
        assert_eq!(conns.len(), top.len());
        for (i, conn) in conns.iter().enumerate() {
            assert_eq!(conn.uniq, i);
        }
    }

    #[test]
    fn test_source_route_identity() {
        assert_eq!(source_route_compute(4, 2, 2), vec![TERMINAL_PORT]);
    }

    #[test]
    fn test_source_route_directions() {
        // Distance 1 clockwise.
        assert_eq!(source_route_compute(4, 0, 1), vec![CW_PORT, TERMINAL_PORT]);
        // Distance 3 clockwise is shorter the other way.
        assert_eq!(source_route_compute(4, 0, 3), vec![CCW_PORT, TERMINAL_PORT]);
        // Wrap-around accounting.
        assert_eq!(source_route_compute(4, 3, 0), vec![CW_PORT, TERMINAL_PORT]);
    }

    #[test]
    fn test_source_route_tie_goes_clockwise() {
        // d == k/2: both ways are two hops; clockwise wins.
        assert_eq!(
            source_route_compute(4, 0, 2),
            vec![CW_PORT, CW_PORT, TERMINAL_PORT]
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = TopologyConfig::Ring { size: 8 };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: TopologyConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config, back);
    }
}
