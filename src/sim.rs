//! Simulation driver.
//!
//! [`Sim`] owns the event queue, the channel arena and every node. It wires
//! channels and nodes up from a [`Topology`], seeds the initial source
//! ticks, and then runs the pop/dispatch loop until a horizon cycle or
//! until the event queue drains (quiescence).

use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::channel::Channel;
use crate::config::{ConfigError, ConfigResult, SimConfig};
use crate::event::{Event, EventQueue};
use crate::router::{Router, RouterParams};
use crate::stats::{DestinationReport, Report, SimStats, SourceReport};
use crate::topology::{RouterPortPair, Topology};
use crate::types::{Cycle, NodeId};
use crate::unit::{GlobalState, PipelineStage};

/// A complete simulation instance.
///
/// # Example
///
/// ```
/// use nocsim::config::SimConfigBuilder;
/// use nocsim::sim::Sim;
///
/// let config = SimConfigBuilder::new()
///     .terminal_count(4)
///     .packet_length(3)
///     .input_buf_size(3)
///     .max_packets(Some(1))
///     .build()
///     .unwrap();
///
/// let mut sim = Sim::new(config).unwrap();
/// sim.run(None);
/// assert_eq!(sim.report().total_generated(), sim.report().total_arrived());
/// ```
pub struct Sim {
    config: SimConfig,
    eventq: EventQueue,
    channels: Vec<Channel>,
    nodes: BTreeMap<NodeId, Router>,
    stat: SimStats,
}

impl Sim {
    /// Builds channels and nodes for `config` and seeds the source ticks.
    pub fn new(config: SimConfig) -> ConfigResult<Self> {
        config.validate()?;
        let topology = Topology::build(&config.topology)?;

        let mut channels = Vec::new();
        let mut out_map: HashMap<RouterPortPair, usize> = HashMap::new();
        let mut in_map: HashMap<RouterPortPair, usize> = HashMap::new();
        for conn in topology.connections_in_order() {
            let id = channels.len();
            out_map.insert(conn.src, id);
            in_map.insert(conn.dst, id);
            channels.push(Channel::new(conn, config.channel_delay));
        }

        let params = RouterParams {
            input_buf_size: config.input_buf_size,
            packet_length: config.packet_length,
            max_packets: config.max_packets,
            ring_size: config.terminal_count,
        };

        let unwired = |pair: RouterPortPair| {
            ConfigError::Validation(format!("{} is not wired in the topology", pair))
        };

        let mut nodes = BTreeMap::new();
        for i in 0..config.terminal_count {
            let src_id = NodeId::Source(i);
            let src_out = RouterPortPair::new(src_id, 0);
            let och = *out_map.get(&src_out).ok_or_else(|| unwired(src_out))?;
            nodes.insert(src_id, Router::new(src_id, 1, &params, vec![], vec![och]));

            let dst_id = NodeId::Destination(i);
            let dst_in = RouterPortPair::new(dst_id, 0);
            let ich = *in_map.get(&dst_in).ok_or_else(|| unwired(dst_in))?;
            nodes.insert(dst_id, Router::new(dst_id, 1, &params, vec![ich], vec![]));

            let rtr_id = NodeId::Router(i);
            let mut ins = Vec::with_capacity(config.router_radix);
            let mut outs = Vec::with_capacity(config.router_radix);
            for port in 0..config.router_radix {
                let pair = RouterPortPair::new(rtr_id, port);
                ins.push(*in_map.get(&pair).ok_or_else(|| unwired(pair))?);
                outs.push(*out_map.get(&pair).ok_or_else(|| unwired(pair))?);
            }
            nodes.insert(
                rtr_id,
                Router::new(rtr_id, config.router_radix, &params, ins, outs),
            );
        }

        let mut eventq = EventQueue::new();
        for i in 0..config.terminal_count {
            eventq.schedule(0, Event::tick(NodeId::Source(i)));
        }

        info!(
            "built simulation: {} terminals, {} channels, delay {}",
            config.terminal_count,
            channels.len(),
            config.channel_delay
        );

        Ok(Self {
            config,
            eventq,
            channels,
            nodes,
            stat: SimStats::default(),
        })
    }

    /// The configuration this simulation was built from.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&Router> {
        self.nodes.get(&id)
    }

    /// Looks up a node mutably, e.g. to retarget a source before running.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Router> {
        self.nodes.get_mut(&id)
    }

    /// All nodes, in `NodeId` order.
    pub fn nodes(&self) -> impl Iterator<Item = &Router> {
        self.nodes.values()
    }

    /// Retargets source `src_index` to destination `dst_index`.
    pub fn set_destination(&mut self, src_index: usize, dst_index: usize) {
        self.nodes
            .get_mut(&NodeId::Source(src_index))
            .unwrap_or_else(|| panic!("no such source: {}", src_index))
            .set_destination(dst_index);
    }

    /// Global kernel counters.
    pub fn stats(&self) -> &SimStats {
        &self.stat
    }

    /// Number of pending events.
    pub fn pending_events(&self) -> usize {
        self.eventq.len()
    }

    /// Current simulation time.
    pub fn curr_time(&self) -> Cycle {
        self.eventq.curr_time()
    }

    /// Runs until the queue drains or the next event would land at or past
    /// `max_cycles`. Returns the final cycle reached.
    pub fn run(&mut self, max_cycles: Option<Cycle>) -> Cycle {
        while let Some(next_time) = self.eventq.peek_time() {
            if let Some(horizon) = max_cycles {
                if next_time >= horizon {
                    info!("horizon reached at cycle {}", horizon);
                    break;
                }
            }
            let Some(event) = self.eventq.pop() else {
                break;
            };
            let node = self
                .nodes
                .get_mut(&event.target)
                .unwrap_or_else(|| panic!("event addressed to unknown node {}", event.target));
            node.tick(&mut self.eventq, &mut self.channels, &mut self.stat);
        }
        if self.eventq.is_empty() {
            info!("event queue drained at cycle {}", self.eventq.curr_time());
        }
        self.eventq.curr_time()
    }

    /// Collects the final report.
    pub fn report(&self) -> Report {
        let mut sources = Vec::new();
        let mut destinations = Vec::new();
        for node in self.nodes.values() {
            match node.id {
                NodeId::Source(i) => sources.push(SourceReport {
                    index: i,
                    flits_generated: node.flit_gen_count,
                }),
                NodeId::Destination(i) => destinations.push(DestinationReport {
                    index: i,
                    flits_arrived: node.flit_arrive_count,
                }),
                NodeId::Router(_) => {}
            }
        }
        Report {
            final_cycle: self.eventq.curr_time(),
            stats: self.stat.clone(),
            sources,
            destinations,
        }
    }

    /// Validates the universal invariants; panics naming any violation.
    ///
    /// Valid at cycle boundaries, i.e. whenever no node is mid-tick: every
    /// tick leaves the books balanced.
    pub fn check_invariants(&self) {
        // Buffer bounds and state/stage coherence.
        for node in self.nodes.values() {
            for (port, iu) in node.input_units.iter().enumerate() {
                assert!(
                    iu.buf.len() <= self.config.input_buf_size,
                    "input buffer bound violated on {} port {}",
                    node.id,
                    port
                );
                match iu.stage {
                    PipelineStage::Rc => assert_eq!(
                        iu.global,
                        GlobalState::Routing,
                        "stage/state mismatch on {} port {}",
                        node.id,
                        port
                    ),
                    PipelineStage::Va => assert_eq!(
                        iu.global,
                        GlobalState::VcWait,
                        "stage/state mismatch on {} port {}",
                        node.id,
                        port
                    ),
                    PipelineStage::Sa => assert!(
                        matches!(iu.global, GlobalState::Active | GlobalState::CreditWait),
                        "stage/state mismatch on {} port {}",
                        node.id,
                        port
                    ),
                    _ => {}
                }
            }
        }

        // Credit conservation: for every channel, credits held upstream plus
        // everything occupying or about to occupy the downstream buffer must
        // add up to the buffer capacity.
        for ch in &self.channels {
            let up = &self.nodes[&ch.conn.src.node];
            let down = &self.nodes[&ch.conn.dst.node];
            let ou = &up.output_units[ch.conn.src.port];
            let iu = &down.input_units[ch.conn.dst.port];

            let staged_up = up
                .input_units
                .iter()
                .filter(|u| u.st_ready.is_some() && u.route_port == Some(ch.conn.src.port))
                .count();
            let staged_down = usize::from(iu.st_ready.is_some());
            let parked = usize::from(ou.buf_credit.is_some());

            let total = ou.credit_count
                + parked
                + staged_up
                + ch.flits_in_flight()
                + iu.buf.len()
                + staged_down
                + ch.credits_in_flight();
            assert_eq!(
                total,
                self.config.input_buf_size,
                "credit conservation violated on channel {} -> {}",
                ch.conn.src,
                ch.conn.dst
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfigBuilder;
    use crate::topology::TopologyConfig;

    #[test]
    fn test_build_default_ring() {
        let sim = Sim::new(SimConfig::default()).unwrap();
        // 4 sources + 4 routers + 4 destinations.
        assert_eq!(sim.nodes().count(), 12);
        // 8 inter-router + 8 terminal channels.
        assert_eq!(sim.channels.len(), 16);
        // One seeded tick per source.
        assert_eq!(sim.pending_events(), 4);
    }

    #[test]
    fn test_torus_config_fails_to_build() {
        let config = SimConfigBuilder::new()
            .topology(TopologyConfig::Torus { k: 4, r: 2 })
            .build()
            .unwrap();
        assert!(Sim::new(config).is_err());
    }

    #[test]
    fn test_invariants_hold_at_start_and_under_load() {
        let config = SimConfigBuilder::new()
            .terminal_count(4)
            .packet_length(4)
            .input_buf_size(3)
            .build()
            .unwrap();
        let mut sim = Sim::new(config).unwrap();
        sim.check_invariants();

        // Run mid-stream against an infinite load and re-check.
        sim.run(Some(20));
        sim.check_invariants();
    }

    #[test]
    fn test_horizon_stops_the_clock() {
        let mut sim = Sim::new(SimConfig::default()).unwrap();
        let final_cycle = sim.run(Some(50));
        assert!(final_cycle < 50);
        // Infinite offered load keeps events pending past any horizon.
        assert!(sim.pending_events() > 0);
    }

    #[test]
    fn test_report_counts_generated_flits() {
        let mut sim = Sim::new(SimConfig::default()).unwrap();
        sim.run(Some(10));
        let report = sim.report();
        assert_eq!(report.sources.len(), 4);
        assert_eq!(report.destinations.len(), 4);
        assert!(report.total_generated() > 0);
    }
}
