//! Node behavior: router pipeline, traffic source and traffic sink.
//!
//! A [`Router`] value represents any node kind; the tick dispatches on the
//! [`NodeId`] variant. Router nodes run the canonical wormhole pipeline
//! stages in reverse dependency order so a flit advanced by one stage is not
//! picked up again by the next stage within the same cycle. Sources and
//! destinations are degenerate single-port pipelines on the same kernel.

use crate::channel::Channel;
use crate::event::{Event, EventQueue};
use crate::flit::{Credit, Flit, FlitType};
use crate::stats::SimStats;
use crate::topology::source_route_compute;
use crate::types::{ChannelId, Cycle, NodeId};
use crate::unit::{GlobalState, InputUnit, OutputUnit, PipelineStage};

macro_rules! node_trace {
    ($now:expr, $id:expr, $($arg:tt)*) => {
        tracing::debug!("[@{:3}] [{}] {}", $now, $id, format_args!($($arg)*))
    };
}

/// Construction parameters shared by every node of a simulation.
#[derive(Clone, Debug)]
pub struct RouterParams {
    /// Input buffer depth per port; also the initial credit count of each
    /// upstream output unit.
    pub input_buf_size: usize,
    /// Flits per packet: head at 0, tail at `packet_length - 1`.
    pub packet_length: u64,
    /// Packets a source injects before going quiet; `None` is infinite.
    pub max_packets: Option<u64>,
    /// Ring size, used for source route computation.
    pub ring_size: usize,
}

/// A node: router, source or destination, decided by its [`NodeId`].
#[derive(Clone, Debug)]
pub struct Router {
    /// This node's identity.
    pub id: NodeId,
    /// Flits consumed, for destination nodes.
    pub flit_arrive_count: u64,
    /// Flits injected, for source nodes.
    pub flit_gen_count: u64,
    /// `(source index, payload)` of each consumed flit, in arrival order.
    pub arrival_log: Vec<(usize, u64)>,
    /// Input units, one per port.
    pub input_units: Vec<InputUnit>,
    /// Output units, one per port.
    pub output_units: Vec<OutputUnit>,

    input_buf_size: usize,
    packet_length: u64,
    max_packets: Option<u64>,
    packets_sent: u64,
    ring_size: usize,
    dest: usize,
    last_tick: Option<Cycle>,
    last_reschedule_tick: Option<Cycle>,
    flit_payload_counter: u64,
    reschedule_next_tick: bool,
    input_channels: Vec<ChannelId>,
    output_channels: Vec<ChannelId>,
    va_last_grant_input: usize,
    sa_last_grant_input: usize,
}

impl Router {
    /// Creates a node with `radix` ports wired to the given channels.
    ///
    /// Terminal nodes use a fixed route through their single port, so their
    /// units come pre-allocated to port 0.
    pub fn new(
        id: NodeId,
        radix: usize,
        params: &RouterParams,
        input_channels: Vec<ChannelId>,
        output_channels: Vec<ChannelId>,
    ) -> Self {
        let mut input_units: Vec<InputUnit> = (0..radix).map(|_| InputUnit::new()).collect();
        let mut output_units: Vec<OutputUnit> = (0..radix)
            .map(|_| OutputUnit::new(params.input_buf_size))
            .collect();

        if !id.is_router() {
            assert_eq!(radix, 1, "terminal nodes have a single port");
            input_units[0].route_port = Some(0);
            output_units[0].input_port = Some(0);
        }

        let dest = (id.index() + params.ring_size / 2) % params.ring_size;

        Self {
            id,
            flit_arrive_count: 0,
            flit_gen_count: 0,
            arrival_log: Vec::new(),
            input_units,
            output_units,
            input_buf_size: params.input_buf_size,
            packet_length: params.packet_length,
            max_packets: params.max_packets,
            packets_sent: 0,
            ring_size: params.ring_size,
            dest,
            last_tick: None,
            last_reschedule_tick: None,
            flit_payload_counter: 0,
            reschedule_next_tick: false,
            input_channels,
            output_channels,
            va_last_grant_input: 0,
            sa_last_grant_input: 0,
        }
    }

    /// Number of ports.
    pub fn radix(&self) -> usize {
        self.input_units.len()
    }

    /// Retargets a source node's traffic.
    pub fn set_destination(&mut self, dst: usize) {
        assert!(dst < self.ring_size, "destination index out of range");
        self.dest = dst;
    }

    /// Overrides the per-source packet bound; `Some(0)` silences the source.
    pub fn set_max_packets(&mut self, max_packets: Option<u64>) {
        self.max_packets = max_packets;
    }

    /// Destination index a source node currently targets.
    pub fn destination(&self) -> usize {
        self.dest
    }

    /// Runs one cycle of this node.
    ///
    /// Multiple schedulers may nominate the same node for the same cycle;
    /// the `last_tick` guard turns the extra invocations into counted
    /// no-ops.
    pub fn tick(&mut self, eq: &mut EventQueue, channels: &mut [Channel], stat: &mut SimStats) {
        if self.last_tick == Some(eq.curr_time()) {
            stat.double_tick_count += 1;
            return;
        }

        self.reschedule_next_tick = false;

        match self.id {
            NodeId::Source(_) => {
                self.source_generate(eq, channels, stat);
                // Sources manage credits too, to know when they may inject.
                self.credit_update(eq);
                self.fetch_credit(eq, channels);
            }
            NodeId::Destination(_) => {
                self.fetch_flit(eq, channels);
                self.destination_consume(eq, channels);
            }
            NodeId::Router(_) => {
                // Reverse dependency order: a flit advanced by one stage
                // must not be processed again by the next stage in the same
                // cycle.
                self.switch_traverse(eq, channels);
                self.switch_alloc(eq, stat);
                self.vc_alloc(eq);
                self.route_compute(eq);
                self.credit_update(eq);
                self.fetch_credit(eq, channels);
                self.fetch_flit(eq, channels);
            }
        }

        self.update_states();
        // Single reschedule point, to avoid flooding the event queue.
        self.do_reschedule(eq);

        self.last_tick = Some(eq.curr_time());
    }

    fn mark_reschedule(&mut self) {
        self.reschedule_next_tick = true;
    }

    fn do_reschedule(&mut self, eq: &mut EventQueue) {
        if self.reschedule_next_tick && self.last_reschedule_tick != Some(eq.curr_time()) {
            eq.reschedule(1, Event::tick(self.id));
            self.last_reschedule_tick = Some(eq.curr_time());
        }
    }

    /// Source behavior: inject one flit per cycle while credits last.
    fn source_generate(&mut self, eq: &mut EventQueue, channels: &mut [Channel], stat: &mut SimStats) {
        if let Some(limit) = self.max_packets {
            if self.packets_sent >= limit {
                return;
            }
        }

        if self.output_units[0].credit_count == 0 {
            stat.source_credit_stall_count += 1;
            node_trace!(eq.curr_time(), self.id, "Credit stall!");
            // No reschedule: the credit update wakes us when a slot frees.
            return;
        }

        let src = self.id.index();
        let payload = self.flit_payload_counter;
        let kind = if payload == 0 {
            FlitType::Head
        } else if payload == self.packet_length - 1 {
            FlitType::Tail
        } else {
            FlitType::Body
        };

        let mut flit = Flit::new(kind, src, self.dest, payload);
        if kind == FlitType::Head {
            flit.route_info.path = source_route_compute(self.ring_size, src, self.dest);
        }
        if kind == FlitType::Tail {
            self.flit_payload_counter = 0;
            self.packets_sent += 1;
        } else {
            self.flit_payload_counter += 1;
        }

        node_trace!(eq.curr_time(), self.id, "Flit created and sent: {}", flit);
        let och = self.output_channels[0];
        channels[och].put(eq, flit);

        let ou = &mut self.output_units[0];
        node_trace!(
            eq.curr_time(),
            self.id,
            "Credit decrement, credit={}->{}",
            ou.credit_count,
            ou.credit_count - 1
        );
        ou.credit_count -= 1;
        self.flit_gen_count += 1;

        self.mark_reschedule();
    }

    /// Destination behavior: consume one flit and return its credit.
    fn destination_consume(&mut self, eq: &mut EventQueue, channels: &mut [Channel]) {
        let Some(flit) = self.input_units[0].buf.pop_front() else {
            return;
        };
        node_trace!(eq.curr_time(), self.id, "Flit arrived: {}", flit);
        self.flit_arrive_count += 1;
        self.arrival_log.push((flit.route_info.src, flit.payload));
        assert!(
            self.input_units[0].buf.is_empty(),
            "destination buffer failed to drain"
        );

        // The buffer drained, so the unit is free again; undo the fetch
        // kickstart rather than leaving the port parked in Routing.
        let iu = &mut self.input_units[0];
        iu.next_global = GlobalState::Idle;
        iu.stage = PipelineStage::Idle;

        let ich = self.input_channels[0];
        channels[ich].put_credit(eq, Credit);
        node_trace!(
            eq.curr_time(),
            self.id,
            "Credit sent to {}",
            channels[ich].conn.src
        );

        self.mark_reschedule();
        // The flit is destroyed here.
    }

    /// Pulls due flits from every input channel into the port buffers.
    fn fetch_flit(&mut self, eq: &mut EventQueue, channels: &mut [Channel]) {
        let now = eq.curr_time();
        let id = self.id;
        let buf_size = self.input_buf_size;

        for iport in 0..self.input_channels.len() {
            let Some(flit) = channels[self.input_channels[iport]].get(now) else {
                continue;
            };
            node_trace!(
                now,
                id,
                "Fetched flit {}, buf.len()={}",
                flit,
                self.input_units[iport].buf.len()
            );

            let was_empty = {
                let iu = &mut self.input_units[iport];
                let was_empty = iu.buf.is_empty();
                // If the buffer was empty, this is the only place that can
                // kickstart the pipeline. Empty is not the same as idle:
                // the unit may still be mid-packet waiting for body flits.
                if was_empty && iu.next_global == GlobalState::Idle {
                    iu.next_global = GlobalState::Routing;
                    iu.stage = PipelineStage::Rc;
                }
                iu.buf.push_back(flit);
                assert!(
                    iu.buf.len() <= buf_size,
                    "input buffer overflow on {} iport {}",
                    id,
                    iport
                );
                was_empty
            };
            if was_empty {
                self.mark_reschedule();
            }
        }
    }

    /// Pulls due credits from every output channel into the staging slots.
    fn fetch_credit(&mut self, eq: &mut EventQueue, channels: &mut [Channel]) {
        let now = eq.curr_time();
        for oport in 0..self.output_channels.len() {
            if let Some(credit) = channels[self.output_channels[oport]].get_credit(now) {
                node_trace!(now, self.id, "Fetched credit, oport={}", oport);
                self.output_units[oport].buf_credit = Some(credit);
                self.mark_reschedule();
            }
        }
    }

    /// Applies staged credits, waking any credit-starved unit pair.
    fn credit_update(&mut self, eq: &mut EventQueue) {
        let now = eq.curr_time();
        let id = self.id;

        for oport in 0..self.output_units.len() {
            if self.output_units[oport].buf_credit.is_none() {
                continue;
            }
            let credit_count = self.output_units[oport].credit_count;
            node_trace!(
                now,
                id,
                "Credit update! credit={}->{} (oport={})",
                credit_count,
                credit_count + 1,
                oport
            );

            let iport = self.output_units[oport]
                .input_port
                .expect("credit update on an output port with no allocated input");
            if credit_count == 0 {
                // The unit pair may be parked in CreditWait; if so, switch
                // both back so the packet can re-enter switch allocation.
                if self.output_units[oport].next_global == GlobalState::CreditWait {
                    assert_eq!(
                        self.input_units[iport].next_global,
                        GlobalState::CreditWait,
                        "credit-wait states out of sync between unit pair"
                    );
                    self.input_units[iport].next_global = GlobalState::Active;
                    self.output_units[oport].next_global = GlobalState::Active;
                }
                self.mark_reschedule();
                node_trace!(now, id, "credit update with kickstart! (iport={})", iport);
            } else {
                node_trace!(now, id, "credit update, but no kickstart (credit={})", credit_count);
            }

            let ou = &mut self.output_units[oport];
            ou.credit_count += 1;
            ou.buf_credit = None;
        }
    }

    /// RC stage: read the next hop off the head flit's source route.
    fn route_compute(&mut self, eq: &mut EventQueue) {
        let now = eq.curr_time();
        let id = self.id;

        for port in 0..self.input_units.len() {
            if self.input_units[port].global != GlobalState::Routing {
                continue;
            }
            let iu = &mut self.input_units[port];
            let flit = iu
                .buf
                .front_mut()
                .expect("route computation on an empty input buffer");
            node_trace!(now, id, "Route computation: {}", flit);
            assert!(
                flit.route_info.idx < flit.route_info.path.len(),
                "path exhausted before reaching a terminal: {}",
                flit
            );

            let oport = flit.route_info.path[flit.route_info.idx];
            flit.route_info.idx += 1;
            node_trace!(
                now,
                id,
                "RC success for {} (idx={}, oport={})",
                flit,
                flit.route_info.idx - 1,
                oport
            );
            iu.route_port = Some(oport);

            // RC -> VA transition.
            iu.next_global = GlobalState::VcWait;
            iu.stage = PipelineStage::Va;
            self.mark_reschedule();
        }
    }

    /// Round-robin arbitration for an idle output VC.
    fn vc_arbit_round_robin(&mut self, out_port: usize) -> Option<usize> {
        let radix = self.radix();
        let mut iport = (self.va_last_grant_input + 1) % radix;
        for _ in 0..radix {
            let iu = &self.input_units[iport];
            if iu.global == GlobalState::VcWait && iu.route_port == Some(out_port) {
                assert_eq!(iu.stage, PipelineStage::Va, "VC wait outside the VA stage");
                self.va_last_grant_input = iport;
                return Some(iport);
            }
            iport = (iport + 1) % radix;
        }
        None
    }

    /// Round-robin arbitration for the switch on an active output port.
    ///
    /// Inputs parked in credit wait are skipped and counted as stalls.
    fn sa_arbit_round_robin(
        &mut self,
        now: Cycle,
        out_port: usize,
        stat: &mut SimStats,
    ) -> Option<usize> {
        let radix = self.radix();
        let mut iport = (self.sa_last_grant_input + 1) % radix;
        for _ in 0..radix {
            let iu = &self.input_units[iport];
            if iu.stage == PipelineStage::Sa && iu.route_port == Some(out_port) {
                match iu.global {
                    GlobalState::Active => {
                        self.sa_last_grant_input = iport;
                        return Some(iport);
                    }
                    GlobalState::CreditWait => {
                        stat.sa_credit_stall_count += 1;
                        node_trace!(now, self.id, "Credit stall! port={}", out_port);
                    }
                    _ => {}
                }
            }
            iport = (iport + 1) % radix;
        }
        None
    }

    /// VA stage: grant idle output VCs to routed packets.
    fn vc_alloc(&mut self, eq: &mut EventQueue) {
        let now = eq.curr_time();
        let id = self.id;

        for oport in 0..self.output_units.len() {
            if self.output_units[oport].global != GlobalState::Idle {
                continue;
            }
            let Some(iport) = self.vc_arbit_round_robin(oport) else {
                continue;
            };

            if let Some(flit) = self.input_units[iport].buf.front() {
                node_trace!(
                    now,
                    id,
                    "VA success for {} from iport {} to oport {}",
                    flit,
                    iport,
                    oport
                );
            }

            // The VC is granted, but switch allocation cannot start without
            // a credit.
            if self.output_units[oport].credit_count == 0 {
                node_trace!(now, id, "VA: no credit, switching to CreditWait");
                self.input_units[iport].next_global = GlobalState::CreditWait;
                self.output_units[oport].next_global = GlobalState::CreditWait;
            } else {
                self.input_units[iport].next_global = GlobalState::Active;
                self.output_units[oport].next_global = GlobalState::Active;
            }

            self.output_units[oport].input_port = Some(iport);
            self.input_units[iport].stage = PipelineStage::Sa;
            self.mark_reschedule();
        }
    }

    /// SA stage: move one flit per granted port into its traversal slot.
    fn switch_alloc(&mut self, eq: &mut EventQueue, stat: &mut SimStats) {
        let now = eq.curr_time();
        let id = self.id;

        for oport in 0..self.output_units.len() {
            if self.output_units[oport].global != GlobalState::Active {
                continue;
            }
            let Some(iport) = self.sa_arbit_round_robin(now, oport, stat) else {
                continue;
            };

            let flit = {
                let iu = &mut self.input_units[iport];
                assert_eq!(iu.global, GlobalState::Active, "switch grant outside Active");
                let flit = iu
                    .buf
                    .pop_front()
                    .expect("switch allocation on an empty input buffer");
                assert!(iu.st_ready.is_none(), "st_ready occupied at switch allocation");
                flit
            };
            node_trace!(
                now,
                id,
                "SA success for {} from iport {} to oport {}",
                flit,
                iport,
                oport
            );

            {
                let ou = &mut self.output_units[oport];
                assert!(ou.credit_count > 0, "switch allocation with no credit");
                node_trace!(
                    now,
                    id,
                    "Credit decrement, credit={}->{} (oport={})",
                    ou.credit_count,
                    ou.credit_count - 1,
                    oport
                );
                ou.credit_count -= 1;
            }

            let is_tail = flit.kind.is_tail();
            let buf_empty = self.input_units[iport].buf.is_empty();
            self.input_units[iport].st_ready = Some(flit);

            // Entering CreditWait does not cancel the traversal: the granted
            // flit sits in st_ready, which is all the ST stage looks at.
            if is_tail {
                // The packet's VC allocation ends here; the next head must
                // re-arbitrate.
                self.output_units[oport].next_global = GlobalState::Idle;
                let iu = &mut self.input_units[iport];
                if buf_empty {
                    iu.next_global = GlobalState::Idle;
                    iu.stage = PipelineStage::Idle;
                    node_trace!(now, id, "SA: next state is Idle");
                } else {
                    iu.next_global = GlobalState::Routing;
                    iu.stage = PipelineStage::Rc;
                    node_trace!(now, id, "SA: next state is Routing");
                }
                self.mark_reschedule();
            } else if self.output_units[oport].credit_count == 0 {
                self.input_units[iport].next_global = GlobalState::CreditWait;
                self.output_units[oport].next_global = GlobalState::CreditWait;
                node_trace!(now, id, "SA: next state is CreditWait");
            } else {
                let iu = &mut self.input_units[iport];
                iu.next_global = GlobalState::Active;
                iu.stage = PipelineStage::Sa;
                node_trace!(now, id, "SA: next state is Active");
                self.mark_reschedule();
            }
        }
    }

    /// ST stage: place staged flits on their output channels and return one
    /// credit upstream for each (the CT stage).
    fn switch_traverse(&mut self, eq: &mut EventQueue, channels: &mut [Channel]) {
        let id = self.id;

        for iport in 0..self.input_units.len() {
            let Some(flit) = self.input_units[iport].st_ready.take() else {
                continue;
            };
            node_trace!(eq.curr_time(), id, "Switch traverse: {}", flit);

            // No output speedup: flits that exit the switch go straight onto
            // the channel.
            let route_port = self.input_units[iport]
                .route_port
                .expect("switch traversal without a computed route");
            let och = self.output_channels[route_port];
            node_trace!(
                eq.curr_time(),
                id,
                "Flit {} sent to {}",
                flit,
                channels[och].conn.dst
            );
            channels[och].put(eq, flit);

            // CT stage: return the freed slot to the upstream node.
            let ich = self.input_channels[iport];
            channels[ich].put_credit(eq, Credit);
            node_trace!(
                eq.curr_time(),
                id,
                "Credit sent to {}",
                channels[ich].conn.src
            );
        }
    }

    /// Commits every staged state transition.
    fn update_states(&mut self) {
        let mut changed = false;

        for iu in &mut self.input_units {
            if iu.global != iu.next_global {
                iu.global = iu.next_global;
                changed = true;
            }
        }
        for ou in &mut self.output_units {
            if ou.global != ou.next_global {
                assert!(
                    !(ou.next_global == GlobalState::CreditWait && ou.credit_count > 0),
                    "committing CreditWait with credits available"
                );
                ou.global = ou.next_global;
                changed = true;
            }
        }

        if changed {
            self.mark_reschedule();
        }
    }
}
