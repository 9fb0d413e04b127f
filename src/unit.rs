//! Per-port input/output unit state.
//!
//! Each router port keeps an [`InputUnit`] and an [`OutputUnit`]. Both hold
//! a committed `global` state and a staged `next_global`; pipeline stages
//! mutate only `next_global`, and the router commits all staged transitions
//! in a single barrier at the end of its tick. This is what keeps the
//! reverse-ordered pipeline race-free in a purely sequential model.

use std::collections::VecDeque;

use crate::flit::{Credit, Flit};

/// Global state of an input or output unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalState {
    /// No packet is using the unit.
    Idle,
    /// A head flit is waiting for route computation.
    Routing,
    /// The route is known; waiting for a VC grant on the output port.
    VcWait,
    /// The packet holds the VC and may compete for the switch.
    Active,
    /// The packet holds the VC but the downstream buffer is full.
    CreditWait,
}

/// Pipeline stage the head-of-line flit of an input unit occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    /// Nothing in flight.
    Idle,
    /// Route computation.
    Rc,
    /// VC allocation.
    Va,
    /// Switch allocation.
    Sa,
    /// Switch traversal.
    St,
}

/// Per-input-port state: the flit buffer and the packet's progress through
/// the pipeline.
#[derive(Clone, Debug)]
pub struct InputUnit {
    /// Committed state.
    pub global: GlobalState,
    /// Staged state, committed at the end of the tick.
    pub next_global: GlobalState,
    /// Output port chosen by route computation for the current packet.
    pub route_port: Option<usize>,
    /// Output VC granted to the current packet (always 0: single VC).
    pub output_vc: usize,
    /// Stage of the head-of-line flit.
    pub stage: PipelineStage,
    /// Buffered flits, oldest first.
    pub buf: VecDeque<Flit>,
    /// Flit that won switch allocation, staged for traversal next cycle.
    pub st_ready: Option<Flit>,
}

impl InputUnit {
    /// Creates an idle input unit.
    pub fn new() -> Self {
        Self {
            global: GlobalState::Idle,
            next_global: GlobalState::Idle,
            route_port: None,
            output_vc: 0,
            stage: PipelineStage::Idle,
            buf: VecDeque::new(),
            st_ready: None,
        }
    }
}

impl Default for InputUnit {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-output-port state: the downstream credit count and the credit
/// staging slot.
#[derive(Clone, Debug)]
pub struct OutputUnit {
    /// Committed state.
    pub global: GlobalState,
    /// Staged state, committed at the end of the tick.
    pub next_global: GlobalState,
    /// Input port whose packet holds this output's VC.
    pub input_port: Option<usize>,
    /// Input VC of that packet (always 0: single VC).
    pub input_vc: usize,
    /// Free slots remaining in the downstream input buffer.
    pub credit_count: usize,
    /// Credit fetched from the channel, applied at the next credit update.
    pub buf_credit: Option<Credit>,
}

impl OutputUnit {
    /// Creates an idle output unit with a full credit allowance.
    pub fn new(credit_count: usize) -> Self {
        Self {
            global: GlobalState::Idle,
            next_global: GlobalState::Idle,
            input_port: None,
            input_vc: 0,
            credit_count,
            buf_credit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_unit_starts_idle() {
        let iu = InputUnit::new();
        assert_eq!(iu.global, GlobalState::Idle);
        assert_eq!(iu.next_global, GlobalState::Idle);
        assert_eq!(iu.stage, PipelineStage::Idle);
        assert!(iu.route_port.is_none());
        assert!(iu.buf.is_empty());
        assert!(iu.st_ready.is_none());
    }

    #[test]
    fn test_output_unit_starts_with_full_credits() {
        let ou = OutputUnit::new(3);
        assert_eq!(ou.global, GlobalState::Idle);
        assert_eq!(ou.credit_count, 3);
        assert!(ou.input_port.is_none());
        assert!(ou.buf_credit.is_none());
    }
}
