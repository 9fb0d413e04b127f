//! Unidirectional delay channels.
//!
//! A channel carries flits from its source port to its destination port and
//! credits the opposite way, each behind a fixed propagation delay. Every
//! `put` also schedules a tick for the receiving node at the delivery cycle,
//! so receivers wake exactly when something is due without polling.

use std::collections::VecDeque;

use crate::event::{Event, EventQueue};
use crate::flit::{Credit, Flit};
use crate::topology::Connection;
use crate::types::Cycle;

/// A delay line between two router ports.
///
/// Items are tagged with their release time on entry and may be consumed
/// only at exactly that cycle: an earlier `get` returns `None` without
/// touching the buffer, a later one is a protocol error (the receiver
/// missed its wakeup) and aborts.
#[derive(Clone, Debug)]
pub struct Channel {
    /// The (node, port) endpoints this channel connects.
    pub conn: Connection,
    /// Propagation delay in cycles, at least 1.
    pub delay: Cycle,
    buf: VecDeque<(Cycle, Flit)>,
    buf_credit: VecDeque<(Cycle, Credit)>,
}

impl Channel {
    /// Creates an empty channel over `conn` with the given delay.
    pub fn new(conn: Connection, delay: Cycle) -> Self {
        assert!(delay >= 1, "channel delay must be at least one cycle");
        Self {
            conn,
            delay,
            buf: VecDeque::new(),
            buf_credit: VecDeque::new(),
        }
    }

    /// Enqueues a flit for delivery and wakes the downstream node at the
    /// delivery cycle.
    pub fn put(&mut self, eq: &mut EventQueue, flit: Flit) {
        self.buf.push_back((eq.curr_time() + self.delay, flit));
        eq.reschedule(self.delay, Event::tick(self.conn.dst.node));
    }

    /// Enqueues a credit for the upstream node and wakes it at the delivery
    /// cycle.
    pub fn put_credit(&mut self, eq: &mut EventQueue, credit: Credit) {
        self.buf_credit.push_back((eq.curr_time() + self.delay, credit));
        eq.reschedule(self.delay, Event::tick(self.conn.src.node));
    }

    /// Takes the flit due at `now`, if any.
    pub fn get(&mut self, now: Cycle) -> Option<Flit> {
        match self.buf.front() {
            Some(&(release, _)) if release <= now => {
                assert!(
                    release == now,
                    "stagnant flit in channel {} -> {} (due {}, now {})",
                    self.conn.src,
                    self.conn.dst,
                    release,
                    now
                );
                self.buf.pop_front().map(|(_, flit)| flit)
            }
            _ => None,
        }
    }

    /// Takes the credit due at `now`, if any.
    pub fn get_credit(&mut self, now: Cycle) -> Option<Credit> {
        match self.buf_credit.front() {
            Some(&(release, _)) if release <= now => {
                assert!(
                    release == now,
                    "stagnant credit in channel {} -> {} (due {}, now {})",
                    self.conn.src,
                    self.conn.dst,
                    release,
                    now
                );
                self.buf_credit.pop_front().map(|(_, credit)| credit)
            }
            _ => None,
        }
    }

    /// Number of flits currently traversing the channel.
    pub fn flits_in_flight(&self) -> usize {
        self.buf.len()
    }

    /// Number of credits currently traversing the channel.
    pub fn credits_in_flight(&self) -> usize {
        self.buf_credit.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::FlitType;
    use crate::topology::RouterPortPair;
    use crate::types::NodeId;

    fn test_conn() -> Connection {
        Connection {
            src: RouterPortPair {
                node: NodeId::Router(0),
                port: 2,
            },
            dst: RouterPortPair {
                node: NodeId::Router(1),
                port: 1,
            },
            uniq: 0,
        }
    }

    #[test]
    fn test_flit_released_after_delay() {
        let mut eq = EventQueue::new();
        let mut ch = Channel::new(test_conn(), 2);

        ch.put(&mut eq, Flit::new(FlitType::Head, 0, 1, 0));
        assert_eq!(ch.flits_in_flight(), 1);

        // Not due yet at time 0 or 1.
        assert!(ch.get(0).is_none());
        assert!(ch.get(1).is_none());
        assert_eq!(ch.flits_in_flight(), 1);

        // Due exactly at time 2.
        let flit = ch.get(2).unwrap();
        assert_eq!(flit.kind, FlitType::Head);
        assert_eq!(ch.flits_in_flight(), 0);
    }

    #[test]
    fn test_put_wakes_receiver() {
        let mut eq = EventQueue::new();
        let mut ch = Channel::new(test_conn(), 3);

        ch.put(&mut eq, Flit::new(FlitType::Body, 0, 1, 1));
        assert_eq!(eq.peek_time(), Some(3));
        assert_eq!(eq.pop().unwrap().target, NodeId::Router(1));
    }

    #[test]
    fn test_credit_travels_upstream() {
        let mut eq = EventQueue::new();
        let mut ch = Channel::new(test_conn(), 1);

        ch.put_credit(&mut eq, Credit);
        // The credit wakeup targets the channel's source side.
        assert_eq!(eq.pop().unwrap().target, NodeId::Router(0));
        assert!(ch.get_credit(0).is_none());
        assert!(ch.get_credit(1).is_some());
    }

    #[test]
    fn test_early_get_does_not_mutate() {
        let mut eq = EventQueue::new();
        let mut ch = Channel::new(test_conn(), 5);
        ch.put(&mut eq, Flit::new(FlitType::Tail, 0, 1, 2));

        for _ in 0..3 {
            assert!(ch.get(4).is_none());
        }
        assert!(ch.get(5).is_some());
    }

    #[test]
    #[should_panic(expected = "stagnant flit")]
    fn test_stagnant_flit_aborts() {
        let mut eq = EventQueue::new();
        let mut ch = Channel::new(test_conn(), 1);
        ch.put(&mut eq, Flit::new(FlitType::Head, 0, 1, 0));
        // Consuming after the release cycle is a protocol error.
        ch.get(10);
    }
}
