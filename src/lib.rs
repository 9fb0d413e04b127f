//! # Nocsim
//!
//! A cycle-accurate, discrete-event simulator for an on-chip network built
//! from single-VC wormhole routers connected by fixed-delay channels.
//!
//! ## Design Principles
//!
//! - **Event-Driven Kernel**: A min-time priority queue of per-node tick
//!   events; the clock only advances when an event is popped, and nodes wake
//!   exactly when something is due.
//! - **Canonical Router Pipeline**: Each router runs RC→VA→SA→ST with
//!   credit-based flow control, evaluated in reverse dependency order so one
//!   cycle of work stays one cycle of work.
//! - **Staged State Commit**: Units keep `global` and `next_global`; stages
//!   mutate only the staged copy, and the router commits all transitions in
//!   a single end-of-tick barrier.
//! - **Arena-Addressed Graph**: The router ↔ channel graph is cyclic, so
//!   channels live in an arena and nodes hold indices; events carry node
//!   ids, never references.

pub mod channel;
pub mod config;
pub mod event;
pub mod flit;
pub mod router;
pub mod sim;
pub mod stats;
pub mod topology;
pub mod types;
pub mod unit;

// Re-export commonly used types
pub use channel::Channel;
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use event::{Event, EventQueue};
pub use flit::{Credit, Flit, FlitType};
pub use router::Router;
pub use sim::Sim;
pub use stats::{Report, SimStats};
pub use topology::{
    source_route_compute, RouterPortPair, Topology, TopologyConfig, TopologyError,
};
pub use types::{ChannelId, Cycle, NodeId};
