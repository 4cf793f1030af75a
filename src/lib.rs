//! # nocsim
//!
//! A cycle-accurate, event-driven simulator for packet-switched
//! networks-on-chip. It models terminal nodes (traffic sources and sinks)
//! connected through routers and fixed-delay channels, reproducing the
//! per-cycle behavior of a classical virtual-channel router pipeline with
//! credit-based flow control.
//!
//! ## Design
//!
//! - **Event-driven time**: a single min-heap [`event::EventQueue`] drives
//!   simulated time; events are per-node tick wakeups, deduplicated so a
//!   node runs its stages at most once per cycle.
//! - **Router pipeline**: each [`router::Router`] advances flits through
//!   RC → VA → SA → ST with round-robin arbitration and a two-phase
//!   global-state commit, evaluated in reverse dependency order within one
//!   cycle.
//! - **Credit flow control**: every channel carries flits forward and
//!   credits backward; output units track the free space of the downstream
//!   input buffer and stall in `CreditWait` when it runs out.
//! - **Regular topologies**: bidirectional rings and k-ary r-cube tori with
//!   source-computed, dimension-ordered routes.

pub mod channel;
pub mod config;
pub mod event;
pub mod flit;
pub mod node;
pub mod router;
pub mod sim;
pub mod stats;
pub mod terminal;
pub mod topology;
pub mod types;

// Re-export commonly used types
pub use channel::{Channel, ChannelId};
pub use config::{SimConfig, SimConfigBuilder};
pub use event::{Event, EventKind, EventQueue};
pub use flit::{source_route, Credit, Flit, FlitKind, RouteInfo};
pub use node::{Node, NodeCtx};
pub use router::Router;
pub use sim::{BuildError, Sim};
pub use stats::{SimReport, Stat};
pub use terminal::{DestinationNode, SourceNode, TrafficPattern};
pub use topology::{Connection, RouterPort, TopoDesc, Topology};
pub use types::{NodeId, NodeKind, SimTime};
