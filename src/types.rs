//! Core type definitions for the simulator.
//!
//! This module defines the fundamental identifier and time types used
//! throughout the simulation kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation time in cycles.
///
/// All events, channel ready-times and tick boundaries use the same
/// `SimTime` representation. Time is a monotonic counter driven purely by
/// the event queue; it has no relation to wall-clock time.
pub type SimTime = u64;

/// The role a node plays in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Traffic generator attached to a router's terminal port.
    Source,
    /// Traffic sink attached to a router's terminal port.
    Destination,
    /// A pipelined virtual-channel router.
    Router,
}

/// Discriminated node identifier.
///
/// Equality and total ordering are over `(kind, value)`, so a source, a
/// destination and a router may share the same numeric value without
/// colliding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub kind: NodeKind,
    pub value: usize,
}

impl NodeId {
    /// Identifier of the source node attached to terminal `value`.
    pub fn source(value: usize) -> Self {
        Self {
            kind: NodeKind::Source,
            value,
        }
    }

    /// Identifier of the destination node attached to terminal `value`.
    pub fn destination(value: usize) -> Self {
        Self {
            kind: NodeKind::Destination,
            value,
        }
    }

    /// Identifier of router `value`.
    pub fn router(value: usize) -> Self {
        Self {
            kind: NodeKind::Router,
            value,
        }
    }

    pub fn is_source(&self) -> bool {
        self.kind == NodeKind::Source
    }

    pub fn is_destination(&self) -> bool {
        self.kind == NodeKind::Destination
    }

    pub fn is_router(&self) -> bool {
        self.kind == NodeKind::Router
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            NodeKind::Source => 'S',
            NodeKind::Destination => 'D',
            NodeKind::Router => 'R',
        };
        write!(f, "{}{}", tag, self.value)
    }
}
