//! Flit and credit encoding, plus source-side route computation.
//!
//! A flit is the flow-control unit: the quantum a channel or pipeline stage
//! handles per cycle. Packets are sequences of one head flit, zero or more
//! body flits and one tail flit; only the head carries routing information.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::topology::TopoDesc;

/// Position of a flit within its packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlitKind {
    Head,
    Body,
    Tail,
}

/// Routing state carried by a flit.
///
/// `path` is the pre-computed ordered list of output ports the packet will
/// take; it is only populated in the head flit. Body and tail flits follow
/// the route their head laid down in the input units, so their `path` stays
/// empty. `idx` is the cursor into `path`; it advances exactly once per hop,
/// at route computation time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// Source terminal value.
    pub src: usize,
    /// Destination terminal value.
    pub dst: usize,
    pub path: Vec<usize>,
    pub idx: usize,
}

/// A single flow-control unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flit {
    pub kind: FlitKind,
    pub route: RouteInfo,
    /// Sequence number within the packet; used for tracing only.
    pub payload: u64,
}

impl Flit {
    pub fn new(kind: FlitKind, src: usize, dst: usize, payload: u64) -> Self {
        Self {
            kind,
            route: RouteInfo {
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
        write!(f, "{{{}.p{}}}", self.route.src, self.payload)
    }
}

/// A back-channel flow-control token.
///
/// Carries no VC identifier: there is exactly one VC per physical channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit;

/// Source-side all-in-one route computation.
///
/// Produces the ordered list of output ports from `src` to `dst` in
/// dimension order, ending with port 0 (eject to terminal). In each
/// dimension the shorter ring direction wins; a tie at exactly half the ring
/// is broken deterministically in favor of the increasing ("clockwise")
/// direction.
pub fn source_route(td: TopoDesc, src: usize, dst: usize) -> Vec<usize> {
    let mut path = Vec::new();
    let mut stride = 1;
    for dim in 0..td.r {
        let src_digit = (src / stride) % td.k;
        let dst_digit = (dst / stride) % td.k;
        let cw = (dst_digit + td.k - src_digit) % td.k;
        if cw <= td.k / 2 {
            for _ in 0..cw {
                path.push(td.plus_port(dim));
            }
        } else {
            for _ in 0..td.k - cw {
                path.push(td.minus_port(dim));
            }
        }
        stride *= td.k;
    }
    path.push(0);
    path
}
