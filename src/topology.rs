//! Channel connectivity graphs.
//!
//! A [`Topology`] is a bidirectional mapping between `(node, port)` endpoints:
//! the forward map answers "where does this output port send to?", the
//! reverse map answers "who feeds this input port?". Constructors are
//! provided for the regular topologies the simulator targets: bidirectional
//! rings and k-ary r-cube tori.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::types::NodeId;

/// One end of a physical channel: a node plus a per-node port index.
///
/// By convention, port 0 of a router is its terminal attachment; ports
/// `1..=2r` are inter-router links (see [`TopoDesc`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouterPort {
    pub node: NodeId,
    pub port: usize,
}

impl RouterPort {
    pub fn new(node: NodeId, port: usize) -> Self {
        Self { node, port }
    }
}

impl fmt::Display for RouterPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}, {}}}", self.node, self.port)
    }
}

/// A directed physical channel between two endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub src: RouterPort,
    pub dst: RouterPort,
}

/// Errors detected while building a topology.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("endpoint {0} is already bound as a channel source")]
    SourceBound(RouterPort),

    #[error("endpoint {0} is already bound as a channel destination")]
    DestinationBound(RouterPort),
}

/// Describes a regular topology: a k-ary r-cube (`r = 1` is a ring).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopoDesc {
    /// Side length (nodes per dimension).
    pub k: usize,
    /// Number of dimensions.
    pub r: usize,
}

impl TopoDesc {
    pub fn ring(k: usize) -> Self {
        Self { k, r: 1 }
    }

    pub fn torus(k: usize, r: usize) -> Self {
        Self { k, r }
    }

    /// Total number of terminals (= routers) in the topology.
    pub fn num_nodes(&self) -> usize {
        self.k.pow(self.r as u32)
    }

    /// Router radix: one terminal port plus two ports per dimension.
    pub fn radix(&self) -> usize {
        1 + 2 * self.r
    }

    /// Output port moving "down" (decreasing coordinate) in dimension `dim`.
    ///
    /// On a ring this is port 1, the counter-clockwise direction.
    pub fn minus_port(&self, dim: usize) -> usize {
        1 + 2 * dim
    }

    /// Output port moving "up" (increasing coordinate) in dimension `dim`.
    ///
    /// On a ring this is port 2, the clockwise direction.
    pub fn plus_port(&self, dim: usize) -> usize {
        2 + 2 * dim
    }
}

/// Encodes channel connectivity in a bidirectional map.
///
/// Supports construction-time checking for connectivity errors: every
/// endpoint may appear at most once as a source and at most once as a
/// destination.
#[derive(Debug, Default)]
pub struct Topology {
    forward: HashMap<RouterPort, Connection>,
    reverse: HashMap<RouterPort, Connection>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a directed channel from `src` to `dst`.
    ///
    /// Fails without mutating either map if `src` is already a channel
    /// source or `dst` is already a channel destination.
    pub fn connect(&mut self, src: RouterPort, dst: RouterPort) -> Result<(), TopologyError> {
        if self.forward.contains_key(&src) {
            return Err(TopologyError::SourceBound(src));
        }
        if self.reverse.contains_key(&dst) {
            return Err(TopologyError::DestinationBound(dst));
        }
        let conn = Connection { src, dst };
        self.forward.insert(src, conn);
        self.reverse.insert(dst, conn);
        Ok(())
    }

    /// Looks up the channel driven by output endpoint `out_port`.
    pub fn find_forward(&self, out_port: RouterPort) -> Option<Connection> {
        self.forward.get(&out_port).copied()
    }

    /// Looks up the channel feeding input endpoint `in_port`.
    pub fn find_reverse(&self, in_port: RouterPort) -> Option<Connection> {
        self.reverse.get(&in_port).copied()
    }

    /// Iterates over every channel in the topology.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.forward.values()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Wires `n` routers into a bidirectional ring with a source and a
    /// destination terminal on each router.
    ///
    /// Port usage: 0 = terminal, 1 = counter-clockwise, 2 = clockwise.
    pub fn ring(n: usize) -> Result<Self, TopologyError> {
        Self::torus(n, 1)
    }

    /// Wires a k-ary r-cube: `k^r` routers with wrap-around links in each
    /// dimension, plus source/destination terminals on every router.
    pub fn torus(k: usize, r: usize) -> Result<Self, TopologyError> {
        let td = TopoDesc::torus(k, r);
        let mut top = Self::new();
        top.connect_torus(td)?;
        top.connect_terminals(td.num_nodes())?;
        Ok(top)
    }

    /// Inter-router wrap-around links for every dimension of `td`.
    fn connect_torus(&mut self, td: TopoDesc) -> Result<(), TopologyError> {
        for node in 0..td.num_nodes() {
            let mut stride = 1;
            for dim in 0..td.r {
                let digit = (node / stride) % td.k;
                let up = node - digit * stride + ((digit + 1) % td.k) * stride;

                let up_out = RouterPort::new(NodeId::router(node), td.plus_port(dim));
                let down_in = RouterPort::new(NodeId::router(up), td.minus_port(dim));

                // Bidirectional link: one channel each way.
                self.connect(up_out, down_in)?;
                self.connect(down_in, up_out)?;

                stride *= td.k;
            }
        }
        Ok(())
    }

    /// Attaches a source and a destination terminal to port 0 of each router.
    fn connect_terminals(&mut self, n: usize) -> Result<(), TopologyError> {
        for id in 0..n {
            let src = RouterPort::new(NodeId::source(id), 0);
            let dst = RouterPort::new(NodeId::destination(id), 0);
            let rtr = RouterPort::new(NodeId::router(id), 0);

            self.connect(src, rtr)?;
            self.connect(rtr, dst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rp(value: usize, port: usize) -> RouterPort {
        RouterPort::new(NodeId::router(value), port)
    }

    #[test]
    fn test_connect_round_trip() {
        let mut top = Topology::new();
        top.connect(rp(0, 1), rp(1, 2)).unwrap();

        let fwd = top.find_forward(rp(0, 1)).unwrap();
        assert_eq!(fwd.dst, rp(1, 2));
        let rev = top.find_reverse(rp(1, 2)).unwrap();
        assert_eq!(rev.src, rp(0, 1));
    }

    #[test]
    fn test_not_connected() {
        let top = Topology::new();
        assert!(top.find_forward(rp(0, 0)).is_none());
        assert!(top.find_reverse(rp(0, 0)).is_none());
    }

    #[test]
    fn test_double_bind_rejected_without_mutation() {
        let mut top = Topology::new();
        top.connect(rp(0, 1), rp(1, 1)).unwrap();

        // Same source endpoint, different destination.
        assert!(top.connect(rp(0, 1), rp(2, 1)).is_err());
        // Different source, same destination endpoint.
        assert!(top.connect(rp(3, 1), rp(1, 1)).is_err());

        // The original binding is intact and no partial entries leaked in.
        assert_eq!(top.len(), 1);
        assert_eq!(top.find_forward(rp(0, 1)).unwrap().dst, rp(1, 1));
        assert!(top.find_reverse(rp(2, 1)).is_none());
        assert!(top.find_forward(rp(3, 1)).is_none());
    }

    #[test]
    fn test_ring_wiring() {
        let top = Topology::ring(4).unwrap();

        // 2 inter-router channels per adjacent pair + 2 terminal channels
        // per router.
        assert_eq!(top.len(), 4 * 2 + 4 * 2);

        // Clockwise from router 0 lands on router 1's counter-clockwise port.
        let conn = top.find_forward(rp(0, 2)).unwrap();
        assert_eq!(conn.dst, rp(1, 1));
        // Counter-clockwise from router 0 wraps to router 3.
        let conn = top.find_forward(rp(0, 1)).unwrap();
        assert_eq!(conn.dst, rp(3, 2));

        // Terminal attachment.
        let conn = top
            .find_forward(RouterPort::new(NodeId::source(2), 0))
            .unwrap();
        assert_eq!(conn.dst, rp(2, 0));
        let conn = top.find_forward(rp(2, 0)).unwrap();
        assert_eq!(conn.dst, RouterPort::new(NodeId::destination(2), 0));
    }

    #[test]
    fn test_ring_maps_are_bijective() {
        let top = Topology::ring(5).unwrap();
        for conn in top.connections() {
            assert_eq!(top.find_forward(conn.src).unwrap(), *conn);
            assert_eq!(top.find_reverse(conn.dst).unwrap(), *conn);
        }
    }

    #[test]
    fn test_torus_wiring() {
        let td = TopoDesc::torus(3, 2);
        let top = Topology::torus(3, 2).unwrap();

        // 9 routers, 2 dimensions: 2 channels per (node, dim) pair plus
        // 2 terminal channels per router.
        assert_eq!(top.len(), 9 * 2 * 2 + 9 * 2);

        // Node 0's +x neighbor is node 1; its +y neighbor is node 3.
        let conn = top.find_forward(rp(0, td.plus_port(0))).unwrap();
        assert_eq!(conn.dst, rp(1, td.minus_port(0)));
        let conn = top.find_forward(rp(0, td.plus_port(1))).unwrap();
        assert_eq!(conn.dst, rp(3, td.minus_port(1)));

        // Wrap-around in x: node 2's +x neighbor is node 0.
        let conn = top.find_forward(rp(2, td.plus_port(0))).unwrap();
        assert_eq!(conn.dst, rp(0, td.minus_port(0)));
    }

    #[test]
    fn test_topo_desc() {
        let td = TopoDesc::ring(4);
        assert_eq!(td.num_nodes(), 4);
        assert_eq!(td.radix(), 3);
        assert_eq!(td.minus_port(0), 1);
        assert_eq!(td.plus_port(0), 2);

        let td = TopoDesc::torus(4, 3);
        assert_eq!(td.num_nodes(), 64);
        assert_eq!(td.radix(), 7);
    }
}
