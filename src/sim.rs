//! Simulation driver.
//!
//! `Sim` owns the event queue, the channel arena and the node arena. It
//! materializes channels from a [`Topology`], instantiates one source, one
//! destination and one router per terminal, seeds the initial tick events and
//! advances the queue until the time or event budget is exhausted.

use std::collections::HashMap;
use thiserror::Error;

use crate::channel::{Channel, ChannelId};
use crate::config::{ConfigError, SimConfig};
use crate::event::{Event, EventKind, EventQueue};
use crate::node::{Node, NodeCtx};
use crate::router::Router;
use crate::stats::{SimReport, Stat};
use crate::terminal::{DestinationNode, SourceNode};
use crate::topology::{RouterPort, Topology, TopologyError};
use crate::types::{NodeId, NodeKind, SimTime};

/// Errors detected while constructing a simulation.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("endpoint {0} has no attached channel")]
    MissingChannel(RouterPort),
}

/// A complete simulation: nodes, channels, event queue and statistics.
pub struct Sim {
    eventq: EventQueue,
    channels: Vec<Channel>,
    nodes: Vec<Box<dyn Node>>,
    index: HashMap<NodeId, usize>,
    stat: Stat,
    max_time: SimTime,
    max_events: Option<u64>,
    events_processed: u64,
}

impl Sim {
    /// Builds a simulation from a validated configuration.
    pub fn from_config(config: &SimConfig) -> Result<Self, BuildError> {
        config.validate()?;
        let td = config.topology.desc();
        let topology = Topology::torus(td.k, td.r)?;

        // One channel per topology connection, indexed both ways so node
        // construction can look up its port attachments.
        let mut channels = Vec::with_capacity(topology.len());
        let mut by_src: HashMap<RouterPort, ChannelId> = HashMap::new();
        let mut by_dst: HashMap<RouterPort, ChannelId> = HashMap::new();
        for conn in topology.connections() {
            let id = channels.len();
            channels.push(Channel::new(*conn, config.simulation.channel_delay));
            by_src.insert(conn.src, id);
            by_dst.insert(conn.dst, id);
        }

        let out_of = |map: &HashMap<RouterPort, ChannelId>, ep: RouterPort| {
            map.get(&ep).copied().ok_or(BuildError::MissingChannel(ep))
        };

        let buf_size = config.simulation.input_buf_size;
        let mut nodes: Vec<Box<dyn Node>> = Vec::with_capacity(3 * td.num_nodes());
        for value in 0..td.num_nodes() {
            let sid = NodeId::source(value);
            let out_ch = out_of(&by_src, RouterPort::new(sid, 0))?;
            nodes.push(Box::new(SourceNode::new(
                sid,
                td,
                out_ch,
                buf_size,
                config.simulation.packet_length,
                config.simulation.packets_per_source,
                config.traffic.pattern,
            )));

            let did = NodeId::destination(value);
            let in_ch = out_of(&by_dst, RouterPort::new(did, 0))?;
            nodes.push(Box::new(DestinationNode::new(did, in_ch, buf_size)));

            let rid = NodeId::router(value);
            let mut in_chs = Vec::with_capacity(td.radix());
            let mut out_chs = Vec::with_capacity(td.radix());
            for port in 0..td.radix() {
                in_chs.push(out_of(&by_dst, RouterPort::new(rid, port))?);
                out_chs.push(out_of(&by_src, RouterPort::new(rid, port))?);
            }
            nodes.push(Box::new(Router::new(rid, buf_size, in_chs, out_chs)));
        }

        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id(), i))
            .collect();

        Ok(Self {
            eventq: EventQueue::new(),
            channels,
            nodes,
            index,
            stat: Stat::default(),
            max_time: config.simulation.max_time,
            max_events: config.simulation.max_events,
            events_processed: 0,
        })
    }

    /// Seeds a tick at time 0 for source `value`. Returns `false` if no such
    /// source exists.
    pub fn start_source(&mut self, value: usize) -> bool {
        let id = NodeId::source(value);
        if !self.index.contains_key(&id) {
            return false;
        }
        self.eventq.schedule(0, Event::tick(id));
        true
    }

    /// Seeds a tick at time 0 for every source.
    pub fn start_all_sources(&mut self) {
        let sources: Vec<usize> = self
            .nodes
            .iter()
            .filter(|n| n.id().is_source())
            .map(|n| n.id().value)
            .collect();
        for value in sources {
            self.start_source(value);
        }
    }

    /// Delivers one event. Returns `false` when the queue is empty or the
    /// time/event budget is exhausted.
    pub fn step(&mut self) -> bool {
        let Some(time) = self.eventq.peek_time() else {
            return false;
        };
        if time > self.max_time {
            return false;
        }
        if self
            .max_events
            .is_some_and(|budget| self.events_processed >= budget)
        {
            return false;
        }

        let event = self.eventq.pop().expect("peeked event vanished");
        self.events_processed += 1;

        let EventKind::Tick { node } = event.kind;
        let idx = *self
            .index
            .get(&node)
            .expect("event addressed to a node outside the arena");
        let node = &mut self.nodes[idx];
        let mut cx = NodeCtx {
            eventq: &mut self.eventq,
            channels: &mut self.channels,
            stat: &mut self.stat,
        };
        node.tick(&mut cx);
        true
    }

    /// Runs until the queue drains or a budget is exhausted.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Current simulated time.
    pub fn curr_time(&self) -> SimTime {
        self.eventq.curr_time()
    }

    /// Events delivered so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// True if no events remain.
    pub fn idle(&self) -> bool {
        self.eventq.is_empty()
    }

    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    /// Flits generated by source `value`.
    pub fn flit_gen(&self, value: usize) -> u64 {
        self.index
            .get(&NodeId::source(value))
            .map(|&i| self.nodes[i].flit_gen_count())
            .unwrap_or(0)
    }

    /// Flits consumed by destination `value`.
    pub fn flit_arrived(&self, value: usize) -> u64 {
        self.index
            .get(&NodeId::destination(value))
            .map(|&i| self.nodes[i].flit_arrive_count())
            .unwrap_or(0)
    }

    /// Flits currently resident in channels and node buffers.
    pub fn flits_in_flight(&self) -> usize {
        let channel_flits: usize = self.channels.iter().map(|c| c.flits_in_flight()).sum();
        let node_flits: usize = self.nodes.iter().map(|n| n.buffered_flits()).sum();
        channel_flits + node_flits
    }

    /// Node-local statistics, if the node exists.
    pub fn node_stats(&self, id: NodeId) -> Option<serde_json::Value> {
        self.index.get(&id).map(|&i| self.nodes[i].stats())
    }

    /// End-of-run report.
    pub fn report(&self) -> SimReport {
        let mut report = SimReport {
            final_time: self.curr_time(),
            events_processed: self.events_processed,
            double_tick_count: self.stat.double_tick_count,
            ..Default::default()
        };
        for node in &self.nodes {
            let id = node.id();
            match id.kind {
                NodeKind::Source => {
                    report.flit_gen_counts.insert(id.value, node.flit_gen_count());
                }
                NodeKind::Destination => {
                    report
                        .flit_arrive_counts
                        .insert(id.value, node.flit_arrive_count());
                }
                NodeKind::Router => {}
            }
        }
        report
    }
}
