//! The `Node` trait and per-tick bookkeeping shared by all node kinds.
//!
//! Nodes live in an arena owned by the simulation and are addressed by
//! [`NodeId`]; the driver borrows the arena for the duration of one tick and
//! hands each node a [`NodeCtx`] with everything it may touch: the event
//! queue, the channel arena and the shared statistics.

use crate::channel::Channel;
use crate::event::{Event, EventQueue};
use crate::stats::Stat;
use crate::types::{NodeId, SimTime};

/// Mutable simulation state handed to a node for one tick.
pub struct NodeCtx<'a> {
    pub eventq: &'a mut EventQueue,
    pub channels: &'a mut [Channel],
    pub stat: &'a mut Stat,
}

impl NodeCtx<'_> {
    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.eventq.curr_time()
    }
}

/// A simulation node: a source, a destination or a router.
///
/// Each node is a local state machine advanced one cycle at a time by
/// `tick`. A tick runs to completion; there is no suspension.
pub trait Node: Send {
    fn id(&self) -> NodeId;

    /// Runs one cycle of this node.
    fn tick(&mut self, cx: &mut NodeCtx<'_>);

    /// Flits generated so far (sources only).
    fn flit_gen_count(&self) -> u64 {
        0
    }

    /// Flits consumed so far (destinations only).
    fn flit_arrive_count(&self) -> u64 {
        0
    }

    /// Flits currently resident in this node's buffers.
    fn buffered_flits(&self) -> usize {
        0
    }

    /// Exports node-local statistics.
    fn stats(&self) -> serde_json::Value;
}

/// Self-tick bookkeeping shared by every node kind.
///
/// Guards against a node ticking twice in one cycle, and collapses all
/// reschedule requests raised during a tick into at most one future tick
/// (the `last_reschedule` watermark backs up the event queue's own
/// per-recipient dedup).
#[derive(Clone, Debug, Default)]
pub(crate) struct SelfTick {
    last_tick: Option<SimTime>,
    reschedule: bool,
    last_reschedule: Option<SimTime>,
}

impl SelfTick {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this node already ran its stages at `now`.
    pub fn already_ticked(&self, now: SimTime) -> bool {
        self.last_tick == Some(now)
    }

    /// Clears the reschedule flag at the start of a tick.
    pub fn begin(&mut self) {
        self.reschedule = false;
    }

    /// Requests a tick on the next cycle.
    pub fn mark(&mut self) {
        self.reschedule = true;
    }

    /// Commits the tick: performs the (at most one) self-reschedule and
    /// records the tick time for the double-tick guard.
    pub fn finish(&mut self, id: NodeId, eventq: &mut EventQueue) {
        let now = eventq.curr_time();
        if self.reschedule && self.last_reschedule != Some(now) {
            eventq.schedule(1, Event::tick(id));
            self.last_reschedule = Some(now);
        }
        self.last_tick = Some(now);
    }
}
