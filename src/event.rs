//! Events and the global event queue.
//!
//! The queue is the single source of simulated time: it holds `(time, event)`
//! items in min-heap order and advances `now` as items are popped. Events are
//! tagged variants rather than captured closures, so the queue never holds a
//! borrow into the nodes it wakes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::types::{NodeId, SimTime};

/// An event delivered to a node by the simulation driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
}

impl Event {
    /// Creates a tick event addressed to `node`.
    pub fn tick(node: NodeId) -> Self {
        Self {
            kind: EventKind::Tick { node },
        }
    }

    /// The node this event is addressed to.
    pub fn recipient(&self) -> NodeId {
        match self.kind {
            EventKind::Tick { node } => node,
        }
    }
}

/// What to do when an event is delivered.
///
/// Channels push flits and credits into their own buffers directly, so the
/// only thing that ever travels through the queue is a wakeup: "run `node`'s
/// tick at this time".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Run one cycle of the addressed node.
    Tick { node: NodeId },
}

/// A queue entry. Ordered by `(time, seq)` so that entries at the same time
/// pop in insertion order.
#[derive(Clone, Debug)]
struct Scheduled {
    time: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse to pop the earliest entry first.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

/// Priority-ordered queue of scheduled events, keyed by simulated time.
///
/// Scheduling an event for a recipient that already has one pending at the
/// same absolute time is a no-op. This is what lets every `mark_reschedule`
/// within one tick collapse into a single future tick.
#[derive(Debug, Default)]
pub struct EventQueue {
    now: SimTime,
    seq: u64,
    heap: BinaryHeap<Scheduled>,
    pending: HashSet<(SimTime, NodeId)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time.
    pub fn curr_time(&self) -> SimTime {
        self.now
    }

    /// Schedules `event` at `now + delta`.
    ///
    /// Returns `false` (and drops the event) if the recipient already has an
    /// event pending at that time.
    pub fn schedule(&mut self, delta: SimTime, event: Event) -> bool {
        let time = self.now + delta;
        if !self.pending.insert((time, event.recipient())) {
            return false;
        }
        self.heap.push(Scheduled {
            time,
            seq: self.seq,
            event,
        });
        self.seq += 1;
        true
    }

    /// Removes the earliest event and advances `now` to its time.
    pub fn pop(&mut self) -> Option<Event> {
        let entry = self.heap.pop()?;
        assert!(
            entry.time >= self.now,
            "event queue went backwards: now={}, event time={}",
            self.now,
            entry.time
        );
        self.now = entry.time;
        self.pending.remove(&(entry.time, entry.event.recipient()));
        Some(entry.event)
    }

    /// Time of the earliest pending event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|e| e.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_order_by_time() {
        let mut eq = EventQueue::new();
        eq.schedule(5, Event::tick(NodeId::router(0)));
        eq.schedule(1, Event::tick(NodeId::router(1)));
        eq.schedule(3, Event::tick(NodeId::router(2)));

        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(1));
        assert_eq!(eq.curr_time(), 1);
        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(2));
        assert_eq!(eq.curr_time(), 3);
        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(0));
        assert_eq!(eq.curr_time(), 5);
        assert!(eq.pop().is_none());
    }

    #[test]
    fn test_fifo_among_equal_times() {
        let mut eq = EventQueue::new();
        eq.schedule(2, Event::tick(NodeId::router(7)));
        eq.schedule(2, Event::tick(NodeId::router(3)));
        eq.schedule(2, Event::tick(NodeId::router(5)));

        // Ties break by insertion order, not by recipient.
        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(7));
        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(3));
        assert_eq!(eq.pop().unwrap().recipient(), NodeId::router(5));
    }

    #[test]
    fn test_dedup_same_recipient_same_time() {
        let mut eq = EventQueue::new();
        assert!(eq.schedule(1, Event::tick(NodeId::router(0))));
        assert!(!eq.schedule(1, Event::tick(NodeId::router(0))));
        // A different recipient at the same time is not deduplicated.
        assert!(eq.schedule(1, Event::tick(NodeId::source(0))));
        assert_eq!(eq.len(), 2);
    }

    #[test]
    fn test_dedup_clears_after_pop() {
        let mut eq = EventQueue::new();
        eq.schedule(0, Event::tick(NodeId::router(0)));
        eq.pop().unwrap();

        // Once delivered, the same (time, recipient) slot is free again.
        assert!(eq.schedule(0, Event::tick(NodeId::router(0))));
    }

    #[test]
    fn test_time_advances_only_on_pop() {
        let mut eq = EventQueue::new();
        eq.schedule(10, Event::tick(NodeId::router(0)));
        assert_eq!(eq.curr_time(), 0);
        assert_eq!(eq.peek_time(), Some(10));
        eq.pop().unwrap();
        assert_eq!(eq.curr_time(), 10);
    }
}
