//! Fixed-delay physical channels.
//!
//! A channel carries flits one way and credits the other way between two
//! endpoints. Both directions are time-stamped FIFOs: an item becomes
//! visible at the far end exactly `delay` cycles after it was put. Every
//! put schedules a tick at the receiving endpoint, which is what wakes a
//! quiescent node when traffic reaches it.

use std::collections::VecDeque;

use crate::event::{Event, EventQueue};
use crate::flit::{Credit, Flit};
use crate::topology::Connection;
use crate::types::SimTime;

/// Index of a channel in the simulation's channel arena.
pub type ChannelId = usize;

/// A one-way flit channel with a credit back-channel.
#[derive(Debug)]
pub struct Channel {
    conn: Connection,
    delay: SimTime,
    buf: VecDeque<(SimTime, Flit)>,
    buf_credit: VecDeque<(SimTime, Credit)>,
}

impl Channel {
    /// Creates a channel over `conn` with the given link delay (>= 1).
    pub fn new(conn: Connection, delay: SimTime) -> Self {
        assert!(delay >= 1, "channel delay must be at least one cycle");
        Self {
            conn,
            delay,
            buf: VecDeque::new(),
            buf_credit: VecDeque::new(),
        }
    }

    pub fn conn(&self) -> Connection {
        self.conn
    }

    pub fn delay(&self) -> SimTime {
        self.delay
    }

    /// Inserts `flit`, to become visible at the destination after the link
    /// delay, and wakes the destination node at that time.
    pub fn put(&mut self, eventq: &mut EventQueue, flit: Flit) {
        let ready = eventq.curr_time() + self.delay;
        self.buf.push_back((ready, flit));
        eventq.schedule(self.delay, Event::tick(self.conn.dst.node));
    }

    /// Inserts a credit travelling back toward the channel source, and wakes
    /// the source node when it arrives.
    pub fn put_credit(&mut self, eventq: &mut EventQueue, credit: Credit) {
        let ready = eventq.curr_time() + self.delay;
        self.buf_credit.push_back((ready, credit));
        eventq.schedule(self.delay, Event::tick(self.conn.src.node));
    }

    /// Takes the head flit if its ready-time is exactly `now`.
    ///
    /// The scheduler wakes the destination at precisely the ready-time, so a
    /// head whose ready-time has passed means a lost wakeup; that is a
    /// modelling bug and fatal.
    pub fn get(&mut self, now: SimTime) -> Option<Flit> {
        let &(ready, _) = self.buf.front()?;
        if now < ready {
            return None;
        }
        assert_eq!(
            now, ready,
            "stagnant flit in channel {} -> {}",
            self.conn.src, self.conn.dst
        );
        self.buf.pop_front().map(|(_, flit)| flit)
    }

    /// Takes the head credit if its ready-time is exactly `now`.
    pub fn get_credit(&mut self, now: SimTime) -> Option<Credit> {
        let &(ready, _) = self.buf_credit.front()?;
        if now < ready {
            return None;
        }
        assert_eq!(
            now, ready,
            "stagnant credit in channel {} -> {}",
            self.conn.src, self.conn.dst
        );
        self.buf_credit.pop_front().map(|(_, credit)| credit)
    }

    /// Number of flits currently in flight on this channel.
    pub fn flits_in_flight(&self) -> usize {
        self.buf.len()
    }
}
