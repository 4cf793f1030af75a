//! Terminal nodes: traffic sources and sinks.
//!
//! A source generates head/body/tail flits on a fixed packet template,
//! computes a source route for each head and respects downstream credit. A
//! destination consumes arriving flits and returns one credit per consumed
//! flit.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use crate::channel::ChannelId;
use crate::flit::{source_route, Credit, Flit, FlitKind};
use crate::node::{Node, NodeCtx, SelfTick};
use crate::topology::TopoDesc;
use crate::types::NodeId;
use std::collections::VecDeque;

/// Chooses the destination terminal for each generated packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficPattern {
    /// Send to `(self + offset) mod n`.
    Shift { offset: usize },
    /// Send every packet to one fixed terminal.
    Fixed { dest: usize },
}

impl TrafficPattern {
    /// Destination terminal for a packet from `src` in a network of
    /// `num_nodes` terminals.
    pub fn dest(&self, src: usize, num_nodes: usize) -> usize {
        match *self {
            TrafficPattern::Shift { offset } => (src + offset) % num_nodes,
            TrafficPattern::Fixed { dest } => dest,
        }
    }
}

impl Default for TrafficPattern {
    /// The classic neighbor-shift workload: `(self + 2) mod n`.
    fn default() -> Self {
        TrafficPattern::Shift { offset: 2 }
    }
}

/// A traffic source attached to one router terminal port.
pub struct SourceNode {
    id: NodeId,
    top_desc: TopoDesc,
    out_channel: ChannelId,
    tick_ctl: SelfTick,
    pattern: TrafficPattern,
    /// Flits per packet; index 0 is the head, `packet_length - 1` the tail.
    packet_length: u64,
    /// Stop after this many packets; `None` generates forever.
    packet_limit: Option<u64>,
    payload_counter: u64,
    packets_sent: u64,
    flit_gen_count: u64,
    /// Credits available on the downstream router's terminal input buffer.
    credit_count: usize,
    buf_credit: Option<Credit>,
}

impl SourceNode {
    pub fn new(
        id: NodeId,
        top_desc: TopoDesc,
        out_channel: ChannelId,
        credit_count: usize,
        packet_length: u64,
        packet_limit: Option<u64>,
        pattern: TrafficPattern,
    ) -> Self {
        assert!(packet_length >= 2, "a packet needs a head and a tail");
        Self {
            id,
            top_desc,
            out_channel,
            tick_ctl: SelfTick::new(),
            pattern,
            packet_length,
            packet_limit,
            payload_counter: 0,
            packets_sent: 0,
            flit_gen_count: 0,
            credit_count,
            buf_credit: None,
        }
    }

    /// True once the packet budget is exhausted.
    fn done(&self) -> bool {
        self.packet_limit
            .is_some_and(|limit| self.packets_sent >= limit)
    }

    /// Emits one flit of the current packet if credit allows.
    fn generate(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        if self.done() {
            return;
        }
        if self.credit_count == 0 {
            debug!("[@{:>3}] [{}] Credit stall!", now, self.id);
            return;
        }

        let src = self.id.value;
        let dst = self.pattern.dest(src, self.top_desc.num_nodes());
        let kind = if self.payload_counter == 0 {
            FlitKind::Head
        } else if self.payload_counter == self.packet_length - 1 {
            FlitKind::Tail
        } else {
            FlitKind::Body
        };

        let mut flit = Flit::new(kind, src, dst, self.payload_counter);
        if kind == FlitKind::Head {
            flit.route.path = source_route(self.top_desc, src, dst);
            debug!(
                "[@{:>3}] [{}] Source route computation: {} -> {} : {:?}",
                now, self.id, src, dst, flit.route.path
            );
        }
        self.payload_counter = (self.payload_counter + 1) % self.packet_length;
        if kind == FlitKind::Tail {
            self.packets_sent += 1;
        }

        trace!(
            "[@{:>3}] [{}] Credit decrement, credit={}->{}",
            now,
            self.id,
            self.credit_count,
            self.credit_count - 1
        );
        self.credit_count -= 1;
        self.flit_gen_count += 1;
        trace!("[@{:>3}] [{}] Flit created and sent: {}", now, self.id, flit);

        cx.channels[self.out_channel].put(cx.eventq, flit);
        self.tick_ctl.mark();
    }

    /// Absorbs a fetched credit; a starved source is woken here.
    fn credit_update(&mut self, cx: &NodeCtx<'_>) {
        if self.buf_credit.take().is_none() {
            return;
        }
        trace!(
            "[@{:>3}] [{}] Credit update, credit={}->{}",
            cx.now(),
            self.id,
            self.credit_count,
            self.credit_count + 1
        );
        if self.credit_count == 0 {
            self.tick_ctl.mark();
        }
        self.credit_count += 1;
    }

    fn fetch_credit(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        if let Some(credit) = cx.channels[self.out_channel].get_credit(now) {
            trace!("[@{:>3}] [{}] Fetched credit", now, self.id);
            self.buf_credit = Some(credit);
            self.tick_ctl.mark();
        }
    }

    pub fn credit_count(&self) -> usize {
        self.credit_count
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }
}

impl Node for SourceNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn tick(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        if self.tick_ctl.already_ticked(now) {
            cx.stat.double_tick_count += 1;
            return;
        }
        self.tick_ctl.begin();

        // A source manages credit like a router output unit so it sends
        // flits only when the terminal buffer downstream has room.
        self.generate(cx);
        self.credit_update(cx);
        self.fetch_credit(cx);

        self.tick_ctl.finish(self.id, cx.eventq);
    }

    fn flit_gen_count(&self) -> u64 {
        self.flit_gen_count
    }

    fn stats(&self) -> serde_json::Value {
        json!({
            "id": self.id.to_string(),
            "flit_gen_count": self.flit_gen_count,
            "packets_sent": self.packets_sent,
            "credit_count": self.credit_count,
        })
    }
}

/// A traffic sink attached to one router terminal port.
pub struct DestinationNode {
    id: NodeId,
    in_channel: ChannelId,
    tick_ctl: SelfTick,
    buf: VecDeque<Flit>,
    input_buf_size: usize,
    flit_arrive_count: u64,
}

impl DestinationNode {
    pub fn new(id: NodeId, in_channel: ChannelId, input_buf_size: usize) -> Self {
        Self {
            id,
            in_channel,
            tick_ctl: SelfTick::new(),
            buf: VecDeque::new(),
            input_buf_size,
            flit_arrive_count: 0,
        }
    }

    /// Consumes one flit and returns a credit upstream.
    fn consume(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        let Some(flit) = self.buf.pop_front() else {
            return;
        };
        debug!("[@{:>3}] [{}] Flit arrived: {}", now, self.id, flit);
        // The flit's life ends here.
        drop(flit);
        self.flit_arrive_count += 1;

        let ich = &mut cx.channels[self.in_channel];
        trace!(
            "[@{:>3}] [{}] Credit sent to {}",
            now,
            self.id,
            ich.conn().src
        );
        ich.put_credit(cx.eventq, Credit);
        self.tick_ctl.mark();
    }

    fn fetch_flit(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        if let Some(flit) = cx.channels[self.in_channel].get(now) {
            trace!(
                "[@{:>3}] [{}] Fetched flit {}, buf.len()={}",
                now,
                self.id,
                flit,
                self.buf.len()
            );
            if self.buf.is_empty() {
                self.tick_ctl.mark();
            }
            self.buf.push_back(flit);
            assert!(
                self.buf.len() <= self.input_buf_size,
                "input buffer overflow on {}",
                self.id
            );
        }
    }
}

impl Node for DestinationNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn tick(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        if self.tick_ctl.already_ticked(now) {
            cx.stat.double_tick_count += 1;
            return;
        }
        self.tick_ctl.begin();

        // Consume before fetch so a flit arriving this cycle is consumed on
        // the next one.
        self.consume(cx);
        self.fetch_flit(cx);

        self.tick_ctl.finish(self.id, cx.eventq);
    }

    fn flit_arrive_count(&self) -> u64 {
        self.flit_arrive_count
    }

    fn buffered_flits(&self) -> usize {
        self.buf.len()
    }

    fn stats(&self) -> serde_json::Value {
        json!({
            "id": self.id.to_string(),
            "flit_arrive_count": self.flit_arrive_count,
            "buffered_flits": self.buf.len(),
        })
    }
}
