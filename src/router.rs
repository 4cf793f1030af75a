//! The pipelined virtual-channel router.
//!
//! Each router owns one input unit and one output unit per port and advances
//! flits through the classical four stages: route computation (RC), VC
//! allocation (VA), switch allocation (SA) and switch traversal (ST), with
//! credit-based flow control toward the downstream input buffers.
//!
//! Within one tick the stages run in *reverse* dependency order so that a
//! flit can never advance through two stages in a single cycle, and global
//! state transitions are staged in `next_global` and committed at the end of
//! the tick ([`Router::update_states`]). Stage evaluation is therefore
//! insensitive to iteration order.

use serde_json::json;
use tracing::{debug, trace};

use crate::channel::ChannelId;
use crate::flit::{Credit, Flit, FlitKind};
use crate::node::{Node, NodeCtx, SelfTick};
use crate::types::{NodeId, SimTime};
use std::collections::VecDeque;

/// Global state of an input or output unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalState {
    Idle,
    Routing,
    VcWait,
    Active,
    CreditWait,
}

/// Pipeline stage occupied by the packet at an input unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Rc,
    Va,
    Sa,
    St,
}

/// Per-input-port state: the flit FIFO and the packet's progress through
/// the pipeline.
#[derive(Debug)]
struct InputUnit {
    global: GlobalState,
    next_global: GlobalState,
    /// Output port chosen by RC for the packet currently being routed.
    route_port: Option<usize>,
    stage: PipelineStage,
    buf: VecDeque<Flit>,
    /// Carries at most one flit from SA into ST.
    st_ready: Option<Flit>,
}

impl InputUnit {
    fn new() -> Self {
        Self {
            global: GlobalState::Idle,
            next_global: GlobalState::Idle,
            route_port: None,
            stage: PipelineStage::Idle,
            buf: VecDeque::new(),
            st_ready: None,
        }
    }
}

/// Per-output-port state. The credit count mirrors the free space in the
/// downstream router's input buffer; there is no output-side flit buffer.
#[derive(Debug)]
struct OutputUnit {
    global: GlobalState,
    next_global: GlobalState,
    /// Input port currently holding this output VC.
    input_port: Option<usize>,
    credit_count: usize,
    /// Single-slot landing buffer for a credit fetched this cycle.
    buf_credit: Option<Credit>,
}

impl OutputUnit {
    fn new(credit_count: usize) -> Self {
        Self {
            global: GlobalState::Idle,
            next_global: GlobalState::Idle,
            input_port: None,
            credit_count,
            buf_credit: None,
        }
    }
}

/// A pipelined VC router with one VC per physical channel.
pub struct Router {
    id: NodeId,
    input_buf_size: usize,
    tick_ctl: SelfTick,
    /// Channel feeding each input port.
    input_channels: Vec<ChannelId>,
    /// Channel driven by each output port.
    output_channels: Vec<ChannelId>,
    input_units: Vec<InputUnit>,
    output_units: Vec<OutputUnit>,
    // Round-robin rotors.
    va_last_grant_input: usize,
    sa_last_grant_input: usize,
}

impl Router {
    /// Creates a router with one input and output unit per port.
    ///
    /// `input_buf_size` bounds each input FIFO and seeds every output unit's
    /// credit count (the downstream buffer has the same capacity).
    pub fn new(
        id: NodeId,
        input_buf_size: usize,
        input_channels: Vec<ChannelId>,
        output_channels: Vec<ChannelId>,
    ) -> Self {
        assert_eq!(
            input_channels.len(),
            output_channels.len(),
            "router radix mismatch"
        );
        let radix = input_channels.len();
        Self {
            id,
            input_buf_size,
            tick_ctl: SelfTick::new(),
            input_channels,
            output_channels,
            input_units: (0..radix).map(|_| InputUnit::new()).collect(),
            output_units: (0..radix).map(|_| OutputUnit::new(input_buf_size)).collect(),
            va_last_grant_input: 0,
            sa_last_grant_input: 0,
        }
    }

    /// Number of ports (input count = output count).
    pub fn radix(&self) -> usize {
        self.input_units.len()
    }

    /// ST: move flits that won switch allocation onto their output channels
    /// and return a credit to the upstream node.
    fn switch_traverse(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        for iport in 0..self.input_units.len() {
            let Some(flit) = self.input_units[iport].st_ready.take() else {
                continue;
            };
            let oport = self.input_units[iport]
                .route_port
                .expect("switch traversal without a computed route");

            // No output speedup: flits that exit the switch land directly on
            // the channel.
            let och = &mut cx.channels[self.output_channels[oport]];
            trace!(
                "[@{:>3}] [{}] Switch traverse: {} sent to {}",
                now,
                self.id,
                flit,
                och.conn().dst
            );
            och.put(cx.eventq, flit);

            // CT: one buffer slot freed, tell the upstream node.
            let ich = &mut cx.channels[self.input_channels[iport]];
            trace!(
                "[@{:>3}] [{}] Credit sent to {}",
                now,
                self.id,
                ich.conn().src
            );
            ich.put_credit(cx.eventq, Credit);
        }
    }

    /// SA: for each active output unit, pick one requesting input unit,
    /// move its head flit into the ST slot and spend one credit.
    fn switch_alloc(&mut self, now: SimTime) {
        for oport in 0..self.output_units.len() {
            if self.output_units[oport].global != GlobalState::Active {
                continue;
            }
            let Some(iport) = self.sa_arbit_round_robin(oport, now) else {
                continue;
            };

            // The flit leaves the input buffer here. Active input units may
            // be empty (body flits still in flight), but the arbiter only
            // grants non-empty ones.
            let flit = self.input_units[iport]
                .buf
                .pop_front()
                .expect("switch allocation granted an empty input buffer");
            trace!(
                "[@{:>3}] [{}] SA success for {} (iport={}, oport={})",
                now,
                self.id,
                flit,
                iport,
                oport
            );

            let ou = &mut self.output_units[oport];
            assert!(
                ou.credit_count > 0,
                "credit underflow on {} oport {}",
                self.id,
                oport
            );
            trace!(
                "[@{:>3}] [{}] Credit decrement, credit={}->{} (oport={})",
                now,
                self.id,
                ou.credit_count,
                ou.credit_count - 1,
                oport
            );
            ou.credit_count -= 1;
            let drained = ou.credit_count == 0;
            let is_tail = flit.kind == FlitKind::Tail;

            let iu = &mut self.input_units[iport];
            debug_assert!(iu.st_ready.is_none(), "ST slot already occupied");
            iu.st_ready = Some(flit);

            // Entering CreditWait does not cancel the ST of the flit that
            // just won SA; only the st_ready slot is visible to ST.
            if is_tail {
                // The tail releases the output VC for the next VA round.
                self.output_units[oport].next_global = GlobalState::Idle;
                let iu = &mut self.input_units[iport];
                if iu.buf.is_empty() {
                    iu.next_global = GlobalState::Idle;
                    iu.stage = PipelineStage::Idle;
                } else {
                    // The next packet's head is already queued.
                    iu.next_global = GlobalState::Routing;
                    iu.stage = PipelineStage::Rc;
                }
                self.tick_ctl.mark();
            } else if drained {
                // Out of credit: both units stall. No reschedule here; the
                // wakeup comes from credit_update when a credit returns.
                self.input_units[iport].next_global = GlobalState::CreditWait;
                self.output_units[oport].next_global = GlobalState::CreditWait;
            } else {
                let iu = &mut self.input_units[iport];
                iu.next_global = GlobalState::Active;
                iu.stage = PipelineStage::Sa;
                self.tick_ctl.mark();
            }
        }
    }

    /// VA: grant each idle output VC to one input unit waiting on it.
    fn vc_alloc(&mut self, now: SimTime) {
        for oport in 0..self.output_units.len() {
            if self.output_units[oport].global != GlobalState::Idle {
                continue;
            }
            let Some(iport) = self.vc_arbit_round_robin(oport) else {
                continue;
            };
            trace!(
                "[@{:>3}] [{}] VA success (iport={}, oport={})",
                now,
                self.id,
                iport,
                oport
            );

            // The VC is granted, but SA cannot start without credit.
            let next = if self.output_units[oport].credit_count == 0 {
                debug!(
                    "[@{:>3}] [{}] VA: no credit, entering CreditWait (oport={})",
                    now, self.id, oport
                );
                GlobalState::CreditWait
            } else {
                GlobalState::Active
            };

            let iu = &mut self.input_units[iport];
            iu.next_global = next;
            iu.stage = PipelineStage::Sa;

            let ou = &mut self.output_units[oport];
            ou.next_global = next;
            ou.input_port = Some(iport);

            self.tick_ctl.mark();
        }
    }

    /// RC: read the head flit's pre-computed route and pick the output port.
    fn route_compute(&mut self, now: SimTime) {
        for port in 0..self.input_units.len() {
            if self.input_units[port].global != GlobalState::Routing {
                continue;
            }
            let iu = &mut self.input_units[port];
            let flit = iu
                .buf
                .front_mut()
                .expect("route computation on an empty input buffer");
            assert!(
                flit.route.idx < flit.route.path.len(),
                "route of {} exhausted before reaching a terminal",
                flit
            );
            let oport = flit.route.path[flit.route.idx];
            trace!(
                "[@{:>3}] [{}] RC success for {} (idx={}, oport={})",
                now,
                self.id,
                flit,
                flit.route.idx,
                oport
            );
            flit.route.idx += 1;
            iu.route_port = Some(oport);

            iu.next_global = GlobalState::VcWait;
            iu.stage = PipelineStage::Va;
            self.tick_ctl.mark();
        }
    }

    /// CU: absorb a fetched credit into the output unit's count, waking a
    /// starved unit pair that parked in CreditWait.
    fn credit_update(&mut self, now: SimTime) {
        for oport in 0..self.output_units.len() {
            if self.output_units[oport].buf_credit.take().is_none() {
                continue;
            }
            let count = self.output_units[oport].credit_count;
            trace!(
                "[@{:>3}] [{}] Credit update, credit={}->{} (oport={})",
                now,
                self.id,
                count,
                count + 1,
                oport
            );
            if count == 0 {
                if self.output_units[oport].next_global == GlobalState::CreditWait {
                    let iport = self.output_units[oport]
                        .input_port
                        .expect("output unit in CreditWait without an input port");
                    debug_assert_eq!(
                        self.input_units[iport].next_global,
                        GlobalState::CreditWait
                    );
                    self.input_units[iport].next_global = GlobalState::Active;
                    self.output_units[oport].next_global = GlobalState::Active;
                }
                self.tick_ctl.mark();
            }
            let ou = &mut self.output_units[oport];
            ou.credit_count += 1;
            debug_assert!(ou.credit_count <= self.input_buf_size);
        }
    }

    /// Pull one credit per output channel into its landing slot.
    fn fetch_credit(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        for oport in 0..self.output_channels.len() {
            let och = &mut cx.channels[self.output_channels[oport]];
            if let Some(credit) = och.get_credit(now) {
                trace!("[@{:>3}] [{}] Fetched credit (oport={})", now, self.id, oport);
                self.output_units[oport].buf_credit = Some(credit);
                self.tick_ctl.mark();
            }
        }
    }

    /// Pull one flit per input channel into its input FIFO.
    fn fetch_flit(&mut self, cx: &mut NodeCtx<'_>) {
        let now = cx.now();
        for iport in 0..self.input_channels.len() {
            let ch = &mut cx.channels[self.input_channels[iport]];
            let Some(flit) = ch.get(now) else {
                continue;
            };
            let iu = &mut self.input_units[iport];
            trace!(
                "[@{:>3}] [{}] Fetched flit {}, buf.len()={}",
                now,
                self.id,
                flit,
                iu.buf.len()
            );
            if iu.buf.is_empty() {
                // Empty buffer: the only place the pipeline kickstarts. The
                // unit may still be draining a previous packet (empty is not
                // idle), hence the state check.
                if iu.next_global == GlobalState::Idle {
                    iu.next_global = GlobalState::Routing;
                    iu.stage = PipelineStage::Rc;
                }
                self.tick_ctl.mark();
            }
            iu.buf.push_back(flit);
            assert!(
                iu.buf.len() <= self.input_buf_size,
                "input buffer overflow on {} iport {}",
                self.id,
                iport
            );
        }
    }

    /// Round-robin arbitration among input units waiting for `out_port` in
    /// the VA stage. Returns the granted input port, or `None` if there was
    /// no request.
    fn vc_arbit_round_robin(&mut self, out_port: usize) -> Option<usize> {
        let radix = self.input_units.len();
        let mut iport = (self.va_last_grant_input + 1) % radix;
        for _ in 0..radix {
            let iu = &self.input_units[iport];
            if iu.global == GlobalState::VcWait && iu.route_port == Some(out_port) {
                debug_assert_eq!(iu.stage, PipelineStage::Va);
                self.va_last_grant_input = iport;
                return Some(iport);
            }
            iport = (iport + 1) % radix;
        }
        None
    }

    /// Round-robin arbitration among active input units requesting
    /// `out_port` in the SA stage.
    fn sa_arbit_round_robin(&mut self, out_port: usize, now: SimTime) -> Option<usize> {
        let radix = self.input_units.len();
        let mut iport = (self.sa_last_grant_input + 1) % radix;
        for _ in 0..radix {
            let iu = &self.input_units[iport];
            if iu.stage == PipelineStage::Sa && iu.route_port == Some(out_port) {
                match iu.global {
                    GlobalState::Active => {
                        self.sa_last_grant_input = iport;
                        return Some(iport);
                    }
                    GlobalState::CreditWait => {
                        debug!(
                            "[@{:>3}] [{}] Credit stall! (iport={}, oport={})",
                            now, self.id, iport, out_port
                        );
                    }
                    _ => {}
                }
            }
            iport = (iport + 1) % radix;
        }
        None
    }

    /// Two-phase commit of the staged `next_global` transitions.
    fn update_states(&mut self) {
        let mut changed = false;
        for port in 0..self.input_units.len() {
            let iu = &mut self.input_units[port];
            if iu.global != iu.next_global {
                iu.global = iu.next_global;
                changed = true;
            }
            let ou = &mut self.output_units[port];
            if ou.global != ou.next_global {
                assert!(
                    !(ou.next_global == GlobalState::CreditWait && ou.credit_count > 0),
                    "{} oport {} commits to CreditWait with {} credits",
                    self.id,
                    port,
                    ou.credit_count
                );
                ou.global = ou.next_global;
                changed = true;
            }
        }
        // Any committed transition implies more work next cycle.
        if changed {
            self.tick_ctl.mark();
        }
    }
}

impl Node for Router {
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

        // Reverse dependency order: a flit that succeeds in an earlier
        // stage must not be picked up again by a later stage in the same
        // cycle.
        self.switch_traverse(cx);
        self.switch_alloc(now);
        self.vc_alloc(now);
        self.route_compute(now);
        self.credit_update(now);
        self.fetch_credit(cx);
        self.fetch_flit(cx);

        self.update_states();
        self.tick_ctl.finish(self.id, cx.eventq);
    }

    fn buffered_flits(&self) -> usize {
        self.input_units
            .iter()
            .map(|iu| iu.buf.len() + usize::from(iu.st_ready.is_some()))
            .sum()
    }

    fn stats(&self) -> serde_json::Value {
        json!({
            "id": self.id.to_string(),
            "radix": self.radix(),
            "buffered_flits": self.buffered_flits(),
            "credit_counts": self.output_units.iter().map(|ou| ou.credit_count).collect::<Vec<_>>(),
            "input_states": self.input_units.iter().map(|iu| format!("{:?}", iu.global)).collect::<Vec<_>>(),
            "output_states": self.output_units.iter().map(|ou| format!("{:?}", ou.global)).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::event::EventQueue;
    use crate::flit::Flit;
    use crate::stats::Stat;
    use crate::topology::{Connection, RouterPort};

    const BUF_SIZE: usize = 8;

    /// A radix-1 router between a stub source and a stub destination:
    /// channel 0 feeds the router, channel 1 drains it.
    fn radix1_fixture() -> (EventQueue, Vec<Channel>, Router) {
        let rtr = NodeId::router(0);
        let ch_in = Channel::new(
            Connection {
                src: RouterPort::new(NodeId::source(0), 0),
                dst: RouterPort::new(rtr, 0),
            },
            1,
        );
        let ch_out = Channel::new(
            Connection {
                src: RouterPort::new(rtr, 0),
                dst: RouterPort::new(NodeId::destination(0), 0),
            },
            1,
        );
        let router = Router::new(rtr, BUF_SIZE, vec![0], vec![1]);
        (EventQueue::new(), vec![ch_in, ch_out], router)
    }

    /// Drives the queue until empty, ticking the router whenever it is the
    /// recipient.
    fn drain(eq: &mut EventQueue, channels: &mut Vec<Channel>, router: &mut Router, stat: &mut Stat) {
        while let Some(ev) = eq.pop() {
            if ev.recipient() == router.id() {
                let mut cx = NodeCtx {
                    eventq: &mut *eq,
                    channels: channels.as_mut_slice(),
                    stat: &mut *stat,
                };
                router.tick(&mut cx);
            }
        }
    }

    fn packet(len: u64) -> Vec<Flit> {
        (0..len)
            .map(|p| {
                let kind = if p == 0 {
                    FlitKind::Head
                } else if p == len - 1 {
                    FlitKind::Tail
                } else {
                    FlitKind::Body
                };
                let mut flit = Flit::new(kind, 0, 0, p);
                if p == 0 {
                    flit.route.path = vec![0];
                }
                flit
            })
            .collect()
    }

    /// Feeds the flits one per cycle, the way an upstream node would, ticking
    /// the router in between.
    fn inject_paced(
        eq: &mut EventQueue,
        channels: &mut Vec<Channel>,
        router: &mut Router,
        stat: &mut Stat,
        flits: Vec<Flit>,
    ) {
        let mut iter = flits.into_iter();
        channels[0].put(eq, iter.next().expect("at least one flit"));
        for flit in iter {
            // The previous put scheduled a router tick one cycle out; run it
            // so the next put lands a cycle later.
            let ev = eq.pop().unwrap();
            assert_eq!(ev.recipient(), router.id());
            let mut cx = NodeCtx {
                eventq: &mut *eq,
                channels: channels.as_mut_slice(),
                stat: &mut *stat,
            };
            router.tick(&mut cx);
            channels[0].put(eq, flit);
        }
    }

    #[test]
    fn test_pipeline_latency_head_to_output() {
        let (mut eq, mut channels, mut router) = radix1_fixture();
        let mut stat = Stat::default();

        // Minimal two-flit packet.
        inject_paced(&mut eq, &mut channels, &mut router, &mut stat, packet(2));
        drain(&mut eq, &mut channels, &mut router, &mut stat);

        // Head arrived at t=1; RC, VA, SA each take a cycle; ST puts it on
        // the output channel at t=5, so it matures there at t=6. The tail
        // follows one cycle behind.
        assert_eq!(channels[1].flits_in_flight(), 2);
        let head = channels[1].get(6).expect("head should be on the output channel");
        assert_eq!(head.kind, FlitKind::Head);
        assert_eq!(head.route.idx, 1);
        let tail = channels[1].get(7).expect("tail should follow");
        assert_eq!(tail.kind, FlitKind::Tail);
        // One credit per traversed flit went back upstream.
        assert!(channels[0].get_credit(6).is_some());
        assert!(channels[0].get_credit(7).is_some());
        assert_eq!(stat.double_tick_count, 0);
    }

    #[test]
    fn test_tail_releases_output_unit() {
        let (mut eq, mut channels, mut router) = radix1_fixture();
        let mut stat = Stat::default();

        inject_paced(&mut eq, &mut channels, &mut router, &mut stat, packet(4));
        drain(&mut eq, &mut channels, &mut router, &mut stat);

        // All four flits traversed; tail committed both units back to Idle.
        assert_eq!(channels[1].flits_in_flight(), 4);
        assert_eq!(router.input_units[0].global, GlobalState::Idle);
        assert_eq!(router.input_units[0].stage, PipelineStage::Idle);
        assert_eq!(router.output_units[0].global, GlobalState::Idle);
        // Four credits spent, none returned (the stub destination never
        // consumes).
        assert_eq!(router.output_units[0].credit_count, BUF_SIZE - 4);
        assert_eq!(router.buffered_flits(), 0);
    }

    #[test]
    fn test_vc_arbiter_rotates() {
        let mut router = Router::new(NodeId::router(0), BUF_SIZE, vec![0, 1, 2], vec![3, 4, 5]);
        for iport in [0, 2] {
            let iu = &mut router.input_units[iport];
            iu.global = GlobalState::VcWait;
            iu.stage = PipelineStage::Va;
            iu.route_port = Some(1);
        }

        // Rotor starts after port 0, so port 2 wins first.
        assert_eq!(router.vc_arbit_round_robin(1), Some(2));
        assert_eq!(router.vc_arbit_round_robin(1), Some(0));
        assert_eq!(router.vc_arbit_round_robin(1), Some(2));
        // No one wants output port 0.
        assert_eq!(router.vc_arbit_round_robin(0), None);
    }

    #[test]
    fn test_sa_arbiter_skips_credit_wait() {
        let mut router = Router::new(NodeId::router(0), BUF_SIZE, vec![0, 1], vec![2, 3]);
        for iport in 0..2 {
            let iu = &mut router.input_units[iport];
            iu.stage = PipelineStage::Sa;
            iu.route_port = Some(0);
        }
        router.input_units[0].global = GlobalState::CreditWait;
        router.input_units[1].global = GlobalState::Active;

        assert_eq!(router.sa_arbit_round_robin(0, 0), Some(1));
        // Only the credit-waiting unit remains: no grant.
        router.input_units[1].global = GlobalState::CreditWait;
        assert_eq!(router.sa_arbit_round_robin(0, 0), None);
    }

    #[test]
    fn test_update_states_commits_and_marks() {
        let mut router = Router::new(NodeId::router(0), BUF_SIZE, vec![0], vec![1]);
        router.input_units[0].next_global = GlobalState::Routing;
        router.update_states();
        assert_eq!(router.input_units[0].global, GlobalState::Routing);

        let mut eq = EventQueue::new();
        router.tick_ctl.finish(router.id, &mut eq);
        assert_eq!(eq.len(), 1, "a committed transition must reschedule");
    }

    #[test]
    #[should_panic(expected = "CreditWait")]
    fn test_credit_wait_commit_with_credits_is_fatal() {
        let mut router = Router::new(NodeId::router(0), BUF_SIZE, vec![0], vec![1]);
        router.output_units[0].next_global = GlobalState::CreditWait;
        // credit_count is still BUF_SIZE > 0: the commit must blow up.
        router.update_states();
    }

    #[test]
    fn test_double_tick_counted_and_ignored() {
        let (mut eq, mut channels, mut router) = radix1_fixture();
        let mut stat = Stat::default();

        let mut cx = NodeCtx {
            eventq: &mut eq,
            channels: &mut channels,
            stat: &mut stat,
        };
        router.tick(&mut cx);
        router.tick(&mut cx);

        assert_eq!(stat.double_tick_count, 1);
    }
}
