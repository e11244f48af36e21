// RouteLab: A Discrete-Event IP/MPLS Control-Plane Simulator
// Copyright (C) 2022  The RouteLab Authors
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module containing the virtual-time scheduler, the deferred-work `Job`
//! variants it carries, and the typed per-device event bus.

use crate::packet::{Frame, Ipv4Packet};
use crate::routing::Route;
use crate::types::{DeviceId, LinkId, SystemId};
use rand::prelude::*;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

/// Deferred work carried by the scheduler. All future activity in the
/// simulator is one of these variants; the topology dispatches them to the
/// owning device when their time comes.
#[derive(Debug)]
pub(crate) enum Job {
    /// Publish an event on a device bus (used to defer `PacketSend`
    /// observations to the current tick instead of mid-mutation).
    Observe(DeviceId, SimEvent),
    /// Deliver a frame to a physical interface.
    Deliver {
        /// Receiving device.
        device: DeviceId,
        /// Receiving physical interface name.
        phy: String,
        /// The frame (already cloned at send time).
        frame: Frame,
    },
    /// Bring one link endpoint up.
    EndpointUp(DeviceId, String),
    /// Bring one link endpoint down.
    EndpointDown(DeviceId, String),
    /// Bring a whole link up (endpoints follow after half the latency).
    LinkUp(LinkId),
    /// Bring a whole link down.
    LinkDown(LinkId),
    /// Hand a locally originated frame to the forwarding engine.
    PfeAccept {
        /// Originating device.
        device: DeviceId,
        /// The frame to route.
        frame: Frame,
        /// Optional egress hint from the control plane.
        dest_iface: Option<String>,
    },
    /// IS-IS hello timer.
    IsisHello(DeviceId),
    /// IS-IS partial-SNP timer.
    IsisPsnp(DeviceId),
    /// IS-IS LSP transmit timer.
    IsisLspTx(DeviceId),
    /// Deferred CSNP on one interface (scheduled when an adjacency
    /// reaches Up).
    IsisCsnp(DeviceId, String),
    /// Deferred regeneration of the local LSP.
    IsisRefreshLocal(DeviceId),
    /// Debounced shortest-path-first run.
    IsisSpf(DeviceId),
    /// Deferred RSVP path refresh.
    RsvpRefresh(DeviceId),
    /// Deferred creation of a bypass LSP around a protected next hop.
    RsvpCreateBypass {
        /// Device at the point of local repair.
        device: DeviceId,
        /// Our interface toward the upstream hop (informational).
        iface: String,
        /// The next-hop address the bypass protects.
        protected_ip: Ipv4Addr,
    },
    /// Send the next echo request of a ping session.
    PingSend(DeviceId, u64),
    /// Check a ping session for a timed-out echo request.
    PingCheck(DeviceId, u64),
}

#[derive(Debug)]
struct ScheduledJob {
    when: u64,
    priority: u8,
    seq: u64,
    job: Job,
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.when, self.priority, self.seq).cmp(&(other.when, other.priority, other.seq))
    }
}

/// Single-threaded virtual-time scheduler. Time only moves when the driver
/// calls [`Scheduler::advance`]; everything else happens "now". Jobs
/// scheduled for the same instant are ordered by a random priority drawn
/// from the seeded generator, so simultaneous events interleave
/// nondeterministically but reproducibly under a fixed seed.
#[derive(Debug)]
pub struct Scheduler {
    now: u64,
    seq: u64,
    queue: BinaryHeap<Reverse<ScheduledJob>>,
    rng: StdRng,
}

impl Scheduler {
    /// Creates a scheduler at tick zero with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Scheduler { now: 0, seq: 0, queue: BinaryHeap::new(), rng: StdRng::seed_from_u64(seed) }
    }

    /// The current virtual time in milliseconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Moves the clock forward. Only the driver loop calls this.
    pub fn advance(&mut self, delta: u64) {
        self.now += delta;
    }

    /// Schedules `job` to run at `now + delay`.
    pub(crate) fn enqueue(&mut self, delay: u64, job: Job) {
        let priority = self.rng.gen_range(0, 101) as u8;
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Reverse(ScheduledJob { when: self.now + delay, priority, seq, job }));
    }

    /// Schedules `job` with the timer jitter of ±1 ms applied to `base`.
    pub(crate) fn enqueue_jittered(&mut self, base: u64, job: Job) {
        let delay = self.rng.gen_range(base - 1, base + 2);
        self.enqueue(delay, job);
    }

    /// Pops the next job due at or before the current tick.
    pub(crate) fn pop_due(&mut self) -> Option<Job> {
        let due = match self.queue.peek() {
            Some(Reverse(entry)) => entry.when <= self.now,
            None => false,
        };
        if due {
            self.queue.pop().map(|Reverse(entry)| entry.job)
        } else {
            None
        }
    }

    /// Delay until the next pending job, or `None` when the queue is empty.
    pub fn next_delay(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(entry)| entry.when.saturating_sub(self.now))
    }

    /// The seeded random generator, shared by everything that needs
    /// reproducible randomness (addresses, initial labels, jitter).
    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

/// Top-level event categories. Subscription on the bus is keyed by these;
/// finer-grained classification lives in [`SubKind`].
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum EventKind {
    /// Administrative interface state change.
    InterfaceState,
    /// A frame was handed to a link or to the forwarding engine.
    PacketSend,
    /// A frame arrived on a physical interface.
    PacketRecv,
    /// A link or interface operational transition.
    LinkState,
    /// A routing table mutation.
    RouteChange,
    /// A forwarding-table lookup resolved.
    Forwarding,
    /// A label-stack operation was applied.
    Mpls,
    /// An ICMP message reached the control plane.
    Icmp,
    /// IS-IS protocol activity.
    Isis,
    /// RSVP-TE protocol activity.
    Rsvp,
    /// ARP activity.
    Arp,
    /// DHCP activity (vocabulary for the external DHCP collaborator;
    /// nothing in this crate publishes it).
    Dhcp,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Sub-classification of an event, nested per top-level kind so listeners
/// can match exhaustively.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SubKind {
    /// `PacketSend` refinement.
    Send(SendSub),
    /// `RouteChange` refinement.
    Route(RouteSub),
    /// `Mpls` refinement.
    Mpls(MplsSub),
    /// `Icmp` refinement.
    Icmp(IcmpSub),
    /// `Isis` refinement.
    Isis(IsisSub),
    /// `Rsvp` refinement.
    Rsvp(RsvpSub),
    /// `Arp` refinement.
    Arp(ArpSub),
}

/// Refinement of `PacketSend`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SendSub {
    /// The frame originated on this device's control plane.
    Local,
}

/// Refinement of `RouteChange`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RouteSub {
    /// A route was added.
    Added,
    /// A route was deleted.
    Deleted,
}

/// Refinement of `Mpls`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum MplsSub {
    /// A label was pushed.
    Push,
    /// The top label was swapped.
    Swap,
    /// The top label was popped.
    Pop,
}

/// Refinement of `Icmp`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IcmpSub {
    /// An echo reply arrived.
    EchoReply,
    /// A destination-unreachable arrived.
    Unreachable,
}

/// Refinement of `Isis`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IsisSub {
    /// An interface was enabled for IS-IS.
    InterfaceAdd,
    /// An adjacency changed state.
    AdjChange,
    /// A link-state PDU entered the database.
    LspAdded,
    /// A shortest-path run was scheduled.
    SpfPending,
    /// Shortest paths were recalculated.
    SpfRun,
}

/// Refinement of `Rsvp`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum RsvpSub {
    /// A Path message was originated.
    SendPath,
    /// A Path message was processed at a transit hop.
    ProcessPath,
    /// A Resv message was processed.
    ProcessResv,
    /// A transit label was allocated.
    LabelReserved,
    /// A bypass route was attached to a protected route.
    BypassInstalled,
}

/// Refinement of `Arp`.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ArpSub {
    /// A cache entry was learned or refreshed.
    EntryAdded,
}

/// Structured payload attached to an event.
#[derive(Debug, Clone)]
pub enum EventObject {
    /// A frame and the physical interface it arrived on.
    FrameIn {
        /// Receiving physical interface.
        phy: String,
        /// The received frame.
        frame: Frame,
    },
    /// A frame on its way out.
    FrameOut(Frame),
    /// An interface transition.
    Iface {
        /// Physical interface name.
        phy: String,
        /// Logical interface name, when the transition is logical.
        logical: Option<String>,
        /// New operational state.
        up: bool,
    },
    /// A route that was added or deleted.
    Route(Route),
    /// An IPv4 packet that reached the control plane.
    Packet(Ipv4Packet),
    /// An MPLS label.
    Label(u32),
    /// An IS-IS neighbor.
    Neighbor {
        /// Neighbor system id.
        system_id: SystemId,
        /// Rendered adjacency state.
        state: String,
    },
    /// An IS-IS link-state PDU.
    Lsp {
        /// LSP identifier.
        lsp_id: SystemId,
        /// Sequence number.
        seq_no: u32,
    },
}

/// An observation published on a device bus. Events are immutable once
/// observed; `when` is stamped at observation time.
#[derive(Debug, Clone)]
pub struct SimEvent {
    /// Top-level category.
    pub kind: EventKind,
    /// Finer classification, when one applies.
    pub sub: Option<SubKind>,
    /// Display name of the publishing component.
    pub source: String,
    /// Optional target (a table name, a receiving interface).
    pub target: Option<String>,
    /// Human-readable description.
    pub msg: String,
    /// Structured payload.
    pub object: Option<EventObject>,
    /// Virtual time at which the event was observed.
    pub when: u64,
}

impl SimEvent {
    /// Builds an event with no sub-kind, target or payload.
    pub fn new(kind: EventKind, source: impl Into<String>, msg: impl Into<String>) -> Self {
        SimEvent {
            kind,
            sub: None,
            source: source.into(),
            target: None,
            msg: msg.into(),
            object: None,
            when: 0,
        }
    }

    /// Attaches a sub-kind.
    pub fn sub(mut self, sub: SubKind) -> Self {
        self.sub = Some(sub);
        self
    }

    /// Attaches a payload.
    pub fn object(mut self, object: EventObject) -> Self {
        self.object = Some(object);
        self
    }

    /// Attaches a target name.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Subscription key on a bus: everything, or one event kind.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum ListenKey {
    /// Receive every event.
    Any,
    /// Receive events of one kind.
    Kind(EventKind),
}

/// Identity of a bus subscriber. Observers are a closed set: dispatching
/// happens in device context, so each variant names a reaction the device
/// knows how to run against itself.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Observer {
    /// Mirror events into the topology-level collector.
    Collector,
    /// Maintain direct (connected/local) routes on interface transitions.
    RouteUpdater,
    /// Rebuild the forwarding table.
    FibRebuild,
    /// Dispatch received frames into the processing pipeline.
    PacketDispatch,
    /// Schedule an IS-IS local LSP refresh on link transitions.
    IsisLinkWatch,
    /// Correlate ICMP events with a ping session.
    Ping(u64),
}

/// Per-device publish/subscribe bus. `observe` stamps the event time and
/// dispatches to the `Any` listeners, then to the listeners of the event's
/// kind, in registration order. No priorities, no backpressure.
#[derive(Debug)]
pub struct EventBus {
    listeners: HashMap<ListenKey, Vec<Observer>>,
    pub(crate) pending: std::collections::VecDeque<SimEvent>,
    pub(crate) draining: bool,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        EventBus {
            listeners: HashMap::new(),
            pending: std::collections::VecDeque::new(),
            draining: false,
        }
    }

    /// Registers an observer for the given key.
    pub fn listen(&mut self, key: ListenKey, observer: Observer) {
        self.listeners.entry(key).or_insert_with(Vec::new).push(observer);
    }

    /// Removes every observer registered for `kind`. This clears the whole
    /// list rather than one subscriber, matching the observed behavior of
    /// the bus this was modeled on.
    pub fn stop_listening(&mut self, kind: EventKind) {
        if let Some(list) = self.listeners.get_mut(&ListenKey::Kind(kind)) {
            list.clear();
        }
    }

    /// The observers interested in an event of `kind`: the `Any` list
    /// first, then the kind list, both in registration order.
    pub(crate) fn interested(&self, kind: EventKind) -> Vec<Observer> {
        let mut out = Vec::new();
        if let Some(list) = self.listeners.get(&ListenKey::Any) {
            out.extend(list.iter().copied());
        }
        if let Some(list) = self.listeners.get(&ListenKey::Kind(kind)) {
            out.extend(list.iter().copied());
        }
        out
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
