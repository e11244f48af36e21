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

//! Module defining physical and logical interfaces and the links between
//! them. Interfaces hold back-references to their device as a plain
//! [`DeviceId`]; the topology registry resolves them.

use crate::event::{EventKind, Job, Scheduler, SimEvent};
use crate::packet::{Frame, MacAddr};
use crate::types::{DeviceId, LinkId};
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;

/// Administrative or operational state of a port.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PortState {
    /// The port is up.
    Up,
    /// The port is down.
    Down,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Up => f.write_str("UP"),
            PortState::Down => f.write_str("DOWN"),
        }
    }
}

/// A physical interface: a port a cable can be attached to. Its hardware
/// address is generated at creation; logical units carry the addressing.
#[derive(Debug)]
pub struct PhysicalInterface {
    /// Interface name, e.g. `et1`.
    pub name: String,
    /// Hardware address, shared by all logical units.
    pub hw_address: MacAddr,
    /// Administrative state.
    pub admin_state: PortState,
    /// Operational state, driven by link transitions.
    pub oper_state: PortState,
    /// The attached link, if any.
    pub link: Option<LinkId>,
    /// True for loopback ports, which never get a link.
    pub is_loopback: bool,
    /// Logical units, in creation order.
    pub logicals: Vec<LogicalInterface>,
}

impl PhysicalInterface {
    pub(crate) fn new(name: impl Into<String>, hw_address: MacAddr, is_loopback: bool) -> Self {
        PhysicalInterface {
            name: name.into(),
            hw_address,
            admin_state: PortState::Up,
            oper_state: PortState::Up,
            link: None,
            is_loopback,
            logicals: Vec::new(),
        }
    }

    /// A physical port is up when a link is attached and both its states
    /// are up. Loopbacks are the exception: always up once created.
    pub fn is_up(&self) -> bool {
        if self.is_loopback {
            return self.admin_state == PortState::Up && self.oper_state == PortState::Up;
        }
        self.link.is_some()
            && self.admin_state == PortState::Up
            && self.oper_state == PortState::Up
    }

    /// The first logical unit, which receives untagged traffic.
    pub fn first_logical(&self) -> Option<&LogicalInterface> {
        self.logicals.first()
    }
}

impl fmt::Display for PhysicalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PHY/{} ({})", self.name, self.hw_address)
    }
}

/// A logical interface: a unit of a physical port carrying addresses and
/// the TE metric. Up iff both of its own states are up; the operational
/// state follows the parent port through link transitions.
#[derive(Debug)]
pub struct LogicalInterface {
    /// Unit name, e.g. `et1.0`.
    pub name: String,
    /// Administrative state.
    pub admin_state: PortState,
    /// Operational state.
    pub oper_state: PortState,
    /// IPv4 interface address (host address plus prefix length).
    pub ipv4: Option<Ipv4Net>,
    /// ISO NET address, set on loopback units when IS-IS is in play.
    pub iso: Option<String>,
    /// Traffic-engineering metric of the attached link.
    pub te_metric: u32,
}

impl LogicalInterface {
    pub(crate) fn new(name: impl Into<String>, ipv4: Option<Ipv4Net>) -> Self {
        LogicalInterface {
            name: name.into(),
            admin_state: PortState::Up,
            oper_state: PortState::Down,
            ipv4,
            iso: None,
            te_metric: 10,
        }
    }

    /// Up iff both states are up.
    pub fn is_up(&self) -> bool {
        self.admin_state == PortState::Up && self.oper_state == PortState::Up
    }

    /// The host address, when the unit is addressed.
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.ipv4.map(|net| net.addr())
    }
}

impl fmt::Display for LogicalInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOG/{}", self.name)
    }
}

/// One end of a link.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Endpoint {
    /// Owning device.
    pub device: DeviceId,
    /// Physical interface name on that device.
    pub iface: String,
}

/// A bidirectional link between two physical interfaces. Delivery is
/// enforced by scheduling: a frame put on the link arrives at the opposite
/// endpoint `latency_ms` later, and state transitions reach the endpoints
/// after half the latency.
#[derive(Debug)]
pub struct Link {
    /// This link's registry handle.
    pub id: LinkId,
    /// First endpoint (the side that initiated the connection).
    pub endpoint1: Endpoint,
    /// Second endpoint.
    pub endpoint2: Endpoint,
    /// One-way latency in milliseconds.
    pub latency_ms: u64,
    /// Link state.
    pub state: PortState,
}

impl Link {
    pub(crate) fn new(id: LinkId, endpoint1: Endpoint, endpoint2: Endpoint, latency_ms: u64) -> Self {
        Link { id, endpoint1, endpoint2, latency_ms, state: PortState::Down }
    }

    /// The endpoint opposite to `(device, iface)`.
    pub fn opposite(&self, device: DeviceId, iface: &str) -> &Endpoint {
        if self.endpoint1.device == device && self.endpoint1.iface == iface {
            &self.endpoint2
        } else {
            &self.endpoint1
        }
    }

    /// Marks the link up and schedules `up` on both endpoints after half
    /// the latency.
    pub(crate) fn up(&mut self, sched: &mut Scheduler) {
        self.state = PortState::Up;
        let delay = self.latency_ms / 2;
        sched.enqueue(delay, Job::EndpointUp(self.endpoint1.device, self.endpoint1.iface.clone()));
        sched.enqueue(delay, Job::EndpointUp(self.endpoint2.device, self.endpoint2.iface.clone()));
    }

    /// Marks the link down and schedules `down` on both endpoints after
    /// half the latency.
    pub(crate) fn down(&mut self, sched: &mut Scheduler) {
        self.state = PortState::Down;
        let delay = self.latency_ms / 2;
        sched
            .enqueue(delay, Job::EndpointDown(self.endpoint1.device, self.endpoint1.iface.clone()));
        sched
            .enqueue(delay, Job::EndpointDown(self.endpoint2.device, self.endpoint2.iface.clone()));
    }

    /// Puts a frame on the wire from `sender`. A down link silently drops.
    /// The `PacketSend` observation is itself scheduled (at zero delay) so
    /// it is not lost between observations, and the receive fires on the
    /// opposite endpoint after the link latency. The frame is deep-copied;
    /// the sender keeps mutating its own copy freely.
    pub(crate) fn send(&self, sched: &mut Scheduler, sender: (DeviceId, &str), frame: &Frame) {
        if self.state == PortState::Down {
            return;
        }
        let receiver = self.opposite(sender.0, sender.1).clone();
        let event = SimEvent::new(
            EventKind::PacketSend,
            format!("PHY/{}", sender.1),
            format!("Sending {}", frame.frame_type()),
        )
        .target(receiver.iface.clone())
        .object(crate::event::EventObject::FrameOut(frame.clone()));
        sched.enqueue(0, Job::Observe(sender.0, event));
        sched.enqueue(
            self.latency_ms,
            Job::Deliver { device: receiver.device, phy: receiver.iface, frame: frame.clone() },
        );
    }
}

/// Returns the opposite host of a point-to-point `/31`, used to infer a
/// neighbor address when none was learned.
pub(crate) fn p2p_peer(net: Ipv4Net) -> Option<Ipv4Addr> {
    if net.prefix_len() != 31 {
        return None;
    }
    net.hosts().find(|host| *host != net.addr())
}
