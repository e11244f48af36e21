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

//! Module defining a network device: interfaces, routing tables, the event
//! bus with its built-in reactors, control-plane packet handling, and the
//! ping driver. A router is a device that additionally owns a forwarding
//! engine and the IS-IS and RSVP processes; a server is the same struct
//! without them.

use crate::arp::ArpHandler;
use crate::event::{
    EventKind, EventObject, IcmpSub, Job, ListenKey, Observer, Scheduler, SimEvent, SubKind,
};
use crate::forwarding::ForwardingTable;
use crate::iface::{p2p_peer, Link, LogicalInterface, PhysicalInterface, PortState};
use crate::isis::IsisProcess;
use crate::packet::{
    Frame, FramePayload, IcmpMessage, IpPayload, IpProtocol, Ipv4Packet, MacAddr,
};
use crate::routing::{Route, RoutingTables, TableId};
use crate::rsvp::RsvpProcess;
use crate::types::{ConfigError, DeviceError, DeviceId};
use ipnet::Ipv4Net;
use log::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Mutable simulation context handed into device code: the scheduler for
/// deferring work, the link registry for putting frames on the wire, and
/// the simulator-wide RSVP tunnel-id counter.
#[derive(Debug)]
pub(crate) struct SimCtx<'a> {
    /// The virtual-time scheduler.
    pub sched: &'a mut Scheduler,
    /// All links, read-only during device work.
    pub links: &'a [Link],
    /// Monotonic tunnel-id allocator shared by every RSVP process.
    pub tunnel_ids: &'a mut u32,
}

impl<'a> SimCtx<'a> {
    /// Allocates the next RSVP tunnel id.
    pub fn next_tunnel_id(&mut self) -> u32 {
        *self.tunnel_ids += 1;
        *self.tunnel_ids
    }
}

/// What flavor of device this is.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum DeviceKind {
    /// A router: forwarding engine plus control-plane processes.
    Router,
    /// An end host: routing tables and ARP, no forwarding engine.
    Server,
}

/// State of one ping run, queryable after the simulation advanced.
#[derive(Debug, Clone)]
pub struct PingSession {
    /// Session id.
    pub id: u64,
    /// Target address.
    pub dest: Ipv4Addr,
    /// Requested number of echo requests.
    pub count: u32,
    /// Requests not yet sent.
    pub remaining: u32,
    /// Per-request timeout in milliseconds.
    pub timeout: u64,
    /// Requests sent so far.
    pub sent: u32,
    /// Replies received.
    pub received: u32,
    /// Unreachables received in place of replies.
    pub unreachable: u32,
    /// True once the session has finished.
    pub done: bool,
    source_iface: Option<String>,
    last_sent: u64,
    sent_time: u64,
    lost: Option<bool>,
}

/// A simulated network device.
#[derive(Debug)]
pub struct Device {
    pub(crate) id: DeviceId,
    /// The device hostname.
    pub hostname: String,
    kind: DeviceKind,
    phys: Vec<PhysicalInterface>,
    pub(crate) bus: crate::event::EventBus,
    pub(crate) routing: RoutingTables,
    pub(crate) forwarding: Option<ForwardingTable>,
    pub(crate) arp: Option<ArpHandler>,
    pub(crate) isis: Option<IsisProcess>,
    pub(crate) rsvp: Option<RsvpProcess>,
    pub(crate) observed: Vec<SimEvent>,
    pings: BTreeMap<u64, PingSession>,
    next_ping_id: u64,
    next_echo_id: u64,
    loopback: Option<Ipv4Addr>,
}

impl Device {
    /// Creates a router with its loopback interface addressed and its
    /// control-plane processes attached. `initial_label` seeds the RSVP
    /// label allocator.
    pub(crate) fn new_router(
        id: DeviceId,
        hostname: impl Into<String>,
        loopback: Ipv4Addr,
        lo_mac: MacAddr,
        initial_label: u32,
    ) -> Self {
        let hostname = hostname.into();
        let mut dev = Device {
            id,
            hostname: hostname.clone(),
            kind: DeviceKind::Router,
            phys: Vec::new(),
            bus: crate::event::EventBus::new(),
            routing: RoutingTables::new(),
            forwarding: Some(ForwardingTable::new()),
            arp: Some(ArpHandler::new()),
            isis: Some(IsisProcess::new(hostname.clone())),
            rsvp: Some(RsvpProcess::new(loopback, initial_label)),
            observed: Vec::new(),
            pings: BTreeMap::new(),
            next_ping_id: 0,
            next_echo_id: 0,
            loopback: Some(loopback),
        };
        dev.bus.listen(ListenKey::Kind(EventKind::LinkState), Observer::RouteUpdater);
        dev.bus.listen(ListenKey::Kind(EventKind::LinkState), Observer::FibRebuild);
        dev.bus.listen(ListenKey::Kind(EventKind::PacketRecv), Observer::PacketDispatch);
        dev.bus.listen(ListenKey::Kind(EventKind::RouteChange), Observer::FibRebuild);

        let mut lo = PhysicalInterface::new("lo", lo_mac, true);
        let lo_net = Ipv4Net::new(loopback, 32).expect("/32 is always valid");
        let mut unit = LogicalInterface::new("lo.0", Some(lo_net));
        unit.oper_state = PortState::Up;
        unit.te_metric = 500;
        lo.logicals.push(unit);
        dev.phys.push(lo);
        dev
    }

    /// Creates a server with its single `et1` interface.
    pub(crate) fn new_server(id: DeviceId, hostname: impl Into<String>, et1_mac: MacAddr) -> Self {
        let mut dev = Device {
            id,
            hostname: hostname.into(),
            kind: DeviceKind::Server,
            phys: Vec::new(),
            bus: crate::event::EventBus::new(),
            routing: RoutingTables::new(),
            forwarding: None,
            arp: Some(ArpHandler::new()),
            isis: None,
            rsvp: None,
            observed: Vec::new(),
            pings: BTreeMap::new(),
            next_ping_id: 0,
            next_echo_id: 0,
            loopback: None,
        };
        dev.bus.listen(ListenKey::Kind(EventKind::LinkState), Observer::RouteUpdater);
        dev.bus.listen(ListenKey::Kind(EventKind::PacketRecv), Observer::PacketDispatch);
        dev.phys.push(PhysicalInterface::new("et1", et1_mac, false));
        dev
    }

    /// Installs the loopback host route. Called once by the topology right
    /// after construction, when a scheduler context exists for publishing.
    pub(crate) fn install_loopback_route(&mut self, ctx: &mut SimCtx<'_>) {
        if let Some(loopback) = self.loopback {
            let route = Route::local(loopback, "lo.0");
            let src = self.hostname.clone();
            self.add_route(ctx, route, TableId::Direct, Some(&src));
        }
    }

    /// The device kind.
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub(crate) fn is_router(&self) -> bool {
        self.kind == DeviceKind::Router
    }

    /// The loopback address, on routers.
    pub fn loopback(&self) -> Option<Ipv4Addr> {
        self.loopback
    }

    /// Read access to the routing tables.
    pub fn routing(&self) -> &RoutingTables {
        &self.routing
    }

    /// Read access to the forwarding table, on routers.
    pub fn forwarding(&self) -> Option<&ForwardingTable> {
        self.forwarding.as_ref()
    }

    /// Read access to the IS-IS process, on routers.
    pub fn isis(&self) -> Option<&IsisProcess> {
        self.isis.as_ref()
    }

    /// Read access to the RSVP process, on routers.
    pub fn rsvp(&self) -> Option<&RsvpProcess> {
        self.rsvp.as_ref()
    }

    /// A finished or running ping session.
    pub fn ping_session(&self, id: u64) -> Option<&PingSession> {
        self.pings.get(&id)
    }

    // ------------------------------------------------------------------
    // Interfaces
    // ------------------------------------------------------------------

    /// The physical interfaces, in creation order.
    pub fn physical_interfaces(&self) -> impl Iterator<Item = &PhysicalInterface> {
        self.phys.iter()
    }

    /// Looks up a physical interface by name.
    pub fn phy(&self, name: &str) -> Option<&PhysicalInterface> {
        self.phys.iter().find(|phy| phy.name == name)
    }

    pub(crate) fn phy_mut(&mut self, name: &str) -> Option<&mut PhysicalInterface> {
        self.phys.iter_mut().find(|phy| phy.name == name)
    }

    /// Looks up a logical interface by unit name.
    pub fn logical(&self, name: &str) -> Option<&LogicalInterface> {
        self.phys.iter().flat_map(|phy| phy.logicals.iter()).find(|l| l.name == name)
    }

    pub(crate) fn logical_mut(&mut self, name: &str) -> Option<&mut LogicalInterface> {
        self.phys.iter_mut().flat_map(|phy| phy.logicals.iter_mut()).find(|l| l.name == name)
    }

    /// The physical interface a logical unit belongs to.
    pub fn phy_of_logical(&self, name: &str) -> Option<&PhysicalInterface> {
        self.phys.iter().find(|phy| phy.logicals.iter().any(|l| l.name == name))
    }

    pub(crate) fn hw_of_logical(&self, name: &str) -> Option<MacAddr> {
        self.phy_of_logical(name).map(|phy| phy.hw_address)
    }

    /// True when the named interface (logical or physical) is up.
    pub fn iface_up(&self, name: &str) -> bool {
        if let Some(logical) = self.logical(name) {
            return logical.is_up();
        }
        self.phy(name).map(|phy| phy.is_up()).unwrap_or(false)
    }

    /// Names of all logical interfaces.
    pub fn logical_names(&self) -> Vec<String> {
        self.phys.iter().flat_map(|phy| phy.logicals.iter().map(|l| l.name.clone())).collect()
    }

    /// True when `address` is assigned to one of our logical interfaces.
    pub fn owns_address(&self, address: Ipv4Addr) -> bool {
        self.phys
            .iter()
            .flat_map(|phy| phy.logicals.iter())
            .any(|l| l.address() == Some(address))
    }

    /// Adds a physical interface. Names containing `lo` become loopbacks.
    pub(crate) fn add_phys(&mut self, name: &str, mac: MacAddr) {
        let is_loopback = name.starts_with("lo");
        self.phys.push(PhysicalInterface::new(name, mac, is_loopback));
    }

    /// Adds a logical unit to a physical interface.
    pub(crate) fn add_logical(
        &mut self,
        phy_name: &str,
        unit_name: &str,
        ipv4: Option<Ipv4Net>,
    ) -> Result<(), ConfigError> {
        let phy = self
            .phy_mut(phy_name)
            .ok_or_else(|| ConfigError::UnknownInterface(phy_name.to_string()))?;
        phy.logicals.push(LogicalInterface::new(unit_name, ipv4));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Event bus
    // ------------------------------------------------------------------

    /// Registers a bus observer.
    pub fn listen(&mut self, key: ListenKey, observer: Observer) {
        self.bus.listen(key, observer);
    }

    /// Clears every observer registered for `kind`.
    pub fn stop_listening(&mut self, kind: EventKind) {
        self.bus.stop_listening(kind);
    }

    /// Publishes an event: stamps the observation time and dispatches it to
    /// the interested observers. Events published while a dispatch is in
    /// progress are queued and handled in order.
    pub(crate) fn publish(&mut self, ctx: &mut SimCtx<'_>, mut event: SimEvent) {
        event.when = ctx.sched.now();
        self.bus.pending.push_back(event);
        if self.bus.draining {
            return;
        }
        self.bus.draining = true;
        while let Some(event) = self.bus.pending.pop_front() {
            self.dispatch_event(ctx, event);
        }
        self.bus.draining = false;
    }

    fn dispatch_event(&mut self, ctx: &mut SimCtx<'_>, event: SimEvent) {
        debug!(
            "{} {}:{} - from {}: {}",
            event.when, self.hostname, event.kind, event.source, event.msg
        );
        for observer in self.bus.interested(event.kind) {
            match observer {
                Observer::Collector => self.observed.push(event.clone()),
                Observer::RouteUpdater => self.react_route_updater(ctx, &event),
                Observer::FibRebuild => self.rebuild_fib(),
                Observer::PacketDispatch => self.react_packet_dispatch(ctx, &event),
                Observer::IsisLinkWatch => {
                    if event.kind == EventKind::LinkState {
                        ctx.sched.enqueue(10, Job::IsisRefreshLocal(self.id));
                    }
                }
                Observer::Ping(id) => self.ping_observe(ctx, id, &event),
            }
        }
    }

    /// Rebuilds the forwarding table from the routing tables. A no-op on
    /// servers.
    pub(crate) fn rebuild_fib(&mut self) {
        let fib = {
            let routing = &self.routing;
            let phys = &self.phys;
            let up = |name: &str| {
                phys.iter()
                    .flat_map(|phy| phy.logicals.iter())
                    .find(|l| l.name == name)
                    .map(|l| l.is_up())
                    .unwrap_or(false)
            };
            routing.forwarding_table(&up)
        };
        if let Some(forwarding) = self.forwarding.as_mut() {
            forwarding.set_fib(fib);
            debug!("[{}] installed new forwarding table", self.hostname);
        }
    }

    /// Maintains connected/local routes when logical interfaces change
    /// state.
    fn react_route_updater(&mut self, ctx: &mut SimCtx<'_>, event: &SimEvent) {
        let (logical, up) = match &event.object {
            Some(EventObject::Iface { logical: Some(name), up, .. }) => (name.clone(), *up),
            _ => return,
        };
        let net = match self.logical(&logical).and_then(|l| l.ipv4) {
            Some(net) => net,
            None => return,
        };
        let connected = Route::connected(net.trunc(), logical.clone());
        let local = Route::local(net.addr(), logical.clone());
        let src = self.hostname.clone();
        if up {
            self.add_route(ctx, connected, TableId::Direct, Some(&src));
            self.add_route(ctx, local, TableId::Direct, Some(&src));
        } else {
            self.del_route(ctx, &connected, TableId::Direct, Some(&src));
            self.del_route(ctx, &local, TableId::Direct, Some(&src));
        }
    }

    /// Dispatches a received frame into the processing pipeline, applying
    /// layer-2 destination filtering first.
    fn react_packet_dispatch(&mut self, ctx: &mut SimCtx<'_>, event: &SimEvent) {
        let (phy_name, frame) = match &event.object {
            Some(EventObject::FrameIn { phy, frame }) => (phy.clone(), frame.clone()),
            _ => return,
        };
        let (hw, logical) = match self.phy(&phy_name) {
            Some(phy) => (phy.hw_address, phy.first_logical().map(|l| l.name.clone())),
            None => return,
        };
        if frame.dest != MacAddr::BROADCAST && frame.dest != hw {
            // Not for us; drop silently.
            return;
        }
        if self.is_router() {
            if let Err(err) = self.pfe_process_frame(ctx, frame, logical.as_deref(), false, None) {
                error!("[{}] {}", self.hostname, err);
            }
        } else {
            match frame.payload {
                FramePayload::Arp(packet) => {
                    if let Some(mut arp) = self.arp.take() {
                        arp.process(self, ctx, logical.as_deref().unwrap_or(""), packet);
                        self.arp = Some(arp);
                    }
                }
                FramePayload::Ipv4(packet) => {
                    self.process_packet(ctx, logical.as_deref(), packet)
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Routing wrappers (publish synchronously after mutating)
    // ------------------------------------------------------------------

    /// Adds a route and publishes the resulting `RouteChange`.
    pub(crate) fn add_route(
        &mut self,
        ctx: &mut SimCtx<'_>,
        route: Route,
        table: TableId,
        src: Option<&str>,
    ) {
        for event in self.routing.add_route(route, table, src) {
            self.publish(ctx, event);
        }
    }

    /// Deletes a route and publishes the resulting `RouteChange`.
    pub(crate) fn del_route(
        &mut self,
        ctx: &mut SimCtx<'_>,
        route: &Route,
        table: TableId,
        src: Option<&str>,
    ) {
        for event in self.routing.del_route(route, table, src) {
            self.publish(ctx, event);
        }
    }

    /// Replaces a table's content and publishes the resulting changes.
    pub(crate) fn set_routes(
        &mut self,
        ctx: &mut SimCtx<'_>,
        routes: Vec<Route>,
        table: TableId,
        src: Option<&str>,
    ) {
        for event in self.routing.set_routes(routes, table, src) {
            self.publish(ctx, event);
        }
    }

    // ------------------------------------------------------------------
    // Link endpoint transitions
    // ------------------------------------------------------------------

    /// Delivers a frame that arrived on a physical interface.
    pub(crate) fn deliver(&mut self, ctx: &mut SimCtx<'_>, phy_name: &str, frame: Frame) {
        let up = self.phy(phy_name).map(|phy| phy.is_up()).unwrap_or(false);
        if !up {
            return;
        }
        let msg = format!("Received {}", frame.frame_type());
        let event = SimEvent::new(EventKind::PacketRecv, format!("PHY/{}", phy_name), msg)
            .object(EventObject::FrameIn { phy: phy_name.to_string(), frame });
        self.publish(ctx, event);
    }

    /// Brings a link endpoint up, cascading to the logical units.
    pub(crate) fn endpoint_up(&mut self, ctx: &mut SimCtx<'_>, phy_name: &str) {
        let names: Vec<String> = match self.phy_mut(phy_name) {
            Some(phy) => {
                phy.oper_state = PortState::Up;
                phy.logicals.iter().map(|l| l.name.clone()).collect()
            }
            None => return,
        };
        let event = SimEvent::new(
            EventKind::LinkState,
            format!("PHY/{}", phy_name),
            format!("PHY/{} is now UP", phy_name),
        )
        .object(EventObject::Iface { phy: phy_name.to_string(), logical: None, up: true });
        self.publish(ctx, event);
        for name in names {
            if let Some(logical) = self.logical_mut(&name) {
                logical.oper_state = PortState::Up;
                if logical.is_up() {
                    let event = SimEvent::new(
                        EventKind::LinkState,
                        format!("LOG/{}", name),
                        format!("LOG/{} is now UP", name),
                    )
                    .object(EventObject::Iface {
                        phy: phy_name.to_string(),
                        logical: Some(name),
                        up: true,
                    });
                    self.publish(ctx, event);
                }
            }
        }
    }

    /// Brings a link endpoint down, cascading to the logical units.
    pub(crate) fn endpoint_down(&mut self, ctx: &mut SimCtx<'_>, phy_name: &str) {
        let names: Vec<String> = match self.phy_mut(phy_name) {
            Some(phy) => {
                phy.oper_state = PortState::Down;
                phy.logicals.iter().map(|l| l.name.clone()).collect()
            }
            None => return,
        };
        let event = SimEvent::new(
            EventKind::LinkState,
            format!("PHY/{}", phy_name),
            format!("PHY/{} is now DOWN", phy_name),
        )
        .object(EventObject::Iface { phy: phy_name.to_string(), logical: None, up: false });
        self.publish(ctx, event);
        for name in names {
            if let Some(logical) = self.logical_mut(&name) {
                logical.oper_state = PortState::Down;
                let event = SimEvent::new(
                    EventKind::LinkState,
                    format!("LOG/{}", name),
                    format!("LOG/{} is now DOWN", name),
                )
                .object(EventObject::Iface {
                    phy: phy_name.to_string(),
                    logical: Some(name),
                    up: false,
                });
                self.publish(ctx, event);
            }
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Sends a frame out of the physical parent of a logical unit.
    pub(crate) fn send_frame_on_logical(
        &mut self,
        ctx: &mut SimCtx<'_>,
        logical: &str,
        dest: MacAddr,
        payload: FramePayload,
    ) {
        let phy_name = match self.phy_of_logical(logical) {
            Some(phy) => phy.name.clone(),
            None => {
                error!("[{}] {} has no parent interface", self.hostname, logical);
                return;
            }
        };
        self.send_frame_on_phy(ctx, &phy_name, dest, payload);
    }

    /// Sends a frame out of a physical interface.
    pub(crate) fn send_frame_on_phy(
        &mut self,
        ctx: &mut SimCtx<'_>,
        phy_name: &str,
        dest: MacAddr,
        payload: FramePayload,
    ) {
        let phy = match self.phy(phy_name) {
            Some(phy) => phy,
            None => return,
        };
        if !phy.is_up() {
            return;
        }
        let link_id = match phy.link {
            Some(id) => id,
            None => {
                error!(
                    "[{}] {} being used to send a frame, but don't have a link!",
                    self.hostname, phy_name
                );
                return;
            }
        };
        let frame = Frame::new(phy.hw_address, dest, payload);
        ctx.links[link_id.0].send(ctx.sched, (self.id, phy_name), &frame);
    }

    /// Resolves a next hop through ARP and sends the packet, parking it on
    /// a cache miss until the reply arrives.
    pub(crate) fn send_resolved(
        &mut self,
        ctx: &mut SimCtx<'_>,
        next_hop: Ipv4Addr,
        packet: Ipv4Packet,
        iface: &str,
    ) {
        let cached = self.arp.as_ref().and_then(|arp| arp.cache.get(next_hop));
        match cached {
            Some(hw) => {
                self.send_frame_on_logical(ctx, iface, hw, FramePayload::Ipv4(packet));
            }
            None => {
                if let Some(mut arp) = self.arp.take() {
                    arp.enqueue(next_hop, packet, iface.to_string());
                    arp.request(self, ctx, next_hop, iface);
                    self.arp = Some(arp);
                }
            }
        }
    }

    /// Picks the layer-2 next hop for a packet leaving on `iface`: the
    /// explicit next hop when one is known, the destination itself when it
    /// is on-link, or the far side of a point-to-point `/31`.
    pub(crate) fn resolve_next_hop(
        &self,
        next_hop: Option<Ipv4Addr>,
        dst: Ipv4Addr,
        iface: &str,
    ) -> Result<Ipv4Addr, DeviceError> {
        if let Some(nh) = next_hop {
            return Ok(nh);
        }
        let net = self.logical(iface).and_then(|l| l.ipv4);
        if let Some(net) = net {
            if net.contains(&dst) {
                return Ok(dst);
            }
            if let Some(peer) = p2p_peer(net) {
                return Ok(peer);
            }
        }
        Err(DeviceError::NextHopRequired(dst))
    }

    /// Sends a locally originated IP packet. Routers hand the frame to
    /// their forwarding engine (so label pushes and recursive routes
    /// apply); servers resolve the route inline and go straight to ARP.
    pub(crate) fn send_ip(
        &mut self,
        ctx: &mut SimCtx<'_>,
        packet: Ipv4Packet,
        source_iface: Option<&str>,
    ) {
        if self.is_router() {
            let frame = Frame::new(MacAddr::BROADCAST, MacAddr::BROADCAST, FramePayload::Ipv4(packet));
            ctx.sched.enqueue(
                0,
                Job::PfeAccept {
                    device: self.id,
                    frame,
                    dest_iface: source_iface.map(|s| s.to_string()),
                },
            );
            return;
        }
        let route = match self.routing.lookup_ip(packet.dst) {
            Some(route) => route,
            None => {
                warn!("[{}] {} - no route to host", self.hostname, packet.dst);
                return;
            }
        };
        let iface = match source_iface.map(|s| s.to_string()).or_else(|| route.interface.clone()) {
            Some(iface) => iface,
            None => return,
        };
        match self.resolve_next_hop(route.next_hop, packet.dst, &iface) {
            Ok(next_hop) => self.send_resolved(ctx, next_hop, packet, &iface),
            Err(err) => warn!("[{}] {}", self.hostname, err),
        }
    }

    /// Sends an IP packet toward an explicit gateway address, regardless of
    /// where the packet's own destination would be routed. RSVP uses this
    /// to keep Path messages on their explicit route.
    pub(crate) fn send_ip_toward(
        &mut self,
        ctx: &mut SimCtx<'_>,
        packet: Ipv4Packet,
        gateway: Ipv4Addr,
    ) {
        let route = match self.routing.lookup_ip(gateway) {
            Some(route) => route,
            None => {
                warn!("[{}] {} - no route to gateway", self.hostname, gateway);
                return;
            }
        };
        let iface = match route.interface.clone() {
            Some(iface) => iface,
            None => return,
        };
        let next_hop = route.next_hop.unwrap_or(gateway);
        self.send_resolved(ctx, next_hop, packet, &iface);
    }

    // ------------------------------------------------------------------
    // Control plane
    // ------------------------------------------------------------------

    /// Handles a packet addressed to this device's control plane.
    pub(crate) fn process_packet(
        &mut self,
        ctx: &mut SimCtx<'_>,
        source_iface: Option<&str>,
        packet: Ipv4Packet,
    ) {
        info!("[{}] received {}", self.hostname, packet);
        match &packet.payload {
            IpPayload::Icmp(icmp) => match *icmp {
                IcmpMessage::EchoRequest { id, sent_at } => {
                    let reply = Ipv4Packet::new(
                        packet.dst,
                        packet.src,
                        IpProtocol::Icmp,
                        IpPayload::Icmp(IcmpMessage::EchoReply { id, sent_at }),
                    );
                    self.send_ip(ctx, reply, None);
                }
                IcmpMessage::EchoReply { id, .. } => {
                    let event = SimEvent::new(
                        EventKind::Icmp,
                        self.hostname.clone(),
                        format!("Received Echo Reply {}", id),
                    )
                    .sub(SubKind::Icmp(IcmpSub::EchoReply))
                    .object(EventObject::Packet(packet.clone()));
                    self.publish(ctx, event);
                }
                IcmpMessage::Unreachable { code, .. } => {
                    let event = SimEvent::new(
                        EventKind::Icmp,
                        self.hostname.clone(),
                        format!("Received Unreachable ({:?})", code),
                    )
                    .sub(SubKind::Icmp(IcmpSub::Unreachable))
                    .object(EventObject::Packet(packet.clone()));
                    self.publish(ctx, event);
                }
            },
            IpPayload::Rsvp(_) => {
                let iface = match source_iface {
                    Some(iface) => iface.to_string(),
                    None => return,
                };
                if let Some(mut rsvp) = self.rsvp.take() {
                    rsvp.process_packet(self, ctx, &iface, packet);
                    self.rsvp = Some(rsvp);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Process plumbing
    // ------------------------------------------------------------------

    /// Runs `f` against the IS-IS process with the device borrowed
    /// alongside it.
    pub(crate) fn with_isis<R>(
        &mut self,
        ctx: &mut SimCtx<'_>,
        f: impl FnOnce(&mut IsisProcess, &mut Device, &mut SimCtx<'_>) -> R,
    ) -> Option<R> {
        let mut isis = self.isis.take()?;
        let out = f(&mut isis, self, ctx);
        self.isis = Some(isis);
        Some(out)
    }

    /// Runs `f` against the RSVP process with the device borrowed
    /// alongside it.
    pub(crate) fn with_rsvp<R>(
        &mut self,
        ctx: &mut SimCtx<'_>,
        f: impl FnOnce(&mut RsvpProcess, &mut Device, &mut SimCtx<'_>) -> R,
    ) -> Option<R> {
        let mut rsvp = self.rsvp.take()?;
        let out = f(&mut rsvp, self, ctx);
        self.rsvp = Some(rsvp);
        Some(out)
    }

    // ------------------------------------------------------------------
    // Ping driver
    // ------------------------------------------------------------------

    /// Starts a ping run toward `dest`. The first request goes out after a
    /// small settling delay; the session id can be used to read the
    /// statistics back once the simulation has advanced.
    pub(crate) fn ping(
        &mut self,
        ctx: &mut SimCtx<'_>,
        dest: Ipv4Addr,
        count: u32,
        timeout: u64,
    ) -> u64 {
        self.bus.stop_listening(EventKind::Icmp);
        self.next_ping_id += 1;
        let id = self.next_ping_id;
        self.pings.insert(
            id,
            PingSession {
                id,
                dest,
                count,
                remaining: count,
                timeout,
                sent: 0,
                received: 0,
                unreachable: 0,
                done: false,
                source_iface: None,
                last_sent: 0,
                sent_time: 0,
                lost: None,
            },
        );
        self.bus.listen(ListenKey::Kind(EventKind::Icmp), Observer::Ping(id));
        info!("[{}] PING {}", self.hostname, dest);
        ctx.sched.enqueue(50, Job::PingSend(self.id, id));
        id
    }

    /// Sends the next echo request of a session.
    pub(crate) fn ping_send(&mut self, ctx: &mut SimCtx<'_>, id: u64) {
        let (dest, source_iface, remaining, done) = match self.pings.get(&id) {
            Some(s) => (s.dest, s.source_iface.clone(), s.remaining, s.done),
            None => return,
        };
        if done || remaining == 0 {
            return;
        }
        // Routers resolve the egress through the FIB so recursive and
        // label-switched routes yield a usable interface; servers only
        // have the routing table.
        let looked_up = if self.is_router() {
            self.forwarding.as_ref().and_then(|fw| fw.lookup_ip(dest)).and_then(|e| e.interface.clone())
        } else {
            self.routing.lookup_ip(dest).and_then(|route| route.interface)
        };
        let iface = match source_iface.or(looked_up) {
            Some(iface) => iface,
            None => {
                warn!("[{}] {} - no route to host!", self.hostname, dest);
                if let Some(s) = self.pings.get_mut(&id) {
                    s.done = true;
                }
                return;
            }
        };
        let source_ip = match self.logical(&iface).and_then(|l| l.address()) {
            Some(ip) => ip,
            None => {
                warn!("[{}] unable to identify a source address on {}", self.hostname, iface);
                if let Some(s) = self.pings.get_mut(&id) {
                    s.done = true;
                }
                return;
            }
        };
        self.next_echo_id += 1;
        let echo_id = self.next_echo_id;
        let now = ctx.sched.now();
        let timeout = match self.pings.get_mut(&id) {
            Some(s) => {
                s.last_sent = echo_id;
                s.lost = Some(true);
                s.sent_time = now;
                s.remaining -= 1;
                s.sent += 1;
                s.timeout
            }
            None => return,
        };
        let packet = Ipv4Packet::new(
            source_ip,
            dest,
            IpProtocol::Icmp,
            IpPayload::Icmp(IcmpMessage::EchoRequest { id: echo_id, sent_at: now }),
        );
        self.send_ip(ctx, packet, Some(&iface));
        ctx.sched.enqueue(timeout, Job::PingCheck(self.id, id));
    }

    /// Reports a timed-out request and continues or finishes the session.
    pub(crate) fn ping_check(&mut self, ctx: &mut SimCtx<'_>, id: u64) {
        let now = ctx.sched.now();
        let (lost, sent_time, remaining, done) = match self.pings.get(&id) {
            Some(s) => (s.lost, s.sent_time, s.remaining, s.done),
            None => return,
        };
        if done {
            return;
        }
        if lost == Some(true) {
            info!("[{}] !! lost after {}ms", self.hostname, now - sent_time);
        }
        if remaining > 0 {
            self.ping_send(ctx, id);
        } else {
            if let Some(s) = self.pings.get_mut(&id) {
                s.done = true;
            }
            self.bus.stop_listening(EventKind::Icmp);
        }
    }

    /// Correlates an ICMP event with a running ping session.
    fn ping_observe(&mut self, ctx: &mut SimCtx<'_>, id: u64, event: &SimEvent) {
        if event.kind != EventKind::Icmp {
            return;
        }
        let packet = match &event.object {
            Some(EventObject::Packet(packet)) => packet,
            _ => return,
        };
        let now = ctx.sched.now();
        let hostname = self.hostname.clone();
        let session = match self.pings.get_mut(&id) {
            Some(session) => session,
            None => return,
        };
        if let IpPayload::Icmp(icmp) = &packet.payload {
            match icmp {
                IcmpMessage::EchoReply { id: echo_id, sent_at }
                    if *echo_id == session.last_sent =>
                {
                    info!(
                        "[{}] received reply from {} - {} ms",
                        hostname,
                        packet.src,
                        now - sent_at
                    );
                    session.lost = Some(false);
                    session.received += 1;
                }
                IcmpMessage::Unreachable { original_echo_id: Some(echo_id), .. }
                    if *echo_id == session.last_sent =>
                {
                    info!("[{}] {} from {}", hostname, icmp, packet.src);
                    session.lost = Some(false);
                    session.unreachable += 1;
                }
                _ => {}
            }
        }
    }
}
