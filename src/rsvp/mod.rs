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

//! The RSVP-TE process: sessions with their Path/Resv state blocks, the
//! constrained shortest-path computation over the IS-IS TED, downstream
//! label distribution, and bypass-LSP creation for link protection.

pub mod pdu;

use crate::device::{Device, SimCtx};
use crate::event::{EventKind, Job, RsvpSub, SimEvent, SubKind};
use crate::mpls::{LabelOp, IMPLICIT_NULL};
use crate::packet::{IpPayload, IpProtocol, Ipv4Packet};
use crate::routing::{Route, RouteKind, TableId};
use crate::types::DeviceError;
use ipnet::Ipv4Net;
use log::*;
use rand::Rng;
use pdu::{
    FilterSpec, PathMsg, PsbKey, ResvMsg, RsbKey, RsvpMessage, SenderTemplate, SessionAttributes,
    SessionObj,
};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Whether a path state block belongs to a regular or a protection LSP.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PsbKind {
    /// An ordinary LSP.
    Standard,
    /// A bypass LSP protecting a next hop.
    Bypass,
}

/// Path state: one block per Path message seen (or originated), keyed by
/// `(destination, tunnel id, LSP id)`.
#[derive(Debug, Clone)]
pub struct PathStateBlock {
    /// The previous hop the Path came from; at the ingress, our own
    /// egress interface address.
    pub hop: Ipv4Addr,
    /// Sender template of the Path.
    pub sender: SenderTemplate,
    /// Session object of the Path.
    pub session: SessionObj,
    /// Session attributes of the Path.
    pub attributes: SessionAttributes,
    /// The label learned from downstream, once the Resv passed by.
    pub label: Option<u32>,
    /// Standard or bypass.
    pub kind: PsbKind,
    /// The protected next-hop address, on bypass blocks.
    pub bypassed: Option<Ipv4Addr>,
    /// The route this block installed at the ingress.
    pub route: Option<Route>,
}

/// Reservation state: one block per distinct Resv seen.
#[derive(Debug, Clone)]
pub struct ResvStateBlock {
    /// The stored message.
    pub resv: ResvMsg,
    /// Its session.
    pub session: SessionObj,
    /// The hop the Resv came from (the downstream neighbor).
    pub hop: Ipv4Addr,
}

/// An LSP requested at this router, driving one Path message.
#[derive(Debug, Clone)]
pub struct RsvpSession {
    /// Head end (our loopback).
    pub source_ip: Ipv4Addr,
    /// Tail end.
    pub dest_ip: Ipv4Addr,
    /// Operator-visible name.
    pub lsp_name: String,
    /// LSP id within this process.
    pub lsp_id: u32,
    /// Simulation-wide tunnel id.
    pub tunnel_id: u32,
    /// Next hop this session bypasses, when it is a protection LSP.
    pub protected_ip: Option<Ipv4Addr>,
    /// The session's Path messages (one, without refresh support).
    pub paths: Vec<PathMsg>,
}

/// The RSVP-TE process of one router.
#[derive(Debug)]
pub struct RsvpProcess {
    source_ip: Ipv4Addr,
    started: bool,
    lsp_id: u32,
    current_label: u32,
    sessions: Vec<RsvpSession>,
    path_state: BTreeMap<PsbKey, PathStateBlock>,
    resv_state: BTreeMap<RsbKey, ResvStateBlock>,
}

impl RsvpProcess {
    pub(crate) fn new(source_ip: Ipv4Addr, initial_label: u32) -> Self {
        RsvpProcess {
            source_ip,
            started: false,
            lsp_id: 1,
            current_label: initial_label,
            sessions: Vec::new(),
            path_state: BTreeMap::new(),
            resv_state: BTreeMap::new(),
        }
    }

    /// The sessions created at this router.
    pub fn sessions(&self) -> &[RsvpSession] {
        &self.sessions
    }

    /// The path state blocks.
    pub fn path_state(&self) -> &BTreeMap<PsbKey, PathStateBlock> {
        &self.path_state
    }

    /// The reservation state blocks.
    pub fn resv_state(&self) -> &BTreeMap<RsbKey, ResvStateBlock> {
        &self.resv_state
    }

    /// Starts the process; queued sessions send their Path messages
    /// shortly after.
    pub(crate) fn start(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if self.started {
            return;
        }
        self.started = true;
        let delay = ctx.sched.rng().gen_range(0, 6);
        ctx.sched.enqueue(delay, Job::RsvpRefresh(dev.id));
    }

    pub(crate) fn on_refresh(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        self.refresh_paths(dev, ctx);
    }

    /// Creates a session (idempotent by name) and immediately tries to
    /// send its Path message.
    pub(crate) fn create_session(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        dest_ip: Ipv4Addr,
        lsp_name: String,
        link_protection: bool,
        protected_ip: Option<Ipv4Addr>,
    ) {
        if self.sessions.iter().any(|s| s.lsp_name == lsp_name) {
            info!("[{}] already have {}, stopping", dev.hostname, lsp_name);
            return;
        }
        self.lsp_id += 1;
        let tunnel_id = ctx.next_tunnel_id();
        let session_obj =
            SessionObj { dest_ip, tunnel_id, source_ip: self.source_ip };
        let path = PathMsg::new(
            session_obj,
            SenderTemplate { address: self.source_ip, lsp_id: self.lsp_id },
            SessionAttributes { name: lsp_name.clone(), local_repair: link_protection },
        );
        self.sessions.push(RsvpSession {
            source_ip: self.source_ip,
            dest_ip,
            lsp_name,
            lsp_id: self.lsp_id,
            tunnel_id,
            protected_ip,
            paths: vec![path],
        });
        self.refresh_paths(dev, ctx);
    }

    /// Sends the Path message of every session that has no path state yet:
    /// computes the constrained route, fills in ERO/hop/record-route, and
    /// records the path state block.
    fn refresh_paths(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if !self.started {
            return;
        }
        for i in 0..self.sessions.len() {
            let key = self.sessions[i].paths[0].key();
            if self.path_state.contains_key(&key) {
                // Refreshes of established paths are out of scope.
                continue;
            }
            let dest_ip = self.sessions[i].dest_ip;
            let exclude_ip = self.sessions[i].protected_ip;
            let name = self.sessions[i].lsp_name.clone();

            let ero = match self.shortest_path(dev, dest_ip, exclude_ip) {
                Some(ero) if !ero.is_empty() => ero,
                _ => {
                    warn!("[{}] no path available for {}", dev.hostname, name);
                    continue;
                }
            };
            let first_hop = ero[0];
            let route = match dev.routing.lookup_ip(first_hop) {
                Some(route) => route,
                None => {
                    warn!("[{}] no route toward first hop {}", dev.hostname, first_hop);
                    continue;
                }
            };
            let out_iface = match route.interface {
                Some(iface) => iface,
                None => continue,
            };
            let our_address = match dev.logical(&out_iface).and_then(|l| l.address()) {
                Some(address) => address,
                None => continue,
            };

            let path_msg = &mut self.sessions[i].paths[0];
            for entry in &ero {
                path_msg.explicit_route.push(*entry);
            }
            path_msg.hop = Some(our_address);
            path_msg.record_route.push(our_address);
            let msg = path_msg.clone();

            let kind = if exclude_ip.is_some() { PsbKind::Bypass } else { PsbKind::Standard };
            self.path_state.insert(
                key,
                PathStateBlock {
                    hop: our_address,
                    sender: msg.sender.clone(),
                    session: msg.session.clone(),
                    attributes: msg.attributes.clone(),
                    label: None,
                    kind,
                    bypassed: exclude_ip,
                    route: None,
                },
            );

            dev.publish(
                ctx,
                SimEvent::new(EventKind::Rsvp, "rsvp", format!("Send Path message for {}", name))
                    .sub(SubKind::Rsvp(RsvpSub::SendPath)),
            );

            let mut packet = Ipv4Packet::new(
                self.source_ip,
                dest_ip,
                IpProtocol::Rsvp,
                IpPayload::Rsvp(RsvpMessage::Path(msg)),
            );
            packet.router_alert = true;
            dev.send_ip_toward(ctx, packet, first_hop);
        }
    }

    /// Constrained shortest path over the IS-IS database, indexed by TE
    /// router id instead of system id. Returns the explicit route as the
    /// list of point-to-point interface addresses to traverse, or `None`
    /// when the database has not converged (or no path survives the
    /// exclusion).
    pub fn shortest_path(
        &self,
        dev: &Device,
        dest_ip: Ipv4Addr,
        exclude_ip: Option<Ipv4Addr>,
    ) -> Option<Vec<Ipv4Addr>> {
        debug!(
            "[{}] CSPF starting for {}, excluding {:?}",
            dev.hostname, dest_ip, exclude_ip
        );
        let database = dev.isis()?.database();

        let mut ted: BTreeMap<Ipv4Addr, &crate::isis::pdu::LspPdu> = BTreeMap::new();
        let mut system_distance: BTreeMap<Ipv4Addr, u32> = BTreeMap::new();
        let mut prev_system: BTreeMap<Ipv4Addr, Option<Ipv4Addr>> = BTreeMap::new();
        let mut queue: Vec<Ipv4Addr> = Vec::new();
        for entry in database.values() {
            let router_id = match entry.pdu.router_id() {
                Some(id) => id,
                // Placeholder entries have no content yet.
                None => continue,
            };
            ted.insert(router_id, &entry.pdu);
            system_distance.insert(router_id, u32::max_value());
            prev_system.insert(router_id, None);
            queue.push(router_id);
        }
        system_distance.insert(self.source_ip, 0);

        let mut address_distance: BTreeMap<Ipv4Net, u32> = BTreeMap::new();
        let mut address_prev: BTreeMap<Ipv4Net, Ipv4Addr> = BTreeMap::new();

        while !queue.is_empty() {
            let min_idx = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, id)| {
                    system_distance.get(*id).copied().unwrap_or(u32::max_value())
                })
                .map(|(idx, _)| idx)?;
            let node = queue.remove(min_idx);
            let node_distance = system_distance.get(&node).copied().unwrap_or(u32::max_value());
            let lsp = ted[&node];

            for reach in lsp.neighbors() {
                let neighbor_router = match database
                    .get(&reach.system_id)
                    .and_then(|entry| entry.pdu.router_id())
                {
                    Some(id) => id,
                    // An adjacency toward a system we only hold a
                    // placeholder for: not converged.
                    None => return None,
                };
                if neighbor_router == self.source_ip {
                    continue;
                }
                if let Some(excluded) = exclude_ip {
                    if reach.neighbor_ip() == Some(excluded) || reach.local_ip() == Some(excluded)
                    {
                        debug!("[{}] CSPF skipping {} (excluded)", dev.hostname, neighbor_router);
                        continue;
                    }
                }
                if !system_distance.contains_key(&neighbor_router) {
                    return None;
                }
                let new_distance = node_distance.saturating_add(reach.metric);
                if new_distance < system_distance[&neighbor_router] {
                    system_distance.insert(neighbor_router, new_distance);
                    prev_system.insert(neighbor_router, Some(node));
                }
            }

            for reach in lsp.addresses() {
                if !reach.up {
                    continue;
                }
                if let Some(excluded) = exclude_ip {
                    if reach.prefix.contains(&excluded) {
                        continue;
                    }
                }
                let new_distance = node_distance.saturating_add(reach.metric);
                let better =
                    address_distance.get(&reach.prefix).map_or(true, |d| *d > new_distance);
                if better {
                    address_distance.insert(reach.prefix, new_distance);
                    address_prev.insert(reach.prefix, node);
                }
            }
        }

        // Reconstruct the router-id path to the destination, source first.
        if !prev_system.contains_key(&dest_ip) {
            return None;
        }
        let mut path: Vec<Ipv4Addr> = Vec::new();
        let mut cursor = prev_system.get(&dest_ip).copied().flatten();
        while let Some(current) = cursor {
            if current != self.source_ip {
                path.push(current);
            }
            cursor = prev_system.get(&current).copied().flatten();
        }
        path.reverse();

        // Convert router ids into the point-to-point interface addresses
        // to traverse, consulting each hop's LSP for the neighbor that
        // carries the next router id.
        let mut ero: Vec<Ipv4Addr> = Vec::new();
        let mut from_entry = self.source_ip;
        for hop in path.iter().chain(std::iter::once(&dest_ip)) {
            let from_lsp = match ted.get(&from_entry) {
                Some(lsp) => *lsp,
                None => return None,
            };
            for reach in from_lsp.neighbors() {
                let neighbor_router =
                    database.get(&reach.system_id).and_then(|entry| entry.pdu.router_id());
                if neighbor_router == Some(*hop) {
                    if let Some(target) = reach.neighbor_ip() {
                        debug!(
                            "[{}] to reach {}, assuming address is {}",
                            dev.hostname, hop, target
                        );
                        ero.push(target);
                    }
                }
            }
            from_entry = *hop;
        }
        Some(ero)
    }

    /// Dispatches a received RSVP packet.
    pub(crate) fn process_packet(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        packet: Ipv4Packet,
    ) {
        let message = match &packet.payload {
            IpPayload::Rsvp(message) => message.clone(),
            _ => return,
        };
        match message {
            RsvpMessage::Path(path) => self.process_path(dev, ctx, iface, &packet, path),
            RsvpMessage::Resv(resv) => {
                if let Err(err) = self.process_resv(dev, ctx, iface, resv) {
                    error!("[{}] {}", dev.hostname, err);
                }
            }
        }
    }

    /// Handles a Path message: answer with a Resv at the egress, or record
    /// path state, consume our ERO entry and forward it downstream.
    fn process_path(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        packet: &Ipv4Packet,
        mut path: PathMsg,
    ) {
        info!(
            "[{}] received RSVP Path on {} for {}, hop={:?}",
            dev.hostname, iface, path.attributes.name, path.hop
        );
        let our_address = dev.logical(iface).and_then(|l| l.address());

        if packet.dst == self.source_ip {
            // The tunnel terminates here: reserve with the implicit-null
            // label so the penultimate hop pops.
            let previous_hop = match path.hop {
                Some(hop) => hop,
                None => return,
            };
            let our_address = match our_address {
                Some(address) => address,
                None => return,
            };
            let mut resv = ResvMsg::new(
                path.session.clone(),
                FilterSpec { address: path.sender.address, lsp_id: path.sender.lsp_id },
            );
            resv.label = Some(IMPLICIT_NULL);
            resv.hop = Some(our_address);
            info!(
                "[{}] issuing RSVP Resv to {} from {}",
                dev.hostname, previous_hop, our_address
            );
            let reply = Ipv4Packet::new(
                our_address,
                previous_hop,
                IpProtocol::Rsvp,
                IpPayload::Rsvp(RsvpMessage::Resv(resv)),
            );
            dev.send_ip(ctx, reply, None);
            return;
        }

        if self.path_state.contains_key(&path.key()) {
            info!("[{}] already have path state for {:?}", dev.hostname, path.key());
        }
        self.path_state.insert(
            path.key(),
            PathStateBlock {
                hop: path.hop.unwrap_or(Ipv4Addr::UNSPECIFIED),
                sender: path.sender.clone(),
                session: path.session.clone(),
                attributes: path.attributes.clone(),
                label: None,
                kind: PsbKind::Standard,
                bypassed: None,
                route: None,
            },
        );

        if path.explicit_route.is_empty() {
            warn!("[{}] Path arrived with an empty ERO", dev.hostname);
            return;
        }
        let head = path.explicit_route.remove(0);
        if our_address != Some(head) {
            error!("[{}] {}", dev.hostname, DeviceError::EroMismatch(head));
            return;
        }

        let target = path.explicit_route.first().copied().unwrap_or(packet.dst);
        let route = match dev.routing.lookup_ip(target) {
            Some(route) => route,
            None => {
                warn!("[{}] no route toward {}", dev.hostname, target);
                return;
            }
        };
        let out_iface = match route.interface {
            Some(iface) => iface,
            None => return,
        };
        let out_address = match dev.logical(&out_iface).and_then(|l| l.address()) {
            Some(address) => address,
            None => return,
        };
        path.hop = Some(out_address);
        path.record_route.push(out_address);

        dev.publish(
            ctx,
            SimEvent::new(EventKind::Rsvp, "rsvp", "Processed Path message")
                .sub(SubKind::Rsvp(RsvpSub::ProcessPath)),
        );

        let mut forwarded = packet.clone();
        forwarded.payload = IpPayload::Rsvp(RsvpMessage::Path(path));
        dev.send_ip_toward(ctx, forwarded, target);
    }

    /// Handles a Resv message: record reservation state, install the label
    /// route (ingress or transit), forward the rewritten Resv upstream,
    /// and arm local repair when the session asked for it.
    fn process_resv(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        mut resv: ResvMsg,
    ) -> Result<(), DeviceError> {
        let downstream_hop = match resv.hop {
            Some(hop) => hop,
            None => return Ok(()),
        };
        let rsb_key = resv.key();
        self.resv_state.entry(rsb_key).or_insert_with(|| ResvStateBlock {
            resv: resv.clone(),
            session: resv.session.clone(),
            hop: downstream_hop,
        });

        dev.publish(
            ctx,
            SimEvent::new(EventKind::Rsvp, "rsvp", "Processed Resv message")
                .sub(SubKind::Rsvp(RsvpSub::ProcessResv)),
        );

        let psb_key = match self.path_state.iter().find(|(_, psb)| {
            psb.session.dest_ip == resv.session.dest_ip
                && psb.session.tunnel_id == resv.session.tunnel_id
                && psb.sender.address == resv.filter.address
                && psb.sender.lsp_id == resv.filter.lsp_id
        }) {
            Some((key, _)) => *key,
            None => {
                info!("[{}] received Resv with no corresponding PSB", dev.hostname);
                return Ok(());
            }
        };
        let label = match resv.label {
            Some(label) => label,
            None => return Ok(()),
        };

        let (psb_hop, psb_kind, psb_bypassed, psb_name, psb_dest, local_repair) = {
            let psb = self.path_state.get_mut(&psb_key).expect("found above");
            psb.label = Some(label);
            (
                psb.hop,
                psb.kind,
                psb.bypassed,
                psb.attributes.name.clone(),
                psb.session.dest_ip,
                psb.attributes.local_repair,
            )
        };
        debug!(
            "[{}] received RSVP Resv on {} for {}, hop={}",
            dev.hostname, iface, psb_name, downstream_hop
        );

        // The route toward the previous hop tells us which interface the
        // rewritten Resv leaves on.
        let upstream_route = match dev.routing.lookup_ip(psb_hop) {
            Some(route) => route,
            None => {
                warn!("[{}] no route toward previous hop {}", dev.hostname, psb_hop);
                return Ok(());
            }
        };
        let upstream_iface = match upstream_route.interface {
            Some(iface) => iface,
            None => return Ok(()),
        };
        let our_ip = match dev.logical(&upstream_iface).and_then(|l| l.address()) {
            Some(address) => address,
            None => return Ok(()),
        };
        if let Some(address) = dev.logical(iface).and_then(|l| l.address()) {
            resv.record_route.push(address);
        }

        if resv.filter.address == self.source_ip {
            // Our own request made it back: install the ingress route.
            debug!("[{}] this was our request", dev.hostname);
            let metric = if psb_kind == PsbKind::Standard {
                RouteKind::Rsvp.preference()
            } else {
                RouteKind::Rsvp.preference() + 1
            };
            let prefix = Ipv4Net::new(psb_dest, 32).expect("/32 is always valid");
            let mut new_route = Route::rsvp_ingress(
                prefix,
                iface.to_string(),
                downstream_hop,
                psb_name.clone(),
                LabelOp::Push(label),
                metric,
            );
            if psb_kind == PsbKind::Bypass {
                self.attach_existing_bypasses(&mut new_route);
            }
            if let Some(psb) = self.path_state.get_mut(&psb_key) {
                psb.route = Some(new_route.clone());
            }
            match psb_kind {
                PsbKind::Standard => {
                    dev.add_route(ctx, new_route, TableId::Rsvp, Some("rsvp"));
                }
                PsbKind::Bypass => {
                    // Attach the fresh bypass to every route that points at
                    // the protected next hop. Linear scans are fine at
                    // simulator scale.
                    let protected = psb_bypassed;
                    let mut attached = 0usize;
                    for table in [TableId::Rsvp, TableId::Mpls].iter() {
                        dev.routing.for_each_route_mut(*table, |route| {
                            if route.next_hop.is_some() && route.next_hop == protected {
                                route.bypass = Some(Box::new(new_route.clone()));
                                attached += 1;
                            }
                        });
                    }
                    if attached > 0 {
                        dev.publish(
                            ctx,
                            SimEvent::new(
                                EventKind::Rsvp,
                                "rsvp",
                                format!("Added bypass to {} protected route(s)", attached),
                            )
                            .sub(SubKind::Rsvp(RsvpSub::BypassInstalled)),
                        );
                    }
                }
            }
        } else {
            // Transit: allocate our label, install the swap (or pop, when
            // downstream signaled implicit null) and pass the Resv on.
            if our_ip == psb_hop {
                return Err(DeviceError::RoutingLoop(psb_hop));
            }
            let action =
                if label == IMPLICIT_NULL { LabelOp::Pop } else { LabelOp::Swap(label) };
            let next_label = self.current_label;
            self.current_label += 10;
            let mut transit_route = Route::rsvp_transit(
                next_label,
                iface.to_string(),
                downstream_hop,
                psb_name.clone(),
                action,
            );
            self.attach_existing_bypasses(&mut transit_route);
            dev.add_route(ctx, transit_route, TableId::Mpls, Some("rsvp"));
            dev.publish(
                ctx,
                SimEvent::new(
                    EventKind::Rsvp,
                    "rsvp",
                    format!("Reserved new label {}", next_label),
                )
                .sub(SubKind::Rsvp(RsvpSub::LabelReserved)),
            );

            resv.label = Some(next_label);
            resv.hop = Some(our_ip);
            debug!(
                "[{}] forwarding Resv via {} to {} for {}",
                dev.hostname, upstream_iface, psb_hop, psb_name
            );
            let forwarded = Ipv4Packet::new(
                our_ip,
                psb_hop,
                IpProtocol::Rsvp,
                IpPayload::Rsvp(RsvpMessage::Resv(resv)),
            );
            dev.send_ip_toward(ctx, forwarded, psb_hop);
        }

        // When the ingress requested local repair, protect the interface
        // toward the downstream hop with a bypass LSP. The bypass guards
        // the interface, so one bypass can protect many LSPs.
        if local_repair {
            if dev.owns_address(downstream_hop) {
                return Ok(());
            }
            ctx.sched.enqueue(
                0,
                Job::RsvpCreateBypass {
                    device: dev.id,
                    iface: upstream_iface,
                    protected_ip: downstream_hop,
                },
            );
        }
        Ok(())
    }

    /// Attaches the route of an existing bypass PSB to a freshly installed
    /// route whose next hop that bypass protects.
    fn attach_existing_bypasses(&self, route: &mut Route) {
        for psb in self.path_state.values() {
            if route.next_hop.is_some() && route.next_hop == psb.bypassed {
                if let Some(bypass_route) = &psb.route {
                    route.bypass = Some(Box::new(bypass_route.clone()));
                }
            }
        }
    }

    /// Creates a bypass LSP around `protected_ip`: the destination is the
    /// router-id of the router owning that address, and the constrained
    /// path excludes the address itself.
    pub(crate) fn create_bypass_lsp(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        protected_iface: &str,
        protected_ip: Ipv4Addr,
    ) {
        info!(
            "[{}] creating bypass session to {} (upstream {})",
            dev.hostname, protected_ip, protected_iface
        );
        let router_id = dev.isis().and_then(|isis| {
            isis.database().values().find_map(|entry| {
                entry
                    .pdu
                    .neighbors()
                    .any(|reach| reach.local_ip() == Some(protected_ip))
                    .then(|| entry.pdu.router_id())
                    .flatten()
            })
        });
        let router_id = match router_id {
            Some(id) => id,
            None => {
                warn!(
                    "[{}] unable to create bypass for {}, unable to find router",
                    dev.hostname, protected_ip
                );
                return;
            }
        };
        let name = format!("Bypass->{} ({})", protected_ip, dev.hostname);
        // The bypass itself does not request link protection; protecting
        // the protection path would recurse.
        self.create_session(dev, ctx, router_id, name, false, Some(protected_ip));
    }
}
