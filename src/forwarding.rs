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

//! Module implementing the packet forwarding engine: the lookup surface
//! over the derived FIB, and the dispatch of IPv4 and MPLS frames through
//! it. The control plane only ever sees packets the engine hands up via
//! `CONTROL` entries or the router-alert option.

use crate::device::{Device, SimCtx};
use crate::event::{
    EventKind, EventObject, MplsSub, SendSub, SimEvent, SubKind,
};
use crate::mpls::{Forwarded, LabelOp, LabelStep, MplsPacket, IMPLICIT_NULL};
use crate::packet::{
    Frame, FramePayload, IcmpMessage, IpPayload, IpProtocol, Ipv4Packet, MacAddr, UnreachableKind,
};
use crate::routing::{Fib, FibEntry, RouteAction};
use crate::types::DeviceError;
use log::*;
use std::net::Ipv4Addr;

/// The forwarding-table surface consumed by the data plane. Opaque to
/// everything else except as a lookup interface; it is replaced wholesale
/// on every rebuild.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    fib: Fib,
}

impl ForwardingTable {
    /// Creates an empty table (everything misses until the first rebuild).
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a freshly derived FIB.
    pub(crate) fn set_fib(&mut self, fib: Fib) {
        self.fib = fib;
    }

    /// The installed FIB.
    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    /// Longest-prefix-match lookup of an IPv4 destination.
    pub fn lookup_ip(&self, address: Ipv4Addr) -> Option<&FibEntry> {
        self.fib.lookup_ip(address)
    }

    /// Exact-match lookup of an MPLS label.
    pub fn lookup_label(&self, label: u32) -> Option<&FibEntry> {
        self.fib.lookup_label(label)
    }
}

impl Device {
    /// Ingress from the local control plane: the frame is observed as a
    /// local send and then processed with `from_self` set.
    pub(crate) fn pfe_accept_frame(
        &mut self,
        ctx: &mut SimCtx<'_>,
        frame: Frame,
        dest_iface: Option<String>,
    ) {
        let event = SimEvent::new(
            EventKind::PacketSend,
            self.hostname.clone(),
            format!("PFE Sending {}", frame.frame_type()),
        )
        .sub(SubKind::Send(SendSub::Local))
        .object(EventObject::FrameOut(frame.clone()));
        self.publish(ctx, event);
        if let Err(err) = self.pfe_process_frame(ctx, frame, None, true, dest_iface) {
            error!("[{}] {}", self.hostname, err);
        }
    }

    /// Dispatches a frame by its type: IPv4 and MPLS flow through the FIB,
    /// ARP goes to the resolver, CLNS to the IS-IS process.
    pub(crate) fn pfe_process_frame(
        &mut self,
        ctx: &mut SimCtx<'_>,
        frame: Frame,
        source_iface: Option<&str>,
        from_self: bool,
        dest_iface: Option<String>,
    ) -> Result<(), DeviceError> {
        match frame.payload {
            FramePayload::Ipv4(packet) => {
                self.pfe_process_ip(ctx, packet, source_iface, from_self, dest_iface)
            }
            FramePayload::Mpls(packet) => self.pfe_process_mpls(ctx, packet, source_iface),
            FramePayload::Arp(packet) => {
                if let Some(mut arp) = self.arp.take() {
                    arp.process(self, ctx, source_iface.unwrap_or(""), packet);
                    self.arp = Some(arp);
                }
                Ok(())
            }
            FramePayload::Clns(pdu) => {
                let iface = source_iface.unwrap_or("").to_string();
                self.with_isis(ctx, |isis, dev, ctx| isis.process_pdu(dev, ctx, &iface, pdu));
                Ok(())
            }
        }
    }

    fn pfe_process_ip(
        &mut self,
        ctx: &mut SimCtx<'_>,
        mut packet: Ipv4Packet,
        source_iface: Option<&str>,
        from_self: bool,
        dest_iface: Option<String>,
    ) -> Result<(), DeviceError> {
        if packet.inspectable() && !from_self {
            self.process_packet(ctx, source_iface, packet);
            return Ok(());
        }

        let entry = match self.forwarding.as_ref().and_then(|fw| fw.lookup_ip(packet.dst)) {
            Some(entry) => entry.clone(),
            None => {
                warn!("[{}] no forwarding entry for {}", self.hostname, packet.dst);
                if !from_self {
                    self.send_unreachable(ctx, &packet, source_iface);
                }
                return Ok(());
            }
        };
        self.publish(
            ctx,
            SimEvent::new(
                EventKind::Forwarding,
                self.hostname.clone(),
                format!("Identified forwarding entry for {}", packet.dst),
            ),
        );
        packet.ttl = packet.ttl.saturating_sub(1);
        debug!("[{}] will apply action {}", self.hostname, entry.action);

        match entry.action {
            RouteAction::Label(op) => {
                let iface = match entry.interface {
                    Some(iface) => iface,
                    None => return Ok(()),
                };
                match self.apply_label_op(ctx, &op, Forwarded::Ip(packet)) {
                    Forwarded::Mpls(mpls) => {
                        self.send_frame_on_logical(
                            ctx,
                            &iface,
                            MacAddr::BROADCAST,
                            FramePayload::Mpls(mpls),
                        );
                    }
                    Forwarded::Ip(_) => {
                        warn!("[{}] label operation did not produce an MPLS packet", self.hostname)
                    }
                }
                Ok(())
            }
            RouteAction::Forward => {
                let iface = match dest_iface.or(entry.interface) {
                    Some(iface) => iface,
                    None => return Ok(()),
                };
                let next_hop = self.resolve_next_hop(entry.next_hop, packet.dst, &iface)?;
                self.send_resolved(ctx, next_hop, packet, &iface);
                Ok(())
            }
            RouteAction::Control => {
                if from_self {
                    return Err(DeviceError::FrameFromSelf);
                }
                self.process_packet(ctx, source_iface, packet);
                Ok(())
            }
            RouteAction::Reject => {
                if !from_self {
                    self.send_unreachable(ctx, &packet, source_iface);
                }
                Ok(())
            }
        }
    }

    fn pfe_process_mpls(
        &mut self,
        ctx: &mut SimCtx<'_>,
        packet: MplsPacket,
        source_iface: Option<&str>,
    ) -> Result<(), DeviceError> {
        let top = packet.top_label();
        let entry = top
            .and_then(|label| self.forwarding.as_ref().and_then(|fw| fw.lookup_label(label)))
            .cloned();
        let entry = match entry {
            Some(entry) => entry,
            None => {
                // An unknown implicit-null label still means "pop": the
                // upstream signaled a penultimate-hop pop.
                if top == Some(IMPLICIT_NULL) {
                    match self.apply_label_op(ctx, &LabelOp::Pop, Forwarded::Mpls(packet)) {
                        Forwarded::Ip(ip) => {
                            return self.pfe_process_ip(ctx, ip, source_iface, false, None);
                        }
                        Forwarded::Mpls(rest) => {
                            warn!("[{}] implicit null left labels {:?}", self.hostname, rest.labels)
                        }
                    }
                } else if let Some(label) = top {
                    error!("[{}] no action found for label {}", self.hostname, label);
                }
                return Ok(());
            }
        };
        let iface = match entry.interface.clone() {
            Some(iface) => iface,
            None => return Ok(()),
        };
        match self.apply_label_op(ctx, &entry.action_as_label_op(), Forwarded::Mpls(packet)) {
            Forwarded::Mpls(mpls) => {
                self.send_frame_on_logical(ctx, &iface, MacAddr::BROADCAST, FramePayload::Mpls(mpls));
            }
            Forwarded::Ip(ip) => {
                // The last pop exposed the payload: forward it on the
                // entry's interface toward the entry's next hop, keeping
                // the packet on the label-switched path's tail.
                let next_hop = self.resolve_next_hop(entry.next_hop, ip.dst, &iface)?;
                self.send_resolved(ctx, next_hop, ip, &iface);
            }
        }
        Ok(())
    }

    /// Applies a label operation, publishing one `Mpls` event per
    /// elementary step.
    pub(crate) fn apply_label_op(
        &mut self,
        ctx: &mut SimCtx<'_>,
        op: &LabelOp,
        packet: Forwarded,
    ) -> Forwarded {
        let (out, steps) = op.apply(packet);
        for step in steps {
            let (sub, msg, label) = match step {
                LabelStep::Pushed(label) => {
                    (MplsSub::Push, format!("Pushed {}", label), label)
                }
                LabelStep::Swapped { old, new } => (
                    MplsSub::Swap,
                    match old {
                        Some(old) => format!("Swapped {} for {}", old, new),
                        None => format!("Swapped in {}", new),
                    },
                    new,
                ),
                LabelStep::Popped(label) => {
                    (MplsSub::Pop, format!("Popped {} from MPLS label stack", label), label)
                }
            };
            let event = SimEvent::new(EventKind::Mpls, self.hostname.clone(), msg)
                .sub(SubKind::Mpls(sub))
                .object(EventObject::Label(label));
            self.publish(ctx, event);
        }
        out
    }

    /// Crafts and sends the ICMP network-unreachable for a packet the FIB
    /// rejected or missed. Unreachables themselves are never answered.
    fn send_unreachable(
        &mut self,
        ctx: &mut SimCtx<'_>,
        packet: &Ipv4Packet,
        source_iface: Option<&str>,
    ) {
        if let IpPayload::Icmp(IcmpMessage::Unreachable { .. }) = packet.payload {
            return;
        }
        let source_iface = match source_iface {
            Some(iface) => iface,
            None => return,
        };
        let our_address = match self.logical(source_iface).and_then(|l| l.address()) {
            Some(address) => address,
            None => return,
        };
        let original_echo_id = match &packet.payload {
            IpPayload::Icmp(IcmpMessage::EchoRequest { id, .. }) => Some(*id),
            _ => None,
        };
        let reply = Ipv4Packet::new(
            our_address,
            packet.src,
            IpProtocol::Icmp,
            IpPayload::Icmp(IcmpMessage::Unreachable {
                code: UnreachableKind::Network,
                original_dst: packet.dst,
                original_src: packet.src,
                original_echo_id,
            }),
        );
        self.send_ip(ctx, reply, None);
    }
}

impl FibEntry {
    /// The entry's action as a label operation; plain actions degrade to a
    /// pop so a labeled packet still sheds its label before the mismatch
    /// is noticed.
    pub(crate) fn action_as_label_op(&self) -> LabelOp {
        match &self.action {
            RouteAction::Label(op) => op.clone(),
            _ => LabelOp::Pop,
        }
    }
}
