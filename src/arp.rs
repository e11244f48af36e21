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

//! Module implementing address resolution (RFC 826) for the simulator:
//! a cache with soft lookups, request/reply handling, and a queue of
//! packets parked until their next hop resolves.

use crate::device::{Device, SimCtx};
use crate::event::{ArpSub, EventKind, SimEvent, SubKind};
use crate::packet::{ArpOp, ArpPacket, FramePayload, Ipv4Packet, MacAddr};
use log::*;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// One learned mapping.
#[derive(Debug, Clone)]
pub struct ArpEntry {
    /// The layer-3 address.
    pub l3address: Ipv4Addr,
    /// The layer-2 address it maps to.
    pub l2address: MacAddr,
    /// Virtual time of the last refresh.
    pub last_used: u64,
}

/// The ARP cache. Lookups are soft: a miss returns `None`, never an error.
#[derive(Debug, Default)]
pub struct ArpCache {
    entries: BTreeMap<Ipv4Addr, ArpEntry>,
}

impl ArpCache {
    /// Soft lookup of a hardware address.
    pub fn get(&self, address: Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(&address).map(|entry| entry.l2address)
    }

    /// Learns or refreshes a mapping. Returns true when the hardware
    /// address is new or changed.
    pub fn insert(&mut self, address: Ipv4Addr, hw: MacAddr, now: u64) -> bool {
        let changed = self.entries.get(&address).map(|e| e.l2address != hw).unwrap_or(true);
        self.entries
            .insert(address, ArpEntry { l3address: address, l2address: hw, last_used: now });
        changed
    }
}

/// The ARP handler of one device.
#[derive(Debug, Default)]
pub struct ArpHandler {
    /// The cache.
    pub cache: ArpCache,
    /// Packets parked until the keyed address resolves, with the interface
    /// to send them on.
    send_q: BTreeMap<Ipv4Addr, Vec<(Ipv4Packet, String)>>,
}

impl ArpHandler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a packet until `next_hop` resolves.
    pub(crate) fn enqueue(&mut self, next_hop: Ipv4Addr, packet: Ipv4Packet, iface: String) {
        debug!("enqueued {} waiting for ARP of {}", packet, next_hop);
        self.send_q.entry(next_hop).or_insert_with(Vec::new).push((packet, iface));
    }

    /// Handles a received ARP packet on `iface`: learn the sender mapping,
    /// answer requests addressed to us, and flush any packets that were
    /// waiting for the sender.
    pub(crate) fn process(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        packet: ArpPacket,
    ) {
        if packet.sender_ip != Ipv4Addr::UNSPECIFIED {
            let changed =
                self.cache.insert(packet.sender_ip, packet.sender_hw, ctx.sched.now());
            if changed {
                dev.publish(
                    ctx,
                    SimEvent::new(EventKind::Arp, "arp", "Added ARP Entry")
                        .sub(SubKind::Arp(ArpSub::EntryAdded)),
                );
            }
        }

        let our_address = dev.logical(iface).and_then(|l| l.address());
        if packet.op == ArpOp::Request {
            if let Some(addr) = our_address {
                if packet.target_ip == addr {
                    debug!("[{}] answering ARP request for {}", dev.hostname, addr);
                    self.reply(dev, ctx, packet.sender_hw, packet.sender_ip, addr, iface);
                }
            }
        }

        if let Some(parked) = self.send_q.remove(&packet.sender_ip) {
            debug!("[{}] sending queued items to {}", dev.hostname, packet.sender_ip);
            for (pdu, out_iface) in parked {
                dev.send_frame_on_logical(
                    ctx,
                    &out_iface,
                    packet.sender_hw,
                    FramePayload::Ipv4(pdu),
                );
            }
        }
    }

    /// Broadcasts a who-has for `target` out of `iface`.
    pub(crate) fn request(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        target: Ipv4Addr,
        iface: &str,
    ) {
        let sender_ip =
            dev.logical(iface).and_then(|l| l.address()).unwrap_or(Ipv4Addr::UNSPECIFIED);
        let sender_hw = match dev.hw_of_logical(iface) {
            Some(hw) => hw,
            None => return,
        };
        let packet = ArpPacket {
            op: ArpOp::Request,
            sender_hw,
            sender_ip,
            target_hw: None,
            target_ip: target,
        };
        dev.send_frame_on_logical(ctx, iface, MacAddr::BROADCAST, FramePayload::Arp(packet));
    }

    /// Answers a request with an is-at.
    pub(crate) fn reply(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        target_hw: MacAddr,
        target_ip: Ipv4Addr,
        from_address: Ipv4Addr,
        iface: &str,
    ) {
        let sender_hw = match dev.hw_of_logical(iface) {
            Some(hw) => hw,
            None => return,
        };
        let packet = ArpPacket {
            op: ArpOp::Reply,
            sender_hw,
            sender_ip: from_address,
            target_hw: Some(target_hw),
            target_ip,
        };
        dev.send_frame_on_logical(ctx, iface, target_hw, FramePayload::Arp(packet));
    }
}
