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

//! Module defining MPLS packets and label-stack operations (RFC 3031).

use crate::packet::Ipv4Packet;
use std::fmt;

/// The reserved implicit-null label: the penultimate hop pops the stack
/// instead of swapping, and the egress receives the bare payload.
pub const IMPLICIT_NULL: u32 = 3;

/// An MPLS packet: a label stack wrapped around an IPv4 packet. The top of
/// the stack is the last element.
#[derive(Debug, Clone)]
pub struct MplsPacket {
    /// The label stack; `last()` is the top.
    pub labels: Vec<u32>,
    /// Time to live (RFC 3031 §3.23).
    pub ttl: u8,
    /// The encapsulated packet.
    pub inner: Ipv4Packet,
}

impl MplsPacket {
    /// Encapsulates an IPv4 packet with an empty label stack, inheriting
    /// its TTL.
    pub fn encapsulate(inner: Ipv4Packet) -> Self {
        let ttl = inner.ttl;
        MplsPacket { labels: Vec::new(), ttl, inner }
    }

    /// The label at the top of the stack.
    pub fn top_label(&self) -> Option<u32> {
        self.labels.last().copied()
    }
}

impl fmt::Display for MplsPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.labels.iter().map(|l| l.to_string()).collect();
        write!(f, "MPLS (labels={})", labels.join(","))
    }
}

/// A packet as seen by the forwarding engine while label operations are
/// applied: either still labeled, or back to plain IPv4 after the last pop.
#[derive(Debug, Clone)]
pub enum Forwarded {
    /// A plain IPv4 packet.
    Ip(Ipv4Packet),
    /// A labeled packet.
    Mpls(MplsPacket),
}

/// A label-stack operation attached to a forwarding entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelOp {
    /// Push a label, encapsulating the packet first if it is plain IPv4.
    Push(u32),
    /// Replace the top label.
    Swap(u32),
    /// Remove the top label; popping the last label yields the inner
    /// IPv4 packet.
    Pop,
    /// Apply the contained operations in order. Produced by the FIB when a
    /// primary action is composed with a bypass action.
    Combined(Vec<LabelOp>),
}

impl LabelOp {
    /// The label this operation introduces, if any. Used when rendering
    /// label chains.
    pub fn new_label(&self) -> Option<u32> {
        match self {
            LabelOp::Push(label) | LabelOp::Swap(label) => Some(*label),
            LabelOp::Pop => None,
            LabelOp::Combined(ops) => ops.iter().rev().find_map(|op| op.new_label()),
        }
    }

    /// Applies the operation, returning the rewritten packet and the
    /// record of the elementary steps taken (for event reporting).
    pub fn apply(&self, packet: Forwarded) -> (Forwarded, Vec<LabelStep>) {
        let mut steps = Vec::new();
        let out = self.apply_inner(packet, &mut steps);
        (out, steps)
    }

    fn apply_inner(&self, packet: Forwarded, steps: &mut Vec<LabelStep>) -> Forwarded {
        match self {
            LabelOp::Push(label) => {
                let mut mpls = match packet {
                    Forwarded::Ip(ip) => MplsPacket::encapsulate(ip),
                    Forwarded::Mpls(mpls) => mpls,
                };
                mpls.labels.push(*label);
                steps.push(LabelStep::Pushed(*label));
                Forwarded::Mpls(mpls)
            }
            LabelOp::Swap(label) => match packet {
                Forwarded::Mpls(mut mpls) => {
                    let old = mpls.labels.pop();
                    mpls.labels.push(*label);
                    steps.push(LabelStep::Swapped { old, new: *label });
                    Forwarded::Mpls(mpls)
                }
                Forwarded::Ip(ip) => {
                    // Swapping an unlabeled packet degenerates to a push.
                    let mut mpls = MplsPacket::encapsulate(ip);
                    mpls.labels.push(*label);
                    steps.push(LabelStep::Swapped { old: None, new: *label });
                    Forwarded::Mpls(mpls)
                }
            },
            LabelOp::Pop => match packet {
                Forwarded::Mpls(mut mpls) => {
                    if let Some(old) = mpls.labels.pop() {
                        steps.push(LabelStep::Popped(old));
                    }
                    if mpls.labels.is_empty() {
                        Forwarded::Ip(mpls.inner)
                    } else {
                        Forwarded::Mpls(mpls)
                    }
                }
                ip @ Forwarded::Ip(_) => ip,
            },
            LabelOp::Combined(ops) => {
                let mut packet = packet;
                for op in ops {
                    packet = op.apply_inner(packet, steps);
                }
                packet
            }
        }
    }
}

impl fmt::Display for LabelOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelOp::Push(label) => write!(f, "Push {}", label),
            LabelOp::Swap(label) => write!(f, "Swap in {}", label),
            LabelOp::Pop => f.write_str("Pop"),
            LabelOp::Combined(ops) => {
                let parts: Vec<String> = ops.iter().map(|op| op.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// One elementary label-stack mutation, reported as an `Mpls` event.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelStep {
    /// A label was pushed.
    Pushed(u32),
    /// The top label was replaced.
    Swapped {
        /// The label that was removed, if the stack was non-empty.
        old: Option<u32>,
        /// The label that took its place.
        new: u32,
    },
    /// The top label was removed.
    Popped(u32),
}
