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

//! Module defining frames and packets. Everything here is plain data: a
//! frame is deep-copied when it is put on a link, so payloads carry no
//! shared mutable state.

use crate::isis::pdu::IsisPdu;
use crate::mpls::MplsPacket;
use crate::rsvp::pdu::RsvpMessage;
use std::fmt;
use std::net::Ipv4Addr;

/// A 48-bit hardware address.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The all-ones broadcast address.
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// Builds an address from the simulator OUI `42:00:00` and a random
    /// device-specific suffix.
    pub fn from_suffix(suffix: [u8; 3]) -> Self {
        MacAddr([0x42, 0x00, 0x00, suffix[0], suffix[1], suffix[2]])
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Ethertype of a frame. CLNS is a fudge: OSI packets really ride in LLC
/// frames, but this simulator does not go down to that level of detail.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum FrameType {
    /// OSI connectionless-mode traffic (IS-IS PDUs).
    Clns,
    /// IPv4.
    Ipv4,
    /// Address resolution.
    Arp,
    /// MPLS unicast.
    MplsUnicast,
    /// MPLS multicast. Present for completeness; nothing emits it.
    MplsMulticast,
}

impl FrameType {
    /// The ethertype value on the wire.
    pub fn value(&self) -> u16 {
        match self {
            FrameType::Clns => 0x001,
            FrameType::Ipv4 => 0x0800,
            FrameType::Arp => 0x0806,
            FrameType::MplsUnicast => 0x8847,
            FrameType::MplsMulticast => 0x8848,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameType::Clns => "CLNS",
            FrameType::Ipv4 => "IPV4",
            FrameType::Arp => "ARP",
            FrameType::MplsUnicast => "MPLSU",
            FrameType::MplsMulticast => "MPLSM",
        };
        f.write_str(name)
    }
}

/// Payload of a frame, tagged by protocol.
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// An IPv4 packet.
    Ipv4(Ipv4Packet),
    /// An MPLS packet with its label stack.
    Mpls(MplsPacket),
    /// An ARP request or reply.
    Arp(ArpPacket),
    /// An IS-IS PDU.
    Clns(IsisPdu),
}

/// A layer-2 frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Source hardware address.
    pub src: MacAddr,
    /// Destination hardware address.
    pub dest: MacAddr,
    /// The encapsulated protocol data.
    pub payload: FramePayload,
}

impl Frame {
    /// Builds a frame around the given payload.
    pub fn new(src: MacAddr, dest: MacAddr, payload: FramePayload) -> Self {
        Frame { src, dest, payload }
    }

    /// The ethertype implied by the payload.
    pub fn frame_type(&self) -> FrameType {
        match self.payload {
            FramePayload::Ipv4(_) => FrameType::Ipv4,
            FramePayload::Mpls(_) => FrameType::MplsUnicast,
            FramePayload::Arp(_) => FrameType::Arp,
            FramePayload::Clns(_) => FrameType::Clns,
        }
    }
}

/// IP protocol numbers used by the simulator.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum IpProtocol {
    /// ICMP (1).
    Icmp,
    /// TCP (6).
    Tcp,
    /// UDP (17).
    Udp,
    /// RSVP (46).
    Rsvp,
}

/// An IPv4 packet.
#[derive(Debug, Clone)]
pub struct Ipv4Packet {
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
    /// Carried protocol.
    pub protocol: IpProtocol,
    /// Time to live, decremented by every forwarding hop.
    pub ttl: u8,
    /// The router-alert IP option: an intermediate router that supports the
    /// carried protocol handles the packet instead of forwarding it.
    pub router_alert: bool,
    /// The transported message.
    pub payload: IpPayload,
}

impl Ipv4Packet {
    /// Builds a packet with the default TTL of 64 and no router alert.
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, protocol: IpProtocol, payload: IpPayload) -> Self {
        Ipv4Packet { src, dst, protocol, ttl: 64, router_alert: false, payload }
    }

    /// True if an intermediate router should hand this packet to its
    /// control plane rather than forward it.
    pub fn inspectable(&self) -> bool {
        self.router_alert
    }
}

impl fmt::Display for Ipv4Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} (TTL={}) {:?}", self.src, self.dst, self.ttl, self.protocol)
    }
}

/// Transported message of an IPv4 packet.
#[derive(Debug, Clone)]
pub enum IpPayload {
    /// An ICMP message.
    Icmp(IcmpMessage),
    /// An RSVP message.
    Rsvp(RsvpMessage),
}

/// Distinguishes the flavors of ICMP destination-unreachable.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum UnreachableKind {
    /// No route to the destination network.
    Network,
    /// The destination network is known but the host is not.
    Host,
}

/// An ICMP message. Unreachables quote the rejected packet the way the real
/// protocol quotes its first eight bytes: addresses plus the echo id, which
/// is what the ping driver needs to correlate.
#[derive(Debug, Clone)]
pub enum IcmpMessage {
    /// Echo request carrying the ping id and the virtual send time.
    EchoRequest {
        /// Ping correlation id.
        id: u64,
        /// Virtual time at which the request was sent.
        sent_at: u64,
    },
    /// Echo reply, mirroring the request payload.
    EchoReply {
        /// Ping correlation id copied from the request.
        id: u64,
        /// Virtual send time copied from the request.
        sent_at: u64,
    },
    /// Destination unreachable.
    Unreachable {
        /// Unreachable flavor.
        code: UnreachableKind,
        /// Destination of the rejected packet.
        original_dst: Ipv4Addr,
        /// Source of the rejected packet.
        original_src: Ipv4Addr,
        /// Echo id of the rejected packet, when it carried an echo request.
        original_echo_id: Option<u64>,
    },
}

impl fmt::Display for IcmpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IcmpMessage::EchoRequest { id, .. } => write!(f, "EchoRequest({})", id),
            IcmpMessage::EchoReply { id, .. } => write!(f, "EchoReply({})", id),
            IcmpMessage::Unreachable { code, original_dst, .. } => {
                write!(f, "DestinationUnreachable({:?}, {})", code, original_dst)
            }
        }
    }
}

/// ARP operation.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ArpOp {
    /// Who-has.
    Request,
    /// Is-at.
    Reply,
}

/// An ARP packet (RFC 826, reduced to the fields the simulator uses).
#[derive(Debug, Clone)]
pub struct ArpPacket {
    /// Operation.
    pub op: ArpOp,
    /// Sender hardware address.
    pub sender_hw: MacAddr,
    /// Sender protocol address.
    pub sender_ip: Ipv4Addr,
    /// Target hardware address; unknown on requests.
    pub target_hw: Option<MacAddr>,
    /// Target protocol address.
    pub target_ip: Ipv4Addr,
}
