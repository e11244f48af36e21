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

//! IS-IS PDUs and TLVs as tagged variants. Only the TLVs this simulator
//! exchanges are modeled; the numeric codes are the real ones for
//! reference (RFC 1195, RFC 5305, RFC 5301).

use crate::types::SystemId;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;

/// Adjacency state of a neighbor, carried in the P2P adjacency TLV.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum AdjState {
    /// Just observed, nothing confirmed.
    New,
    /// We have seen the neighbor, it has not yet seen us.
    Initializing,
    /// Two-way adjacency established.
    Up,
    /// The interface underneath went away.
    Down,
}

impl fmt::Display for AdjState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdjState::New => "NEW",
            AdjState::Initializing => "Initializing",
            AdjState::Up => "UP",
            AdjState::Down => "DOWN",
        };
        f.write_str(name)
    }
}

/// Sub-TLVs of extended IS reachability (TLV 22).
#[derive(Debug, Clone, PartialEq)]
pub enum SubTlv {
    /// Our interface address on the shared link (sub-TLV 6), with its
    /// operational state.
    IpInterfaceAddress {
        /// The interface address.
        address: Ipv4Addr,
        /// Whether the interface was up when advertised.
        up: bool,
    },
    /// The neighbor's interface address on the shared link (sub-TLV 8).
    NeighborIpAddress(Ipv4Addr),
}

/// Extended IS reachability (TLV 22): one adjacent system with its metric
/// and addressing sub-TLVs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtIsReach {
    /// The adjacent system.
    pub system_id: SystemId,
    /// Link metric.
    pub metric: u32,
    /// Addressing sub-TLVs.
    pub subs: Vec<SubTlv>,
}

impl ExtIsReach {
    /// Our address on the link toward this neighbor.
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.subs.iter().find_map(|sub| match sub {
            SubTlv::IpInterfaceAddress { address, .. } => Some(*address),
            _ => None,
        })
    }

    /// The neighbor's address on the shared link.
    pub fn neighbor_ip(&self) -> Option<Ipv4Addr> {
        self.subs.iter().find_map(|sub| match sub {
            SubTlv::NeighborIpAddress(address) => Some(*address),
            _ => None,
        })
    }
}

/// Extended IP reachability (TLV 135): one routable prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtIpReach {
    /// The advertised prefix.
    pub prefix: Ipv4Net,
    /// Prefix metric.
    pub metric: u32,
    /// Whether the advertising interface was up.
    pub up: bool,
}

/// An LSP entry inside a CSNP or PSNP (TLV 9).
#[derive(Debug, Clone, PartialEq)]
pub struct LspEntry {
    /// The summarized LSP.
    pub lsp_id: SystemId,
    /// Its sequence number.
    pub seq_no: u32,
    /// Its remaining lifetime.
    pub remaining_lifetime: u32,
    /// Hostname hint for rendering, when known.
    pub hostname: Option<String>,
}

/// The TLVs carried by hellos and link-state PDUs.
#[derive(Debug, Clone, PartialEq)]
pub enum Tlv {
    /// Area address (TLV 1).
    AreaAddress(String),
    /// Interface address of the sending circuit (TLV 132).
    IpAddress(Ipv4Addr),
    /// Point-to-point adjacency state (TLV 240).
    P2pAdjacency {
        /// The system the sender has an adjacency with.
        system_id: SystemId,
        /// The sender's view of that adjacency.
        state: AdjState,
    },
    /// Dynamic hostname (TLV 137).
    DynamicHostname(String),
    /// Traffic-engineering router id (TLV 134), the loopback address.
    TeRouterId(Ipv4Addr),
    /// Extended IS reachability (TLV 22).
    ExtIsReach(ExtIsReach),
    /// Extended IP reachability (TLV 135).
    ExtIpReach(ExtIpReach),
}

/// A point-to-point hello.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloPdu {
    /// Sending system.
    pub source: SystemId,
    /// Hello TLVs: area, interface address, adjacency states.
    pub tlvs: Vec<Tlv>,
}

/// A complete or partial sequence-numbers PDU: the sender's summary of
/// (part of) its link-state database.
#[derive(Debug, Clone, PartialEq)]
pub struct SnpPdu {
    /// Sending system.
    pub source: SystemId,
    /// Summarized LSPs, sorted by LSP id.
    pub entries: Vec<LspEntry>,
}

/// A link-state PDU. The simulator generates a single fragment per system,
/// so `lsp_id` coincides with the source system id.
#[derive(Debug, Clone, PartialEq)]
pub struct LspPdu {
    /// Originating system.
    pub source: SystemId,
    /// LSP identifier.
    pub lsp_id: SystemId,
    /// Sequence number; zero marks a placeholder that was only summarized.
    pub seq_no: u32,
    /// The advertised TLVs.
    pub tlvs: Vec<Tlv>,
}

impl LspPdu {
    /// A content-less placeholder created when a CSNP mentions an LSP we
    /// have never seen.
    pub fn placeholder(lsp_id: SystemId) -> Self {
        LspPdu { source: lsp_id.clone(), lsp_id, seq_no: 0, tlvs: Vec::new() }
    }

    /// The advertised adjacencies.
    pub fn neighbors(&self) -> impl Iterator<Item = &ExtIsReach> {
        self.tlvs.iter().filter_map(|tlv| match tlv {
            Tlv::ExtIsReach(reach) => Some(reach),
            _ => None,
        })
    }

    /// The advertised prefixes.
    pub fn addresses(&self) -> impl Iterator<Item = &ExtIpReach> {
        self.tlvs.iter().filter_map(|tlv| match tlv {
            Tlv::ExtIpReach(reach) => Some(reach),
            _ => None,
        })
    }

    /// The advertised hostname.
    pub fn hostname(&self) -> Option<&str> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            Tlv::DynamicHostname(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The traffic-engineering router id.
    pub fn router_id(&self) -> Option<Ipv4Addr> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            Tlv::TeRouterId(address) => Some(*address),
            _ => None,
        })
    }

    /// Drops the reachability TLV naming `system_id`. Returns true when
    /// one was removed.
    pub fn remove_neighbor(&mut self, system_id: &SystemId) -> bool {
        let before = self.tlvs.len();
        self.tlvs.retain(|tlv| match tlv {
            Tlv::ExtIsReach(reach) => &reach.system_id != system_id,
            _ => true,
        });
        self.tlvs.len() < before
    }
}

impl fmt::Display for LspPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hostname() {
            Some(name) => write!(f, "LSP {}({}).00,seq={}", name, self.lsp_id, self.seq_no),
            None => write!(f, "LSP {}.00,seq={}", self.lsp_id, self.seq_no),
        }
    }
}

/// Any IS-IS PDU, as carried in a CLNS frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IsisPdu {
    /// Point-to-point hello.
    Hello(HelloPdu),
    /// Complete sequence-numbers PDU.
    Csnp(SnpPdu),
    /// Partial sequence-numbers PDU.
    Psnp(SnpPdu),
    /// Link-state PDU.
    Lsp(LspPdu),
}

impl fmt::Display for IsisPdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsisPdu::Hello(pdu) => write!(f, "p2p Hello (source={})", pdu.source),
            IsisPdu::Csnp(pdu) => write!(f, "L1 CSNP (source={})", pdu.source),
            IsisPdu::Psnp(pdu) => write!(f, "L1 PSNP (source={})", pdu.source),
            IsisPdu::Lsp(pdu) => pdu.fmt(f),
        }
    }
}
