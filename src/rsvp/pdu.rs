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

//! RSVP-TE messages and their objects (RFC 3209), reduced to the fields
//! the simulator exchanges: Path and Resv with session, sender/filter,
//! hop, label, explicit route and record route.

use std::fmt;
use std::net::Ipv4Addr;

/// Key of a path state block: `(destination, tunnel id, LSP id)`.
pub type PsbKey = (Ipv4Addr, u32, u32);

/// Key of a reservation state block:
/// `(destination, tunnel id, filter address, filter LSP id, hop)`.
pub type RsbKey = (Ipv4Addr, u32, Ipv4Addr, u32, Ipv4Addr);

/// The RSVP session object: one tunnel between two routers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionObj {
    /// Tunnel endpoint.
    pub dest_ip: Ipv4Addr,
    /// Tunnel id, unique across the simulation.
    pub tunnel_id: u32,
    /// Tunnel head end.
    pub source_ip: Ipv4Addr,
}

/// The sender template: which LSP of the session a Path describes.
#[derive(Debug, Clone, PartialEq)]
pub struct SenderTemplate {
    /// Head-end address.
    pub address: Ipv4Addr,
    /// LSP id within the session.
    pub lsp_id: u32,
}

/// The filter spec of a Resv, mirroring the sender template it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    /// Head-end address the reservation is for.
    pub address: Ipv4Addr,
    /// LSP id the reservation is for.
    pub lsp_id: u32,
}

/// LSP tunnel session attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAttributes {
    /// Operator-visible LSP name.
    pub name: String,
    /// Whether transit hops should arm local repair (bypass LSPs).
    pub local_repair: bool,
}

/// A Path message, sent downstream along the explicit route.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMsg {
    /// Session object.
    pub session: SessionObj,
    /// Sender template.
    pub sender: SenderTemplate,
    /// Session attributes.
    pub attributes: SessionAttributes,
    /// Address of the interface the message left on; the receiver answers
    /// toward it.
    pub hop: Option<Ipv4Addr>,
    /// Remaining explicit route: interface addresses still to traverse.
    pub explicit_route: Vec<Ipv4Addr>,
    /// Interfaces traversed so far.
    pub record_route: Vec<Ipv4Addr>,
}

impl PathMsg {
    /// Builds an empty Path for a session.
    pub fn new(session: SessionObj, sender: SenderTemplate, attributes: SessionAttributes) -> Self {
        PathMsg {
            session,
            sender,
            attributes,
            hop: None,
            explicit_route: Vec::new(),
            record_route: Vec::new(),
        }
    }

    /// The path-state key this message refreshes.
    pub fn key(&self) -> PsbKey {
        (self.session.dest_ip, self.session.tunnel_id, self.sender.lsp_id)
    }
}

impl fmt::Display for PathMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RSVP Path ({})", self.attributes.name)
    }
}

/// A Resv message, flowing back upstream and distributing labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ResvMsg {
    /// Session object.
    pub session: SessionObj,
    /// Filter spec naming the reservation's LSP.
    pub filter: FilterSpec,
    /// The label the sender assigned for this hop to use.
    pub label: Option<u32>,
    /// Address of the interface the message left on.
    pub hop: Option<Ipv4Addr>,
    /// Interfaces traversed so far.
    pub record_route: Vec<Ipv4Addr>,
}

impl ResvMsg {
    /// Builds an empty Resv for a session.
    pub fn new(session: SessionObj, filter: FilterSpec) -> Self {
        ResvMsg { session, filter, label: None, hop: None, record_route: Vec::new() }
    }

    /// The reservation-state key of this message.
    pub fn key(&self) -> RsbKey {
        (
            self.session.dest_ip,
            self.session.tunnel_id,
            self.filter.address,
            self.filter.lsp_id,
            self.hop.unwrap_or(Ipv4Addr::UNSPECIFIED),
        )
    }
}

impl fmt::Display for ResvMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RSVP Resv (label={:?})", self.label)
    }
}

/// Any RSVP message, as carried in an IP packet with protocol 46.
#[derive(Debug, Clone, PartialEq)]
pub enum RsvpMessage {
    /// A Path message.
    Path(PathMsg),
    /// A Resv message.
    Resv(ResvMsg),
}

impl fmt::Display for RsvpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsvpMessage::Path(path) => path.fmt(f),
            RsvpMessage::Resv(resv) => resv.fmt(f),
        }
    }
}
