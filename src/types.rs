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

//! Module containing the identifier newtypes and the error taxonomy.

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Handle of a device inside the topology registry. Interfaces and scheduled
/// jobs refer to devices through this handle, never through ownership edges.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct DeviceId(pub(crate) usize);

impl DeviceId {
    /// Returns the raw registry index.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Handle of a link inside the topology registry.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub struct LinkId(pub(crate) usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// IS-IS system identifier, the dotted middle part of an ISO NET address
/// (e.g. `1921.6805.0001`). Also used as the LSP identifier, since this
/// simulator generates a single LSP fragment per system.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone)]
pub struct SystemId(pub String);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors raised while building or reconfiguring the topology. These are
/// surfaced to the caller and fatal to the requested operation only.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// The named interface does not exist on the device.
    #[error("{0} is an unknown interface")]
    UnknownInterface(String),
    /// IS-IS was started without any interface carrying an ISO address.
    #[error("{0} has no interface with an ISO address")]
    MissingIsoAddress(String),
    /// No unconnected, non-loopback physical interface is left on the device.
    #[error("{0} has no free physical interface")]
    NoFreeInterface(String),
    /// The automatic address pools ran dry.
    #[error("address pool exhausted")]
    AddressExhausted,
    /// A textual address did not parse.
    #[error("{0} is not a valid IPv4 interface address")]
    BadAddress(String),
}

/// Errors raised by a device while handling a frame or a control message.
#[derive(Error, Debug, PartialEq)]
pub enum DeviceError {
    /// No route exists toward the given address.
    #[error("no route to host {0}")]
    NoRoute(Ipv4Addr),
    /// A forwarding entry without a next hop was used for an off-link
    /// destination on a multipoint interface.
    #[error("a valid next hop is required to reach {0}")]
    NextHopRequired(Ipv4Addr),
    /// A locally originated frame resolved to a CONTROL action.
    #[error("frame from self unexpectedly requires control-plane handling")]
    FrameFromSelf,
    /// An RSVP Resv arrived whose previous hop is one of our own addresses.
    #[error("routing loop detected toward {0}")]
    RoutingLoop(Ipv4Addr),
    /// A Path message arrived on an interface that does not match the head
    /// of its explicit route.
    #[error("did not find ourselves in the ERO: {0}")]
    EroMismatch(Ipv4Addr),
}

/// Top-level error type. The scheduler catches these at the callback
/// boundary, logs them, and keeps running.
#[derive(Error, Debug, PartialEq)]
pub enum SimError {
    /// Configuration error, fatal to the operation that raised it.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Device error; the current callback aborts, the simulator continues.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}
