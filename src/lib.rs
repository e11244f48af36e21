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

#![deny(missing_docs, missing_debug_implementations)]

//! # RouteLab
//!
//! A discrete-event simulator of a multi-router IP/MPLS network. It
//! reproduces the observable behavior of the distributed control plane
//! (IS-IS link-state flooding and SPF, RSVP-TE label distribution with
//! local-repair bypass LSPs, ARP) and the packet forwarding engine that
//! consumes the resulting tables, all under a single seeded virtual clock.
//!
//! ## Example usage
//!
//! The following example wires two routers back to back, lets IS-IS
//! converge, and looks up the route one router computed to the other's
//! loopback:
//!
//! ```rust
//! use routelab::Topology;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut topology = Topology::new("two routers");
//!
//!     let r1 = topology.add_router("r1", &["et1"], "default")?;
//!     let r2 = topology.add_router("r2", &["et1"], "default")?;
//!     topology.link_router_pair(r1, r2, 10, 10)?;
//!
//!     topology.isis_enable_all("default");
//!     topology.isis_start_all("default")?;
//!     topology.run_until(30_000);
//!
//!     let r2_loopback = topology.device(r2).loopback().unwrap();
//!     let route = topology.device(r1).routing().lookup_ip(r2_loopback).unwrap();
//!     assert_eq!(route.interface.as_deref(), Some("et1.0"));
//!     Ok(())
//! }
//! ```
//!
//! ## Structure
//!
//! - **[`topology`]**: the driver. Owns the device and link registries,
//!   the virtual clock, and the automatic address pools.
//! - **[`event`]**: the scheduler (a virtual-time priority queue of
//!   deferred jobs) and the typed per-device event bus.
//! - **[`device`]**: a network device with its interfaces, tables, bus
//!   reactors, control plane and ping driver.
//! - **[`routing`]** / **[`forwarding`]**: per-protocol routing tables
//!   with composed views, and the FIB the data plane consumes.
//! - **[`isis`]** / **[`rsvp`]**: the two control-plane processes.
//! - **[`packet`]** / **[`mpls`]** / **[`iface`]** / **[`arp`]**: frames,
//!   label stacks, links and address resolution.

pub mod arp;
pub mod device;
pub mod event;
pub mod forwarding;
pub mod iface;
pub mod isis;
pub mod mpls;
pub mod packet;
pub mod routing;
pub mod rsvp;
mod test;
pub mod topology;
pub mod types;

pub use device::{Device, DeviceKind, PingSession};
pub use event::{EventKind, Scheduler, SimEvent, SubKind};
pub use routing::{Route, RouteAction, RouteKey, RouteKind, TableId};
pub use topology::{Topology, TopologyDescription};
pub use types::{ConfigError, DeviceError, DeviceId, LinkId, SimError, SystemId};
