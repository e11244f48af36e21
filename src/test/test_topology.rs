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

use crate::topology::Topology;
use std::net::Ipv4Addr;

#[test]
fn test_iso_address_encodes_the_loopback() {
    let address = Topology::build_iso_address("49.0001", Ipv4Addr::new(192, 168, 50, 1));
    assert_eq!(address, "49.0001.1921.6805.0001.0001.00");
}

#[test]
fn test_iso_address_round_trips() {
    let loopback = Ipv4Addr::new(10, 200, 3, 254);
    let address = Topology::build_iso_address("49.0001", loopback);
    // Extract the system-id portion and reinterpret the decimal digits as
    // four octets.
    let parts: Vec<&str> = address.split('.').collect();
    let digits: String = format!("{}{}{}", parts[2], parts[3], parts[4]);
    assert_eq!(digits.len(), 12);
    let octets: Vec<u8> =
        (0..4).map(|i| digits[i * 3..i * 3 + 3].parse().unwrap()).collect();
    assert_eq!(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]), loopback);
}

#[test]
fn test_loopbacks_and_p2p_addresses_allocate_in_order() {
    let mut topology = Topology::new("allocation");
    let r1 = topology.add_router("r1", &["et1", "et2"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1", "et2"], "default").unwrap();
    let r3 = topology.add_router("r3", &["et1"], "default").unwrap();
    topology.link_router_pair(r1, r2, 10, 10).unwrap();
    topology.link_router_pair(r2, r3, 10, 10).unwrap();

    assert_eq!(topology.device(r1).loopback(), Some(Ipv4Addr::new(192, 168, 50, 1)));
    assert_eq!(topology.device(r2).loopback(), Some(Ipv4Addr::new(192, 168, 50, 2)));
    assert_eq!(topology.device(r3).loopback(), Some(Ipv4Addr::new(192, 168, 50, 3)));

    // The first /31 hands out its two hosts in iteration order.
    let r1_addr = topology.device(r1).logical("et1.0").unwrap().address().unwrap();
    let r2_addr = topology.device(r2).logical("et1.0").unwrap().address().unwrap();
    assert_eq!(r1_addr, Ipv4Addr::new(100, 65, 0, 0));
    assert_eq!(r2_addr, Ipv4Addr::new(100, 65, 0, 1));

    let r2_second = topology.device(r2).logical("et2.0").unwrap().address().unwrap();
    let r3_addr = topology.device(r3).logical("et1.0").unwrap().address().unwrap();
    assert_eq!(r2_second, Ipv4Addr::new(100, 65, 0, 2));
    assert_eq!(r3_addr, Ipv4Addr::new(100, 65, 0, 3));
}

#[test]
fn test_get_topology_is_deterministic() {
    let mut topology = Topology::new("export");
    let r1 = topology.add_router("r1", &["et1"], "backbone").unwrap();
    let r2 = topology.add_router("r2", &["et1"], "backbone").unwrap();
    let s = topology.add_server("outside", "edge");
    topology.link_router_pair(r1, r2, 10, 10).unwrap();
    let _ = s;

    let first = topology.get_topology();
    let second = topology.get_topology();
    assert_eq!(first, second);

    assert_eq!(first.clusters.len(), 2);
    assert_eq!(first.clusters[0].name, "backbone");
    assert_eq!(first.clusters[0].systems[0].name, "r1");
    assert_eq!(first.links.len(), 1);
    assert_eq!(first.links[0].endpoint1.system, "r1");
    assert_eq!(first.links[0].endpoint1.iface, "et1");
    assert_eq!(first.links[0].endpoint2.system, "r2");

    // The linked, addressed unit shows up with its address.
    let r1_ifaces = &first.clusters[0].systems[0].interfaces;
    assert!(r1_ifaces.iter().any(|i| i.name == "et1.0" && i.address == "100.65.0.0/31"));
}

#[test]
fn test_interfaces_come_up_after_half_latency() {
    let mut topology = Topology::new("latency");
    let r1 = topology.add_router("r1", &["et1"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1"], "default").unwrap();
    topology.link_router_pair(r1, r2, 10, 10).unwrap();

    assert!(!topology.device(r1).iface_up("et1.0"));
    topology.run_until(100);
    assert!(topology.device(r1).iface_up("et1.0"));
    assert!(topology.device(r2).iface_up("et1.0"));

    // Connected and local routes followed the transition.
    let route = topology
        .device(r1)
        .routing()
        .lookup_ip(Ipv4Addr::new(100, 65, 0, 1))
        .unwrap();
    assert_eq!(route.kind, crate::routing::RouteKind::Connected);
}
