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

use crate::event::{EventObject, MplsSub, SubKind};
use crate::mpls::LabelOp;
use crate::routing::{Route, TableId};
use crate::topology::Topology;
use crate::types::DeviceId;
use std::net::Ipv4Addr;

fn ip(text: &str) -> Ipv4Addr {
    text.parse().unwrap()
}

/// r1 -- r2 -- r3 with IS-IS converged everywhere.
fn converged_line() -> (Topology, DeviceId, DeviceId, DeviceId) {
    let _ = pretty_env_logger::try_init();
    let mut topology = Topology::new("line");
    let r1 = topology.add_router("r1", &["et1"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1", "et2"], "default").unwrap();
    let r3 = topology.add_router("r3", &["et1", "et2"], "default").unwrap();
    topology.link_router_pair(r1, r2, 10, 10).unwrap();
    topology.link_router_pair(r2, r3, 10, 10).unwrap();
    topology.isis_enable_all("default");
    topology.isis_start_all("default").unwrap();
    topology.run_until(40_000);
    (topology, r1, r2, r3)
}

#[test]
fn test_ping_over_manual_label_switched_path() {
    let (mut topology, r1, r2, r3) = converged_line();
    let lo3 = topology.device(r3).loopback().unwrap();

    // A stub network behind r3, deliberately kept out of IS-IS.
    topology.add_ip_address(r3, "et2", "10.1.42.2/24").unwrap();
    topology.set_interface_state(r3, "et2", true);

    // r1 learns the stub prefix via "BGP" with r3's loopback as protocol
    // next hop, and reaches that loopback over a hand-built LSP.
    topology.add_route(
        r1,
        Route::bgp("10.1.42.0/24".parse().unwrap(), vec!["I".into()], lo3),
        TableId::Bgp,
    );
    topology.add_route(
        r1,
        Route::rsvp_ingress(
            format!("{}/32", lo3).parse().unwrap(),
            "et1.0",
            ip("100.65.0.1"),
            "lsp-r1-to-r3",
            LabelOp::Push(42),
            7,
        ),
        TableId::Rsvp,
    );
    // r2 terminates label 42 and hands the payload toward r3.
    topology.add_route(
        r2,
        Route::rsvp_transit(42, "et2.0", ip("100.65.0.3"), "lsp-r1-to-r3", LabelOp::Pop),
        TableId::Mpls,
    );

    let ping = topology.ping(r1, ip("10.1.42.2"), 1, 1000);
    let events = topology.run_another(3000);

    let session = topology.device(r1).ping_session(ping).unwrap();
    assert_eq!(session.sent, 1);
    assert_eq!(session.received, 1, "the echo reply must come back");

    // The ingress pushed label 42, the transit popped it.
    assert!(events.iter().any(|(host, event)| {
        host == "r1"
            && event.sub == Some(SubKind::Mpls(MplsSub::Push))
            && matches!(event.object, Some(EventObject::Label(42)))
    }));
    assert!(events.iter().any(|(host, event)| {
        host == "r2"
            && event.sub == Some(SubKind::Mpls(MplsSub::Pop))
            && matches!(event.object, Some(EventObject::Label(42)))
    }));
}

#[test]
fn test_reject_default_answers_with_unreachable() {
    let _ = pretty_env_logger::try_init();
    let mut topology = Topology::new("reject");
    let r1 = topology.add_router("r1", &["et1"], "default").unwrap();
    let outside = topology.add_server("outside", "edge");
    topology.link_router_pair(outside, r1, 10, 10).unwrap();
    topology.run_until(1000);

    // The server points its default at the router; the router has no
    // route for the probe and must reject it.
    topology.static_route_via(outside, "0.0.0.0/0", ip("100.65.0.1"), "et1.0");
    let ping = topology.ping(outside, ip("1.2.3.4"), 1, 1000);
    topology.run_another(3000);

    let session = topology.device(outside).ping_session(ping).unwrap();
    assert_eq!(session.received, 0);
    assert_eq!(session.unreachable, 1, "the reject entry must answer with an unreachable");

    // The gateway resolution went through ARP and was learned.
    let cache = &topology.device(outside).arp.as_ref().unwrap().cache;
    assert!(cache.get(ip("100.65.0.1")).is_some());
}

#[test]
fn test_ping_between_routers() {
    let (mut topology, r1, _r2, r3) = converged_line();
    let lo3 = topology.device(r3).loopback().unwrap();
    let ping = topology.ping(r1, lo3, 3, 1000);
    topology.run_another(6000);
    let session = topology.device(r1).ping_session(ping).unwrap();
    assert_eq!(session.sent, 3);
    assert_eq!(session.received, 3);
    assert!(session.done);
}
