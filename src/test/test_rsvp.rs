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

//! End-to-end RSVP-TE scenarios on the eleven-router backbone: LSP
//! establishment with link protection, and failure masking through the
//! bypass before the IGP has reconverged.

use crate::event::EventKind;
use crate::mpls::LabelOp;
use crate::routing::{Route, RouteAction, RouteKind, TableId};
use crate::topology::Topology;
use crate::types::{DeviceId, LinkId};
use std::net::Ipv4Addr;

const CDN_IP: &str = "10.4.42.2";
const CDN_NETWORK: &str = "10.4.42.0/24";

struct Backbone {
    topology: Topology,
    gxx: DeviceId,
    jxx: DeviceId,
    ixx: DeviceId,
    ayy: DeviceId,
    outside: DeviceId,
    cdn: DeviceId,
    gxx_jxx: LinkId,
}

fn ip(text: &str) -> Ipv4Addr {
    text.parse().unwrap()
}

/// The backbone from the full RSVP walkthrough: ten core routers, an
/// external peer, and a CDN stub hanging off `ayy`.
fn build_backbone() -> Backbone {
    let _ = pretty_env_logger::try_init();
    let mut t = Topology::new("backbone");

    let outside = t.add_router("outside", &["et1"], "outside").unwrap();
    let gxx = t.add_router("gxx", &["et1", "et2", "et3"], "backbone").unwrap();
    let mxx = t.add_router("mxx", &["et1", "et2", "et3"], "backbone").unwrap();
    let jxx = t.add_router("jxx", &["et1", "et2", "et3", "et4"], "backbone").unwrap();
    let ixx = t.add_router("ixx", &["et1", "et2", "et3", "et4", "et5"], "backbone").unwrap();
    let axx = t.add_router("axx", &["et1", "et2", "et3"], "backbone").unwrap();
    let lxx = t.add_router("lxx", &["et1", "et2"], "backbone").unwrap();
    let ayy = t.add_router("ayy", &["et1", "et2", "et3", "et4"], "backbone").unwrap();
    let fxx = t.add_router("fxx", &["et1", "et2", "et3"], "backbone").unwrap();
    let dxx = t.add_router("dxx", &["et1", "et2", "et3"], "backbone").unwrap();
    let oxx = t.add_router("oxx", &["et1", "et2", "et3", "et4"], "backbone").unwrap();
    let cdn = t.add_router("cdn", &["et1", "et2"], "AS 65514").unwrap();

    t.link_router_pair(gxx, mxx, 50, 9210).unwrap();
    let gxx_jxx = t.link_router_pair(gxx, jxx, 60, 14530).unwrap();
    t.link_router_pair(mxx, axx, 9, 3025).unwrap();
    t.link_router_pair(mxx, dxx, 15, 6017).unwrap();
    t.link_router_pair(axx, ixx, 9, 3230).unwrap();
    t.link_router_pair(axx, dxx, 9, 1839).unwrap();
    t.link_router_pair(jxx, ixx, 4, 412).unwrap();
    t.link_router_pair(lxx, ayy, 3, 717).unwrap();
    t.link_router_pair(jxx, oxx, 10, 1976).unwrap();
    t.link_router_pair(jxx, lxx, 10, 10_000).unwrap();
    t.link_router_pair(ixx, ayy, 40, 10_000).unwrap();
    t.link_router_pair(ixx, fxx, 45, 10_000).unwrap();
    t.link_router_pair(dxx, oxx, 18, 5095).unwrap();
    t.link_router_pair(oxx, ixx, 11, 3249).unwrap();
    t.link_router_pair(fxx, ayy, 6, 780).unwrap();
    t.link_router_pair(outside, gxx, 10, 10).unwrap();
    t.link_router_pair(ayy, cdn, 10, 10).unwrap();

    // The CDN prefix lives on a dangling interface of the stub router.
    t.add_ip_address(cdn, "et2", &format!("{}/24", CDN_IP)).unwrap();
    t.set_interface_state(cdn, "et2", true);

    t.static_route(outside, "0.0.0.0/0", "et1.0");
    t.static_route(cdn, "0.0.0.0/0", "et1.0");

    t.isis_enable_all("backbone");
    t.isis_start_all("backbone").unwrap();
    t.run_until(120_000);

    Backbone { topology: t, gxx, jxx, ixx, ayy, outside, cdn, gxx_jxx }
}

/// Injects the BGP state and signals both protected LSPs, then lets RSVP
/// converge.
fn establish_lsps(net: &mut Backbone) {
    let t = &mut net.topology;
    let gxx_lo = t.device(net.gxx).loopback().unwrap();
    let ayy_lo = t.device(net.ayy).loopback().unwrap();
    let cdn_peer = t.device(net.cdn).logical("et1.0").unwrap().address().unwrap();
    let outside_net = t.device(net.outside).logical("et1.0").unwrap().ipv4.unwrap().trunc();

    // The CDN prefix is announced externally and carried inside with the
    // far-end loopbacks as protocol next hops.
    t.add_route(
        net.ayy,
        Route::bgp(CDN_NETWORK.parse().unwrap(), vec!["I".into(), "65514".into()], cdn_peer),
        TableId::Bgp,
    );
    t.add_route(
        net.gxx,
        Route::bgp(CDN_NETWORK.parse().unwrap(), vec!["I".into(), "65514".into()], ayy_lo),
        TableId::Bgp,
    );
    t.add_route(
        net.ayy,
        Route::bgp(outside_net, vec!["I".into()], gxx_lo),
        TableId::Bgp,
    );

    t.create_lsp(net.gxx, "GXX-TO-AYY", ayy_lo, true);
    t.create_lsp(net.ayy, "AYY-TO-GXX", gxx_lo, true);
    t.rsvp_start_all("backbone");
    t.run_another(200_000);
}

#[test]
fn test_lsp_with_link_protection() {
    let mut net = build_backbone();
    establish_lsps(&mut net);
    let t = &net.topology;
    let ayy_lo = t.device(net.ayy).loopback().unwrap();

    // The ingress holds exactly one RSVP route, pushing toward the tail.
    let rsvp_table = t.device(net.gxx).routing().table(TableId::Rsvp);
    assert_eq!(rsvp_table.len(), 1);
    let primary = &rsvp_table.values().next().unwrap()[0];
    assert_eq!(primary.prefix().unwrap().addr(), ayy_lo);
    assert!(
        matches!(primary.action, RouteAction::Label(LabelOp::Push(_))),
        "ingress route must push a label"
    );
    assert_eq!(primary.kind, RouteKind::Rsvp);

    // Each transit router on the path holds one label route per label
    // allocated to it.
    for id in [net.jxx, net.ixx].iter() {
        let mpls = t.device(*id).routing().table(TableId::Mpls);
        assert!(!mpls.is_empty(), "transit router without label state");
        for routes in mpls.values() {
            assert_eq!(routes.len(), 1);
        }
    }

    // Link protection armed: the primary carries a bypass that leaves on a
    // different interface.
    let bypass = primary.bypass.as_ref().expect("protected route must carry a bypass");
    assert_ne!(bypass.interface, primary.interface);
    assert!(matches!(bypass.action, RouteAction::Label(LabelOp::Push(_))));

    // The protected transit hop is armed as well.
    let jxx_protected = t
        .device(net.jxx)
        .routing()
        .table(TableId::Mpls)
        .values()
        .any(|routes| routes[0].bypass.is_some());
    assert!(jxx_protected, "transit labels toward the protected hop must carry a bypass");
}

#[test]
fn test_traffic_rides_the_lsp() {
    let mut net = build_backbone();
    establish_lsps(&mut net);

    let ping = net.topology.ping(net.outside, ip(CDN_IP), 1, 2000);
    let events = net.topology.run_another(8000);

    let session = net.topology.device(net.outside).ping_session(ping).unwrap();
    assert_eq!(session.received, 1, "the CDN must answer over the label path");

    // The label path runs via jxx; mxx only carries bypass traffic and
    // must stay quiet.
    assert!(events.iter().any(|(host, e)| host == "jxx" && e.kind == EventKind::Mpls));
    assert!(!events.iter().any(|(host, e)| host == "mxx" && e.kind == EventKind::Mpls));
}

#[test]
fn test_bypass_masks_link_failure() {
    let mut net = build_backbone();
    establish_lsps(&mut net);

    // Kill the link the primary LSP rides on and probe immediately: the
    // FIB rebuild composes the bypass with the primary action, no RSVP
    // signaling and no SPF run required first.
    net.topology.set_link_state(net.gxx_jxx, false);
    let ping = net.topology.ping(net.outside, ip(CDN_IP), 1, 4000);
    let events = net.topology.run_another(10_000);

    let session = net.topology.device(net.outside).ping_session(ping).unwrap();
    assert_eq!(session.received, 1, "the bypass must mask the failure");

    // The detour is label-switched through mxx this time.
    assert!(events.iter().any(|(host, e)| host == "mxx" && e.kind == EventKind::Mpls));
}
