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

use crate::routing::{Route, RouteKind, TableId};
use crate::topology::Topology;
use crate::types::DeviceId;
use std::net::Ipv4Addr;

fn ip(text: &str) -> Ipv4Addr {
    text.parse().unwrap()
}

fn converged_pair() -> (Topology, DeviceId, DeviceId) {
    let _ = pretty_env_logger::try_init();
    let mut topology = Topology::new("convergence");
    let r1 = topology.add_router("r1", &["et1"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1", "et2"], "default").unwrap();
    topology.link_router_pair(r1, r2, 10, 10).unwrap();
    topology.isis_enable_all("default");
    topology.isis_start_all("default").unwrap();
    topology.run_until(30_000);
    (topology, r1, r2)
}

fn converged_triple() -> (Topology, DeviceId, DeviceId, DeviceId) {
    let (mut topology, r1, r2) = converged_pair();
    let r3 = topology.add_router("r3", &["et1"], "default").unwrap();
    topology.link_router_pair(r2, r3, 10, 10).unwrap();
    topology.isis_enable_all("default");
    topology.start_isis(r3).unwrap();
    topology.run_another(30_000);
    (topology, r1, r2, r3)
}

#[test]
fn test_two_router_convergence() {
    let (topology, r1, r2) = converged_pair();

    for id in [r1, r2].iter() {
        let isis = topology.device(*id).isis().unwrap();
        assert_eq!(isis.database().len(), 2, "both routers must hold both LSPs");
        assert!(isis.database().values().all(|entry| entry.seq_no() >= 1));
    }

    let lo1 = topology.device(r1).loopback().unwrap();
    let lo2 = topology.device(r2).loopback().unwrap();
    assert_eq!(topology.device(r1).isis().unwrap().distance_to_router(lo2), Some(10));
    assert_eq!(topology.device(r2).isis().unwrap().distance_to_router(lo1), Some(10));

    let route = topology.device(r1).routing().lookup_ip(lo2).unwrap();
    assert_eq!(route.kind, RouteKind::Isis);
    assert_eq!(route.interface.as_deref(), Some("et1.0"));
}

#[test]
fn test_database_synchronization_is_symmetric() {
    let (topology, r1, r2) = converged_pair();
    let db1 = topology.device(r1).isis().unwrap().database();
    let db2 = topology.device(r2).isis().unwrap().database();
    assert_eq!(db1.len(), db2.len());
    for (lsp_id, entry) in db1 {
        let other = db2.get(lsp_id).expect("LSP missing on the peer");
        assert_eq!(entry.seq_no(), other.seq_no(), "sequence mismatch for {}", lsp_id);
    }
}

#[test]
fn test_three_router_reconvergence() {
    let (topology, r1, _r2, r3) = converged_triple();
    let lo3 = topology.device(r3).loopback().unwrap();

    // r1 reaches r3 through r2's side of the first /31.
    let route = topology.device(r1).routing().lookup_ip(lo3).unwrap();
    assert_eq!(route.kind, RouteKind::Isis);
    assert_eq!(route.next_hop, Some(ip("100.65.0.1")));
    assert_eq!(topology.device(r1).isis().unwrap().distance_to_router(lo3), Some(20));
}

#[test]
fn test_bgp_recursive_resolution() {
    let (mut topology, r1, _r2, r3) = converged_triple();
    let lo3 = topology.device(r3).loopback().unwrap();
    topology.add_route(
        r1,
        Route::bgp("10.1.42.0/24".parse().unwrap(), vec!["I".into()], lo3),
        TableId::Bgp,
    );

    // The FIB resolves the protocol next hop through the IS-IS path
    // toward r3, which leaves via the interface facing r2.
    let entry =
        topology.device(r1).forwarding().unwrap().lookup_ip(ip("10.1.42.5")).unwrap().clone();
    assert_eq!(entry.interface.as_deref(), Some("et1.0"));
    assert_eq!(entry.next_hop, Some(ip("100.65.0.1")));
}

#[test]
fn test_link_failure_reconverges_around_dead_path() {
    // A triangle: r1-r2 direct, plus the long way r1-r3-r2. Killing the
    // direct link must move r1's route onto the detour after SPF.
    let _ = pretty_env_logger::try_init();
    let mut topology = Topology::new("failure");
    let r1 = topology.add_router("r1", &["et1", "et2"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1", "et2"], "default").unwrap();
    let r3 = topology.add_router("r3", &["et1", "et2"], "default").unwrap();
    let direct = topology.link_router_pair(r1, r2, 10, 10).unwrap();
    topology.link_router_pair(r1, r3, 10, 10).unwrap();
    topology.link_router_pair(r3, r2, 10, 10).unwrap();
    topology.isis_enable_all("default");
    topology.isis_start_all("default").unwrap();
    topology.run_until(40_000);

    let lo2 = topology.device(r2).loopback().unwrap();
    let before = topology.device(r1).routing().lookup_ip(lo2).unwrap();
    assert_eq!(before.interface.as_deref(), Some("et1.0"));

    topology.set_link_state(direct, false);
    topology.run_another(40_000);

    let after = topology.device(r1).routing().lookup_ip(lo2).unwrap();
    assert_eq!(after.interface.as_deref(), Some("et2.0"), "route must detour via r3");
    assert_eq!(topology.device(r1).isis().unwrap().distance_to_router(lo2), Some(20));
}
