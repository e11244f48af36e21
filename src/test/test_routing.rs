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

use crate::event::{RouteSub, SubKind};
use crate::mpls::LabelOp;
use crate::routing::{
    Route, RouteAction, RouteKey, RouteKind, RoutingTables, TableId,
};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

fn net(text: &str) -> Ipv4Net {
    text.parse().unwrap()
}

fn ip(text: &str) -> Ipv4Addr {
    text.parse().unwrap()
}

fn isis_route(prefix: &str, iface: &str, next_hop: &str, metric: u32) -> Route {
    Route::new(
        RouteKey::Prefix(net(prefix)),
        RouteKind::Isis,
        Some(iface.to_string()),
        Some(ip(next_hop)),
    )
    .metric(metric)
}

#[test]
fn test_per_prefix_lists_sorted_by_metric() {
    let mut tables = RoutingTables::new();
    tables.add_route(isis_route("10.0.0.0/24", "et1.0", "10.0.1.1", 20), TableId::Isis, None);
    tables.add_route(isis_route("10.0.0.0/24", "et2.0", "10.0.2.1", 10), TableId::Isis, None);
    let routes = &tables.table(TableId::Isis)[&RouteKey::Prefix(net("10.0.0.0/24"))];
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].metric, 10);
    assert_eq!(routes[1].metric, 20);
}

#[test]
fn test_set_routes_is_idempotent() {
    let mut tables = RoutingTables::new();
    let routes = vec![
        isis_route("10.0.0.0/24", "et1.0", "10.0.1.1", 10),
        isis_route("10.0.1.0/24", "et1.0", "10.0.1.1", 20),
    ];
    let first = tables.set_routes(routes.clone(), TableId::Isis, None);
    assert_eq!(first.len(), 2);
    let second = tables.set_routes(routes, TableId::Isis, None);
    assert!(second.is_empty(), "identical replacement must not emit events");
}

#[test]
fn test_set_routes_replaces_and_prunes() {
    let mut tables = RoutingTables::new();
    tables.set_routes(
        vec![
            isis_route("10.0.0.0/24", "et1.0", "10.0.1.1", 10),
            isis_route("10.0.1.0/24", "et1.0", "10.0.1.1", 10),
        ],
        TableId::Isis,
        None,
    );
    // Replace one, drop the other.
    let events = tables.set_routes(
        vec![isis_route("10.0.0.0/24", "et2.0", "10.0.2.1", 30)],
        TableId::Isis,
        None,
    );
    let adds =
        events.iter().filter(|e| e.sub == Some(SubKind::Route(RouteSub::Added))).count();
    let dels =
        events.iter().filter(|e| e.sub == Some(SubKind::Route(RouteSub::Deleted))).count();
    assert_eq!(adds, 1);
    assert_eq!(dels, 2);
    assert!(tables.table(TableId::Isis).get(&RouteKey::Prefix(net("10.0.1.0/24"))).is_none());
    let kept = &tables.table(TableId::Isis)[&RouteKey::Prefix(net("10.0.0.0/24"))];
    assert_eq!(kept[0].metric, 30);
}

#[test]
fn test_del_missing_route_is_not_fatal() {
    let mut tables = RoutingTables::new();
    let events =
        tables.del_route(&isis_route("10.0.0.0/24", "et1.0", "10.0.1.1", 10), TableId::Isis, None);
    assert!(events.is_empty());
}

#[test]
fn test_lookup_prefers_longest_prefix() {
    let mut tables = RoutingTables::new();
    tables.add_route(Route::connected(net("100.65.0.0/31"), "et1.0"), TableId::Direct, None);
    tables.add_route(isis_route("100.65.0.0/32", "et2.0", "10.0.2.1", 10), TableId::Isis, None);
    tables.add_route(
        Route::new(RouteKey::Prefix(net("0.0.0.0/0")), RouteKind::Static, Some("et3.0".into()), None),
        TableId::Static,
        None,
    );

    let host = tables.lookup_ip(ip("100.65.0.0")).unwrap();
    assert_eq!(host.kind, RouteKind::Isis);
    let onlink = tables.lookup_ip(ip("100.65.0.1")).unwrap();
    assert_eq!(onlink.kind, RouteKind::Connected);
    let elsewhere = tables.lookup_ip(ip("8.8.8.8")).unwrap();
    assert_eq!(elsewhere.kind, RouteKind::Static);
}

#[test]
fn test_first_table_in_chain_owns_prefix() {
    let mut tables = RoutingTables::new();
    tables.add_route(
        Route::new(
            RouteKey::Prefix(net("10.0.0.0/24")),
            RouteKind::Static,
            Some("et1.0".into()),
            Some(ip("10.0.1.1")),
        ),
        TableId::Static,
        None,
    );
    tables.add_route(isis_route("10.0.0.0/24", "et2.0", "10.0.2.1", 10), TableId::Isis, None);
    let route = tables.lookup_ip(ip("10.0.0.5")).unwrap();
    assert_eq!(route.kind, RouteKind::Static);
}

#[test]
fn test_fib_appends_reject_default() {
    let tables = RoutingTables::new();
    let fib = tables.forwarding_table(&|_| true);
    assert_eq!(fib.ipv4.len(), 1);
    assert_eq!(fib.ipv4[0].action, RouteAction::Reject);
    assert_eq!(fib.ipv4[0].key, RouteKey::Prefix(net("0.0.0.0/0")));
}

#[test]
fn test_fib_local_routes_become_control() {
    let mut tables = RoutingTables::new();
    tables.add_route(Route::local(ip("192.168.50.1"), "lo.0"), TableId::Direct, None);
    let fib = tables.forwarding_table(&|_| true);
    let entry = fib.lookup_ip(ip("192.168.50.1")).unwrap();
    assert_eq!(entry.action, RouteAction::Control);
    assert_eq!(entry.interface.as_deref(), Some("lo.0"));
}

#[test]
fn test_fib_hides_down_interfaces() {
    let mut tables = RoutingTables::new();
    tables.add_route(isis_route("10.0.0.0/24", "et1.0", "10.0.1.1", 10), TableId::Isis, None);
    let fib = tables.forwarding_table(&|_| false);
    let entry = fib.lookup_ip(ip("10.0.0.5")).unwrap();
    assert_eq!(entry.action, RouteAction::Reject);
}

fn bgp_over_lsp_tables() -> RoutingTables {
    let mut tables = RoutingTables::new();
    tables.add_route(
        Route::bgp(net("10.1.42.0/24"), vec!["I".into()], ip("192.168.50.3")),
        TableId::Bgp,
        None,
    );
    let mut lsp_route = Route::rsvp_ingress(
        net("192.168.50.3/32"),
        "et1.0",
        ip("100.65.0.1"),
        "to-r3",
        LabelOp::Push(42),
        RouteKind::Rsvp.preference(),
    );
    lsp_route.bypass = Some(Box::new(Route::rsvp_ingress(
        net("192.168.50.3/32"),
        "et2.0",
        ip("100.65.0.3"),
        "bypass-to-r3",
        LabelOp::Push(99),
        RouteKind::Rsvp.preference() + 1,
    )));
    tables.add_route(lsp_route, TableId::Rsvp, None);
    tables
}

#[test]
fn test_fib_resolves_bgp_through_lsp() {
    let tables = bgp_over_lsp_tables();
    let fib = tables.forwarding_table(&|_| true);
    let entry = fib.lookup_ip(ip("10.1.42.5")).unwrap();
    assert_eq!(entry.interface.as_deref(), Some("et1.0"));
    assert_eq!(entry.action, RouteAction::Label(LabelOp::Push(42)));
}

#[test]
fn test_fib_substitutes_bypass_when_primary_is_down() {
    let tables = bgp_over_lsp_tables();
    let fib = tables.forwarding_table(&|name| name != "et1.0");
    let entry = fib.lookup_ip(ip("10.1.42.5")).unwrap();
    assert_eq!(entry.interface.as_deref(), Some("et2.0"));
    match &entry.action {
        RouteAction::Label(LabelOp::Combined(ops)) => {
            assert_eq!(ops[0], LabelOp::Push(42));
            assert_eq!(ops[1], LabelOp::Push(99));
        }
        other => panic!("expected a composed label program, got {}", other),
    }
}

#[test]
fn test_fib_hides_bgp_when_nothing_resolves() {
    let tables = bgp_over_lsp_tables();
    let fib = tables.forwarding_table(&|_| false);
    let entry = fib.lookup_ip(ip("10.1.42.5")).unwrap();
    assert_eq!(entry.action, RouteAction::Reject);
}

#[test]
fn test_label_fib_substitutes_bypass() {
    let mut tables = RoutingTables::new();
    let mut transit =
        Route::rsvp_transit(42, "et1.0", ip("100.65.0.1"), "to-r3", LabelOp::Pop);
    transit.bypass = Some(Box::new(Route::rsvp_ingress(
        net("192.168.50.3/32"),
        "et2.0",
        ip("100.65.0.3"),
        "bypass",
        LabelOp::Push(7),
        8,
    )));
    tables.add_route(transit, TableId::Mpls, None);

    let fib = tables.forwarding_table(&|_| true);
    assert_eq!(fib.lookup_label(42).unwrap().action, RouteAction::Label(LabelOp::Pop));

    let fib = tables.forwarding_table(&|name| name != "et1.0");
    let entry = fib.lookup_label(42).unwrap();
    assert_eq!(entry.interface.as_deref(), Some("et2.0"));
    match &entry.action {
        RouteAction::Label(LabelOp::Combined(ops)) => {
            assert_eq!(ops[0], LabelOp::Pop);
            assert_eq!(ops[1], LabelOp::Push(7));
        }
        other => panic!("expected a composed label program, got {}", other),
    }
}
