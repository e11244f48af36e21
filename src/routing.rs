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

//! Module containing routes, the per-protocol routing tables with their
//! composed views, and the derivation of the forwarding table.

use crate::event::{EventKind, EventObject, RouteSub, SimEvent, SubKind};
use crate::mpls::LabelOp;
use ipnet::Ipv4Net;
use itertools::Itertools;
use log::*;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

/// Protocol that owns a route. The numeric value is the route preference;
/// lower wins when merging tables.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum RouteKind {
    /// Address assigned to a local interface.
    Local,
    /// Network directly attached to an interface.
    Connected,
    /// Manually configured route.
    Static,
    /// Label-switched path installed by RSVP-TE.
    Rsvp,
    /// Route computed by IS-IS.
    Isis,
    /// Route learned from BGP.
    Bgp,
}

impl RouteKind {
    /// The route preference (administrative distance); lower is preferred.
    pub fn preference(&self) -> u32 {
        match self {
            RouteKind::Local => 1,
            RouteKind::Connected => 2,
            RouteKind::Static => 5,
            RouteKind::Rsvp => 7,
            RouteKind::Isis => 15,
            RouteKind::Bgp => 170,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteKind::Local => "LOCAL",
            RouteKind::Connected => "CONNECTED",
            RouteKind::Static => "STATIC",
            RouteKind::Rsvp => "RSVP",
            RouteKind::Isis => "ISIS",
            RouteKind::Bgp => "BGP",
        };
        f.write_str(name)
    }
}

/// What the forwarding plane does with a matching packet.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteAction {
    /// Send it out the entry's interface toward the next hop.
    Forward,
    /// Hand it to the control plane.
    Control,
    /// Drop it and answer with an ICMP unreachable.
    Reject,
    /// Apply a label-stack operation, then send it out the interface.
    Label(LabelOp),
}

impl fmt::Display for RouteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteAction::Forward => f.write_str("FORWARD"),
            RouteAction::Control => f.write_str("CONTROL"),
            RouteAction::Reject => f.write_str("REJECT"),
            RouteAction::Label(op) => op.fmt(f),
        }
    }
}

/// Key of a route inside a table. All tables are keyed by network prefix
/// except `mpls`, which is keyed by label; `u32` is the single canonical
/// label key type.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum RouteKey {
    /// A network prefix.
    Prefix(Ipv4Net),
    /// An MPLS label.
    Label(u32),
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKey::Prefix(net) => net.fmt(f),
            RouteKey::Label(label) => label.fmt(f),
        }
    }
}

/// BGP attributes carried by a [`RouteKind::Bgp`] route.
#[derive(Debug, Clone, PartialEq)]
pub struct BgpInfo {
    /// The AS path, origin last.
    pub as_path: Vec<String>,
    /// The protocol next hop, resolved recursively at FIB-build time.
    pub protocol_next_hop: Ipv4Addr,
}

/// A routing table entry.
#[derive(Debug, Clone)]
pub struct Route {
    /// Table key: a prefix, or a label for `mpls` routes.
    pub key: RouteKey,
    /// Owning protocol.
    pub kind: RouteKind,
    /// Egress logical interface. BGP routes may not know one.
    pub interface: Option<String>,
    /// Next-hop address, when one is known.
    pub next_hop: Option<Ipv4Addr>,
    /// Metric; entries for one prefix are kept sorted ascending by it.
    pub metric: u32,
    /// Manual preference override. Only set when overriding.
    pub admin_cost: Option<u32>,
    /// Forwarding action.
    pub action: RouteAction,
    /// Resolved route for recursive (BGP) next hops.
    pub recursive: Option<Box<Route>>,
    /// Protection route substituted when this route's interface is down.
    pub bypass: Option<Box<Route>>,
    /// BGP attributes.
    pub bgp: Option<BgpInfo>,
    /// Name of the label-switched path, on RSVP routes.
    pub lsp_name: Option<String>,
}

impl Route {
    /// Builds a route with the protocol's default metric and the plain
    /// `Forward` action.
    pub fn new(
        key: RouteKey,
        kind: RouteKind,
        interface: Option<String>,
        next_hop: Option<Ipv4Addr>,
    ) -> Self {
        Route {
            key,
            kind,
            interface,
            next_hop,
            metric: kind.preference(),
            admin_cost: None,
            action: RouteAction::Forward,
            recursive: None,
            bypass: None,
            bgp: None,
            lsp_name: None,
        }
    }

    /// Overrides the metric.
    pub fn metric(mut self, metric: u32) -> Self {
        self.metric = metric;
        self
    }

    /// Overrides the action.
    pub fn action(mut self, action: RouteAction) -> Self {
        self.action = action;
        self
    }

    /// A `Local` route for an interface host address.
    pub fn local(address: Ipv4Addr, interface: impl Into<String>) -> Self {
        let net = Ipv4Net::new(address, 32).expect("/32 is always a valid prefix length");
        Route::new(RouteKey::Prefix(net), RouteKind::Local, Some(interface.into()), None).metric(1)
    }

    /// A `Connected` route for an interface network.
    pub fn connected(network: Ipv4Net, interface: impl Into<String>) -> Self {
        Route::new(RouteKey::Prefix(network), RouteKind::Connected, Some(interface.into()), None)
            .metric(1)
    }

    /// A BGP route with its protocol next hop.
    pub fn bgp(prefix: Ipv4Net, as_path: Vec<String>, protocol_next_hop: Ipv4Addr) -> Self {
        let mut route = Route::new(RouteKey::Prefix(prefix), RouteKind::Bgp, None, None);
        route.bgp = Some(BgpInfo { as_path, protocol_next_hop });
        route
    }

    /// An RSVP ingress route pushing onto a label-switched path.
    pub fn rsvp_ingress(
        prefix: Ipv4Net,
        interface: impl Into<String>,
        next_hop: Ipv4Addr,
        lsp_name: impl Into<String>,
        op: LabelOp,
        metric: u32,
    ) -> Self {
        let mut route =
            Route::new(RouteKey::Prefix(prefix), RouteKind::Rsvp, Some(interface.into()), Some(next_hop))
                .metric(metric)
                .action(RouteAction::Label(op));
        route.lsp_name = Some(lsp_name.into());
        route
    }

    /// An RSVP transit route keyed by the label advertised upstream.
    pub fn rsvp_transit(
        label: u32,
        interface: impl Into<String>,
        next_hop: Ipv4Addr,
        lsp_name: impl Into<String>,
        op: LabelOp,
    ) -> Self {
        let mut route =
            Route::new(RouteKey::Label(label), RouteKind::Rsvp, Some(interface.into()), Some(next_hop))
                .action(RouteAction::Label(op));
        route.lsp_name = Some(lsp_name.into());
        route
    }

    /// The prefix, for prefix-keyed routes.
    pub fn prefix(&self) -> Option<Ipv4Net> {
        match self.key {
            RouteKey::Prefix(net) => Some(net),
            RouteKey::Label(_) => None,
        }
    }

    /// Identity used by table maintenance: two routes are the same entry
    /// when key, protocol, interface and metric agree. The next hop is
    /// deliberately not part of the identity.
    pub fn same_entry(&self, other: &Route) -> bool {
        self.key == other.key
            && self.kind == other.kind
            && self.interface == other.interface
            && self.metric == other.metric
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] to {} via {}",
            self.kind,
            self.metric,
            self.next_hop.map(|nh| nh.to_string()).unwrap_or_else(|| "-".to_string()),
            self.interface.as_deref().unwrap_or("-"),
        )?;
        if let Some(name) = &self.lsp_name {
            write!(f, ", label-switched-path {}, {}", name, self.action)?;
        }
        Ok(())
    }
}

/// The fixed set of per-protocol tables.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
pub enum TableId {
    /// Local and connected routes.
    Direct,
    /// Static routes.
    Static,
    /// IS-IS routes.
    Isis,
    /// BGP routes.
    Bgp,
    /// RSVP ingress routes (the `inet.3` content).
    Rsvp,
    /// Label routes, keyed by label.
    Mpls,
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TableId::Direct => "direct",
            TableId::Static => "static",
            TableId::Isis => "isis",
            TableId::Bgp => "bgp",
            TableId::Rsvp => "rsvp",
            TableId::Mpls => "mpls",
        };
        f.write_str(name)
    }
}

/// Member order of the `inet` view (inet.0).
pub const INET: &[TableId] = &[TableId::Direct, TableId::Static, TableId::Isis, TableId::Bgp];
/// Member order of the `inet3` view (inet.3).
pub const INET3: &[TableId] = &[TableId::Rsvp];
/// Member order of the chain used to resolve protocol next hops.
pub const RECURSIVE: &[TableId] =
    &[TableId::Rsvp, TableId::Direct, TableId::Static, TableId::Isis];

/// One table: per-key lists of routes, each list sorted ascending by
/// metric so the head is the preferred entry.
pub type RouteTable = BTreeMap<RouteKey, Vec<Route>>;

/// An installed forwarding entry.
#[derive(Debug, Clone)]
pub struct FibEntry {
    /// The matched key.
    pub key: RouteKey,
    /// Egress interface; absent on `Reject` entries.
    pub interface: Option<String>,
    /// Next hop used for layer-2 resolution.
    pub next_hop: Option<Ipv4Addr>,
    /// Action to apply.
    pub action: RouteAction,
}

impl fmt::Display for FibEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} ({})",
            self.key,
            self.interface.as_deref().unwrap_or("-"),
            self.action
        )
    }
}

/// The derived forwarding table: longest-prefix-match IPv4 entries plus a
/// label map. Rebuilt from scratch on every route or link change.
#[derive(Debug, Clone, Default)]
pub struct Fib {
    /// IPv4 entries ordered by descending `(prefix length, network)`, so a
    /// linear scan performs longest-prefix match with a deterministic
    /// tie-break.
    pub ipv4: Vec<FibEntry>,
    /// Label entries.
    pub mpls: BTreeMap<u32, FibEntry>,
}

impl Fib {
    /// Longest-prefix lookup of an IPv4 address.
    pub fn lookup_ip(&self, address: Ipv4Addr) -> Option<&FibEntry> {
        self.ipv4.iter().find(|entry| match entry.key {
            RouteKey::Prefix(net) => net.contains(&address),
            RouteKey::Label(_) => false,
        })
    }

    /// Exact lookup of a label.
    pub fn lookup_label(&self, label: u32) -> Option<&FibEntry> {
        self.mpls.get(&label)
    }
}

/// The per-protocol route stores of one device, composed into the `inet`,
/// `inet3` and `recursive` views.
#[derive(Debug, Default)]
pub struct RoutingTables {
    direct: RouteTable,
    statics: RouteTable,
    isis: RouteTable,
    bgp: RouteTable,
    rsvp: RouteTable,
    mpls: RouteTable,
}

impl RoutingTables {
    /// Creates the empty table set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to one table.
    pub fn table(&self, id: TableId) -> &RouteTable {
        match id {
            TableId::Direct => &self.direct,
            TableId::Static => &self.statics,
            TableId::Isis => &self.isis,
            TableId::Bgp => &self.bgp,
            TableId::Rsvp => &self.rsvp,
            TableId::Mpls => &self.mpls,
        }
    }

    fn table_mut(&mut self, id: TableId) -> &mut RouteTable {
        match id {
            TableId::Direct => &mut self.direct,
            TableId::Static => &mut self.statics,
            TableId::Isis => &mut self.isis,
            TableId::Bgp => &mut self.bgp,
            TableId::Rsvp => &mut self.rsvp,
            TableId::Mpls => &mut self.mpls,
        }
    }

    /// Applies `f` to every route of one table. Used by RSVP to attach
    /// bypass routes in place; deliberately does not emit `RouteChange`,
    /// the next rebuild picks the mutation up.
    pub(crate) fn for_each_route_mut(&mut self, id: TableId, mut f: impl FnMut(&mut Route)) {
        for routes in self.table_mut(id).values_mut() {
            for route in routes.iter_mut() {
                f(route);
            }
        }
    }

    /// Inserts a route, keeping the per-key list sorted ascending by
    /// metric. Returns the `RouteChange` events to publish.
    pub fn add_route(&mut self, route: Route, id: TableId, src: Option<&str>) -> Vec<SimEvent> {
        let event = route_event(RouteSub::Added, &route, id, src);
        let list = self.table_mut(id).entry(route.key).or_insert_with(Vec::new);
        list.push(route);
        list.sort_by_key(|r| r.metric);
        vec![event]
    }

    /// Removes a route. A missing entry is warned about, not fatal.
    pub fn del_route(&mut self, route: &Route, id: TableId, src: Option<&str>) -> Vec<SimEvent> {
        let table = self.table_mut(id);
        let mut found = false;
        let mut emptied = false;
        if let Some(list) = table.get_mut(&route.key) {
            if let Some(pos) = list.iter().position(|r| r.same_entry(route)) {
                list.remove(pos);
                found = true;
            }
            emptied = list.is_empty();
        }
        if emptied {
            table.remove(&route.key);
        }
        if found {
            vec![route_event(RouteSub::Deleted, route, id, src)]
        } else {
            warn!("{} not in table {}, can't delete", route.key, id);
            Vec::new()
        }
    }

    /// Idempotent bulk replace of one table: add what is missing, replace
    /// what differs, delete what is gone. Identical replacements are
    /// short-circuited without spurious `RouteChange` events.
    pub fn set_routes(
        &mut self,
        routes: Vec<Route>,
        id: TableId,
        src: Option<&str>,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let mut visited = Vec::new();
        for route in routes {
            visited.push(route.key);
            let existing = self.table(id).get(&route.key).cloned();
            match existing {
                Some(list) if list.iter().any(|r| r.same_entry(&route)) => {}
                Some(list) => {
                    for old in &list {
                        events.extend(self.del_route(old, id, src));
                    }
                    events.extend(self.add_route(route, id, src));
                }
                None => {
                    events.extend(self.add_route(route, id, src));
                }
            }
        }
        let stale: Vec<Route> = self
            .table(id)
            .iter()
            .filter(|(key, _)| !visited.contains(*key))
            .flat_map(|(_, list)| list.iter().cloned())
            .collect();
        for route in stale {
            events.extend(self.del_route(&route, id, src));
        }
        events
    }

    /// Looks up an address in the default `inet` view.
    pub fn lookup_ip(&self, address: Ipv4Addr) -> Option<Route> {
        self.lookup_ip_chain(address, INET)
    }

    /// Looks up an address in the chain used for protocol next hops.
    pub fn recursive_lookup_ip(&self, address: Ipv4Addr) -> Option<Route> {
        self.lookup_ip_chain(address, RECURSIVE)
    }

    /// Looks up an address in an explicit chain of tables. The first table
    /// holding a prefix owns it; across prefixes the longest match wins,
    /// with ties broken by the higher network address. When the winning
    /// route carries a resolved recursive route, its interface is
    /// substituted before returning.
    pub fn lookup_ip_chain(&self, address: Ipv4Addr, chain: &[TableId]) -> Option<Route> {
        let merged = self.merged_view(chain);
        let best = merged
            .iter()
            .sorted_by(|(a, _), (b, _)| prefix_order(**b).cmp(&prefix_order(**a)))
            .find(|(net, _)| net.contains(&address));
        best.and_then(|(_, routes)| routes.first()).map(|route| {
            let mut route = route.clone();
            if let Some(resolved) = &route.recursive {
                route.interface = resolved.interface.clone();
            }
            route
        })
    }

    /// The first-hit-per-prefix merge of a chain, in table order.
    fn merged_view(&self, chain: &[TableId]) -> BTreeMap<Ipv4Net, &Vec<Route>> {
        let mut merged: BTreeMap<Ipv4Net, &Vec<Route>> = BTreeMap::new();
        for id in chain {
            for (key, routes) in self.table(*id) {
                if let RouteKey::Prefix(net) = key {
                    merged.entry(*net).or_insert(routes);
                }
            }
        }
        merged
    }

    /// Derives the forwarding table. `iface_up` reports whether a logical
    /// interface is currently up.
    ///
    /// IPv4 entries are produced per prefix from the `inet` view, walking
    /// the candidate routes until one is installable; prefixes whose routes
    /// all fail to resolve stay hidden. BGP routes resolve their protocol
    /// next hop through the `recursive` chain, falling back to the resolved
    /// route's bypass (composing both actions) when the primary interface
    /// is down. A `0.0.0.0/0 REJECT` entry is appended when no default
    /// route survived. Label entries substitute their bypass the same way.
    pub fn forwarding_table(&self, iface_up: &dyn Fn(&str) -> bool) -> Fib {
        let mut fib = Fib::default();
        let default = Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).expect("/0 is valid");
        let mut have_default = false;

        let merged = self.merged_view(INET);
        let prefixes: Vec<Ipv4Net> = merged
            .keys()
            .copied()
            .sorted_by(|a, b| prefix_order(*b).cmp(&prefix_order(*a)))
            .collect();

        for prefix in prefixes {
            let routes = merged[&prefix];
            for route in routes.iter() {
                let installed = match (&route.kind, &route.bgp) {
                    (RouteKind::Local, _) => {
                        fib.ipv4.push(FibEntry {
                            key: RouteKey::Prefix(prefix),
                            interface: route.interface.clone(),
                            next_hop: None,
                            action: RouteAction::Control,
                        });
                        true
                    }
                    (RouteKind::Bgp, Some(info)) => {
                        match self.recursive_lookup_ip(info.protocol_next_hop) {
                            None => {
                                info!(
                                    "unable to resolve protocol next hop {} for {}, hiding",
                                    info.protocol_next_hop, prefix
                                );
                                false
                            }
                            Some(resolved) => {
                                let primary_up = resolved
                                    .interface
                                    .as_deref()
                                    .map(|name| iface_up(name))
                                    .unwrap_or(false);
                                if primary_up {
                                    fib.ipv4.push(FibEntry {
                                        key: RouteKey::Prefix(prefix),
                                        interface: resolved.interface.clone(),
                                        next_hop: resolved.next_hop,
                                        action: resolved.action.clone(),
                                    });
                                    true
                                } else if let Some(bypass) = resolved.bypass.as_ref().filter(|b| {
                                    b.interface.as_deref().map(|name| iface_up(name)).unwrap_or(false)
                                }) {
                                    fib.ipv4.push(FibEntry {
                                        key: RouteKey::Prefix(prefix),
                                        interface: bypass.interface.clone(),
                                        next_hop: bypass.next_hop,
                                        action: RouteAction::Label(compose(
                                            &resolved.action,
                                            &bypass.action,
                                        )),
                                    });
                                    true
                                } else {
                                    false
                                }
                            }
                        }
                    }
                    _ => {
                        let up = route
                            .interface
                            .as_deref()
                            .map(|name| iface_up(name))
                            .unwrap_or(false);
                        if up {
                            fib.ipv4.push(FibEntry {
                                key: RouteKey::Prefix(prefix),
                                interface: route.interface.clone(),
                                next_hop: route.next_hop,
                                action: RouteAction::Forward,
                            });
                            true
                        } else {
                            false
                        }
                    }
                };
                if installed {
                    if prefix == default {
                        have_default = true;
                    }
                    break;
                }
            }
        }

        if !have_default {
            fib.ipv4.push(FibEntry {
                key: RouteKey::Prefix(default),
                interface: None,
                next_hop: None,
                action: RouteAction::Reject,
            });
        }

        for (key, routes) in &self.mpls {
            let label = match key {
                RouteKey::Label(label) => *label,
                RouteKey::Prefix(_) => continue,
            };
            let route = match routes.first() {
                Some(route) => route,
                None => continue,
            };
            let primary_up =
                route.interface.as_deref().map(|name| iface_up(name)).unwrap_or(false);
            let entry = match route.bypass.as_ref() {
                Some(bypass) if !primary_up => FibEntry {
                    key: RouteKey::Label(label),
                    interface: bypass.interface.clone(),
                    next_hop: bypass.next_hop,
                    action: RouteAction::Label(compose(&route.action, &bypass.action)),
                },
                _ => FibEntry {
                    key: RouteKey::Label(label),
                    interface: route.interface.clone(),
                    next_hop: route.next_hop,
                    action: route.action.clone(),
                },
            };
            fib.mpls.insert(label, entry);
        }

        fib
    }
}

/// Sort key ordering prefixes ascending by `(prefix length, network)`;
/// callers reverse it for longest-prefix-first walks.
fn prefix_order(net: Ipv4Net) -> (u8, u32) {
    (net.prefix_len(), u32::from(net.network()))
}

/// Composes a primary action with a bypass action into one label program.
fn compose(primary: &RouteAction, bypass: &RouteAction) -> LabelOp {
    let as_op = |action: &RouteAction| match action {
        RouteAction::Label(op) => op.clone(),
        // Non-label actions contribute nothing to the label program.
        _ => LabelOp::Combined(Vec::new()),
    };
    LabelOp::Combined(vec![as_op(primary), as_op(bypass)])
}

fn route_event(sub: RouteSub, route: &Route, id: TableId, src: Option<&str>) -> SimEvent {
    let verb = match sub {
        RouteSub::Added => "Added",
        RouteSub::Deleted => "Deleted",
    };
    SimEvent::new(
        EventKind::RouteChange,
        src.unwrap_or("routing"),
        format!("{} {} route to {}", verb, route.kind, route.key),
    )
    .sub(SubKind::Route(sub))
    .target(id.to_string())
    .object(EventObject::Route(route.clone()))
}
