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

//! # Top-level topology driver
//!
//! The `Topology` owns the flat device and link registries, the virtual
//! clock, and the automatic address pools, and runs the simulation by
//! draining the scheduler. All driver-facing operations (adding devices,
//! wiring links, starting protocols, pinging) go through it.

use crate::device::{Device, SimCtx};
use crate::event::{Job, ListenKey, Observer, Scheduler, SimEvent};
use crate::iface::{Endpoint, Link};
use crate::routing::{Route, RouteKey, RouteKind, TableId};
use crate::types::{ConfigError, DeviceId, LinkId};
use ipnet::Ipv4Net;
use log::*;
use rand::prelude::*;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Exportable description of the topology, stable across invocations for
/// an unchanged set of clusters and links. Consumed by external rendering
/// collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyDescription {
    /// Clusters in creation order.
    pub clusters: Vec<ClusterDescription>,
    /// Links in creation order.
    pub links: Vec<LinkDescription>,
}

/// One cluster and its systems.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterDescription {
    /// Cluster name.
    pub name: String,
    /// Member systems in creation order.
    pub systems: Vec<SystemDescription>,
}

/// One device and its connected, addressed interfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDescription {
    /// Hostname.
    pub name: String,
    /// Interfaces: logical units with their IPv4 address, physical ports
    /// with their hardware address.
    pub interfaces: Vec<InterfaceDescription>,
}

/// One interface row of the export.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDescription {
    /// Interface name.
    pub name: String,
    /// Rendered address.
    pub address: String,
}

/// One link row of the export.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDescription {
    /// First endpoint.
    pub endpoint1: EndpointDescription,
    /// Second endpoint.
    pub endpoint2: EndpointDescription,
}

/// A link endpoint in the export.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescription {
    /// Hostname of the device.
    pub system: String,
    /// Physical interface name.
    pub iface: String,
}

/// A simulated multi-router topology under one virtual clock.
#[derive(Debug)]
pub struct Topology {
    name: String,
    area_id: String,
    sched: Scheduler,
    devices: Vec<Device>,
    links: Vec<Link>,
    clusters: Vec<(String, Vec<DeviceId>)>,
    collected: Vec<(String, SimEvent)>,
    next_tunnel_id: u32,
    loopback_net: Ipv4Net,
    next_loopback: u32,
    p2p_net: Ipv4Net,
    next_p2p: u32,
}

impl Topology {
    /// Creates a topology with the default RNG seed.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_seed(name, 1)
    }

    /// Creates a topology with an explicit RNG seed, for reproducing a
    /// specific interleaving.
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Topology {
            name: name.into(),
            area_id: "49.0001".to_string(),
            sched: Scheduler::new(seed),
            devices: Vec::new(),
            links: Vec::new(),
            clusters: Vec::new(),
            collected: Vec::new(),
            next_tunnel_id: 0,
            loopback_net: "192.168.50.0/24".parse().expect("well-formed literal"),
            next_loopback: 0,
            p2p_net: "100.65.0.0/16".parse().expect("well-formed literal"),
            next_p2p: 0,
        }
    }

    /// The topology name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current virtual time.
    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    /// Read access to a device.
    pub fn device(&self, id: DeviceId) -> &Device {
        &self.devices[id.0]
    }

    /// Read access to a link.
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    /// Finds a device by hostname.
    pub fn device_by_name(&self, hostname: &str) -> Option<DeviceId> {
        self.devices.iter().position(|dev| dev.hostname == hostname).map(DeviceId)
    }

    fn with_device<R>(
        &mut self,
        id: DeviceId,
        f: impl FnOnce(&mut Device, &mut SimCtx<'_>) -> R,
    ) -> R {
        let devices = &mut self.devices;
        let mut ctx = SimCtx {
            sched: &mut self.sched,
            links: &self.links,
            tunnel_ids: &mut self.next_tunnel_id,
        };
        f(&mut devices[id.0], &mut ctx)
    }

    fn cluster_entry(&mut self, cluster: &str) -> &mut Vec<DeviceId> {
        if let Some(idx) = self.clusters.iter().position(|(name, _)| name == cluster) {
            return &mut self.clusters[idx].1;
        }
        self.clusters.push((cluster.to_string(), Vec::new()));
        &mut self.clusters.last_mut().expect("just pushed").1
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    /// Adds a router with a loopback allocated from `192.168.50.0/24` and
    /// the given physical interfaces.
    pub fn add_router(
        &mut self,
        name: &str,
        interfaces: &[&str],
        cluster: &str,
    ) -> Result<DeviceId, ConfigError> {
        let loopback = self.alloc_loopback()?;
        let id = DeviceId(self.devices.len());
        let lo_mac = crate::packet::MacAddr::from_suffix(self.sched.rng().gen());
        let initial_label = self.sched.rng().gen_range(100, 501);
        let mut dev = Device::new_router(id, name, loopback, lo_mac, initial_label);
        if let Some(lo) = dev.logical_mut("lo.0") {
            lo.iso = Some(Self::build_iso_address(&self.area_id, loopback));
        }
        for iface in interfaces {
            let mac = crate::packet::MacAddr::from_suffix(self.sched.rng().gen());
            dev.add_phys(iface, mac);
        }
        dev.listen(ListenKey::Any, Observer::Collector);
        self.devices.push(dev);
        self.cluster_entry(cluster).push(id);
        self.with_device(id, |dev, ctx| dev.install_loopback_route(ctx));
        info!("added router {}", name);
        Ok(id)
    }

    /// Adds a server (single `et1` interface, no control-plane processes).
    pub fn add_server(&mut self, name: &str, cluster: &str) -> DeviceId {
        let id = DeviceId(self.devices.len());
        let mac = crate::packet::MacAddr::from_suffix(self.sched.rng().gen());
        let mut dev = Device::new_server(id, name, mac);
        dev.listen(ListenKey::Any, Observer::Collector);
        self.devices.push(dev);
        self.cluster_entry(cluster).push(id);
        info!("added server {}", name);
        id
    }

    /// Adds a physical interface to an existing device.
    pub fn add_physical_interface(&mut self, id: DeviceId, name: &str) {
        let mac = crate::packet::MacAddr::from_suffix(self.sched.rng().gen());
        self.devices[id.0].add_phys(name, mac);
    }

    /// Adds a logical unit with an optional `a.b.c.d/len` address.
    pub fn add_logical_interface(
        &mut self,
        id: DeviceId,
        phy: &str,
        unit: &str,
        address: Option<&str>,
    ) -> Result<(), ConfigError> {
        let ipv4 = match address {
            Some(text) => Some(
                text.parse::<Ipv4Net>()
                    .map_err(|_| ConfigError::BadAddress(text.to_string()))?,
            ),
            None => None,
        };
        self.devices[id.0].add_logical(phy, unit, ipv4)
    }

    /// Assigns an address to an interface, creating the `.0` unit when the
    /// name refers to a physical port.
    pub fn add_ip_address(
        &mut self,
        id: DeviceId,
        iface: &str,
        address: &str,
    ) -> Result<(), ConfigError> {
        let ipv4: Ipv4Net = address
            .parse()
            .map_err(|_| ConfigError::BadAddress(address.to_string()))?;
        let dev = &mut self.devices[id.0];
        if dev.logical(iface).is_some() {
            if let Some(logical) = dev.logical_mut(iface) {
                logical.ipv4 = Some(ipv4);
            }
            return Ok(());
        }
        if dev.phy(iface).is_some() {
            let unit = format!("{}.0", iface);
            return dev.add_logical(iface, &unit, Some(ipv4));
        }
        Err(ConfigError::UnknownInterface(iface.to_string()))
    }

    /// Links two routers on their first free physical interfaces,
    /// allocating a `/31` whose two hosts are consumed in iteration order.
    pub fn link_router_pair(
        &mut self,
        r1: DeviceId,
        r2: DeviceId,
        latency_ms: u64,
        te_metric: u32,
    ) -> Result<LinkId, ConfigError> {
        let p2p = self.alloc_p2p()?;
        let mut hosts = p2p.hosts();
        let host1 = hosts.next().ok_or(ConfigError::AddressExhausted)?;
        let host2 = hosts.next().ok_or(ConfigError::AddressExhausted)?;

        let iface1 = self.first_free_phy(r1)?;
        let iface2 = self.first_free_phy(r2)?;

        let unit1 = format!("{}.0", iface1);
        let unit2 = format!("{}.0", iface2);
        let net1 = Ipv4Net::new(host1, 31).expect("/31 is always valid");
        let net2 = Ipv4Net::new(host2, 31).expect("/31 is always valid");
        self.devices[r1.0].add_logical(&iface1, &unit1, Some(net1))?;
        self.devices[r2.0].add_logical(&iface2, &unit2, Some(net2))?;
        if let Some(logical) = self.devices[r1.0].logical_mut(&unit1) {
            logical.te_metric = te_metric;
        }
        if let Some(logical) = self.devices[r2.0].logical_mut(&unit2) {
            logical.te_metric = te_metric;
        }

        let link_id = LinkId(self.links.len());
        let mut link = Link::new(
            link_id,
            Endpoint { device: r1, iface: iface1.clone() },
            Endpoint { device: r2, iface: iface2.clone() },
            latency_ms,
        );
        if let Some(phy) = self.devices[r1.0].phy_mut(&iface1) {
            phy.link = Some(link_id);
        }
        if let Some(phy) = self.devices[r2.0].phy_mut(&iface2) {
            phy.link = Some(link_id);
        }
        link.up(&mut self.sched);
        self.links.push(link);
        info!(
            "linked {}/{} to {}/{}",
            self.devices[r1.0].hostname, unit1, self.devices[r2.0].hostname, unit2
        );
        Ok(link_id)
    }

    fn first_free_phy(&self, id: DeviceId) -> Result<String, ConfigError> {
        self.devices[id.0]
            .physical_interfaces()
            .find(|phy| !phy.is_loopback && phy.link.is_none())
            .map(|phy| phy.name.clone())
            .ok_or_else(|| ConfigError::NoFreeInterface(self.devices[id.0].hostname.clone()))
    }

    // ------------------------------------------------------------------
    // Link state
    // ------------------------------------------------------------------

    /// Administratively brings a physical interface (and its logical
    /// units) up or down, without touching any link. Used for stub
    /// interfaces that carry a network but no cable.
    pub fn set_interface_state(&mut self, id: DeviceId, phy: &str, up: bool) {
        let phy = phy.to_string();
        self.with_device(id, |dev, ctx| {
            if up {
                dev.endpoint_up(ctx, &phy);
            } else {
                dev.endpoint_down(ctx, &phy);
            }
        });
    }

    /// Brings a link up or down immediately.
    pub fn set_link_state(&mut self, id: LinkId, up: bool) {
        if up {
            self.links[id.0].up(&mut self.sched);
        } else {
            self.links[id.0].down(&mut self.sched);
        }
    }

    /// Schedules a link transition `delay` milliseconds from now.
    pub fn schedule_link_state(&mut self, delay: u64, id: LinkId, up: bool) {
        let job = if up { Job::LinkUp(id) } else { Job::LinkDown(id) };
        self.sched.enqueue(delay, job);
    }

    // ------------------------------------------------------------------
    // Protocols
    // ------------------------------------------------------------------

    /// Enables IS-IS on one interface of a router.
    pub fn enable_isis(&mut self, id: DeviceId, iface: &str, passive: bool, metric: u32) {
        let iface = iface.to_string();
        self.with_device(id, |dev, ctx| {
            dev.with_isis(ctx, |isis, dev, ctx| {
                isis.enable_interface(dev, ctx, &iface, passive, metric)
            });
        });
    }

    /// Starts IS-IS on a router.
    pub fn start_isis(&mut self, id: DeviceId) -> Result<(), ConfigError> {
        self.with_device(id, |dev, ctx| {
            dev.with_isis(ctx, |isis, dev, ctx| isis.start(dev, ctx)).unwrap_or(Ok(()))
        })
    }

    /// Starts RSVP on a router.
    pub fn start_rsvp(&mut self, id: DeviceId) {
        self.with_device(id, |dev, ctx| {
            dev.with_rsvp(ctx, |rsvp, dev, ctx| rsvp.start(dev, ctx));
        });
    }

    /// Enables IS-IS on every in-cluster interface of every router of the
    /// cluster: loopbacks passively, point-to-point interfaces with their
    /// TE metric. Interfaces whose link leaves the cluster stay disabled.
    pub fn isis_enable_all(&mut self, cluster: &str) {
        let members: BTreeSet<String> = self
            .cluster_members(cluster)
            .iter()
            .map(|id| self.devices[id.0].hostname.clone())
            .collect();
        let mut plan: Vec<(DeviceId, String, bool, u32)> = Vec::new();
        for id in self.cluster_members(cluster) {
            let dev = &self.devices[id.0];
            if !dev.is_router() {
                continue;
            }
            for phy in dev.physical_interfaces() {
                let in_cluster = match phy.link {
                    None => true,
                    Some(link_id) => {
                        let link = &self.links[link_id.0];
                        let h1 = &self.devices[link.endpoint1.device.0].hostname;
                        let h2 = &self.devices[link.endpoint2.device.0].hostname;
                        members.contains(h1) && members.contains(h2)
                    }
                };
                if !in_cluster {
                    continue;
                }
                for logical in &phy.logicals {
                    plan.push((id, logical.name.clone(), phy.is_loopback, logical.te_metric));
                }
            }
        }
        for (id, iface, passive, metric) in plan {
            info!(
                "requested IS-IS enable on {}/{}",
                self.devices[id.0].hostname, iface
            );
            self.enable_isis(id, &iface, passive, metric);
        }
    }

    /// Starts IS-IS on every router of a cluster.
    pub fn isis_start_all(&mut self, cluster: &str) -> Result<(), ConfigError> {
        for id in self.cluster_members(cluster) {
            if self.devices[id.0].is_router() {
                info!("starting IS-IS on {}", self.devices[id.0].hostname);
                self.start_isis(id)?;
            }
        }
        Ok(())
    }

    /// Starts RSVP on every router of a cluster.
    pub fn rsvp_start_all(&mut self, cluster: &str) {
        for id in self.cluster_members(cluster) {
            if self.devices[id.0].is_router() {
                info!("starting RSVP on {}", self.devices[id.0].hostname);
                self.start_rsvp(id);
            }
        }
    }

    fn cluster_members(&self, cluster: &str) -> Vec<DeviceId> {
        self.clusters
            .iter()
            .find(|(name, _)| name == cluster)
            .map(|(_, members)| members.clone())
            .unwrap_or_default()
    }

    /// Requests an RSVP-signaled LSP from `id` toward `dest_ip`.
    pub fn create_lsp(&mut self, id: DeviceId, name: &str, dest_ip: Ipv4Addr, link_protection: bool) {
        let name = name.to_string();
        self.with_device(id, |dev, ctx| {
            dev.with_rsvp(ctx, |rsvp, dev, ctx| {
                rsvp.create_session(dev, ctx, dest_ip, name, link_protection, None)
            });
        });
    }

    /// Installs a static route through a gateway interface (router form:
    /// the next hop is inferred from the interface).
    pub fn static_route(&mut self, id: DeviceId, prefix: &str, gw_iface: &str) {
        let prefix: Ipv4Net = match prefix.parse() {
            Ok(net) => net,
            Err(_) => {
                warn!("ignoring malformed static prefix {}", prefix);
                return;
            }
        };
        let route = Route::new(
            RouteKey::Prefix(prefix),
            RouteKind::Static,
            Some(gw_iface.to_string()),
            None,
        );
        self.add_route(id, route, TableId::Static);
    }

    /// Installs a static route with an explicit gateway address (server
    /// form).
    pub fn static_route_via(
        &mut self,
        id: DeviceId,
        prefix: &str,
        gateway: Ipv4Addr,
        gw_iface: &str,
    ) {
        let prefix: Ipv4Net = match prefix.parse() {
            Ok(net) => net,
            Err(_) => {
                warn!("ignoring malformed static prefix {}", prefix);
                return;
            }
        };
        let route = Route::new(
            RouteKey::Prefix(prefix),
            RouteKind::Static,
            Some(gw_iface.to_string()),
            Some(gateway),
        );
        self.add_route(id, route, TableId::Static);
    }

    /// Adds an arbitrary route to one of a device's tables (used by test
    /// drivers to inject BGP state).
    pub fn add_route(&mut self, id: DeviceId, route: Route, table: TableId) {
        self.with_device(id, |dev, ctx| dev.add_route(ctx, route, table, None));
    }

    /// Starts a ping from a device; returns the session id for reading the
    /// statistics back later.
    pub fn ping(&mut self, id: DeviceId, dest: Ipv4Addr, count: u32, timeout: u64) -> u64 {
        self.with_device(id, |dev, ctx| dev.ping(ctx, dest, count, timeout))
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Runs the simulation until the virtual clock reaches `tick`,
    /// returning the events collected on the way.
    pub fn run_until(&mut self, tick: u64) -> Vec<(String, SimEvent)> {
        self.collected.clear();
        let mut delay = self.run_due();
        while self.sched.now() < tick {
            self.sched.advance(delay.unwrap_or(1).max(1));
            delay = self.run_due();
        }
        self.collected.clone()
    }

    /// Runs for another `delta` milliseconds.
    pub fn run_another(&mut self, delta: u64) -> Vec<(String, SimEvent)> {
        self.run_until(self.sched.now() + delta)
    }

    /// Executes everything due at the current tick and returns the delay
    /// until the next pending job.
    fn run_due(&mut self) -> Option<u64> {
        while let Some(job) = self.sched.pop_due() {
            self.execute(job);
            self.drain_observed();
        }
        self.sched.next_delay()
    }

    fn drain_observed(&mut self) {
        for dev in &mut self.devices {
            if !dev.observed.is_empty() {
                let hostname = dev.hostname.clone();
                self.collected
                    .extend(dev.observed.drain(..).map(|event| (hostname.clone(), event)));
            }
        }
    }

    fn execute(&mut self, job: Job) {
        match job {
            Job::Observe(id, event) => self.with_device(id, |dev, ctx| dev.publish(ctx, event)),
            Job::Deliver { device, phy, frame } => {
                self.with_device(device, |dev, ctx| dev.deliver(ctx, &phy, frame))
            }
            Job::EndpointUp(id, phy) => {
                self.with_device(id, |dev, ctx| dev.endpoint_up(ctx, &phy))
            }
            Job::EndpointDown(id, phy) => {
                self.with_device(id, |dev, ctx| dev.endpoint_down(ctx, &phy))
            }
            Job::LinkUp(id) => self.links[id.0].up(&mut self.sched),
            Job::LinkDown(id) => self.links[id.0].down(&mut self.sched),
            Job::PfeAccept { device, frame, dest_iface } => {
                self.with_device(device, |dev, ctx| dev.pfe_accept_frame(ctx, frame, dest_iface))
            }
            Job::IsisHello(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| isis.on_hello_timer(dev, ctx));
                });
            }
            Job::IsisPsnp(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| isis.on_psnp_timer(dev, ctx));
                });
            }
            Job::IsisLspTx(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| isis.on_lsp_timer(dev, ctx));
                });
            }
            Job::IsisCsnp(id, iface) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| {
                        isis.send_complete_snp(dev, ctx, Some(&iface))
                    });
                });
            }
            Job::IsisRefreshLocal(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| isis.on_refresh_timer(dev, ctx));
                });
            }
            Job::IsisSpf(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_isis(ctx, |isis, dev, ctx| isis.run_spf(dev, ctx));
                });
            }
            Job::RsvpRefresh(id) => {
                self.with_device(id, |dev, ctx| {
                    dev.with_rsvp(ctx, |rsvp, dev, ctx| rsvp.on_refresh(dev, ctx));
                });
            }
            Job::RsvpCreateBypass { device, iface, protected_ip } => {
                self.with_device(device, |dev, ctx| {
                    dev.with_rsvp(ctx, |rsvp, dev, ctx| {
                        rsvp.create_bypass_lsp(dev, ctx, &iface, protected_ip)
                    });
                });
            }
            Job::PingSend(id, session) => {
                self.with_device(id, |dev, ctx| dev.ping_send(ctx, session))
            }
            Job::PingCheck(id, session) => {
                self.with_device(id, |dev, ctx| dev.ping_check(ctx, session))
            }
        }
    }

    // ------------------------------------------------------------------
    // Export & addressing
    // ------------------------------------------------------------------

    /// The exportable topology description.
    pub fn get_topology(&self) -> TopologyDescription {
        let mut clusters = Vec::new();
        for (name, members) in &self.clusters {
            let mut systems = Vec::new();
            for id in members {
                let dev = &self.devices[id.0];
                let mut interfaces = Vec::new();
                for phy in dev.physical_interfaces() {
                    if phy.link.is_none() {
                        continue;
                    }
                    for logical in &phy.logicals {
                        if let Some(net) = logical.ipv4 {
                            interfaces.push(InterfaceDescription {
                                name: logical.name.clone(),
                                address: net.to_string(),
                            });
                        }
                    }
                    interfaces.push(InterfaceDescription {
                        name: phy.name.clone(),
                        address: phy.hw_address.to_string(),
                    });
                }
                systems.push(SystemDescription { name: dev.hostname.clone(), interfaces });
            }
            clusters.push(ClusterDescription { name: name.clone(), systems });
        }
        let links = self
            .links
            .iter()
            .map(|link| LinkDescription {
                endpoint1: EndpointDescription {
                    system: self.devices[link.endpoint1.device.0].hostname.clone(),
                    iface: link.endpoint1.iface.clone(),
                },
                endpoint2: EndpointDescription {
                    system: self.devices[link.endpoint2.device.0].hostname.clone(),
                    iface: link.endpoint2.iface.clone(),
                },
            })
            .collect();
        TopologyDescription { clusters, links }
    }

    /// Builds an ISO NET address from an area id and a loopback: each
    /// octet becomes three decimal digits, the twelve digits are grouped
    /// into dotted four-digit chunks, and selector `.0001.00` is appended.
    pub fn build_iso_address(area_id: &str, loopback: Ipv4Addr) -> String {
        let mut digits = String::new();
        for octet in loopback.octets().iter() {
            digits.push_str(&format!("{:03}", octet));
        }
        let grouped = format!("{}.{}.{}", &digits[0..4], &digits[4..8], &digits[8..12]);
        format!("{}.{}.0001.00", area_id, grouped)
    }

    fn alloc_loopback(&mut self) -> Result<Ipv4Addr, ConfigError> {
        self.next_loopback += 1;
        let base = u32::from(self.loopback_net.network());
        let candidate = Ipv4Addr::from(base + self.next_loopback);
        if !self.loopback_net.contains(&candidate) || self.next_loopback >= 255 {
            return Err(ConfigError::AddressExhausted);
        }
        Ok(candidate)
    }

    fn alloc_p2p(&mut self) -> Result<Ipv4Net, ConfigError> {
        let base = u32::from(self.p2p_net.network());
        let offset = self.next_p2p.checked_mul(2).ok_or(ConfigError::AddressExhausted)?;
        let candidate = Ipv4Addr::from(base + offset);
        if !self.p2p_net.contains(&candidate) {
            return Err(ConfigError::AddressExhausted);
        }
        self.next_p2p += 1;
        Ipv4Net::new(candidate, 31).map_err(|_| ConfigError::AddressExhausted)
    }
}
