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

//! The IS-IS link-state process (ISO/IEC 10589 with the RFC 1195 IP
//! extensions and RFC 5305 TE TLVs), restricted to Level 1 point-to-point
//! circuits: the adjacency state machine, the link-state database with its
//! SRM/SSN flooding duties, CSNP/PSNP synchronization, event-driven local
//! LSP regeneration, and the modified Dijkstra that feeds the routing
//! table.

pub mod pdu;

use crate::device::{Device, SimCtx};
use crate::event::{EventKind, EventObject, IsisSub, Job, ListenKey, Observer, SimEvent, SubKind};
use crate::iface::p2p_peer;
use crate::packet::{FramePayload, MacAddr};
use crate::routing::{Route, RouteKey, RouteKind, TableId};
use crate::types::{ConfigError, SystemId};
use ipnet::Ipv4Net;
use log::*;
use pdu::{
    AdjState, ExtIpReach, ExtIsReach, HelloPdu, IsisPdu, LspEntry, LspPdu, SnpPdu, SubTlv, Tlv,
};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

const HELLO_INTERVAL: u64 = 3000;
const PARTIAL_SNP_INTERVAL: u64 = 100;
const MINIMUM_LSP_INTERVAL: u64 = 100;
const SPF_DELAY: u64 = 200;
const REFRESH_DELAY: u64 = 10;
const DEFAULT_LIFETIME: u32 = 1200;

/// Per-interface IS-IS configuration. Passive interfaces are advertised
/// but form no adjacency.
#[derive(Debug, Clone)]
pub struct IfaceConfig {
    /// False for passive interfaces.
    pub active: bool,
    /// Circuit metric.
    pub metric: u32,
    /// Point-to-point; the only mode this simulator implements.
    pub p2p: bool,
}

/// An adjacency with another system on one interface.
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// The neighbor's system id.
    pub system_id: SystemId,
    /// Interface the adjacency lives on.
    pub interface_name: String,
    /// Adjacency state.
    pub state: AdjState,
    /// The neighbor's interface address on the shared link, learned from
    /// its hellos.
    pub address: Option<Ipv4Addr>,
    /// Metric toward the neighbor.
    pub metric: u32,
}

/// A database entry: the stored LSP plus its flooding duties. `srm` names
/// the interfaces the LSP still has to be sent on, `ssn` the interfaces it
/// has to be acknowledged on via a PSNP.
#[derive(Debug, Clone)]
pub struct DatabaseEntry {
    /// The stored PDU.
    pub pdu: LspPdu,
    /// Remaining lifetime in seconds. Aging is out of scope; the value is
    /// carried in SNP entries.
    pub remaining_lifetime: u32,
    /// Virtual time of the last transmission.
    pub last_sent: u64,
    srm: BTreeSet<String>,
    ssn: BTreeSet<String>,
}

impl DatabaseEntry {
    fn new(pdu: LspPdu) -> Self {
        DatabaseEntry {
            pdu,
            remaining_lifetime: DEFAULT_LIFETIME,
            last_sent: 0,
            srm: BTreeSet::new(),
            ssn: BTreeSet::new(),
        }
    }

    /// The stored sequence number.
    pub fn seq_no(&self) -> u32 {
        self.pdu.seq_no
    }

    /// Interfaces this LSP still needs to be flooded on.
    pub fn srm_interfaces(&self) -> impl Iterator<Item = &String> {
        self.srm.iter()
    }

    /// Interfaces this LSP still needs to be acknowledged on.
    pub fn ssn_interfaces(&self) -> impl Iterator<Item = &String> {
        self.ssn.iter()
    }

    fn set_srm(&mut self, iface: &str) {
        self.srm.insert(iface.to_string());
    }

    fn clear_srm(&mut self, iface: &str) {
        self.srm.remove(iface);
    }

    fn set_ssn(&mut self, iface: &str) {
        self.ssn.insert(iface.to_string());
    }

    fn clear_ssn(&mut self, iface: &str) {
        self.ssn.remove(iface);
    }
}

/// The IS-IS process of one router.
#[derive(Debug)]
pub struct IsisProcess {
    hostname: String,
    started: bool,
    system_id: Option<SystemId>,
    area_id: Option<String>,
    interfaces: BTreeMap<String, IfaceConfig>,
    adjacencies: BTreeMap<String, BTreeMap<SystemId, Neighbor>>,
    database: BTreeMap<SystemId, DatabaseEntry>,
    spf_pending: bool,
    system_distance: BTreeMap<SystemId, u32>,
    system_paths: BTreeMap<SystemId, Vec<SystemId>>,
    address_paths: BTreeMap<Ipv4Net, Vec<SystemId>>,
    address_distances: BTreeMap<Ipv4Net, u32>,
}

impl IsisProcess {
    pub(crate) fn new(hostname: String) -> Self {
        IsisProcess {
            hostname,
            started: false,
            system_id: None,
            area_id: None,
            interfaces: BTreeMap::new(),
            adjacencies: BTreeMap::new(),
            database: BTreeMap::new(),
            spf_pending: false,
            system_distance: BTreeMap::new(),
            system_paths: BTreeMap::new(),
            address_paths: BTreeMap::new(),
            address_distances: BTreeMap::new(),
        }
    }

    /// The link-state database.
    pub fn database(&self) -> &BTreeMap<SystemId, DatabaseEntry> {
        &self.database
    }

    /// Our system id, once started.
    pub fn system_id(&self) -> Option<&SystemId> {
        self.system_id.as_ref()
    }

    /// The per-interface configuration.
    pub fn interfaces(&self) -> &BTreeMap<String, IfaceConfig> {
        &self.interfaces
    }

    /// All adjacencies, keyed by interface then neighbor.
    pub fn adjacencies(&self) -> &BTreeMap<String, BTreeMap<SystemId, Neighbor>> {
        &self.adjacencies
    }

    /// Distance of the last SPF run to the system advertising `router_id`
    /// as its TE router id.
    pub fn distance_to_router(&self, router_id: Ipv4Addr) -> Option<u32> {
        let system = self
            .database
            .iter()
            .find(|(_, entry)| entry.pdu.router_id() == Some(router_id))
            .map(|(id, _)| id)?;
        self.system_distance.get(system).copied()
    }

    /// Distance of the last SPF run to an advertised prefix.
    pub fn address_distance(&self, prefix: Ipv4Net) -> Option<u32> {
        self.address_distances.get(&prefix).copied()
    }

    /// Enables IS-IS on a logical interface.
    pub(crate) fn enable_interface(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        name: &str,
        passive: bool,
        metric: u32,
    ) {
        self.interfaces
            .insert(name.to_string(), IfaceConfig { active: !passive, metric, p2p: true });
        self.adjacencies.entry(name.to_string()).or_insert_with(BTreeMap::new);
        let event = SimEvent::new(
            EventKind::Isis,
            "ISIS",
            format!("ADD_INTERFACE ({}->{})", name, passive),
        )
        .sub(SubKind::Isis(IsisSub::InterfaceAdd));
        dev.publish(ctx, event);
    }

    /// Starts the process: derives the area and system id from the ISO
    /// address, generates the initial local LSP, and arms the timers.
    pub(crate) fn start(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
    ) -> Result<(), ConfigError> {
        if self.started {
            return Ok(());
        }
        let iso = self
            .interfaces
            .keys()
            .find_map(|name| dev.logical(name).and_then(|l| l.iso.clone()))
            .ok_or_else(|| ConfigError::MissingIsoAddress(self.hostname.clone()))?;
        let parts: Vec<&str> = iso.split('.').collect();
        if parts.len() < 6 {
            return Err(ConfigError::MissingIsoAddress(self.hostname.clone()));
        }
        self.area_id = Some(format!("{}.{}", parts[0], parts[1]));
        self.system_id = Some(SystemId(format!("{}.{}.{}", parts[2], parts[3], parts[4])));
        self.started = true;

        self.refresh_local(dev, ctx);

        ctx.sched.enqueue_jittered(HELLO_INTERVAL, Job::IsisHello(dev.id));
        ctx.sched.enqueue_jittered(PARTIAL_SNP_INTERVAL, Job::IsisPsnp(dev.id));
        ctx.sched.enqueue_jittered(MINIMUM_LSP_INTERVAL, Job::IsisLspTx(dev.id));
        dev.listen(ListenKey::Kind(EventKind::LinkState), Observer::IsisLinkWatch);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    pub(crate) fn on_hello_timer(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if !self.started {
            return;
        }
        self.send_hellos(dev, ctx);
        ctx.sched.enqueue_jittered(HELLO_INTERVAL, Job::IsisHello(dev.id));
    }

    pub(crate) fn on_psnp_timer(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if !self.started {
            return;
        }
        self.send_partial_snps(dev, ctx);
        ctx.sched.enqueue_jittered(PARTIAL_SNP_INTERVAL, Job::IsisPsnp(dev.id));
    }

    pub(crate) fn on_lsp_timer(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if !self.started {
            return;
        }
        self.send_lsps(dev, ctx);
        ctx.sched.enqueue_jittered(MINIMUM_LSP_INTERVAL, Job::IsisLspTx(dev.id));
    }

    /// Called on any link transition (via the bus watcher): regenerate the
    /// local LSP shortly after the dust settles.
    pub(crate) fn on_refresh_timer(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        self.refresh_local(dev, ctx);
    }

    fn send_hellos(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        let system_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };
        let area = self.area_id.clone().unwrap_or_default();
        let names: Vec<String> = self
            .interfaces
            .iter()
            .filter(|(_, cfg)| cfg.active && cfg.p2p)
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            if !dev.iface_up(&name) {
                continue;
            }
            let mut tlvs = vec![Tlv::AreaAddress(area.clone())];
            if let Some(address) = dev.logical(&name).and_then(|l| l.address()) {
                tlvs.push(Tlv::IpAddress(address));
            }
            if let Some(neighbors) = self.adjacencies.get_mut(&name) {
                for neighbor in neighbors.values_mut() {
                    if neighbor.state == AdjState::New || neighbor.state == AdjState::Down {
                        neighbor.state = AdjState::Initializing;
                    }
                    tlvs.push(Tlv::P2pAdjacency {
                        system_id: neighbor.system_id.clone(),
                        state: neighbor.state,
                    });
                }
            }
            let hello = IsisPdu::Hello(HelloPdu { source: system_id.clone(), tlvs });
            dev.send_frame_on_logical(ctx, &name, MacAddr::BROADCAST, FramePayload::Clns(hello));
        }
    }

    /// Sends a CSNP summarizing the whole database, on one interface or on
    /// all active ones.
    pub(crate) fn send_complete_snp(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        only_iface: Option<&str>,
    ) {
        let system_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };
        debug!("[{}] request to send CSNP via {:?}", self.hostname, only_iface);
        // Entries sorted by LSP id; the database iterates in key order.
        let entries: Vec<LspEntry> = self
            .database
            .values()
            .map(|entry| LspEntry {
                lsp_id: entry.pdu.lsp_id.clone(),
                seq_no: entry.seq_no(),
                remaining_lifetime: entry.remaining_lifetime,
                hostname: entry.pdu.hostname().map(|s| s.to_string()),
            })
            .collect();
        let names: Vec<String> = self
            .interfaces
            .iter()
            .filter(|(name, cfg)| {
                cfg.active && only_iface.map(|only| only == name.as_str()).unwrap_or(true)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            if dev.iface_up(&name) {
                debug!("[{}] sending CSNP via {}", self.hostname, name);
                let pdu =
                    IsisPdu::Csnp(SnpPdu { source: system_id.clone(), entries: entries.clone() });
                dev.send_frame_on_logical(ctx, &name, MacAddr::BROADCAST, FramePayload::Clns(pdu));
            }
        }
    }

    fn send_partial_snps(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        let system_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };
        let iface_names: Vec<String> = self.adjacencies.keys().cloned().collect();
        for name in iface_names {
            if !self.has_up_neighbor(&name) {
                continue;
            }
            let candidates: Vec<SystemId> = self
                .database
                .iter()
                .filter(|(_, entry)| entry.ssn.contains(&name))
                .map(|(id, _)| id.clone())
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let mut entries = Vec::new();
            for id in &candidates {
                if let Some(entry) = self.database.get_mut(id) {
                    entries.push(LspEntry {
                        lsp_id: entry.pdu.lsp_id.clone(),
                        seq_no: entry.seq_no(),
                        remaining_lifetime: entry.remaining_lifetime,
                        hostname: entry.pdu.hostname().map(|s| s.to_string()),
                    });
                    entry.clear_ssn(&name);
                    debug!("[{}] added {} to PSNP through {}", self.hostname, id, name);
                }
            }
            if dev.iface_up(&name) {
                let pdu = IsisPdu::Psnp(SnpPdu { source: system_id.clone(), entries });
                dev.send_frame_on_logical(ctx, &name, MacAddr::BROADCAST, FramePayload::Clns(pdu));
            }
        }
    }

    /// Transmits every LSP flagged with SRM on the flagged interfaces.
    /// SRM stays set until the copy is acknowledged through a SNP.
    fn send_lsps(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        let now = ctx.sched.now();
        let mut to_send: Vec<(SystemId, String)> = Vec::new();
        for (id, entry) in &self.database {
            for iface in &entry.srm {
                to_send.push((id.clone(), iface.clone()));
            }
        }
        for (id, iface) in to_send {
            if !self.has_up_neighbor(&iface) || !dev.iface_up(&iface) {
                continue;
            }
            if let Some(entry) = self.database.get_mut(&id) {
                entry.last_sent = now;
                let pdu = IsisPdu::Lsp(entry.pdu.clone());
                dev.send_frame_on_logical(ctx, &iface, MacAddr::BROADCAST, FramePayload::Clns(pdu));
            }
        }
    }

    // ------------------------------------------------------------------
    // Local LSP generation
    // ------------------------------------------------------------------

    /// Regenerates our own LSP from the current interface and adjacency
    /// state (ISO 10589 §7.3.6, event-driven generation). When the content
    /// changed, the sequence number is bumped, the LSP is flagged for
    /// flooding on every up interface, and an SPF run is scheduled.
    pub(crate) fn refresh_local(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if !self.started {
            return;
        }
        let system_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };

        let mut new = false;
        if !self.database.contains_key(&system_id) {
            let mut lsp = LspPdu {
                source: system_id.clone(),
                lsp_id: system_id.clone(),
                seq_no: 1,
                tlvs: Vec::new(),
            };
            lsp.tlvs.push(Tlv::DynamicHostname(self.hostname.clone()));
            if let Some(loopback) = dev.loopback() {
                lsp.tlvs.push(Tlv::TeRouterId(loopback));
            }
            self.database.insert(system_id.clone(), DatabaseEntry::new(lsp));
            new = true;
        }

        let mut changed = false;
        let mut up_interfaces: Vec<String> = Vec::new();
        let mut adjacency_events: Vec<SimEvent> = Vec::new();

        let iface_cfgs: Vec<(String, u32)> =
            self.interfaces.iter().map(|(name, cfg)| (name.clone(), cfg.metric)).collect();

        for (name, metric) in iface_cfgs {
            let iface_up = dev.iface_up(&name);
            let net = dev.logical(&name).and_then(|l| l.ipv4);
            if iface_up {
                up_interfaces.push(name.clone());
            }

            let neighbor_ids: Vec<SystemId> = self
                .adjacencies
                .get(&name)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();

            for neighbor_id in neighbor_ids {
                let (state, learned_address) = {
                    let neighbor = self
                        .adjacencies
                        .get_mut(&name)
                        .and_then(|m| m.get_mut(&neighbor_id))
                        .expect("neighbor listed a moment ago");
                    if !iface_up && neighbor.state != AdjState::Down {
                        neighbor.state = AdjState::Down;
                        adjacency_events.push(
                            SimEvent::new(
                                EventKind::Isis,
                                "ISIS",
                                format!("Mark ({})->DOWN", neighbor.system_id),
                            )
                            .sub(SubKind::Isis(IsisSub::AdjChange))
                            .object(EventObject::Neighbor {
                                system_id: neighbor.system_id.clone(),
                                state: AdjState::Down.to_string(),
                            }),
                        );
                    }
                    (neighbor.state, neighbor.address)
                };

                let own = self.database.get_mut(&system_id).expect("own LSP inserted above");
                if state == AdjState::Down {
                    if own.pdu.remove_neighbor(&neighbor_id) {
                        changed = true;
                    }
                    continue;
                }
                if state != AdjState::Up {
                    continue;
                }

                let existing = own.pdu.tlvs.iter().position(|tlv| {
                    matches!(tlv, Tlv::ExtIsReach(reach) if reach.system_id == neighbor_id)
                });
                if let Some(idx) = existing {
                    if let Tlv::ExtIsReach(reach) = &mut own.pdu.tlvs[idx] {
                        if reach.metric != metric {
                            reach.metric = metric;
                            changed = true;
                        }
                    }
                } else {
                    let mut subs = Vec::new();
                    if let Some(net) = net {
                        subs.push(SubTlv::IpInterfaceAddress {
                            address: net.addr(),
                            up: iface_up,
                        });
                        // Prefer the address learned from hellos; fall
                        // back to the other host of the /31.
                        let neighbor_address = learned_address.or_else(|| p2p_peer(net));
                        if let Some(address) = neighbor_address {
                            subs.push(SubTlv::NeighborIpAddress(address));
                        }
                    }
                    own.pdu.tlvs.push(Tlv::ExtIsReach(ExtIsReach {
                        system_id: neighbor_id.clone(),
                        metric,
                        subs,
                    }));
                    changed = true;
                }
            }

            if let Some(net) = net {
                let prefix = net.trunc();
                let own = self.database.get_mut(&system_id).expect("own LSP inserted above");
                let existing = own
                    .pdu
                    .tlvs
                    .iter()
                    .position(|tlv| matches!(tlv, Tlv::ExtIpReach(reach) if reach.prefix == prefix));
                if let Some(idx) = existing {
                    if let Tlv::ExtIpReach(reach) = &mut own.pdu.tlvs[idx] {
                        if reach.metric != metric {
                            reach.metric = metric;
                            changed = true;
                        }
                        if reach.up != iface_up {
                            reach.up = iface_up;
                            changed = true;
                        }
                    }
                } else {
                    own.pdu.tlvs.push(Tlv::ExtIpReach(ExtIpReach {
                        prefix,
                        metric,
                        up: iface_up,
                    }));
                    changed = true;
                }
            }
        }

        for event in adjacency_events {
            dev.publish(ctx, event);
        }

        if changed || new {
            let own = self.database.get_mut(&system_id).expect("own LSP inserted above");
            if changed && !new {
                own.pdu.seq_no += 1;
            }
            for iface in &up_interfaces {
                own.set_srm(iface);
            }
            self.schedule_spf(dev, ctx);
        }
    }

    // ------------------------------------------------------------------
    // PDU processing
    // ------------------------------------------------------------------

    /// Dispatches a received IS-IS PDU.
    pub(crate) fn process_pdu(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        pdu: IsisPdu,
    ) {
        match pdu {
            IsisPdu::Hello(hello) => self.process_hello(dev, ctx, iface, hello),
            IsisPdu::Csnp(snp) => self.process_snp(dev, ctx, iface, &snp, true),
            IsisPdu::Psnp(snp) => self.process_snp(dev, ctx, iface, &snp, false),
            IsisPdu::Lsp(lsp) => self.process_lsp(dev, ctx, iface, lsp),
        }
    }

    fn process_hello(
        &mut self,
        dev: &mut Device,
        ctx: &mut SimCtx<'_>,
        iface: &str,
        hello: HelloPdu,
    ) {
        let our_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };
        if !self.adjacencies.contains_key(iface) {
            warn!("[{}] received hello on {}, but IS-IS not enabled", self.hostname, iface);
            return;
        }

        let source = hello.source.clone();
        let neighbors = self.adjacencies.get_mut(iface).expect("checked above");
        let neighbor = neighbors.entry(source.clone()).or_insert_with(|| Neighbor {
            system_id: source.clone(),
            interface_name: iface.to_string(),
            state: AdjState::New,
            address: None,
            metric: 10,
        });

        for tlv in &hello.tlvs {
            if let Tlv::IpAddress(address) = tlv {
                neighbor.address = Some(*address);
            }
        }

        let mut transition: Option<AdjState> = None;
        for tlv in &hello.tlvs {
            if let Tlv::P2pAdjacency { system_id, state } = tlv {
                if *system_id != our_id {
                    continue;
                }
                // They see us: one- or two-way confirmation.
                if *state == AdjState::Up || *state == AdjState::Initializing {
                    match neighbor.state {
                        AdjState::Initializing => {
                            neighbor.state = AdjState::Up;
                            neighbor.interface_name = iface.to_string();
                            transition = Some(AdjState::Up);
                        }
                        AdjState::New => {
                            neighbor.state = AdjState::Initializing;
                            transition = Some(AdjState::Initializing);
                        }
                        _ => {}
                    }
                }
            }
        }

        if let Some(state) = transition {
            let event = SimEvent::new(EventKind::Isis, "ISIS", format!("Mark ({})->{}", source, state))
                .sub(SubKind::Isis(IsisSub::AdjChange))
                .object(EventObject::Neighbor { system_id: source, state: state.to_string() });
            dev.publish(ctx, event);
            if state == AdjState::Up {
                self.refresh_local(dev, ctx);
                ctx.sched.enqueue(1, Job::IsisCsnp(dev.id, iface.to_string()));
            }
        }
    }

    /// ISO 10589 §7.3.15.2, action on receipt of a sequence-numbers PDU.
    fn process_snp(
        &mut self,
        _dev: &mut Device,
        _ctx: &mut SimCtx<'_>,
        iface: &str,
        snp: &SnpPdu,
        complete: bool,
    ) {
        let mut seen: BTreeSet<SystemId> = BTreeSet::new();
        for entry in &snp.entries {
            seen.insert(entry.lsp_id.clone());
            if !self.database.contains_key(&entry.lsp_id) {
                // Never heard of it: remember the id and ask for the
                // content through a PSNP.
                let mut placeholder =
                    DatabaseEntry::new(LspPdu::placeholder(entry.lsp_id.clone()));
                placeholder.set_ssn(iface);
                placeholder.clear_srm(iface);
                self.database.insert(entry.lsp_id.clone(), placeholder);
                continue;
            }
            if let Some(lsp) = self.database.get_mut(&entry.lsp_id) {
                if lsp.seq_no() == entry.seq_no {
                    lsp.clear_srm(iface);
                } else if lsp.seq_no() > entry.seq_no {
                    // We are more current; they need our copy.
                    lsp.set_srm(iface);
                    lsp.clear_ssn(iface);
                } else {
                    lsp.set_ssn(iface);
                    lsp.clear_srm(iface);
                }
            }
        }
        if complete {
            // Anything the sender's complete summary did not mention must
            // be flooded to it, unless we only hold a placeholder.
            for (id, lsp) in self.database.iter_mut() {
                if !seen.contains(id) && lsp.seq_no() > 0 {
                    lsp.set_srm(iface);
                }
            }
        }
    }

    /// ISO 10589 §7.3.15.1, action on receipt of a link-state PDU.
    fn process_lsp(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>, iface: &str, lsp: LspPdu) {
        if !self.has_up_neighbor(iface) {
            debug!(
                "[{}] received LSP on {}, but do not have UP neighbor, ignoring",
                self.hostname, iface
            );
            return;
        }
        let current_seq = self.database.get(&lsp.lsp_id).map(|entry| entry.seq_no());
        match current_seq {
            Some(seq) if seq == lsp.seq_no => {
                // They sent what we hold; nothing to flood back, but
                // acknowledge it.
                if let Some(entry) = self.database.get_mut(&lsp.lsp_id) {
                    entry.clear_srm(iface);
                    entry.set_ssn(iface);
                }
            }
            Some(seq) if seq > lsp.seq_no => {
                // We win; give them the newer copy.
                if let Some(entry) = self.database.get_mut(&lsp.lsp_id) {
                    entry.set_srm(iface);
                    entry.clear_ssn(iface);
                }
            }
            _ => {
                let lsp_id = lsp.lsp_id.clone();
                let seq_no = lsp.seq_no;
                let mut entry = DatabaseEntry::new(lsp);
                for (name, cfg) in &self.interfaces {
                    if cfg.active {
                        entry.set_srm(name);
                        if name != iface {
                            entry.clear_ssn(name);
                        }
                    }
                }
                entry.clear_srm(iface);
                entry.set_ssn(iface);
                self.database.insert(lsp_id.clone(), entry);
                let event = SimEvent::new(
                    EventKind::Isis,
                    "ISIS",
                    format!("Added LSP Entry {}(seq={})", lsp_id, seq_no),
                )
                .sub(SubKind::Isis(IsisSub::LspAdded))
                .object(EventObject::Lsp { lsp_id, seq_no });
                dev.publish(ctx, event);
                self.schedule_spf(dev, ctx);
            }
        }
    }

    // ------------------------------------------------------------------
    // SPF
    // ------------------------------------------------------------------

    /// Debounces a Dijkstra run behind `spf_pending`.
    pub(crate) fn schedule_spf(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        if self.spf_pending {
            return;
        }
        self.spf_pending = true;
        let event = SimEvent::new(EventKind::Isis, "ISIS", "SPF pending")
            .sub(SubKind::Isis(IsisSub::SpfPending));
        dev.publish(ctx, event);
        ctx.sched.enqueue(SPF_DELAY, Job::IsisSpf(dev.id));
    }

    /// The full Dijkstra over the link-state database, relaxing both
    /// system edges and the prefixes each system advertises. Aborts
    /// without touching the routing table when the database references a
    /// system it does not contain (not yet converged).
    pub(crate) fn run_spf(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        self.spf_pending = false;
        let self_id = match &self.system_id {
            Some(id) => id.clone(),
            None => return,
        };
        info!("[{}] starting SPF run", self.hostname);

        let mut system_distance: BTreeMap<SystemId, u32> = BTreeMap::new();
        let mut prev_system: BTreeMap<SystemId, Option<SystemId>> = BTreeMap::new();
        let mut queue: Vec<SystemId> = Vec::new();
        for id in self.database.keys() {
            system_distance.insert(id.clone(), u32::max_value());
            prev_system.insert(id.clone(), None);
            queue.push(id.clone());
        }
        system_distance.insert(self_id.clone(), 0);

        let mut distance: BTreeMap<Ipv4Net, u32> = BTreeMap::new();
        let mut prev: BTreeMap<Ipv4Net, SystemId> = BTreeMap::new();

        while !queue.is_empty() {
            let min_idx = queue
                .iter()
                .enumerate()
                .min_by_key(|(_, id)| system_distance.get(*id).copied().unwrap_or(u32::max_value()))
                .map(|(idx, _)| idx)
                .unwrap_or(0);
            let node = queue.remove(min_idx);
            let node_distance = system_distance.get(&node).copied().unwrap_or(u32::max_value());
            let lsp = &self.database[&node].pdu;

            for reach in lsp.neighbors() {
                let neighbor_id = &reach.system_id;
                if !system_distance.contains_key(neighbor_id) {
                    // The database references a system we have no LSP for.
                    debug!("[{}] SPF not converged, missing {}", self.hostname, neighbor_id);
                    return;
                }
                let new_distance = node_distance.saturating_add(reach.metric);
                if new_distance < system_distance[neighbor_id] {
                    system_distance.insert(neighbor_id.clone(), new_distance);
                    prev_system.insert(neighbor_id.clone(), Some(node.clone()));
                }
            }

            for reach in lsp.addresses() {
                if !reach.up {
                    continue;
                }
                let new_distance = node_distance.saturating_add(reach.metric);
                let better = distance.get(&reach.prefix).map_or(true, |d| *d > new_distance);
                if better {
                    distance.insert(reach.prefix, new_distance);
                    prev.insert(reach.prefix, node.clone());
                }
            }
        }

        let resolve_path = |start: Option<&SystemId>| -> Vec<SystemId> {
            let mut path = Vec::new();
            let mut cursor = start.cloned();
            while let Some(current) = cursor {
                if current != self_id {
                    path.push(current.clone());
                }
                cursor = prev_system.get(&current).cloned().flatten();
            }
            path
        };

        let mut address_paths: BTreeMap<Ipv4Net, Vec<SystemId>> = BTreeMap::new();
        for (address, via) in &prev {
            let mut path = resolve_path(Some(via));
            path.reverse();
            address_paths.insert(*address, path);
        }
        let mut system_paths: BTreeMap<SystemId, Vec<SystemId>> = BTreeMap::new();
        for id in prev_system.keys() {
            let path = resolve_path(prev_system.get(id).and_then(|p| p.as_ref()));
            system_paths.insert(id.clone(), path);
        }

        self.system_distance = system_distance;
        self.system_paths = system_paths;
        self.address_paths = address_paths;
        self.address_distances = distance;

        let event = SimEvent::new(EventKind::Isis, "ISIS", "Recalculated shortest paths")
            .sub(SubKind::Isis(IsisSub::SpfRun));
        dev.publish(ctx, event);
        self.update_routing_table(dev, ctx);
    }

    /// Converts the SPF result into IS-IS routes and replaces the `isis`
    /// table. The first hop of each path supplies the egress interface and
    /// the next-hop address.
    fn update_routing_table(&mut self, dev: &mut Device, ctx: &mut SimCtx<'_>) {
        let mut routes = Vec::new();
        for (address, path) in &self.address_paths {
            let first_hop = match path.first() {
                Some(hop) => hop,
                // Our own prefixes are covered by direct routes.
                None => continue,
            };
            let neighbor = match self.find_neighbor(first_hop) {
                Some(neighbor) => neighbor,
                None => {
                    error!(
                        "[{}] invalid state: {} is not one of our neighbors",
                        self.hostname, first_hop
                    );
                    continue;
                }
            };
            let next_hop = neighbor.address.or_else(|| {
                dev.logical(&neighbor.interface_name).and_then(|l| l.ipv4).and_then(p2p_peer)
            });
            let metric = match self.address_distances.get(address) {
                Some(metric) => *metric,
                None => continue,
            };
            routes.push(
                Route::new(
                    RouteKey::Prefix(*address),
                    RouteKind::Isis,
                    Some(neighbor.interface_name.clone()),
                    next_hop,
                )
                .metric(metric),
            );
        }
        dev.set_routes(ctx, routes, TableId::Isis, Some("ISIS"));
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn has_up_neighbor(&self, iface: &str) -> bool {
        self.adjacencies
            .get(iface)
            .map(|m| m.values().any(|n| n.state == AdjState::Up))
            .unwrap_or(false)
    }

    /// Finds the adjacency record for a system, on any interface.
    pub fn find_neighbor(&self, system_id: &SystemId) -> Option<&Neighbor> {
        self.adjacencies.values().find_map(|m| m.get(system_id))
    }
}
