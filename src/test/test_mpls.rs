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

use crate::mpls::{Forwarded, LabelOp, LabelStep, MplsPacket};
use crate::packet::{IcmpMessage, IpPayload, IpProtocol, Ipv4Packet};
use std::net::Ipv4Addr;

fn sample_packet() -> Ipv4Packet {
    Ipv4Packet::new(
        Ipv4Addr::new(10, 0, 0, 1),
        Ipv4Addr::new(10, 0, 0, 2),
        IpProtocol::Icmp,
        IpPayload::Icmp(IcmpMessage::EchoRequest { id: 1, sent_at: 0 }),
    )
}

#[test]
fn test_push_encapsulates_plain_ip() {
    let (out, steps) = LabelOp::Push(42).apply(Forwarded::Ip(sample_packet()));
    match out {
        Forwarded::Mpls(mpls) => {
            assert_eq!(mpls.labels, vec![42]);
            assert_eq!(mpls.ttl, 64);
        }
        Forwarded::Ip(_) => panic!("push must produce a labeled packet"),
    }
    assert_eq!(steps, vec![LabelStep::Pushed(42)]);
}

#[test]
fn test_swap_replaces_top_label() {
    let mut mpls = MplsPacket::encapsulate(sample_packet());
    mpls.labels = vec![10, 20];
    let (out, steps) = LabelOp::Swap(30).apply(Forwarded::Mpls(mpls));
    match out {
        Forwarded::Mpls(mpls) => assert_eq!(mpls.labels, vec![10, 30]),
        Forwarded::Ip(_) => panic!("swap must keep the packet labeled"),
    }
    assert_eq!(steps, vec![LabelStep::Swapped { old: Some(20), new: 30 }]);
}

#[test]
fn test_last_pop_yields_the_inner_packet() {
    let mut mpls = MplsPacket::encapsulate(sample_packet());
    mpls.labels = vec![42];
    let (out, steps) = LabelOp::Pop.apply(Forwarded::Mpls(mpls));
    match out {
        Forwarded::Ip(packet) => assert_eq!(packet.dst, Ipv4Addr::new(10, 0, 0, 2)),
        Forwarded::Mpls(_) => panic!("popping the last label must expose the payload"),
    }
    assert_eq!(steps, vec![LabelStep::Popped(42)]);
}

#[test]
fn test_pop_keeps_remaining_labels() {
    let mut mpls = MplsPacket::encapsulate(sample_packet());
    mpls.labels = vec![10, 20];
    let (out, _) = LabelOp::Pop.apply(Forwarded::Mpls(mpls));
    match out {
        Forwarded::Mpls(mpls) => assert_eq!(mpls.labels, vec![10]),
        Forwarded::Ip(_) => panic!("one label must remain"),
    }
}

#[test]
fn test_combined_applies_in_order() {
    // The failure-masking composition: apply the primary push, then wrap
    // the result in the bypass label.
    let op = LabelOp::Combined(vec![LabelOp::Push(100), LabelOp::Push(200)]);
    let (out, steps) = op.apply(Forwarded::Ip(sample_packet()));
    match out {
        Forwarded::Mpls(mpls) => assert_eq!(mpls.labels, vec![100, 200]),
        Forwarded::Ip(_) => panic!("combined pushes must label the packet"),
    }
    assert_eq!(steps, vec![LabelStep::Pushed(100), LabelStep::Pushed(200)]);
    assert_eq!(op.new_label(), Some(200));
}

#[test]
fn test_combined_pop_then_push_relabels() {
    // What a protected transit entry does: finish the primary operation,
    // then enter the bypass tunnel.
    let mut mpls = MplsPacket::encapsulate(sample_packet());
    mpls.labels = vec![42];
    let op = LabelOp::Combined(vec![LabelOp::Pop, LabelOp::Push(7)]);
    let (out, _) = op.apply(Forwarded::Mpls(mpls));
    match out {
        Forwarded::Mpls(mpls) => assert_eq!(mpls.labels, vec![7]),
        Forwarded::Ip(_) => panic!("the bypass push must re-label the packet"),
    }
}
