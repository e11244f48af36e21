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

use crate::event::{Job, Scheduler};
use crate::topology::Topology;
use crate::types::LinkId;
use maplit::hashset;
use std::collections::HashSet;

#[test]
fn test_due_jobs_pop_in_time_order() {
    let mut sched = Scheduler::new(42);
    sched.enqueue(10, Job::LinkUp(LinkId(0)));
    sched.enqueue(5, Job::LinkUp(LinkId(1)));
    sched.enqueue(5, Job::LinkUp(LinkId(2)));

    // Nothing is due before the clock moves.
    assert!(sched.pop_due().is_none());
    assert_eq!(sched.next_delay(), Some(5));

    sched.advance(5);
    let mut popped: Vec<LinkId> = Vec::new();
    while let Some(job) = sched.pop_due() {
        match job {
            Job::LinkUp(id) => popped.push(id),
            _ => panic!("unexpected job"),
        }
    }
    assert_eq!(popped.len(), 2);
    assert_eq!(popped.into_iter().collect::<HashSet<_>>(), hashset! {LinkId(1), LinkId(2)});

    assert_eq!(sched.next_delay(), Some(5));
    sched.advance(5);
    match sched.pop_due() {
        Some(Job::LinkUp(id)) => assert_eq!(id, LinkId(0)),
        other => panic!("expected the 10ms job, got {:?}", other),
    }
    assert_eq!(sched.next_delay(), None);
}

#[test]
fn test_jitter_stays_within_one_ms() {
    for seed in 0..32 {
        let mut sched = Scheduler::new(seed);
        sched.enqueue_jittered(100, Job::LinkUp(LinkId(0)));
        let delay = sched.next_delay().unwrap();
        assert!((99..=101).contains(&delay), "jittered delay {} out of range", delay);
    }
}

fn converged_run(seed: u64) -> Vec<(String, String, u64)> {
    let mut topology = Topology::with_seed("determinism", seed);
    let r1 = topology.add_router("r1", &["et1"], "default").unwrap();
    let r2 = topology.add_router("r2", &["et1"], "default").unwrap();
    topology.link_router_pair(r1, r2, 10, 10).unwrap();
    topology.isis_enable_all("default");
    topology.isis_start_all("default").unwrap();
    topology
        .run_until(15_000)
        .into_iter()
        .map(|(host, event)| (host, event.msg, event.when))
        .collect()
}

#[test]
fn test_same_seed_same_interleaving() {
    let first = converged_run(7);
    let second = converged_run(7);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_events_never_fire_early() {
    let events = converged_run(3);
    let mut last_when = 0;
    for (_, _, when) in events {
        assert!(when >= last_when, "event observed at {} after {}", when, last_when);
        last_when = when;
    }
}
