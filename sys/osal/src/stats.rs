// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-resource-kind lifetime counters.
//!
//! Each kind tracks how many resources were ever created and ever deleted;
//! the number currently alive is the difference. Counters are atomic and
//! bumped adjacent to the owning table's state transition, so readers
//! observe them eventually consistent with the table itself.

use std::sync::atomic::{AtomicU32, Ordering};

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};

use crate::runtime::runtime;

/// The resource kinds that keep statistics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Enum)]
pub enum ResourceKind {
    Task,
    Mutex,
    BinSem,
    CountSem,
    Queue,
    Pool,
    Timer,
}

#[derive(Default)]
pub(crate) struct Stats {
    kinds: EnumMap<ResourceKind, KindCounters>,
}

#[derive(Default)]
struct KindCounters {
    created: AtomicU32,
    deleted: AtomicU32,
}

impl Stats {
    pub(crate) fn note_created(&self, kind: ResourceKind) {
        self.kinds[kind].created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_deleted(&self, kind: ResourceKind) {
        self.kinds[kind].deleted.fetch_add(1, Ordering::Relaxed);
    }

    fn kind_snapshot(&self, kind: ResourceKind) -> KindStats {
        let created = self.kinds[kind].created.load(Ordering::Relaxed);
        let deleted = self.kinds[kind].deleted.load(Ordering::Relaxed);
        KindStats {
            created,
            deleted,
            current: created - deleted,
        }
    }
}

/// Counters for one resource kind. `current == created - deleted`.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub struct KindStats {
    pub created: u32,
    pub deleted: u32,
    pub current: u32,
}

/// A point-in-time view of every kind's counters, serializable for host
/// tooling.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub struct StatsReport {
    pub tasks: KindStats,
    pub mutexes: KindStats,
    pub bin_sems: KindStats,
    pub count_sems: KindStats,
    pub queues: KindStats,
    pub pools: KindStats,
    pub timers: KindStats,
}

/// Takes a snapshot of all counters.
pub fn snapshot() -> StatsReport {
    let stats = &runtime().stats;
    StatsReport {
        tasks: stats.kind_snapshot(ResourceKind::Task),
        mutexes: stats.kind_snapshot(ResourceKind::Mutex),
        bin_sems: stats.kind_snapshot(ResourceKind::BinSem),
        count_sems: stats.kind_snapshot(ResourceKind::CountSem),
        queues: stats.kind_snapshot(ResourceKind::Queue),
        pools: stats.kind_snapshot(ResourceKind::Pool),
        timers: stats.kind_snapshot(ResourceKind::Timer),
    }
}

/// Renders the counters through the logger, one line per kind.
pub fn print() {
    let report = snapshot();
    for (name, k) in [
        ("task", report.tasks),
        ("mutex", report.mutexes),
        ("bin-sem", report.bin_sems),
        ("count-sem", report.count_sems),
        ("queue", report.queues),
        ("pool", report.pools),
        ("timer", report.timers),
    ] {
        log::info!(
            "{name}: created={} deleted={} current={}",
            k.created,
            k.deleted,
            k.current
        );
    }
}
