// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handle table behavior across resource kinds: capacity, reuse,
//! statistics, configuration reporting.

mod common;

use abi::config;
use abi::ErrorKind;
use common::serial;

#[test]
fn table_capacity_is_enforced() {
    let _guard = serial();
    osal::init();

    // Timers have the smallest table; fill it.
    let mut timers = Vec::new();
    loop {
        match osal::timer::create() {
            Ok(id) => timers.push(id),
            Err(kind) => {
                assert_eq!(kind, ErrorKind::NoFreeIds);
                assert_eq!(osal::last_error(), ErrorKind::NoFreeIds.code());
                break;
            }
        }
        assert!(
            timers.len() <= config::MAX_TIMERS,
            "table exceeded its configured capacity"
        );
    }
    assert_eq!(timers.len(), config::MAX_TIMERS);

    // Freeing one slot admits exactly one more.
    osal::timer::destroy(timers[2]).unwrap();
    let replacement = osal::timer::create().unwrap();
    assert!(osal::timer::create().is_err());

    for (i, id) in timers.iter().enumerate() {
        if i != 2 {
            osal::timer::destroy(*id).unwrap();
        }
    }
    osal::timer::destroy(replacement).unwrap();
}

#[test]
fn slots_reuse_lowest_index_first() {
    let _guard = serial();
    osal::init();

    let a = osal::countsem::create(0).unwrap();
    let b = osal::countsem::create(0).unwrap();
    let c = osal::countsem::create(0).unwrap();

    osal::countsem::destroy(a).unwrap();
    osal::countsem::destroy(b).unwrap();

    // Recreation hands back the lowest freed index; the numeric handle may
    // therefore equal a stale one.
    let d = osal::countsem::create(5).unwrap();
    assert_eq!(d, a);

    // The stale handle now observes the new resource -- never freed state.
    assert_eq!(osal::countsem::info(a).unwrap().value, 5);
    // A handle whose slot stayed free keeps failing cleanly.
    assert_eq!(osal::countsem::give(b), Err(ErrorKind::Invalid));

    osal::countsem::destroy(c).unwrap();
    osal::countsem::destroy(d).unwrap();
}

#[test]
fn statistics_track_create_and_delete() {
    let _guard = serial();
    osal::init();

    let before = osal::stats::snapshot();
    let q1 = osal::countsem::create(0).unwrap();
    let q2 = osal::countsem::create(0).unwrap();
    osal::countsem::destroy(q1).unwrap();

    let after = osal::stats::snapshot();
    assert_eq!(after.count_sems.created, before.count_sems.created + 2);
    assert_eq!(after.count_sems.deleted, before.count_sems.deleted + 1);
    assert_eq!(
        after.count_sems.current,
        after.count_sems.created - after.count_sems.deleted
    );
    assert_eq!(after.count_sems.current, before.count_sems.current + 1);

    osal::countsem::destroy(q2).unwrap();
    let settled = osal::stats::snapshot();
    assert_eq!(settled.count_sems.current, before.count_sems.current);

    // The report serializes for host-side tooling.
    let json = serde_json::to_string(&settled).unwrap();
    let back: osal::stats::StatsReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settled);

    // And renders without panicking.
    osal::stats::print();
}

#[test]
fn config_info_matches_the_build() {
    let info = osal::config_info();
    assert_eq!(info.max_sporadic_tasks, config::MAX_SPORADIC_TASKS as u32);
    assert_eq!(info.max_periodic_tasks, config::MAX_PERIODIC_TASKS as u32);
    assert_eq!(info.max_queues, config::MAX_QUEUES as u32);
    assert_eq!(info.max_timers, config::MAX_TIMERS as u32);
    assert_eq!(
        info.max_mutexes as usize,
        config::MAX_USER_MUTEXES + config::INTERNAL_MUTEXES
    );
}

#[test]
fn counting_semaphore_balances() {
    let _guard = serial();
    osal::init();

    let sem = osal::countsem::create(0).unwrap();
    for _ in 0..5 {
        osal::countsem::give(sem).unwrap();
    }
    for _ in 0..5 {
        osal::countsem::take(sem).unwrap();
    }
    assert_eq!(osal::countsem::info(sem).unwrap().value, 0);
    assert_eq!(
        osal::countsem::try_take(sem),
        Err(ErrorKind::SemNotAvail)
    );
    assert_eq!(
        osal::countsem::timed_wait(sem, 30),
        Err(ErrorKind::Timeout)
    );
    osal::countsem::destroy(sem).unwrap();
}
