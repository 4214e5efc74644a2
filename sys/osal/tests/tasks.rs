// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task lifecycle: startup barrier, exit, suspend/resume, priority,
//! per-task errno.

mod common;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use abi::{ErrorKind, Priority, TaskFlags, TaskId};
use common::serial;

#[test]
fn exit_ends_the_task_midway() {
    let _guard = serial();
    osal::init();

    let count = Arc::new(AtomicU32::new(0));
    let steps = Arc::clone(&count);
    osal::task::create(
        move || {
            steps.fetch_add(1, Ordering::SeqCst);
            osal::task::exit();
            #[allow(unreachable_code)]
            {
                steps.fetch_add(1, Ordering::SeqCst);
            }
        },
        0,
        Priority(100),
        TaskFlags::empty(),
    )
    .unwrap();
    osal::start();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn suspend_parks_until_resumed() {
    let _guard = serial();
    osal::init();

    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&events);
    let sleeper = osal::task::create(
        move || {
            log.lock().unwrap().push("parked");
            osal::task::suspend(TaskId::SELF).unwrap();
            log.lock().unwrap().push("woke");
        },
        0,
        Priority(100),
        TaskFlags::empty(),
    )
    .unwrap();

    let log = Arc::clone(&events);
    osal::task::create(
        move || {
            osal::time::sleep_ms(200);
            log.lock().unwrap().push("resuming");
            osal::task::resume(sleeper).unwrap();
        },
        0,
        Priority(120),
        TaskFlags::empty(),
    )
    .unwrap();
    osal::start();

    assert_eq!(
        &*events.lock().unwrap(),
        &["parked", "resuming", "woke"]
    );
}

#[test]
fn suspending_another_task_is_not_supported() {
    let _guard = serial();
    osal::init();

    // From the main thread, naming any task id but our own.
    assert_eq!(
        osal::task::suspend(TaskId(3)),
        Err(ErrorKind::NotSupported)
    );
}

#[test]
fn set_priority_returns_the_old_one() {
    let _guard = serial();
    osal::init();

    let done = Arc::new(AtomicBool::new(false));
    let report = Arc::clone(&done);
    let id = osal::task::create(
        move || {
            osal::time::sleep_ms(100);
            report.store(true, Ordering::SeqCst);
        },
        0,
        Priority(100),
        TaskFlags::empty(),
    )
    .unwrap();

    let info = osal::task::info(id).unwrap();
    assert_eq!(info.priority, Priority(100));
    assert_eq!(info.creator, TaskId::MAIN);
    assert!(!info.periodic);

    assert_eq!(
        osal::task::set_priority(id, Priority(42)),
        Ok(Priority(100))
    );
    assert_eq!(osal::task::info(id).unwrap().priority, Priority(42));
    assert_eq!(
        osal::task::set_priority(id, Priority(0)),
        Err(ErrorKind::Invalid)
    );

    osal::start();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn errno_is_per_task() {
    let _guard = serial();
    osal::init();

    // Fail something on the main thread.
    assert!(osal::mutex::lock(abi::MutexId(9999)).is_err());
    assert_eq!(osal::last_error(), ErrorKind::Invalid.code());

    let task_errno = Arc::new(AtomicU32::new(u32::MAX));
    let report = Arc::clone(&task_errno);
    osal::task::create(
        move || {
            // A fresh task starts with a clear cell.
            let initial = osal::last_error();
            let _ = osal::binsem::take(abi::BinSemId(9999));
            let after = osal::last_error();
            report.store(
                ((initial as u32) << 16) | (after as u32 & 0xFFFF),
                Ordering::SeqCst,
            );
        },
        0,
        Priority(100),
        TaskFlags::empty(),
    )
    .unwrap();
    osal::start();

    let packed = task_errno.load(Ordering::SeqCst);
    assert_eq!(packed >> 16, 0, "task began with stale errno");
    assert_eq!(
        packed & 0xFFFF,
        ErrorKind::Invalid.code() as u32,
        "task's own failure not recorded"
    );
    // The task's failure did not clobber ours.
    assert_eq!(osal::last_error(), ErrorKind::Invalid.code());
}

#[test]
fn tasks_wait_for_start() {
    let _guard = serial();
    osal::init();

    // The barrier in this process is already open if another test called
    // start() first, so observe ordering through a fresh task instead: it
    // must not run before start() when the barrier is still closed, and
    // either way everything has run by the time start() returns.
    let ran = Arc::new(AtomicBool::new(false));
    let report = Arc::clone(&ran);
    osal::task::create(
        move || {
            report.store(true, Ordering::SeqCst);
        },
        0,
        Priority(100),
        TaskFlags::empty(),
    )
    .unwrap();
    osal::start();
    assert!(ran.load(Ordering::SeqCst));
}
