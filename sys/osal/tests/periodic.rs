// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic task dispatch: rate, deadline detection, miss handling.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use abi::{ErrorKind, Priority, TaskFlags};
use common::serial;

#[test]
fn runs_at_the_configured_rate() {
    let _guard = serial();
    osal::init();

    let runs = Arc::new(AtomicU32::new(0));
    let handler_fired = Arc::new(AtomicU32::new(0));

    let body_runs = Arc::clone(&runs);
    let handler_runs = Arc::clone(&handler_fired);
    let periodic = osal::task::create_periodic(
        move || {
            body_runs.fetch_add(1, Ordering::SeqCst);
            osal::time::sleep_ms(50);
        },
        Some(Box::new(move |_| {
            handler_runs.fetch_add(1, Ordering::SeqCst);
        })),
        0,
        Priority(50),
        TaskFlags::empty(),
        100,
    )
    .unwrap();

    // A watchdog task ends the experiment after one second.
    osal::task::create(
        move || {
            osal::time::sleep_ms(1050);
            osal::task::delete(periodic).unwrap();
        },
        0,
        Priority(40),
        TaskFlags::empty(),
    )
    .unwrap();
    osal::start();

    // Period 100 ms, body 50 ms: ten invocations in the second, give or
    // take a boundary.
    let total = runs.load(Ordering::SeqCst);
    assert!(
        (9..=11).contains(&total),
        "expected ~10 periodic runs, got {total}"
    );
    assert_eq!(handler_fired.load(Ordering::SeqCst), 0);
}

#[test]
fn overrun_invokes_handler_once_and_terminates() {
    let _guard = serial();
    osal::init();

    let runs = Arc::new(AtomicU32::new(0));
    let reported: Arc<Mutex<Vec<ErrorKind>>> = Arc::new(Mutex::new(Vec::new()));

    let body_runs = Arc::clone(&runs);
    let handler_reports = Arc::clone(&reported);
    osal::task::create_periodic(
        move || {
            body_runs.fetch_add(1, Ordering::SeqCst);
            // Overruns the 100 ms period on the first invocation.
            osal::time::sleep_ms(150);
        },
        Some(Box::new(move |kind| {
            handler_reports.lock().unwrap().push(kind);
        })),
        0,
        Priority(50),
        TaskFlags::empty(),
        100,
    )
    .unwrap();

    // The miss terminates the task, so start() returns on its own.
    osal::start();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let reports = reported.lock().unwrap();
    assert_eq!(&*reports, &[ErrorKind::PeriodicTaskMissed]);
}

#[test]
fn rejects_a_zero_period() {
    let _guard = serial();
    osal::init();

    let result = osal::task::create_periodic(
        || {},
        None,
        0,
        Priority(50),
        TaskFlags::empty(),
        0,
    );
    assert_eq!(result, Err(ErrorKind::Invalid));
    assert_eq!(osal::last_error(), ErrorKind::Invalid.code());
}
