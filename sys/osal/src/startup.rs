// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library startup and the startup barrier.
//!
//! Every newly created task parks on a process-wide gate until [`start`]
//! has been called at least once, so the initial set of tasks begins
//! executing in priority order regardless of the order they were created
//! in. Once open, the gate stays open: tasks created later start running
//! immediately.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::host;
use crate::runtime::runtime;

/// A one-way gate: closed until opened, then open forever.
pub(crate) struct Gate {
    opened: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            opened: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Blocks until the gate has been opened. Returns immediately if it
    /// already was.
    pub(crate) fn wait_open(&self) {
        let mut opened = self.opened.lock().unwrap();
        while !*opened {
            opened = self.cv.wait(opened).unwrap();
        }
    }

    /// Opens the gate and wakes everyone parked on it.
    pub(crate) fn open(&self) {
        let mut opened = self.opened.lock().unwrap();
        *opened = true;
        self.cv.notify_all();
    }
}

/// Initializes the resource tables. Idempotent; every public operation also
/// initializes on first use, so calling this is a formality that pins the
/// moment the uptime clock starts.
pub fn init() {
    let _ = runtime();
}

/// Releases all tasks from the startup barrier, then blocks until every
/// created task has exited -- including tasks created by other tasks after
/// the call. Returns once the task table is empty.
pub fn start() {
    let rt = runtime();
    rt.barrier.open();
    log::debug!("startup barrier open");

    loop {
        // Collect the join handles of everything currently alive; join with
        // no table lock held. Tasks free their own slots on exit, so each
        // pass shrinks the table, and a task spawned mid-join is picked up
        // by the next pass.
        let mut handles = Vec::new();
        rt.tasks.update_each(|_, record| {
            if let Some(handle) = record.join.take() {
                handles.push(handle);
            }
        });

        if handles.is_empty() {
            if rt.tasks.used_count() == 0 {
                break;
            }
            // A create is mid-commit; give it a moment.
            host::sleep(Duration::from_millis(1));
            continue;
        }
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_releases_waiters_and_stays_open() {
        use std::sync::Arc;

        let gate = Arc::new(Gate::new());
        let mut joins = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            joins.push(std::thread::spawn(move || gate.wait_open()));
        }
        std::thread::sleep(Duration::from_millis(20));
        gate.open();
        for join in joins {
            join.join().unwrap();
        }
        // Late arrivals pass straight through.
        gate.wait_open();
    }
}
