// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Counting semaphores.
//!
//! The value is a non-negative counter: `give` increments, `take`
//! decrements or blocks until it can. The message queue drives one of these
//! internally to count resident messages, so the blocking machinery lives
//! in [`HostCountSem`] and the table-facing API wraps it.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use abi::{CountSemId, ErrorKind, TaskId};

use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::time;
use crate::Result;

/// The host-side counting semaphore: a counter under a mutex, with a
/// condvar for sleepers.
pub(crate) struct HostCountSem {
    value: Mutex<u32>,
    cv: Condvar,
}

impl HostCountSem {
    pub(crate) fn new(initial: u32) -> Self {
        Self {
            value: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Increments the value and wakes a sleeper. Fails only on counter
    /// overflow.
    pub(crate) fn give(&self) -> Result<()> {
        let mut value = self.value.lock().unwrap();
        match value.checked_add(1) {
            Some(v) => {
                *value = v;
                self.cv.notify_one();
                Ok(())
            }
            None => fail(ErrorKind::SemFailure),
        }
    }

    /// Decrements the value, blocking while it is zero.
    pub(crate) fn take(&self) {
        let mut value = self.value.lock().unwrap();
        while *value == 0 {
            value = self.cv.wait(value).unwrap();
        }
        *value -= 1;
    }

    /// Decrements the value if it is positive; never blocks.
    pub(crate) fn try_take(&self) -> bool {
        let mut value = self.value.lock().unwrap();
        if *value > 0 {
            *value -= 1;
            true
        } else {
            false
        }
    }

    /// Decrements the value, blocking up to `timeout`. Returns whether the
    /// decrement happened.
    pub(crate) fn timed_take(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut value = self.value.lock().unwrap();
        while *value == 0 {
            let Some(remaining) =
                deadline.checked_duration_since(Instant::now())
            else {
                return false;
            };
            let (guard, result) =
                self.cv.wait_timeout(value, remaining).unwrap();
            value = guard;
            if result.timed_out() && *value == 0 {
                return false;
            }
        }
        *value -= 1;
        true
    }

    pub(crate) fn value(&self) -> u32 {
        *self.value.lock().unwrap()
    }
}

pub(crate) struct CountSemRecord {
    creator: TaskId,
    sem: Arc<HostCountSem>,
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CountSemInfo {
    pub creator: TaskId,
    pub value: u32,
}

/// Creates a counting semaphore with the given initial value.
pub fn create(initial: u32) -> Result<CountSemId> {
    let rt = runtime();
    let index = rt.countsems.reserve()?;
    rt.countsems.commit(
        index,
        CountSemRecord {
            creator: task::current(),
            sem: Arc::new(HostCountSem::new(initial)),
        },
    );
    rt.stats.note_created(ResourceKind::CountSem);
    Ok(CountSemId(index as u32))
}

/// Destroys a counting semaphore. Waiters blocked at destruction time stay
/// blocked; callers must not rely on destruction interrupting a `take`.
pub fn destroy(id: CountSemId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.countsems.remove_if(id.index(), |_| Ok(()))?;
    rt.stats.note_deleted(ResourceKind::CountSem);
    Ok(())
}

/// Increments the semaphore.
pub fn give(id: CountSemId) -> Result<()> {
    let sem = fetch(id)?;
    sem.give()
}

/// Decrements the semaphore, blocking until possible.
pub fn take(id: CountSemId) -> Result<()> {
    let sem = fetch(id)?;
    sem.take();
    Ok(())
}

/// Decrements the semaphore if possible; fails with `SemNotAvail` instead
/// of blocking.
pub fn try_take(id: CountSemId) -> Result<()> {
    let sem = fetch(id)?;
    if sem.try_take() {
        Ok(())
    } else {
        fail(ErrorKind::SemNotAvail)
    }
}

/// Decrements the semaphore, blocking up to `millis` (rounded up to the
/// tick). Fails with `Timeout` on expiry, leaving the value untouched.
pub fn timed_wait(id: CountSemId, millis: u32) -> Result<()> {
    let sem = fetch(id)?;
    if sem.timed_take(time::timeout_duration(millis)) {
        Ok(())
    } else {
        fail(ErrorKind::Timeout)
    }
}

/// Reports the semaphore's creator and current value.
pub fn info(id: CountSemId) -> Result<CountSemInfo> {
    runtime().countsems.with(id.index(), |record| CountSemInfo {
        creator: record.creator,
        value: record.sem.value(),
    })
}

// Blocking operations run on a clone of the host primitive so no table
// lock is held while sleeping.
fn fetch(id: CountSemId) -> Result<Arc<HostCountSem>> {
    runtime().countsems.with(id.index(), |record| record.sem.clone())
}
