// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary semaphores with broadcast flush.
//!
//! The stored value is 0 or 1. `give` raises it to 1, saturating, and
//! releases at most one waiter; `flush` releases *every* waiter currently
//! blocked in `take` without changing the stored value.
//!
//! Flush correctness is the one delicate ordering contract here. Each
//! semaphore counts its blocked takers: the count is incremented before the
//! wait and decremented after, and a flush issues exactly that many wakes
//! (`pending`) while holding the semaphore's flush mutex. A taker passes
//! through a lock/unlock of the same mutex on its way out, so a take racing
//! a flush either was counted -- and is released -- or arrives afterwards
//! and sees the post-flush state. Wakes issued by a flush are reserved for
//! counted waiters; `try_take` and timed takes only ever consume the stored
//! value, as in the reference implementation, and therefore do not
//! participate in flush.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use abi::{BinSemId, ErrorKind, TaskId};

use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::time;
use crate::Result;

struct BinState {
    /// The stored value.
    value: bool,
    /// Takers currently blocked in `take`.
    blocked: u32,
    /// Wakes owed to blocked takers, from `give` or `flush`.
    pending: u32,
}

pub(crate) struct HostBinSem {
    state: Mutex<BinState>,
    cv: Condvar,
    /// Serializes flush against concurrent takes; see module docs.
    flush_gate: Mutex<()>,
}

impl HostBinSem {
    fn new(initial: bool) -> Self {
        Self {
            state: Mutex::new(BinState {
                value: initial,
                blocked: 0,
                pending: 0,
            }),
            cv: Condvar::new(),
            flush_gate: Mutex::new(()),
        }
    }

    fn take(&self) {
        let mut state = self.state.lock().unwrap();
        state.blocked += 1;
        loop {
            if state.pending > 0 {
                state.pending -= 1;
                break;
            }
            if state.value {
                state.value = false;
                break;
            }
            state = self.cv.wait(state).unwrap();
        }
        state.blocked -= 1;
        drop(state);
        // Order ourselves after any flush in progress.
        drop(self.flush_gate.lock().unwrap());
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.value {
            state.value = false;
            true
        } else {
            false
        }
    }

    fn timed_take(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if state.value {
                state.value = false;
                return true;
            }
            let Some(remaining) =
                deadline.checked_duration_since(Instant::now())
            else {
                return false;
            };
            let (guard, result) =
                self.cv.wait_timeout(state, remaining).unwrap();
            state = guard;
            if result.timed_out() && !state.value {
                return false;
            }
        }
    }

    fn give(&self) {
        let mut state = self.state.lock().unwrap();
        if state.blocked > state.pending {
            // A blocked taker will absorb this give; the value stays 0.
            state.pending += 1;
        } else {
            state.value = true;
        }
        self.cv.notify_all();
    }

    fn flush(&self) {
        let _gate = self.flush_gate.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        state.pending = state.blocked;
        self.cv.notify_all();
    }

    fn value(&self) -> u32 {
        u32::from(self.state.lock().unwrap().value)
    }
}

pub(crate) struct BinSemRecord {
    creator: TaskId,
    sem: Arc<HostBinSem>,
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BinSemInfo {
    pub creator: TaskId,
    pub value: u32,
}

/// Creates a binary semaphore. `initial` values other than 0 and 1 are
/// rejected.
pub fn create(initial: u32) -> Result<BinSemId> {
    if initial > 1 {
        return fail(ErrorKind::Invalid);
    }
    let rt = runtime();
    let index = rt.binsems.reserve()?;
    rt.binsems.commit(
        index,
        BinSemRecord {
            creator: task::current(),
            sem: Arc::new(HostBinSem::new(initial == 1)),
        },
    );
    rt.stats.note_created(ResourceKind::BinSem);
    Ok(BinSemId(index as u32))
}

/// Destroys a binary semaphore. Waiters blocked at destruction time stay
/// blocked.
pub fn destroy(id: BinSemId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.binsems.remove_if(id.index(), |_| Ok(()))?;
    rt.stats.note_deleted(ResourceKind::BinSem);
    Ok(())
}

/// Takes the semaphore, blocking while the value is 0 until a `give` or a
/// `flush` releases the caller.
pub fn take(id: BinSemId) -> Result<()> {
    let sem = fetch(id)?;
    sem.take();
    Ok(())
}

/// Takes the semaphore if its value is 1; fails with `SemNotAvail` instead
/// of blocking.
pub fn try_take(id: BinSemId) -> Result<()> {
    let sem = fetch(id)?;
    if sem.try_take() {
        Ok(())
    } else {
        fail(ErrorKind::SemNotAvail)
    }
}

/// Takes the semaphore, blocking up to `millis` (rounded up to the tick).
pub fn timed_wait(id: BinSemId, millis: u32) -> Result<()> {
    let sem = fetch(id)?;
    if sem.timed_take(time::timeout_duration(millis)) {
        Ok(())
    } else {
        fail(ErrorKind::Timeout)
    }
}

/// Raises the value to 1 (saturating) and releases at most one waiter; if
/// none is blocked, the 1 persists.
pub fn give(id: BinSemId) -> Result<()> {
    let sem = fetch(id)?;
    sem.give();
    Ok(())
}

/// Releases every currently blocked waiter without altering the stored
/// value.
pub fn flush(id: BinSemId) -> Result<()> {
    let sem = fetch(id)?;
    sem.flush();
    Ok(())
}

/// Reports the semaphore's creator and current value.
pub fn info(id: BinSemId) -> Result<BinSemInfo> {
    runtime().binsems.with(id.index(), |record| BinSemInfo {
        creator: record.creator,
        value: record.sem.value(),
    })
}

fn fetch(id: BinSemId) -> Result<Arc<HostBinSem>> {
    runtime().binsems.with(id.index(), |record| record.sem.clone())
}
