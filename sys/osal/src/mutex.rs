// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutual-exclusion semaphores.
//!
//! The lock is owner-tracked and *not* recursive: a nested lock by the
//! owner fails with `SemFailure` rather than deadlocking the task against
//! itself. Unlock by a non-owner fails the same way and leaves the lock
//! held.
//!
//! Priority elevation is the host's business; the POSIX adapter provides
//! none (see `host::posix`), so on the hosted target this is a plain
//! blocking lock.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use abi::{ErrorKind, MutexId, TaskId};

use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::time;
use crate::Result;

pub(crate) struct HostMutex {
    owner: Mutex<Option<TaskId>>,
    cv: Condvar,
}

impl HostMutex {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    fn lock(&self, me: TaskId) -> Result<()> {
        let mut owner = self.owner.lock().unwrap();
        // Nested lock by the owner would deadlock the task against itself;
        // reject it instead.
        if *owner == Some(me) {
            return fail(ErrorKind::SemFailure);
        }
        while owner.is_some() {
            owner = self.cv.wait(owner).unwrap();
        }
        *owner = Some(me);
        Ok(())
    }

    fn try_lock(&self, me: TaskId) -> Result<()> {
        let mut owner = self.owner.lock().unwrap();
        match *owner {
            None => {
                *owner = Some(me);
                Ok(())
            }
            Some(holder) if holder == me => fail(ErrorKind::SemFailure),
            Some(_) => fail(ErrorKind::SemNotAvail),
        }
    }

    fn timed_lock(&self, me: TaskId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut owner = self.owner.lock().unwrap();
        if *owner == Some(me) {
            return fail(ErrorKind::SemFailure);
        }
        while owner.is_some() {
            let Some(remaining) =
                deadline.checked_duration_since(Instant::now())
            else {
                return fail(ErrorKind::Timeout);
            };
            let (guard, result) =
                self.cv.wait_timeout(owner, remaining).unwrap();
            owner = guard;
            if result.timed_out() && owner.is_some() {
                return fail(ErrorKind::Timeout);
            }
        }
        *owner = Some(me);
        Ok(())
    }

    fn unlock(&self, me: TaskId) -> Result<()> {
        let mut owner = self.owner.lock().unwrap();
        if *owner != Some(me) {
            return fail(ErrorKind::SemFailure);
        }
        *owner = None;
        self.cv.notify_one();
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.owner.lock().unwrap().is_some()
    }
}

pub(crate) struct MutexRecord {
    creator: TaskId,
    lock: Arc<HostMutex>,
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MutexInfo {
    pub creator: TaskId,
}

/// Creates a mutex, initially unlocked.
pub fn create() -> Result<MutexId> {
    let rt = runtime();
    let index = rt.mutexes.reserve()?;
    rt.mutexes.commit(
        index,
        MutexRecord {
            creator: task::current(),
            lock: Arc::new(HostMutex::new()),
        },
    );
    rt.stats.note_created(ResourceKind::Mutex);
    Ok(MutexId(index as u32))
}

/// Destroys a mutex. Fails with `Busy` while the mutex is held -- release
/// first, then destroy.
pub fn destroy(id: MutexId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.mutexes.remove_if(id.index(), |record| {
        if record.lock.is_held() {
            fail(ErrorKind::Busy)
        } else {
            Ok(())
        }
    })?;
    rt.stats.note_deleted(ResourceKind::Mutex);
    Ok(())
}

/// Acquires the mutex, blocking until ownership is obtained.
pub fn lock(id: MutexId) -> Result<()> {
    let lock = fetch(id)?;
    lock.lock(task::current())
}

/// Acquires the mutex if it is free; fails with `SemNotAvail` instead of
/// blocking.
pub fn try_lock(id: MutexId) -> Result<()> {
    let lock = fetch(id)?;
    lock.try_lock(task::current())
}

/// Acquires the mutex, blocking up to `millis` (rounded up to the tick).
/// Fails with `Timeout` on expiry with the lock state unchanged.
pub fn timed_lock(id: MutexId, millis: u32) -> Result<()> {
    let lock = fetch(id)?;
    lock.timed_lock(task::current(), time::timeout_duration(millis))
}

/// Releases the mutex. Fails with `SemFailure` if the caller is not the
/// owner.
pub fn unlock(id: MutexId) -> Result<()> {
    let lock = fetch(id)?;
    lock.unlock(task::current())
}

/// Reports the mutex's creator.
pub fn info(id: MutexId) -> Result<MutexInfo> {
    runtime().mutexes.with(id.index(), |record| MutexInfo {
        creator: record.creator,
    })
}

fn fetch(id: MutexId) -> Result<Arc<HostMutex>> {
    runtime().mutexes.with(id.index(), |record| record.lock.clone())
}
