// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed-capacity handle table shared by every resource kind.
//!
//! A handle is an index into one of these. The table is guarded by a
//! reader/writer lock: `validate`-style reads take the read side so they do
//! not serialize against each other under load, and *every* transition of a
//! slot's allocation state happens under the write side. At most one
//! create or delete is in progress per table at any instant.
//!
//! Creation is two-phase, because creating the backing host object can
//! block and must not happen under the lock: `reserve` claims the lowest
//! free slot and marks it taken before the writer lock is released, the
//! host object is created unlocked, then `commit` installs the record (or
//! `abort` re-frees the slot if the host call failed).

use std::sync::RwLock;

use abi::ErrorKind;

use crate::err::fail;
use crate::Result;

enum Slot<R> {
    Free,
    /// Claimed by an in-progress create; invisible to `with`, not
    /// allocatable by `reserve`.
    Reserved,
    Used(R),
}

impl<R> Slot<R> {
    fn record(&self) -> Option<&R> {
        match self {
            Slot::Used(r) => Some(r),
            _ => None,
        }
    }
}

pub(crate) struct HandleTable<R, const N: usize> {
    slots: RwLock<[Slot<R>; N]>,
}

impl<R, const N: usize> HandleTable<R, N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: RwLock::new(core::array::from_fn(|_| Slot::Free)),
        }
    }

    /// Claims the lowest-index free slot. Fails with `NoFreeIds` when the
    /// table is full.
    pub(crate) fn reserve(&self) -> Result<usize> {
        let mut slots = self.slots.write().unwrap();
        match slots.iter().position(|s| matches!(s, Slot::Free)) {
            Some(index) => {
                slots[index] = Slot::Reserved;
                Ok(index)
            }
            None => fail(ErrorKind::NoFreeIds),
        }
    }

    /// Installs the record in a slot claimed by `reserve`.
    pub(crate) fn commit(&self, index: usize, record: R) {
        let mut slots = self.slots.write().unwrap();
        debug_assert!(matches!(slots[index], Slot::Reserved));
        slots[index] = Slot::Used(record);
    }

    /// Releases a slot claimed by `reserve` whose host object could not be
    /// created.
    pub(crate) fn abort(&self, index: usize) {
        let mut slots = self.slots.write().unwrap();
        debug_assert!(matches!(slots[index], Slot::Reserved));
        slots[index] = Slot::Free;
    }

    /// Runs `body` against the record named by `index`, under the read
    /// lock. Fails with `Invalid` for an out-of-range index or a slot that
    /// is not allocated.
    pub(crate) fn with<T>(
        &self,
        index: usize,
        body: impl FnOnce(&R) -> T,
    ) -> Result<T> {
        let slots = self.slots.read().unwrap();
        match slots.get(index).and_then(Slot::record) {
            Some(record) => Ok(body(record)),
            None => fail(ErrorKind::Invalid),
        }
    }

    /// Like [`Self::with`], but takes the write lock so `body` may mutate
    /// record fields.
    pub(crate) fn update<T>(
        &self,
        index: usize,
        body: impl FnOnce(&mut R) -> T,
    ) -> Result<T> {
        let mut slots = self.slots.write().unwrap();
        match slots.get_mut(index) {
            Some(Slot::Used(record)) => Ok(body(record)),
            _ => fail(ErrorKind::Invalid),
        }
    }

    /// Frees the slot and returns its record, if `check` agrees. The check
    /// runs under the write lock, so a delete precondition (a queue must be
    /// empty, a mutex must not be held) cannot race a concurrent operation
    /// into a stale answer.
    pub(crate) fn remove_if(
        &self,
        index: usize,
        check: impl FnOnce(&R) -> Result<()>,
    ) -> Result<R> {
        let mut slots = self.slots.write().unwrap();
        match slots.get_mut(index) {
            Some(slot) if matches!(slot, Slot::Used(_)) => {
                if let Slot::Used(record) = &*slot {
                    check(record)?;
                }
                match core::mem::replace(slot, Slot::Free) {
                    Slot::Used(record) => Ok(record),
                    _ => unreachable!(),
                }
            }
            _ => fail(ErrorKind::Invalid),
        }
    }

    /// Visits every allocated slot under the write lock.
    pub(crate) fn update_each(&self, mut body: impl FnMut(usize, &mut R)) {
        let mut slots = self.slots.write().unwrap();
        for (index, slot) in slots.iter_mut().enumerate() {
            if let Slot::Used(record) = slot {
                body(index, record);
            }
        }
    }

    /// Counts allocated slots.
    pub(crate) fn used_count(&self) -> usize {
        let slots = self.slots.read().unwrap();
        slots.iter().filter(|s| matches!(s, Slot::Used(_))).count()
    }
}
