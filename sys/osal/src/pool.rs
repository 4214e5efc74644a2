// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Public fixed-partition memory pools.
//!
//! A pool is created over a caller-provided buffer and hands out
//! zero-initialized elements of a fixed size in O(1). Elements are named by
//! [`PoolBuf`] offset handles; the bytes are reached through the closure
//! accessors, so a handle can be passed between tasks without aliasing
//! trouble. A handle that does not belong to the pool is rejected without
//! damaging the free list.

use std::sync::{Arc, Mutex};

use abi::{ErrorKind, PoolId, TaskId};

use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::Result;

/// Names one element obtained from a pool, as a byte offset into the
/// pool's buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PoolBuf {
    offset: u32,
}

impl PoolBuf {
    /// The element's byte offset within the pool's buffer.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

pub(crate) struct PoolRecord {
    creator: TaskId,
    pool: Arc<Mutex<partpool::Pool>>,
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PoolInfo {
    pub creator: TaskId,
    pub capacity: u32,
    pub free: u32,
}

/// Creates a pool of `elem_size`-byte elements over `buffer`.
///
/// Fails with `Invalid` for an empty buffer, a zero or sub-minimum element
/// size, or a buffer too small for a single element.
pub fn create(buffer: Box<[u8]>, elem_size: usize) -> Result<PoolId> {
    if buffer.is_empty() || elem_size < partpool::MIN_ELEM_SIZE {
        return fail(ErrorKind::Invalid);
    }
    let rt = runtime();
    let index = rt.pools.reserve()?;
    let pool = match partpool::Pool::new(buffer, elem_size) {
        Ok(pool) => pool,
        Err(_) => {
            rt.pools.abort(index);
            return fail(ErrorKind::Invalid);
        }
    };
    rt.pools.commit(
        index,
        PoolRecord {
            creator: task::current(),
            pool: Arc::new(Mutex::new(pool)),
        },
    );
    rt.stats.note_created(ResourceKind::Pool);
    Ok(PoolId(index as u32))
}

/// Destroys a pool. Fails with `Busy` while any element is outstanding.
pub fn destroy(id: PoolId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.pools.remove_if(id.index(), |record| {
        if record.pool.lock().unwrap().allocated_count() > 0 {
            fail(ErrorKind::Busy)
        } else {
            Ok(())
        }
    })?;
    rt.stats.note_deleted(ResourceKind::Pool);
    Ok(())
}

/// Takes one zero-initialized element from the pool. Fails when the pool
/// is exhausted; never blocks.
pub fn get(id: PoolId) -> Result<PoolBuf> {
    let pool = fetch(id)?;
    let mut pool = pool.lock().unwrap();
    match pool.alloc() {
        Some(offset) => Ok(PoolBuf { offset }),
        None => fail(ErrorKind::Unspecified),
    }
}

/// Returns an element to the pool. A handle that does not come from this
/// pool fails with `Invalid` and leaves the pool untouched.
pub fn put(id: PoolId, buf: PoolBuf) -> Result<()> {
    let pool = fetch(id)?;
    let mut pool = pool.lock().unwrap();
    if pool.allocated_count() == 0 {
        return fail(ErrorKind::Unspecified);
    }
    if pool.free(buf.offset) {
        Ok(())
    } else {
        fail(ErrorKind::Invalid)
    }
}

/// Reads an element's bytes.
pub fn with<T>(
    id: PoolId,
    buf: PoolBuf,
    body: impl FnOnce(&[u8]) -> T,
) -> Result<T> {
    let pool = fetch(id)?;
    let pool = pool.lock().unwrap();
    match pool.elem(buf.offset) {
        Some(bytes) => Ok(body(bytes)),
        None => fail(ErrorKind::Invalid),
    }
}

/// Writes an element's bytes.
pub fn with_mut<T>(
    id: PoolId,
    buf: PoolBuf,
    body: impl FnOnce(&mut [u8]) -> T,
) -> Result<T> {
    let pool = fetch(id)?;
    let mut pool = pool.lock().unwrap();
    match pool.elem_mut(buf.offset) {
        Some(bytes) => Ok(body(bytes)),
        None => fail(ErrorKind::Invalid),
    }
}

/// Reports the pool's creator and element counts.
pub fn info(id: PoolId) -> Result<PoolInfo> {
    runtime().pools.with(id.index(), |record| {
        let pool = record.pool.lock().unwrap();
        PoolInfo {
            creator: record.creator,
            capacity: pool.capacity(),
            free: pool.free_count(),
        }
    })
}

fn fetch(id: PoolId) -> Result<Arc<Mutex<partpool::Pool>>> {
    runtime().pools.with(id.index(), |record| record.pool.clone())
}
