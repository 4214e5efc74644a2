// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded priority message queues.
//!
//! A queue is three pieces: a fixed-partition pool carved out of the
//! caller's buffer holding the payload bytes, a descriptor list kept in
//! non-increasing priority order (FIFO among equals), and a counting
//! semaphore whose value always equals the number of resident messages.
//! `put` allocates a payload, copies, inserts, signals; `get` waits on the
//! semaphore under the queue's blocking policy, removes the head, copies
//! out, and returns the payload to the pool.
//!
//! The `NON_BLOCKING` creation flag selects only what a zero timeout means
//! on `get`: fail fast with `QueueEmpty`, versus pend forever.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use abi::{ErrorKind, QueueFlags, QueueId, TaskId};

use crate::countsem::HostCountSem;
use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::time;
use crate::Result;

/// Payload slots are word-aligned within the buffer.
const WORD: usize = 4;

struct MsgDesc {
    offset: u32,
    size: u32,
    priority: u32,
}

struct QueueState {
    pool: partpool::Pool,
    messages: VecDeque<MsgDesc>,
}

struct QueueInner {
    sem: HostCountSem,
    state: Mutex<QueueState>,
}

pub(crate) struct QueueRecord {
    creator: TaskId,
    depth: u32,
    data_size: usize,
    blocking: bool,
    inner: Arc<QueueInner>,
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct QueueInfo {
    pub creator: TaskId,
    pub depth: u32,
    pub data_size: usize,
    pub resident: u32,
}

/// Creates a message queue over a caller-provided buffer.
///
/// The buffer must be word-aligned and hold at least
/// `depth * round_up(data_size, 4)` bytes; `data_size` is the largest
/// payload a single message may carry.
pub fn create(
    buffer: Box<[u8]>,
    depth: u32,
    data_size: usize,
    flags: QueueFlags,
) -> Result<QueueId> {
    if depth == 0 || data_size == 0 || buffer.is_empty() {
        return fail(ErrorKind::Invalid);
    }
    if buffer.as_ptr() as usize % WORD != 0 {
        return fail(ErrorKind::AddressMisaligned);
    }
    let elem_size = data_size.next_multiple_of(WORD);
    if buffer.len() < depth as usize * elem_size {
        return fail(ErrorKind::Invalid);
    }

    let rt = runtime();
    let index = rt.queues.reserve()?;
    let pool = match partpool::Pool::new(buffer, elem_size) {
        Ok(pool) => pool,
        Err(_) => {
            rt.queues.abort(index);
            return fail(ErrorKind::Invalid);
        }
    };
    rt.queues.commit(
        index,
        QueueRecord {
            creator: task::current(),
            depth,
            data_size,
            blocking: !flags.contains(QueueFlags::NON_BLOCKING),
            inner: Arc::new(QueueInner {
                sem: HostCountSem::new(0),
                state: Mutex::new(QueueState {
                    pool,
                    messages: VecDeque::with_capacity(depth as usize),
                }),
            }),
        },
    );
    rt.stats.note_created(ResourceKind::Queue);
    log::debug!("queue {index} created, depth {depth} x {data_size} bytes");
    Ok(QueueId(index as u32))
}

/// Destroys a queue. Fails with `Busy` while any message remains resident.
pub fn destroy(id: QueueId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.queues.remove_if(id.index(), |record| {
        if record.inner.state.lock().unwrap().messages.is_empty() {
            Ok(())
        } else {
            fail(ErrorKind::Busy)
        }
    })?;
    rt.stats.note_deleted(ResourceKind::Queue);
    Ok(())
}

/// Posts a message. Fails with `QueueFull` when `depth` messages are
/// already resident, and with `Invalid` for an empty payload or one larger
/// than the queue's `data_size`.
pub fn put(id: QueueId, data: &[u8], priority: u32) -> Result<()> {
    let (inner, depth, data_size) = runtime().queues.with(id.index(), |r| {
        (r.inner.clone(), r.depth, r.data_size)
    })?;
    if data.is_empty() || data.len() > data_size {
        return fail(ErrorKind::Invalid);
    }

    {
        let mut state = inner.state.lock().unwrap();
        if state.messages.len() >= depth as usize {
            return fail(ErrorKind::QueueFull);
        }
        let Some(offset) = state.pool.alloc() else {
            return fail(ErrorKind::QueueFull);
        };
        state.pool.elem_mut(offset).unwrap()[..data.len()]
            .copy_from_slice(data);

        // Insert before the first lower-priority message, after every
        // equal-priority one, preserving FIFO within a priority.
        let position = state
            .messages
            .iter()
            .position(|m| m.priority < priority)
            .unwrap_or(state.messages.len());
        state.messages.insert(
            position,
            MsgDesc {
                offset,
                size: data.len() as u32,
                priority,
            },
        );
    }
    inner.sem.give()
}

/// Receives the highest-priority message into `out`, returning the payload
/// length.
///
/// `out` must hold at least the queue's `data_size` bytes; that is checked
/// before any wait. Timeout policy:
/// - `millis > 0`: block up to that long (rounded up to the tick), then
///   fail with `Timeout`;
/// - `millis == 0` on a blocking queue: pend until a message arrives;
/// - `millis == 0` on a non-blocking queue: fail with `QueueEmpty`
///   immediately if nothing is waiting.
pub fn get(id: QueueId, out: &mut [u8], millis: u32) -> Result<usize> {
    let (inner, blocking, data_size) = runtime().queues.with(id.index(), |r| {
        (r.inner.clone(), r.blocking, r.data_size)
    })?;
    if out.len() < data_size {
        return fail(ErrorKind::Invalid);
    }

    if millis > 0 {
        if !inner.sem.timed_take(time::timeout_duration(millis)) {
            return fail(ErrorKind::Timeout);
        }
    } else if blocking {
        inner.sem.take();
    } else if !inner.sem.try_take() {
        return fail(ErrorKind::QueueEmpty);
    }

    let mut state = inner.state.lock().unwrap();
    // The semaphore's value equals the message count, so having passed it
    // there is a message for us.
    let msg = state.messages.pop_front().expect("semaphore/list mismatch");
    let size = msg.size as usize;
    let elem = state.pool.elem(msg.offset).unwrap();
    out[..size].copy_from_slice(&elem[..size]);
    if !state.pool.free(msg.offset) {
        // Can't happen: the offset came from this pool.
        debug_assert!(false, "queue payload offset rejected by pool");
    }
    Ok(size)
}

/// Reports the queue's creator, geometry, and resident message count.
pub fn info(id: QueueId) -> Result<QueueInfo> {
    runtime().queues.with(id.index(), |record| QueueInfo {
        creator: record.creator,
        depth: record.depth,
        data_size: record.data_size,
        resident: record.inner.sem.value(),
    })
}
