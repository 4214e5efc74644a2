// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! POSIX host adapter.
//!
//! Tasks become threads under `SCHED_FIFO` where the process is allowed to
//! use it. Priority elevation is best-effort: an unprivileged process gets
//! `EPERM` from the scheduler calls and runs everything at the default
//! policy, which is fine for development -- the API behaves identically,
//! minus the preemption guarantees. The hosted target provides no priority
//! ceiling or inheritance for mutexes.

use std::os::unix::thread::JoinHandleExt;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use abi::config::MIN_STACK_SIZE;
use abi::Priority;

/// Parameters for a new host thread.
pub(crate) struct ThreadConfig {
    pub name: String,
    pub stack_size: usize,
    pub priority: Priority,
}

/// Spawns a host thread for a task. The stack request is raised to the
/// host's usable minimum; the scheduling priority is applied from inside
/// the new thread before `body` runs.
pub(crate) fn spawn(
    config: ThreadConfig,
    body: impl FnOnce() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    let priority = config.priority;
    thread::Builder::new()
        .name(config.name)
        .stack_size(config.stack_size.max(MIN_STACK_SIZE))
        .spawn(move || {
            apply_current_priority(priority);
            body();
        })
}

/// Maps an abstract priority (1 most important) onto the host's
/// `SCHED_FIFO` range, which counts the other way.
fn native_priority(priority: Priority) -> libc::c_int {
    // Safety: both calls are pure queries.
    let (min, max) = unsafe {
        (
            libc::sched_get_priority_min(libc::SCHED_FIFO),
            libc::sched_get_priority_max(libc::SCHED_FIFO),
        )
    };
    (max - libc::c_int::from(priority.0) + 1).clamp(min, max)
}

fn set_sched_param(thread: libc::pthread_t, priority: Priority) {
    let param = libc::sched_param {
        sched_priority: native_priority(priority),
    };
    // Safety: `thread` came from a live handle or pthread_self, and the
    // param struct outlives the call.
    let rc = unsafe {
        libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param)
    };
    if rc != 0 {
        // Typically EPERM without CAP_SYS_NICE. Not an error for the
        // caller; the priority remains advisory.
        log::debug!("pthread_setschedparam failed ({rc}), priority advisory");
    }
}

/// Applies `priority` to the calling thread, best-effort.
pub(crate) fn apply_current_priority(priority: Priority) {
    // Safety: pthread_self has no preconditions.
    set_sched_param(unsafe { libc::pthread_self() }, priority);
}

/// Applies `priority` to another live thread, best-effort.
pub(crate) fn set_thread_priority(
    handle: &JoinHandle<()>,
    priority: Priority,
) {
    set_sched_param(handle.as_pthread_t(), priority);
}

/// The host's scheduler tick rate. The tick is the floor for every timed
/// wait and timer interval in the core.
pub(crate) fn ticks_per_second() -> u32 {
    // Safety: pure query.
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u32
    } else {
        100
    }
}

/// Current wall-clock time as (seconds, microseconds) since the POSIX
/// epoch. `None` if the clock reads before the epoch.
pub(crate) fn wall_clock() -> Option<(u64, u32)> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    Some((now.as_secs(), now.subsec_micros()))
}

/// Blocks the calling thread for at least `duration`.
pub(crate) fn sleep(duration: Duration) {
    thread::sleep(duration);
}

/// Offers the processor to another ready thread.
pub(crate) fn yield_now() {
    thread::yield_now();
}
