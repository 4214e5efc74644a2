// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tasks: creation, priority, suspend/resume, exit, and periodic dispatch.
//!
//! A task is a host thread wrapped in a trampoline. The trampoline records
//! the task's identity thread-locally, parks on the process-wide startup
//! barrier until [`crate::start`] opens it, runs the entry closure, and
//! frees the task's slot exactly once on the way out -- whether the entry
//! returned, called [`exit`], or panicked. Panics are contained here; they
//! never cross into foreign code.
//!
//! A periodic task wraps its entry in a dispatcher that sleeps to each
//! period boundary and detects overruns: if the wall clock has passed the
//! next boundary before the previous invocation finished, the period is
//! torn down, the error handler (if any) runs exactly once with
//! `PeriodicTaskMissed`, and the task terminates. The period is never
//! retried after a miss.
//!
//! Deletion of another task is cooperative on this host: the slot is freed
//! immediately and a cancel flag is raised, which the runtime's own
//! suspension points (the periodic dispatcher, a suspended task's wakeup)
//! observe. A straight-line task body keeps running until its next such
//! point or until it returns.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use abi::config::EXTRA_STACK_OVERHEAD;
use abi::{ErrorKind, Priority, TaskFlags, TaskId};

use crate::err::{clear_last_error, fail};
use crate::host::{self, ThreadConfig};
use crate::runtime::runtime;
use crate::startup::Gate;
use crate::stats::ResourceKind;
use crate::Result;

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// Unwind payload used by [`exit`]; the trampoline recognizes it as a
/// normal termination.
struct ExitToken;

pub(crate) struct TaskRecord {
    creator: TaskId,
    stack_size: usize,
    priority: Priority,
    flags: TaskFlags,
    /// Index into the periodic table for a periodic task's period slot.
    periodic_slot: Option<usize>,
    /// Taken by `start()` for the join-all; `None` afterwards, and for
    /// deleted (detached) tasks.
    pub(crate) join: Option<JoinHandle<()>>,
    suspender: Arc<Suspender>,
    /// Raised by `delete`; unique per task incarnation, which also lets the
    /// trampoline tell whether a slot still belongs to it after reuse.
    cancel: Arc<AtomicBool>,
}

/// One periodic task's period slot.
pub(crate) struct PeriodicRecord {
    pub(crate) period_ms: u32,
    /// The owning task incarnation's cancel flag, used as an identity token
    /// so a stale owner cannot free a reused slot.
    owner: Arc<AtomicBool>,
}

struct Suspender {
    suspended: Mutex<bool>,
    cv: Condvar,
}

impl Suspender {
    fn new() -> Self {
        Self {
            suspended: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut suspended = self.suspended.lock().unwrap();
        *suspended = true;
        while *suspended {
            suspended = self.cv.wait(suspended).unwrap();
        }
    }

    fn unpark(&self) {
        let mut suspended = self.suspended.lock().unwrap();
        *suspended = false;
        self.cv.notify_all();
    }
}

/// Information returned by [`info`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskInfo {
    pub creator: TaskId,
    pub stack_size: usize,
    pub priority: Priority,
    pub periodic: bool,
}

/// The calling task's id, or [`TaskId::MAIN`] when called off-task.
pub fn current() -> TaskId {
    CURRENT_TASK.get().unwrap_or(TaskId::MAIN)
}

/// Creates a one-shot task running `entry` exactly once.
///
/// The task parks on the startup barrier until [`crate::start`] has been
/// called, then runs. `stack_size` is a floor request; the host minimum
/// applies.
pub fn create(
    entry: impl FnOnce() + Send + 'static,
    stack_size: usize,
    priority: Priority,
    flags: TaskFlags,
) -> Result<TaskId> {
    create_common(
        Box::new(entry),
        stack_size,
        priority,
        flags,
        Arc::new(AtomicBool::new(false)),
        None,
    )
}

/// Creates a periodic task running `entry` every `period_ms` milliseconds.
///
/// On the first missed deadline the period is torn down, `err_handler` (if
/// present) is invoked exactly once with `PeriodicTaskMissed`, and the task
/// terminates.
pub fn create_periodic(
    entry: impl FnMut() + Send + 'static,
    err_handler: Option<Box<dyn FnOnce(ErrorKind) + Send>>,
    stack_size: usize,
    priority: Priority,
    flags: TaskFlags,
    period_ms: u32,
) -> Result<TaskId> {
    if period_ms == 0 {
        return fail(ErrorKind::Invalid);
    }
    let rt = runtime();
    let cancel = Arc::new(AtomicBool::new(false));

    let slot = rt.periodic.reserve()?;
    rt.periodic.commit(
        slot,
        PeriodicRecord {
            period_ms,
            owner: cancel.clone(),
        },
    );

    let body = periodic_dispatcher(entry, err_handler, period_ms, slot, cancel.clone());
    match create_common(
        Box::new(body),
        stack_size,
        priority,
        flags | TaskFlags::PERIODIC,
        cancel,
        Some(slot),
    ) {
        Ok(id) => Ok(id),
        Err(kind) => {
            let _ = rt.periodic.remove_if(slot, |_| Ok(()));
            Err(kind)
        }
    }
}

/// Builds the loop body for a periodic task: sleep to the next period
/// boundary, detect overrun, dispatch.
fn periodic_dispatcher(
    mut entry: impl FnMut() + Send + 'static,
    err_handler: Option<Box<dyn FnOnce(ErrorKind) + Send>>,
    period_ms: u32,
    slot: usize,
    cancel: Arc<AtomicBool>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let period = Duration::from_millis(u64::from(period_ms));
        let mut missed = false;
        let mut next = Instant::now();
        loop {
            next += period;
            let now = Instant::now();
            if now > next {
                missed = true;
                break;
            }
            host::sleep(next - now);
            if cancel.load(Ordering::Acquire) {
                break;
            }
            entry();
        }

        // Release the period slot before the error handler runs, and drop
        // the record's link to it so the final teardown does not touch a
        // reused slot.
        let rt = runtime();
        let me = current();
        let _ = rt.periodic.remove_if(slot, |record| {
            if Arc::ptr_eq(&record.owner, &cancel) {
                Ok(())
            } else {
                Err(ErrorKind::Invalid)
            }
        });
        let _ = rt.tasks.update(me.index(), |record| {
            record.periodic_slot = None;
        });

        if missed {
            log::warn!("periodic task {} missed its deadline", me.0);
            if let Some(handler) = err_handler {
                handler(ErrorKind::PeriodicTaskMissed);
            }
        }
    }
}

fn create_common(
    entry: Box<dyn FnOnce() + Send + 'static>,
    stack_size: usize,
    priority: Priority,
    flags: TaskFlags,
    cancel: Arc<AtomicBool>,
    periodic_slot: Option<usize>,
) -> Result<TaskId> {
    if priority.0 == 0 {
        return fail(ErrorKind::Invalid);
    }
    let rt = runtime();
    let index = rt.tasks.reserve()?;
    let id = TaskId(index as u32);

    let suspender = Arc::new(Suspender::new());
    // Holds the new thread until its record is committed, so the thread can
    // never observe (or free) a half-created slot.
    let commit_gate = Arc::new(Gate::new());

    let trampoline = {
        let cancel = cancel.clone();
        let commit_gate = commit_gate.clone();
        move || {
            CURRENT_TASK.set(Some(id));
            clear_last_error();
            commit_gate.wait_open();
            runtime().barrier.wait_open();
            if !cancel.load(Ordering::Acquire) {
                match catch_unwind(AssertUnwindSafe(entry)) {
                    Ok(()) => {}
                    Err(payload) if payload.is::<ExitToken>() => {}
                    Err(_) => {
                        log::warn!("task {index} terminated by panic");
                    }
                }
            }
            finalize(id, &cancel);
        }
    };

    let join = match host::spawn(
        ThreadConfig {
            name: format!("task-{index}"),
            stack_size: stack_size.saturating_add(EXTRA_STACK_OVERHEAD),
            priority,
        },
        trampoline,
    ) {
        Ok(handle) => handle,
        Err(err) => {
            rt.tasks.abort(index);
            log::warn!("task {index}: thread creation failed: {err}");
            return fail(ErrorKind::Unspecified);
        }
    };

    rt.tasks.commit(
        index,
        TaskRecord {
            creator: current(),
            stack_size,
            priority,
            flags,
            periodic_slot,
            join: Some(join),
            suspender,
            cancel,
        },
    );
    rt.stats.note_created(ResourceKind::Task);
    commit_gate.open();
    log::debug!("task {index} created at priority {}", priority.0);
    Ok(id)
}

/// Frees the slot for a task that has finished, unless `delete` got there
/// first (in which case the slot may already host a successor).
fn finalize(id: TaskId, my_cancel: &Arc<AtomicBool>) {
    let rt = runtime();
    let removed = rt.tasks.remove_if(id.index(), |record| {
        if Arc::ptr_eq(&record.cancel, my_cancel) {
            Ok(())
        } else {
            Err(ErrorKind::Invalid)
        }
    });
    if let Ok(record) = removed {
        rt.stats.note_deleted(ResourceKind::Task);
        if let Some(slot) = record.periodic_slot {
            let _ = rt.periodic.remove_if(slot, |p| {
                if Arc::ptr_eq(&p.owner, &record.cancel) {
                    Ok(())
                } else {
                    Err(ErrorKind::Invalid)
                }
            });
        }
        log::debug!("task {} exited", id.0);
    }
}

/// Terminates the calling task. Never returns; the trampoline recovers the
/// unwind and frees the slot. Must be called from a task.
pub fn exit() -> ! {
    std::panic::resume_unwind(Box::new(ExitToken));
}

/// Deletes a task. Cooperative on this host: the slot is freed now, the
/// thread is detached and told to exit, and it does so at its next runtime
/// suspension point. Disabled under the static allocation policy.
pub fn delete(id: TaskId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let id = resolve(id);
    let rt = runtime();
    let record = rt.tasks.remove_if(id.index(), |_| Ok(()))?;
    rt.stats.note_deleted(ResourceKind::Task);

    record.cancel.store(true, Ordering::Release);
    // Wake it if it is parked in suspend(); it will observe the flag.
    record.suspender.unpark();
    if let Some(slot) = record.periodic_slot {
        let _ = rt.periodic.remove_if(slot, |p| {
            if Arc::ptr_eq(&p.owner, &record.cancel) {
                Ok(())
            } else {
                Err(ErrorKind::Invalid)
            }
        });
    }
    // Dropping the join handle detaches the thread.
    log::debug!("task {} deleted", id.0);
    Ok(())
}

/// Suspends the calling task until [`resume`]. Only `SELF` (or the
/// caller's own id) is accepted; suspending another task is not supported
/// on this host.
pub fn suspend(id: TaskId) -> Result<()> {
    let me = current();
    if id != TaskId::SELF && id != me {
        return fail(ErrorKind::NotSupported);
    }
    if me == TaskId::MAIN {
        return fail(ErrorKind::Unspecified);
    }
    let (suspender, cancel) = runtime()
        .tasks
        .with(me.index(), |r| (r.suspender.clone(), r.cancel.clone()))?;
    suspender.park();
    if cancel.load(Ordering::Acquire) {
        exit();
    }
    Ok(())
}

/// Resumes a suspended task.
pub fn resume(id: TaskId) -> Result<()> {
    let suspender =
        runtime().tasks.with(id.index(), |r| r.suspender.clone())?;
    suspender.unpark();
    Ok(())
}

/// Changes a task's priority, returning the previous one. The host-side
/// adjustment is best-effort.
pub fn set_priority(id: TaskId, new: Priority) -> Result<Priority> {
    if new.0 == 0 {
        return fail(ErrorKind::Invalid);
    }
    let id = resolve(id);
    runtime().tasks.update(id.index(), |record| {
        let old = record.priority;
        record.priority = new;
        match &record.join {
            Some(handle) => host::set_thread_priority(handle, new),
            // The handle is with start()'s join-all; we can still adjust
            // ourselves.
            None if id == current() => host::apply_current_priority(new),
            None => {}
        }
        old
    })
}

/// Reports a task's creator, stack, priority and kind.
pub fn info(id: TaskId) -> Result<TaskInfo> {
    let id = resolve(id);
    runtime().tasks.with(id.index(), |record| TaskInfo {
        creator: record.creator,
        stack_size: record.stack_size,
        priority: record.priority,
        periodic: record.flags.contains(TaskFlags::PERIODIC),
    })
}

/// Offers the processor to another ready task.
pub fn yield_now() {
    host::yield_now();
}

fn resolve(id: TaskId) -> TaskId {
    if id == TaskId::SELF {
        current()
    } else {
        id
    }
}
