// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot timers with relative and wall-clock arming.
//!
//! All expiries are delivered by one dedicated dispatcher thread, so
//! callbacks run in a normal thread context and may use the full API --
//! including re-arming their own timer. The dispatcher sleeps until the
//! earliest armed deadline, wakes on any arm/cancel/destroy, collects the
//! due callbacks under the table lock, and invokes them with no lock held.
//!
//! Arming an already-armed timer cancels and re-arms it. Intervals are
//! rounded up to the tick. A wall-clock target in the past fires
//! immediately.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use abi::{ErrorKind, TaskId, TimeOfDay, TimerId};

use crate::err::fail;
use crate::runtime::runtime;
use crate::stats::ResourceKind;
use crate::task;
use crate::time;
use crate::Result;

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// The most recent arming, kept after the timer fires so `reset` can
/// re-arm it.
struct Programmed {
    interval: Duration,
    callback: Callback,
}

pub(crate) struct TimerRecord {
    #[allow(dead_code)]
    creator: TaskId,
    programmed: Option<Programmed>,
    deadline: Option<Instant>,
}

/// Wakes the dispatcher whenever the set of armed deadlines changes.
pub(crate) struct DispatcherSignal {
    generation: Mutex<u64>,
    cv: Condvar,
}

impl DispatcherSignal {
    pub(crate) fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn notify(&self) {
        let mut generation = self.generation.lock().unwrap();
        *generation += 1;
        self.cv.notify_all();
    }

    fn current(&self) -> u64 {
        *self.generation.lock().unwrap()
    }

    /// Sleeps until `until` (forever if `None`) or until the generation
    /// moves past `seen`, whichever is first.
    fn wait_while_unchanged(&self, seen: u64, until: Option<Instant>) {
        let mut generation = self.generation.lock().unwrap();
        while *generation == seen {
            match until {
                Some(deadline) => {
                    let Some(remaining) =
                        deadline.checked_duration_since(Instant::now())
                    else {
                        return;
                    };
                    let (guard, _) = self
                        .cv
                        .wait_timeout(generation, remaining)
                        .unwrap();
                    generation = guard;
                }
                None => {
                    generation = self.cv.wait(generation).unwrap();
                }
            }
        }
    }
}

pub(crate) fn spawn_dispatcher() {
    let spawned = std::thread::Builder::new()
        .name("osal-timer".into())
        .spawn(dispatcher_loop);
    if let Err(err) = spawned {
        log::error!("timer dispatcher failed to start: {err}");
    }
}

fn dispatcher_loop() {
    let rt = runtime();
    loop {
        // Snapshot the generation before scanning, so an arm that lands
        // between the scan and the sleep wakes us instead of being lost.
        let seen = rt.timer_signal.current();
        let now = Instant::now();
        let mut due: Vec<Callback> = Vec::new();
        let mut earliest: Option<Instant> = None;

        rt.timers.update_each(|_, record| {
            if let Some(deadline) = record.deadline {
                if deadline <= now {
                    record.deadline = None;
                    if let Some(programmed) = &record.programmed {
                        due.push(programmed.callback.clone());
                    }
                } else {
                    earliest = Some(
                        earliest.map_or(deadline, |e| e.min(deadline)),
                    );
                }
            }
        });

        for callback in due {
            callback();
        }
        rt.timer_signal.wait_while_unchanged(seen, earliest);
    }
}

/// Creates a timer, unarmed.
pub fn create() -> Result<TimerId> {
    let rt = runtime();
    let index = rt.timers.reserve()?;
    rt.timers.commit(
        index,
        TimerRecord {
            creator: task::current(),
            programmed: None,
            deadline: None,
        },
    );
    rt.stats.note_created(ResourceKind::Timer);
    Ok(TimerId(index as u32))
}

/// Destroys a timer. A pending fire is cancelled; the callback will not
/// run.
pub fn destroy(id: TimerId) -> Result<()> {
    if cfg!(feature = "static-alloc") {
        return fail(ErrorKind::NotSupported);
    }
    let rt = runtime();
    rt.timers.remove_if(id.index(), |_| Ok(()))?;
    rt.stats.note_deleted(ResourceKind::Timer);
    rt.timer_signal.notify();
    Ok(())
}

/// Arms the timer to fire `callback` once, `millis` from now (rounded up
/// to the tick; zero fires as soon as the dispatcher runs). An armed timer
/// is cancelled and re-armed.
pub fn fire_after(
    id: TimerId,
    millis: u32,
    callback: impl Fn() + Send + Sync + 'static,
) -> Result<()> {
    let interval = if millis == 0 {
        Duration::ZERO
    } else {
        time::timeout_duration(millis)
    };
    arm(id, interval, Arc::new(callback))
}

/// Arms the timer to fire `callback` once at the wall-clock time `when`.
/// A target at or before the current time of day fires immediately.
pub fn fire_when(
    id: TimerId,
    when: &TimeOfDay,
    callback: impl Fn() + Send + Sync + 'static,
) -> Result<()> {
    let Some(target) = when.seconds_since_epoch() else {
        return fail(ErrorKind::Invalid);
    };
    let now = match time::get_tod()?.seconds_since_epoch() {
        Some(seconds) => seconds,
        None => return fail(ErrorKind::TimerFailure),
    };
    let delay = Duration::from_secs(u64::from(target.saturating_sub(now)));
    arm(id, delay, Arc::new(callback))
}

/// Re-arms the timer with its most recently configured interval and
/// callback. Fails with `TimerNotAvail` if the timer was never armed.
pub fn reset(id: TimerId) -> Result<()> {
    let rt = runtime();
    let armed = rt.timers.update(id.index(), |record| {
        match &record.programmed {
            Some(programmed) => {
                record.deadline = Some(Instant::now() + programmed.interval);
                Ok(())
            }
            None => fail(ErrorKind::TimerNotAvail),
        }
    })?;
    armed?;
    rt.timer_signal.notify();
    Ok(())
}

/// Disarms the timer without forgetting its configuration; the next
/// [`reset`], [`fire_after`] or [`fire_when`] starts it again.
pub fn cancel(id: TimerId) -> Result<()> {
    let rt = runtime();
    rt.timers.update(id.index(), |record| {
        record.deadline = None;
    })?;
    rt.timer_signal.notify();
    Ok(())
}

fn arm(id: TimerId, interval: Duration, callback: Callback) -> Result<()> {
    let rt = runtime();
    rt.timers.update(id.index(), |record| {
        record.programmed = Some(Programmed {
            interval,
            callback,
        });
        record.deadline = Some(Instant::now() + interval);
    })?;
    rt.timer_signal.notify();
    Ok(())
}
