// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time services: sleep, monotonic uptime, ticks, and the wall clock.
//!
//! The tick is the scheduler's quantum, queried from the host once and
//! cached. Timed waits and timer intervals are rounded *up* to the next
//! tick boundary, so a nonzero timeout never degenerates to a busy poll.
//!
//! The wall clock has two sources. [`set_tod`] anchors a caller-supplied
//! time of day against the monotonic clock, from which [`get_tod`] then
//! advances -- setting the time never touches the host clock, which a
//! hosted process generally is not allowed to do. Before any `set_tod`,
//! `get_tod` derives the answer from the host's wall clock instead.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use abi::tod::SECONDS_1970_THROUGH_1988;
use abi::{ErrorKind, TimeOfDay, TimeValue};

use crate::err::fail;
use crate::host;
use crate::runtime::runtime;
use crate::Result;

static BOOT: OnceLock<Instant> = OnceLock::new();
static TICKS_PER_SECOND: OnceLock<u32> = OnceLock::new();

/// Wall-clock anchor established by [`set_tod`].
pub(crate) struct TodAnchor {
    base_seconds: u32,
    base_micros: u32,
    at: Instant,
}

pub(crate) fn mark_boot() {
    let _ = BOOT.get_or_init(Instant::now);
}

fn boot() -> Instant {
    *BOOT.get_or_init(Instant::now)
}

/// Blocks the calling task for at least `millis` milliseconds.
pub fn sleep_ms(millis: u32) {
    host::sleep(Duration::from_millis(u64::from(millis)));
}

/// Blocks the calling task for at least `micros` microseconds.
pub fn sleep_us(micros: u32) {
    host::sleep(Duration::from_micros(u64::from(micros)));
}

/// Monotonic time since the runtime initialized.
pub fn uptime() -> TimeValue {
    let _ = runtime();
    let elapsed = boot().elapsed();
    TimeValue {
        seconds: elapsed.as_secs() as u32,
        microseconds: elapsed.subsec_micros(),
    }
}

/// The scheduler tick count since the runtime initialized. Wraps at 32
/// bits.
pub fn ticks_since_boot() -> u32 {
    let _ = runtime();
    let elapsed = boot().elapsed();
    let tps = u64::from(ticks_per_second());
    let ticks = elapsed.as_secs() * tps
        + u64::from(elapsed.subsec_nanos()) * tps / 1_000_000_000;
    ticks as u32
}

/// Scheduler ticks per second on this host.
pub fn ticks_per_second() -> u32 {
    *TICKS_PER_SECOND.get_or_init(host::ticks_per_second)
}

/// Length of one scheduler tick in microseconds.
pub fn microseconds_per_tick() -> u32 {
    (1_000_000 / ticks_per_second()).max(1)
}

/// Converts a millisecond interval to ticks, rounding up to the next tick
/// boundary. Zero stays zero.
pub fn millis_to_ticks(millis: u32) -> u32 {
    if millis == 0 {
        return 0;
    }
    let per_tick = u64::from(microseconds_per_tick());
    let micros = u64::from(millis) * 1000;
    (micros.div_ceil(per_tick)) as u32
}

/// The duration actually waited for a `millis` timeout: at least one tick,
/// rounded up to a tick boundary.
pub(crate) fn timeout_duration(millis: u32) -> Duration {
    let ticks = millis_to_ticks(millis).max(1);
    Duration::from_micros(
        u64::from(ticks) * u64::from(microseconds_per_tick()),
    )
}

/// Returns the wall-clock time of day.
///
/// Fails with `TimeNotSet` if no anchor was established and the host clock
/// reads before the 1988 epoch.
pub fn get_tod() -> Result<TimeOfDay> {
    let rt = runtime();
    let anchor = rt.tod.read().unwrap();
    if let Some(anchor) = &*anchor {
        let elapsed = anchor.at.elapsed();
        let micros =
            u64::from(anchor.base_micros) + u64::from(elapsed.subsec_micros());
        let seconds = u64::from(anchor.base_seconds)
            + elapsed.as_secs()
            + micros / 1_000_000;
        let Ok(seconds) = u32::try_from(seconds) else {
            return fail(ErrorKind::Unspecified);
        };
        let mut tod = TimeOfDay::from_seconds_since_epoch(seconds);
        tod.microsecond = (micros % 1_000_000) as u32;
        Ok(tod)
    } else {
        let Some((unix_seconds, micros)) = host::wall_clock() else {
            return fail(ErrorKind::Unspecified);
        };
        if unix_seconds < SECONDS_1970_THROUGH_1988 {
            return fail(ErrorKind::TimeNotSet);
        }
        let Ok(seconds) = u32::try_from(unix_seconds - SECONDS_1970_THROUGH_1988)
        else {
            return fail(ErrorKind::Unspecified);
        };
        let mut tod = TimeOfDay::from_seconds_since_epoch(seconds);
        tod.microsecond = micros;
        Ok(tod)
    }
}

/// Sets the wall-clock time of day. The value is validated and anchored
/// process-locally; the host clock is not modified.
pub fn set_tod(tod: &TimeOfDay) -> Result<()> {
    let Some(base_seconds) = tod.seconds_since_epoch() else {
        return fail(ErrorKind::Invalid);
    };
    let rt = runtime();
    *rt.tod.write().unwrap() = Some(TodAnchor {
        base_seconds,
        base_micros: tod.microsecond,
        at: Instant::now(),
    });
    log::debug!(
        "time of day set to {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        tod.year,
        tod.month,
        tod.day,
        tod.hour,
        tod.minute,
        tod.second
    );
    Ok(())
}
