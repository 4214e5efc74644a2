// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error recording.
//!
//! Failures are delivered twice: as the `Err` arm of the returned `Result`,
//! and as the calling task's last-error code for callers composing in the
//! classic check-the-return-then-read-errno style. Each task has exactly one
//! cell; code running off-task (the main thread, the timer dispatcher) gets
//! its own. Failures never unwind out of the public API.

use std::cell::Cell;

use abi::ErrorKind;

use crate::Result;

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Records `kind` in the caller's last-error cell and returns it as the
/// error. Every failing public operation funnels through here, so the cell
/// and the return value can never disagree.
pub(crate) fn fail<T>(kind: ErrorKind) -> Result<T> {
    LAST_ERROR.with(|e| e.set(kind.code()));
    Err(kind)
}

/// The calling task's last-error code: 0 if no operation has failed on this
/// task, otherwise the code of the most recent failure.
pub fn last_error() -> i32 {
    LAST_ERROR.with(Cell::get)
}

/// The calling task's last failure, decoded. `None` if nothing has failed.
pub fn last_error_kind() -> Option<ErrorKind> {
    ErrorKind::try_from(last_error()).ok()
}

/// Resets the calling task's last-error cell. Task bodies start with a
/// clear cell.
pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|e| e.set(0));
}
