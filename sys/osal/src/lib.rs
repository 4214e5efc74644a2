// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A portable operating-system abstraction layer: tasks (one-shot and
//! periodic), mutexes, binary and counting semaphores, bounded priority
//! message queues, one-shot timers, fixed-partition memory pools, and wall
//! clock / uptime services, over a uniform handle-based API.
//!
//! The crate is a library; there is no scheduler here. Tasks are host
//! threads, scheduled by the host with a real-time policy where the host
//! permits it, and every other primitive is built on the thin seam in
//! [`host`]. An RTOS port replaces that seam and nothing else.
//!
//! Resources are named by small integer handles drawn from fixed-capacity
//! tables sized in [`abi::config`]. Creating a resource allocates the
//! lowest free slot; deleting it frees the slot for reuse. All fallible
//! operations return [`ErrorKind`] and additionally record it in the
//! calling task's last-error cell (see [`last_error`]) for callers that
//! keep the classic errno discipline.
//!
//! The usual shape of a program:
//!
//! ```ignore
//! osal::init();
//! let sem = osal::binsem::create(0)?;
//! osal::task::create(move || worker(sem), 0, Priority(100),
//!     TaskFlags::empty())?;
//! osal::start(); // opens the startup barrier, returns when all tasks exit
//! ```

use abi::config::ConfigInfo;
pub use abi::ErrorKind;

pub use crate::err::{last_error, last_error_kind};
pub use crate::startup::{init, start};

/// Shorthand for the result type every fallible operation returns.
pub type Result<T> = core::result::Result<T, ErrorKind>;

mod err;
mod host;
mod runtime;
mod startup;
mod table;

pub mod binsem;
pub mod countsem;
pub mod mutex;
#[cfg(feature = "mem-pool")]
pub mod pool;
pub mod queue;
pub mod stats;
pub mod task;
pub mod time;
pub mod timer;

/// Returns the build-time capacity configuration.
pub fn config_info() -> ConfigInfo {
    ConfigInfo::gather()
}
