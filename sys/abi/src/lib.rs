// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Public ABI definitions for the OS abstraction layer, shared between the
//! core and application code.
//!
//! Everything here is plain data: error kinds with stable numeric values,
//! opaque resource identifiers, priorities, creation flags, and the two
//! canonical time representations. The behavior lives in the `osal` crate;
//! host-side tooling can consume these types without pulling in the core.

#![no_std]

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub mod config;
pub mod tod;

/// The closed set of failure kinds. Every fallible operation in the core
/// reports exactly one of these; the numeric values are stable and match
/// the errno codes of the C-compatible surface (0 is reserved for success,
/// so the set starts at 1).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorKind {
    /// Unspecified failure in the host runtime.
    Unspecified = 1,
    /// Bad argument: out-of-range id, bad priority, bad size, empty buffer.
    Invalid = 2,
    /// A buffer violated an alignment requirement.
    AddressMisaligned = 3,
    /// A timed wait expired before the event occurred.
    Timeout = 4,
    /// The host lacks the requested feature.
    NotSupported = 5,
    /// Delete attempted while the resource is in use.
    Busy = 6,
    /// The underlying semaphore or mutex primitive failed, including unlock
    /// of a mutex by a non-owner.
    SemFailure = 7,
    /// A `try_` operation found the resource unavailable.
    SemNotAvail = 8,
    /// Non-blocking receive found no message waiting.
    QueueEmpty = 9,
    /// The queue's payload pool is exhausted.
    QueueFull = 10,
    /// The resource table for this kind is full.
    NoFreeIds = 11,
    /// The time of day was queried before being initialized.
    TimeNotSet = 12,
    /// The host timer primitive failed.
    TimerFailure = 13,
    /// The timer has no stored interval to re-arm from.
    TimerNotAvail = 14,
    /// ECC helper: general error.
    EccError = 15,
    /// ECC helper: uncorrectable error.
    EccUncorrectable = 16,
    /// ECC helper: single correctable error.
    EccSingle = 17,
    /// ECC helper: invalid order requested.
    EccInvalidOrder = 18,
    /// A periodic task missed its deadline.
    PeriodicTaskMissed = 19,
}

impl ErrorKind {
    /// The stable errno value for this kind.
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// We use an explicit `TryFrom` impl instead of `FromPrimitive` so that the
/// core does not grow a dependency on `num-traits` just for this.
impl core::convert::TryFrom<i32> for ErrorKind {
    type Error = ();

    fn try_from(x: i32) -> Result<Self, Self::Error> {
        match x {
            1 => Ok(Self::Unspecified),
            2 => Ok(Self::Invalid),
            3 => Ok(Self::AddressMisaligned),
            4 => Ok(Self::Timeout),
            5 => Ok(Self::NotSupported),
            6 => Ok(Self::Busy),
            7 => Ok(Self::SemFailure),
            8 => Ok(Self::SemNotAvail),
            9 => Ok(Self::QueueEmpty),
            10 => Ok(Self::QueueFull),
            11 => Ok(Self::NoFreeIds),
            12 => Ok(Self::TimeNotSet),
            13 => Ok(Self::TimerFailure),
            14 => Ok(Self::TimerNotAvail),
            15 => Ok(Self::EccError),
            16 => Ok(Self::EccUncorrectable),
            17 => Ok(Self::EccSingle),
            18 => Ok(Self::EccInvalidOrder),
            19 => Ok(Self::PeriodicTaskMissed),
            _ => Err(()),
        }
    }
}

/// Names a task.
///
/// A `TaskId` is an index into the task table. Slot reuse is serialized by
/// the table's writer lock, so a stale id either names the slot's new
/// occupant or fails validation -- it can never reach freed state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Sentinel accepted by operations that act on "the calling task".
    pub const SELF: Self = Self(0x0000_FFFF);

    /// Sentinel recorded as the creator of resources created off-task (from
    /// the main thread, before the runtime owns the caller).
    pub const MAIN: Self = Self(0x0000_FFFE);

    /// Extracts the table index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

macro_rules! resource_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(
            Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Extracts the table index.
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }
    };
}

resource_id! {
    /// Names a mutex.
    MutexId
}
resource_id! {
    /// Names a binary semaphore.
    BinSemId
}
resource_id! {
    /// Names a counting semaphore.
    CountSemId
}
resource_id! {
    /// Names a message queue.
    QueueId
}
resource_id! {
    /// Names a memory pool.
    PoolId
}
resource_id! {
    /// Names a timer.
    TimerId
}

/// Indicates priority of a task.
///
/// Priorities run from 1 to 255 with 1 the most important; the host adapter
/// inverts this where the underlying scheduler counts the other way. Zero is
/// not a valid priority.
///
/// Note that this type *deliberately* does not implement `PartialOrd`/`Ord`,
/// to keep us from confusing ourselves on whether `>` means numerically
/// greater / less important, or more important / numerically smaller.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Most important valid priority.
    pub const HIGHEST: Self = Self(1);
    /// Least important valid priority.
    pub const LOWEST: Self = Self(255);

    /// Returns `Some` for a priority in the valid 1..=255 range.
    pub const fn new(level: u8) -> Option<Self> {
        if level == 0 {
            None
        } else {
            Some(Self(level))
        }
    }

    /// Checks if `self` is strictly more important than `other`.
    ///
    /// This is easier to read than comparing the numeric values, since lower
    /// numbers are more important.
    pub fn is_more_important_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

bitflags::bitflags! {
    /// Collection of boolean flags controlling task creation.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    #[repr(transparent)]
    pub struct TaskFlags: u32 {
        /// Floating point operations enabled for this task.
        const FP_ENABLED = 1 << 0;
        /// Floating point operations disabled for this task.
        const FP_DISABLED = 1 << 1;
        /// Set internally on the body of a periodic task.
        const PERIODIC = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Flags controlling message queue creation. They select only the
    /// policy of a receive with a zero timeout.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
    #[repr(transparent)]
    pub struct QueueFlags: u32 {
        /// A receive with a zero timeout returns `QueueEmpty` instead of
        /// pending forever.
        const NON_BLOCKING = 1 << 0;
    }
}

/// A point in time as seconds plus microseconds, used for both monotonic
/// uptime and wall-clock values.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct TimeValue {
    pub seconds: u32,
    pub microseconds: u32,
}

/// Broken-down wall-clock time, anchored at the 1988 epoch.
///
/// Field ranges: `year >= 1988`, `month` 1..=12, `day` 1..=31, `hour`
/// 0..=23, `minute` and `second` 0..=59, `microsecond` 0..=999_999. Use
/// [`TimeOfDay::is_valid`] before trusting externally supplied values; the
/// calendar conversions live in [`tod`].
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
#[repr(C)]
pub struct TimeOfDay {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
}
