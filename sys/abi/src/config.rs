// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Compile-time configuration.
//!
//! All resource tables are sized here, once, at build time. The core never
//! allocates table space dynamically; creating the N+1th resource of a kind
//! fails with `NoFreeIds`.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Maximum number of one-shot tasks that can be concurrently active.
pub const MAX_SPORADIC_TASKS: usize = 32;

/// Maximum number of periodic tasks that can be concurrently active.
pub const MAX_PERIODIC_TASKS: usize = 16;

/// Total task table capacity. Periodic tasks occupy a task slot *and* a
/// periodic slot.
pub const MAX_TASKS: usize = MAX_SPORADIC_TASKS + MAX_PERIODIC_TASKS;

/// Maximum number of message queues.
pub const MAX_QUEUES: usize = 16;

/// Maximum number of memory pools.
pub const MAX_POOLS: usize = 8;

/// Maximum number of binary semaphores.
pub const MAX_BIN_SEMAPHORES: usize = 24;

/// Maximum number of counting semaphores.
pub const MAX_COUNT_SEMAPHORES: usize = 24;

/// Mutexes reserved for the core's own locking needs, on top of the user
/// allowance. Each resource kind budgets two.
pub const INTERNAL_MUTEXES: usize = 14;

/// Mutexes available to applications.
pub const MAX_USER_MUTEXES: usize = 20;

/// Total mutex table capacity.
pub const MAX_MUTEXES: usize = MAX_USER_MUTEXES + INTERNAL_MUTEXES;

/// Maximum number of timers.
pub const MAX_TIMERS: usize = 8;

/// Stack floor applied to task creation; requests below this are raised to
/// it, matching the host's minimum usable thread stack.
pub const MIN_STACK_SIZE: usize = 20 * 1024;

/// Bytes added to every task's stack requirement beyond what the caller
/// asked for.
pub const EXTRA_STACK_OVERHEAD: usize = 0;

/// KiB added to the total memory requirement calculated for the core.
pub const EXTRA_MEMORY_OVERHEAD_KIB: usize = 0;

/// Hardware clock frequency used by bare-metal targets to derive the tick
/// length. The hosted adapter asks the OS instead.
pub const HW_CLOCK_FREQUENCY_HZ: u32 = 1_000_000;

// The id sentinels live above every possible table index.
const_assert!(MAX_TASKS < 0xFFFE);
const_assert!(MAX_PERIODIC_TASKS <= MAX_TASKS);
const_assert!(MAX_MUTEXES > INTERNAL_MUTEXES);

/// The configured capacity set, as a value. This is what
/// `osal::config_info()` hands back to applications that want to size their
/// own structures against the build.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub max_sporadic_tasks: u32,
    pub max_periodic_tasks: u32,
    pub max_bin_semaphores: u32,
    pub max_count_semaphores: u32,
    pub max_mutexes: u32,
    pub max_pools: u32,
    pub max_queues: u32,
    pub max_timers: u32,
}

impl ConfigInfo {
    /// Collects the build-time constants.
    pub const fn gather() -> Self {
        Self {
            max_sporadic_tasks: MAX_SPORADIC_TASKS as u32,
            max_periodic_tasks: MAX_PERIODIC_TASKS as u32,
            max_bin_semaphores: MAX_BIN_SEMAPHORES as u32,
            max_count_semaphores: MAX_COUNT_SEMAPHORES as u32,
            max_mutexes: MAX_MUTEXES as u32,
            max_pools: MAX_POOLS as u32,
            max_queues: MAX_QUEUES as u32,
            max_timers: MAX_TIMERS as u32,
        }
    }
}
