// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The process-wide runtime singleton.
//!
//! One `Runtime` owns every resource table, the statistics counters, the
//! time-of-day anchor and the startup barrier. It is constructed on first
//! use from whichever operation gets there first; the public module
//! functions are a thin veneer over it.

use std::sync::{OnceLock, RwLock};

use abi::config::{
    MAX_BIN_SEMAPHORES, MAX_COUNT_SEMAPHORES, MAX_MUTEXES,
    MAX_PERIODIC_TASKS, MAX_QUEUES, MAX_TASKS, MAX_TIMERS,
};
#[cfg(feature = "mem-pool")]
use abi::config::MAX_POOLS;

use crate::binsem::BinSemRecord;
use crate::countsem::CountSemRecord;
use crate::mutex::MutexRecord;
#[cfg(feature = "mem-pool")]
use crate::pool::PoolRecord;
use crate::queue::QueueRecord;
use crate::startup::Gate;
use crate::stats::Stats;
use crate::table::HandleTable;
use crate::task::{PeriodicRecord, TaskRecord};
use crate::time::{self, TodAnchor};
use crate::timer::{DispatcherSignal, TimerRecord};

pub(crate) struct Runtime {
    pub(crate) tasks: HandleTable<TaskRecord, MAX_TASKS>,
    pub(crate) periodic: HandleTable<PeriodicRecord, MAX_PERIODIC_TASKS>,
    pub(crate) mutexes: HandleTable<MutexRecord, MAX_MUTEXES>,
    pub(crate) binsems: HandleTable<BinSemRecord, MAX_BIN_SEMAPHORES>,
    pub(crate) countsems: HandleTable<CountSemRecord, MAX_COUNT_SEMAPHORES>,
    pub(crate) queues: HandleTable<QueueRecord, MAX_QUEUES>,
    #[cfg(feature = "mem-pool")]
    pub(crate) pools: HandleTable<PoolRecord, MAX_POOLS>,
    pub(crate) timers: HandleTable<TimerRecord, MAX_TIMERS>,
    pub(crate) stats: Stats,
    pub(crate) barrier: Gate,
    pub(crate) tod: RwLock<Option<TodAnchor>>,
    pub(crate) timer_signal: DispatcherSignal,
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

pub(crate) fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        // Pin the uptime epoch to initialization.
        time::mark_boot();

        // The dispatcher parks on the singleton, which is safe to do from
        // here: it blocks in OnceLock::get_or_init until this closure
        // returns.
        crate::timer::spawn_dispatcher();

        log::debug!("osal runtime initialized");
        Runtime {
            tasks: HandleTable::new(),
            periodic: HandleTable::new(),
            mutexes: HandleTable::new(),
            binsems: HandleTable::new(),
            countsems: HandleTable::new(),
            queues: HandleTable::new(),
            #[cfg(feature = "mem-pool")]
            pools: HandleTable::new(),
            timers: HandleTable::new(),
            stats: Stats::default(),
            barrier: Gate::new(),
            tod: RwLock::new(None),
            timer_signal: DispatcherSignal::new(),
        }
    })
}
