// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared test plumbing.

use std::sync::{Mutex, MutexGuard, OnceLock};

/// The resource tables are process-wide, so tests that create tasks or
/// count on table capacity take this lock to run one at a time.
pub fn serial() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A word-aligned byte buffer for queue and pool backings.
#[allow(dead_code)] // not every test binary creates queues or pools
pub fn buffer(len: usize) -> Box<[u8]> {
    vec![0u8; len].into_boxed_slice()
}
