// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The host adapter seam.
//!
//! Everything the core needs from the platform funnels through this module:
//! thread creation with a stack and a priority, priority adjustment, clock
//! and tick-rate queries, sleep and yield. No other module names an OS
//! facility directly, so porting to another host means replacing the
//! implementation selected here and nothing else.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod posix;
        pub(crate) use posix::*;
    } else {
        compile_error!("no host adapter for this platform");
    }
}
