// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `units` module provides definitions for common units.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A span of time, or an instant relative to some epoch, in nanoseconds.
///
/// All capture-timestamp arithmetic is carried out in signed 64-bit nanoseconds. A capture
/// timestamp of `0` means "unknown".
pub type Nanoseconds = i64;

/// One nanosecond.
pub const NANOSECOND: Nanoseconds = 1;

/// One microsecond.
pub const MICROSECOND: Nanoseconds = 1_000;

/// One millisecond.
pub const MILLISECOND: Nanoseconds = 1_000_000;

/// One second.
pub const SECOND: Nanoseconds = 1_000_000_000;

/// Get the current wall-clock time as nanoseconds since the Unix epoch.
///
/// Capture timestamps are expressed on this clock.
pub fn unix_now() -> Nanoseconds {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_nanos() as Nanoseconds,
        Err(_) => 0,
    }
}

/// Get the current monotonic time in nanoseconds.
///
/// The epoch is unspecified but fixed for the lifetime of the process. Deadlines passed to
/// blocking waits are expressed on this clock.
pub fn monotonic_now() -> Nanoseconds {
    static EPOCH: OnceLock<Instant> = OnceLock::new();

    let epoch = EPOCH.get_or_init(Instant::now);

    epoch.elapsed().as_nanos() as Nanoseconds
}
