// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `e2e_latency_monitor` module tracks the end-to-end latency of a stream.

use runnel_core::errors::{ReadStatus, Result};
use runnel_core::frame::Frame;
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::units::{unix_now, Nanoseconds};

/// Tracks the end-to-end latency of a stream: the wall-clock time between a sample
/// being captured at the origin and leaving the receiver pipeline.
///
/// Forwards frames from the underlying reader unchanged. Latency is available only
/// while frames carry capture timestamps, which are expressed in Unix time.
pub struct E2eLatencyMonitor {
    reader: Box<dyn FrameReader>,

    ready: bool,
    e2e_latency: Nanoseconds,
}

impl E2eLatencyMonitor {
    /// Create a monitor over an underlying reader.
    pub fn new(reader: Box<dyn FrameReader>) -> Self {
        E2eLatencyMonitor { reader, ready: false, e2e_latency: 0 }
    }

    /// Check if the last frame carried a capture timestamp.
    pub fn has_latency(&self) -> bool {
        self.ready
    }

    /// Get the last measured latency.
    pub fn latency(&self) -> Nanoseconds {
        self.e2e_latency
    }
}

impl FrameReader for E2eLatencyMonitor {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let status = self.reader.read(frame, duration, mode)?;

        if frame.capture_ts() != 0 {
            self.ready = true;
            self.e2e_latency = unix_now() - frame.capture_ts();
        }
        else {
            self.ready = false;
        }

        Ok(status)
    }
}
