// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `frame` module defines `Frame`, a contiguous run of interleaved samples moving
//! through the pipeline.

use bitflags::bitflags;

use crate::pool::PooledBuffer;
use crate::sample::Sample;
use crate::units::Nanoseconds;

bitflags! {
    /// Flags describing the contents of a frame.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct FrameFlags: u8 {
        /// Samples are derived from packets that actually arrived.
        const HAS_SIGNAL   = 1 << 0;
        /// Samples are silence or interpolation because packets were missing.
        ///
        /// A frame is either entirely signal or entirely gaps, never both. The
        /// depacketizer enforces this via partial reads.
        const HAS_GAPS     = 1 << 1;
        /// Some packets overlapping this frame were dropped by the jitter policy.
        const HAS_DROPS    = 1 << 2;
        /// The frame was filled to a smaller duration than requested.
        const NOT_COMPLETE = 1 << 3;
    }
}

/// A `Frame` is a contiguous run of interleaved samples, carried in a pooled buffer,
/// annotated with its duration, flags, and capture timestamp.
///
/// The duration counts samples per channel. The capture timestamp is the wall-clock
/// (Unix) nanosecond instant at which the first sample of the frame was captured at the
/// origin, or zero when unknown.
#[derive(Default)]
pub struct Frame {
    buf: Option<PooledBuffer>,
    byte_len: usize,
    duration: usize,
    capture_ts: Nanoseconds,
    flags: FrameFlags,
    raw: bool,
}

impl Frame {
    /// Get the frame flags.
    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    /// Replace the frame flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags;
    }

    /// Check if all of the given flags are set.
    pub fn has_flags(&self, flags: FrameFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Check if the frame holds native raw samples.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Mark the frame as holding native raw samples.
    pub fn set_raw(&mut self, raw: bool) {
        self.raw = raw;
    }

    /// Get the duration in samples per channel.
    pub fn duration(&self) -> usize {
        self.duration
    }

    /// Set the duration in samples per channel.
    pub fn set_duration(&mut self, duration: usize) {
        self.duration = duration;
    }

    /// Get the capture timestamp of the first sample, or zero when unknown.
    pub fn capture_ts(&self) -> Nanoseconds {
        self.capture_ts
    }

    /// Set the capture timestamp of the first sample.
    pub fn set_capture_ts(&mut self, cts: Nanoseconds) {
        self.capture_ts = cts;
    }

    /// Check if a buffer is attached.
    pub fn has_buffer(&self) -> bool {
        self.buf.is_some()
    }

    /// Get the byte capacity of the attached buffer.
    pub fn byte_capacity(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.byte_capacity())
    }

    /// Get the payload length in bytes.
    pub fn num_bytes(&self) -> usize {
        self.byte_len
    }

    /// Set the payload length in bytes.
    pub fn set_num_bytes(&mut self, n_bytes: usize) {
        assert!(n_bytes <= self.byte_capacity(), "frame payload exceeds buffer");

        self.byte_len = n_bytes;
    }

    /// View the payload as bytes.
    pub fn bytes(&self) -> &[u8] {
        match self.buf {
            Some(ref buf) => &buf.as_bytes()[..self.byte_len],
            None => &[],
        }
    }

    /// View the payload as mutable bytes.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.byte_len;
        match self.buf {
            Some(ref mut buf) => &mut buf.as_bytes_mut()[..len],
            None => &mut [],
        }
    }

    /// Get the payload length in raw samples, counting all channels.
    pub fn num_samples(&self) -> usize {
        debug_assert!(self.raw);

        self.byte_len / std::mem::size_of::<Sample>()
    }

    /// View the payload as raw samples. The frame must be raw.
    pub fn samples(&self) -> &[Sample] {
        assert!(self.raw, "frame is not in raw format");

        match self.buf {
            Some(ref buf) => &buf.as_samples()[..self.byte_len / 4],
            None => &[],
        }
    }

    /// View the payload as mutable raw samples. The frame must be raw.
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        assert!(self.raw, "frame is not in raw format");

        let len = self.byte_len / 4;
        match self.buf {
            Some(ref mut buf) => &mut buf.as_samples_mut()[..len],
            None => &mut [],
        }
    }

    /// Reset all metadata, keeping the attached buffer.
    pub fn clear(&mut self) {
        self.byte_len = 0;
        self.duration = 0;
        self.capture_ts = 0;
        self.flags = FrameFlags::empty();
        self.raw = false;
    }

    pub(crate) fn attach_buffer(&mut self, buf: PooledBuffer) {
        self.buf = Some(buf);
    }

    pub(crate) fn take_buffer(&mut self) -> Option<PooledBuffer> {
        self.buf.take()
    }
}
