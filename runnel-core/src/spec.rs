// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `spec` module defines `SampleSpec`, the semantic description of a PCM stream.

use std::fmt;

use crate::channels::ChannelSet;
use crate::frame::{Frame, FrameFlags};
use crate::sample::PcmFormat;
use crate::units::{Nanoseconds, SECOND};

/// `SampleSpec` is the semantic description of a PCM stream: the sample encoding, the
/// sample rate, and the channel set.
///
/// Durations handed between pipeline stages are counted in samples per channel. A spec
/// provides the conversions between durations, overall (interleaved) sample counts, byte
/// counts, and nanoseconds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SampleSpec {
    format: PcmFormat,
    rate: u32,
    channels: ChannelSet,
}

impl SampleSpec {
    /// Create a sample spec.
    pub fn new(rate: u32, format: PcmFormat, channels: ChannelSet) -> Self {
        SampleSpec { format, rate, channels }
    }

    /// Get the sample encoding.
    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Get the sample rate in Hz.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Get the channel set.
    pub fn channels(&self) -> ChannelSet {
        self.channels
    }

    /// Get the number of channels.
    pub fn num_channels(&self) -> usize {
        self.channels.num_channels()
    }

    /// Check if all fields of the spec are set.
    pub fn is_complete(&self) -> bool {
        self.rate > 0 && !self.channels.is_empty()
    }

    /// Check if the stream is in the native in-memory format.
    pub fn is_raw(&self) -> bool {
        self.format.is_raw()
    }

    /// Get the width of one encoded sample of one channel, in bytes.
    pub fn sample_size(&self) -> usize {
        self.format.sample_size()
    }

    /// Get the number of bytes holding `duration` samples of every channel.
    pub fn duration_to_bytes(&self, duration: usize) -> usize {
        duration * self.num_channels() * self.sample_size()
    }

    /// Get the number of samples per channel held in `bytes` bytes.
    pub fn bytes_to_duration(&self, bytes: usize) -> usize {
        bytes / (self.num_channels() * self.sample_size())
    }

    /// Convert a duration in samples per channel to nanoseconds.
    pub fn duration_to_ns(&self, duration: usize) -> Nanoseconds {
        duration as Nanoseconds * SECOND / self.rate as Nanoseconds
    }

    /// Convert nanoseconds to a duration in samples per channel, rounding down.
    pub fn ns_to_duration(&self, ns: Nanoseconds) -> usize {
        debug_assert!(ns >= 0);

        ((ns as i128 * self.rate as i128) / SECOND as i128) as usize
    }

    /// Convert an overall (interleaved) sample count to nanoseconds.
    pub fn samples_overall_to_ns(&self, n_samples: usize) -> Nanoseconds {
        debug_assert!(n_samples % self.num_channels() == 0);

        (n_samples / self.num_channels()) as Nanoseconds * SECOND
            / self.rate as Nanoseconds
    }

    /// Convert a fractional overall sample count to nanoseconds.
    pub fn fract_samples_overall_to_ns(&self, n_samples: f32) -> Nanoseconds {
        (n_samples as f64 / self.num_channels() as f64 * SECOND as f64
            / self.rate as f64) as Nanoseconds
    }

    /// Convert a byte count to nanoseconds.
    pub fn bytes_to_ns(&self, n_bytes: usize) -> Nanoseconds {
        (n_bytes as i128 * SECOND as i128
            / (self.num_channels() * self.sample_size()) as i128
            / self.rate as i128) as Nanoseconds
    }

    /// Cap a requested duration so that the resulting frame fits into a buffer of
    /// `buffer_bytes` bytes.
    pub fn cap_frame_duration(&self, duration: usize, buffer_bytes: usize) -> usize {
        duration.min(self.bytes_to_duration(buffer_bytes))
    }

    /// Validate the invariants of a frame produced under this spec.
    ///
    /// A frame must be sized consistently with its duration, its raw bit must match the
    /// spec, and it must carry either signal or gaps, never both. Violations indicate a
    /// bug in the stage that produced the frame, hence debug assertions.
    pub fn validate_frame(&self, frame: &Frame) {
        debug_assert_eq!(frame.num_bytes(), self.duration_to_bytes(frame.duration()));
        debug_assert_eq!(frame.is_raw(), self.is_raw());
        debug_assert!(
            !(frame.flags().contains(FrameFlags::HAS_SIGNAL)
                && frame.flags().contains(FrameFlags::HAS_GAPS)),
            "frame must have either signal or gaps, not both"
        );
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.format, self.rate, self.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelSet;
    use crate::units::MILLISECOND;

    #[test]
    fn verify_byte_conversions() {
        let spec = SampleSpec::new(48_000, PcmFormat::Raw, ChannelSet::stereo());

        assert_eq!(spec.duration_to_bytes(10), 10 * 2 * 4);
        assert_eq!(spec.bytes_to_duration(80), 10);

        let spec = SampleSpec::new(44_100, PcmFormat::S24Le, ChannelSet::mono());

        assert_eq!(spec.duration_to_bytes(100), 300);
        assert_eq!(spec.bytes_to_duration(300), 100);
    }

    #[test]
    fn verify_time_conversions() {
        let spec = SampleSpec::new(48_000, PcmFormat::Raw, ChannelSet::stereo());

        assert_eq!(spec.duration_to_ns(48), MILLISECOND);
        assert_eq!(spec.ns_to_duration(MILLISECOND), 48);
        assert_eq!(spec.samples_overall_to_ns(96), MILLISECOND);
        assert_eq!(spec.bytes_to_ns(96 * 4), MILLISECOND);
    }

    #[test]
    fn verify_cap_frame_duration() {
        let spec = SampleSpec::new(48_000, PcmFormat::Raw, ChannelSet::mono());

        assert_eq!(spec.cap_frame_duration(100, 4096), 100);
        assert_eq!(spec.cap_frame_duration(2000, 4096), 1024);
    }

    #[test]
    fn verify_completeness() {
        assert!(!SampleSpec::default().is_complete());

        let spec = SampleSpec::new(48_000, PcmFormat::Raw, ChannelSet::mono());
        assert!(spec.is_complete());
        assert!(spec.is_raw());
    }
}
