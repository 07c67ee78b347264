// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `device` module defines the traits implemented by audio sources and sinks.

use runnel_core::errors::{bad_operation_error, ReadStatus, Result};
use runnel_core::frame::Frame;
use runnel_core::reader::ReadMode;
use runnel_core::spec::SampleSpec;
use runnel_core::units::Nanoseconds;

/// Kind of an audio device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceType {
    /// The device produces frames.
    Source,
    /// The device consumes frames.
    Sink,
}

/// State of an audio device or pipeline.
///
/// The discriminants are distinct bits so that states can be combined into masks for
/// [`wait_state`](https://docs.rs/runnel-pipeline) style operations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum DeviceState {
    /// The device is producing or consuming sound.
    Active = 1 << 0,
    /// The device has nothing to do right now, but may become active later.
    Idle = 1 << 1,
    /// The device was explicitly paused.
    Paused = 1 << 2,
    /// The device encountered a failure and cannot be used anymore.
    Broken = 1 << 3,
    /// The device was closed.
    Closed = 1 << 4,
}

impl DeviceState {
    /// Get the state as a bit usable in a state mask.
    pub const fn mask(self) -> u32 {
        self as u32
    }
}

/// Capabilities common to sources and sinks.
///
/// `close` must be called exactly once before the device is dropped; it is an error to
/// use the device afterwards.
pub trait Device {
    /// Get the kind of the device.
    fn device_type(&self) -> DeviceType;

    /// Get the sample spec of frames read from or written to the device.
    fn sample_spec(&self) -> SampleSpec;

    /// Check if reads/writes block on the device's own clock.
    fn has_clock(&self) -> bool {
        false
    }

    /// Check if the device can report its buffering latency.
    fn has_latency(&self) -> bool {
        false
    }

    /// Get the device buffering latency.
    fn latency(&self) -> Result<Nanoseconds> {
        bad_operation_error("device does not report latency")
    }

    /// Check if the device supports state management.
    fn has_state(&self) -> bool {
        false
    }

    /// Get the current device state.
    fn state(&self) -> DeviceState {
        DeviceState::Active
    }

    /// Pause the device.
    fn pause(&mut self) -> Result<()> {
        bad_operation_error("device does not support pausing")
    }

    /// Resume the device after a pause.
    fn resume(&mut self) -> Result<()> {
        bad_operation_error("device does not support pausing")
    }

    /// Close the device, flushing and releasing any underlying resources.
    fn close(&mut self) -> Result<()>;
}

/// A frame producer: a sound card input, a file decoder, or a receiver pipeline.
pub trait Source: Device {
    /// Restart reading from the beginning, if the source supports it.
    fn rewind(&mut self) -> Result<()> {
        bad_operation_error("source does not support rewinding")
    }

    /// Report the playback time of the first sample of the last read frame.
    ///
    /// Invoked by the pump after the frame was handed to the sink and its playback time
    /// is known.
    fn reclock(&mut self, _playback_ts: Nanoseconds) {}

    /// Read a frame of up to `duration` samples per channel.
    fn read(&mut self, frame: &mut Frame, duration: usize, mode: ReadMode)
        -> Result<ReadStatus>;
}

/// A frame consumer: a sound card output, a file encoder, or a sender pipeline.
pub trait Sink: Device {
    /// Write a frame.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush any buffered frames to the underlying device or file.
    fn flush(&mut self) -> Result<()>;
}
