// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pump` module moves frames from a source to a sink, with optional failover to a
//! backup source while the main source is idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info};

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::Frame;
use runnel_core::reader::ReadMode;
use runnel_core::spec::SampleSpec;
use runnel_core::units::{unix_now, Nanoseconds, MILLISECOND};

use crate::device::{DeviceState, Sink, Source};

const DEFAULT_FRAME_LENGTH: Nanoseconds = 10 * MILLISECOND;

/// Parameters of an IO pump.
#[derive(Clone, Debug)]
pub struct IoConfig {
    /// Sample spec of the transferred frames.
    pub sample_spec: SampleSpec,
    /// Duration of one transferred frame. Zero selects the default of 10ms.
    pub frame_length: Nanoseconds,
}

/// Pump operation mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PumpMode {
    /// Run until the main source reports end of stream or [`PumpController::stop`] is
    /// called.
    Permanent,
    /// Additionally exit the first time the main source transitions from active to idle.
    Oneshot,
}

/// Thread-safe handle to stop a running pump.
#[derive(Clone)]
pub struct PumpController {
    stop: Arc<AtomicBool>,
}

impl PumpController {
    /// Ask the pump to exit. May be called from any thread. The pump observes the flag
    /// at the top of each transfer iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Current {
    Main,
    Backup,
}

/// `IoPump` couples one source to one sink.
///
/// On each iteration one frame of the configured length is transferred. When the main
/// source becomes idle and a backup source is present, the pump rewinds and plays the
/// backup until the main source becomes active again. On exit the sink is flushed and
/// every device is closed exactly once; the first error wins.
pub struct IoPump {
    factory: FrameFactory,

    main_source: Box<dyn Source>,
    backup_source: Option<Box<dyn Source>>,
    sink: Box<dyn Sink>,
    current: Current,

    sample_spec: SampleSpec,

    frame: Frame,
    frame_size: usize,
    frame_duration: usize,

    mode: PumpMode,
    was_active: bool,
    stop: Arc<AtomicBool>,

    transferred_bytes: u64,
}

impl IoPump {
    /// Create a pump.
    pub fn new(
        factory: FrameFactory,
        main_source: Box<dyn Source>,
        backup_source: Option<Box<dyn Source>>,
        sink: Box<dyn Sink>,
        config: &IoConfig,
        mode: PumpMode,
    ) -> Result<Self> {
        if !config.sample_spec.is_complete() {
            return Err(Error::BadConfig("io pump requires a complete sample spec"));
        }

        let frame_length = if config.frame_length == 0 {
            DEFAULT_FRAME_LENGTH
        }
        else {
            config.frame_length
        };

        let frame_duration = config.sample_spec.ns_to_duration(frame_length);
        let frame_size = config.sample_spec.duration_to_bytes(frame_duration);

        let frame = factory.allocate_frame(frame_size)?;

        Ok(IoPump {
            factory,
            main_source,
            backup_source,
            sink,
            current: Current::Main,
            sample_spec: config.sample_spec,
            frame,
            frame_size,
            frame_duration,
            mode,
            was_active: false,
            stop: Arc::new(AtomicBool::new(false)),
            transferred_bytes: 0,
        })
    }

    /// Get a handle that can stop the pump from another thread.
    pub fn controller(&self) -> PumpController {
        PumpController { stop: Arc::clone(&self.stop) }
    }

    /// Run the pump until the source finishes, the pump is stopped, or a device fails.
    ///
    /// Consumes the pump: all devices are flushed and closed before returning.
    pub fn run(mut self) -> Result<()> {
        debug!("io pump: starting main loop");

        let mut result = loop {
            match self.next() {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        if result.is_ok() {
            debug!(
                "io pump: transferred {:.3} MB",
                self.transferred_bytes as f64 / 1024.0 / 1024.0
            );

            result = self.flush_sink();
        }

        let close_result = self.close_all_devices();

        debug!("io pump: exiting main loop");

        match result {
            Ok(()) => close_result,
            Err(err) => Err(err),
        }
    }

    /// Transfer one frame. Returns `Ok(false)` when the pump should exit normally.
    fn next(&mut self) -> Result<bool> {
        // User called stop().
        if self.stop.load(Ordering::Relaxed) {
            debug!("io pump: got stop request, exiting");
            return Err(Error::Aborted);
        }

        // Main source became inactive.
        if self.current == Current::Main && self.main_source.state() == DeviceState::Idle
        {
            // In oneshot mode, when the main source becomes active and then inactive
            // the first time, we exit.
            if self.mode == PumpMode::Oneshot && self.was_active {
                info!("io pump: main source became inactive in oneshot mode, exiting");
                return Ok(false);
            }

            // When a backup source was given, play it while the main source is idle.
            if let Some(backup) = self.backup_source.as_mut() {
                info!("io pump: main source became inactive, switching to backup");

                if let Err(err) = backup.rewind() {
                    error!("io pump: can't rewind backup source: {}", err);
                    return Err(err);
                }

                self.switch_source(Current::Backup)?;
            }
        }

        // Main source became active again.
        if self.current == Current::Backup
            && self.main_source.state() == DeviceState::Active
        {
            info!("io pump: main source became active, switching to it");

            self.switch_source(Current::Main)?;
        }

        // Transfer one frame.
        let status = {
            let source: &mut dyn Source = match self.current {
                Current::Main => &mut *self.main_source,
                Current::Backup => &mut **self.backup_source.as_mut().unwrap(),
            };

            transfer_frame(
                &self.factory,
                &self.sample_spec,
                &mut self.frame,
                self.frame_size,
                self.frame_duration,
                source,
                &mut *self.sink,
                &mut self.transferred_bytes,
            )?
        };

        if status == ReadStatus::Finished {
            // EOF from the main source causes exit.
            if self.current == Current::Main {
                info!("io pump: got eof from main source, exiting");
                return Ok(false);
            }

            // EOF from the backup source causes rewind.
            debug!("io pump: got eof from backup source, rewinding");

            if let Err(err) = self.backup_source.as_mut().unwrap().rewind() {
                error!("io pump: can't rewind backup source: {}", err);
                return Err(err);
            }
        }

        if self.current == Current::Main
            && self.main_source.state() == DeviceState::Active
        {
            // Remember that the main source was active and we've read something.
            self.was_active = true;
        }

        Ok(true)
    }

    fn switch_source(&mut self, target: Current) -> Result<()> {
        if self.current == target {
            return Ok(());
        }

        match target {
            Current::Main => {
                // Pause backup, resume main.
                if let Some(backup) = self.backup_source.as_mut() {
                    if backup.has_state() {
                        if let Err(err) = backup.pause() {
                            error!("io pump: can't pause backup source: {}", err);
                            return Err(err);
                        }
                    }
                }

                if self.main_source.has_state() {
                    if let Err(err) = self.main_source.resume() {
                        error!("io pump: can't resume main source: {}", err);
                        return Err(err);
                    }
                }
            }
            Current::Backup => {
                // Pause main, resume backup.
                if self.main_source.has_state() {
                    if let Err(err) = self.main_source.pause() {
                        error!("io pump: can't pause main source: {}", err);
                        return Err(err);
                    }
                }

                let backup = self.backup_source.as_mut().unwrap();
                if backup.has_state() {
                    if let Err(err) = backup.resume() {
                        error!("io pump: can't resume backup source: {}", err);
                        return Err(err);
                    }
                }
            }
        }

        self.current = target;

        Ok(())
    }

    fn flush_sink(&mut self) -> Result<()> {
        if let Err(err) = self.sink.flush() {
            error!("io pump: got error when flushing sink: {}", err);
            return Err(err);
        }

        Ok(())
    }

    fn close_all_devices(&mut self) -> Result<()> {
        let mut first_error = Ok(());

        let mut close = |result: Result<()>| {
            if let Err(err) = result {
                error!("io pump: failed to close device: {}", err);
                if first_error.is_ok() {
                    first_error = Err(err);
                }
            }
        };

        close(self.main_source.close());
        close(self.sink.close());
        if let Some(backup) = self.backup_source.as_mut() {
            close(backup.close());
        }

        first_error
    }
}

#[allow(clippy::too_many_arguments)]
fn transfer_frame(
    factory: &FrameFactory,
    sample_spec: &SampleSpec,
    frame: &mut Frame,
    frame_size: usize,
    frame_duration: usize,
    source: &mut dyn Source,
    sink: &mut dyn Sink,
    transferred_bytes: &mut u64,
) -> Result<ReadStatus> {
    // If the writer stole the frame's buffer, allocate it again.
    factory.reallocate_frame(frame, frame_size)?;

    // Fill the frame from the source. If the source has a clock, we block on it here.
    let status = source.read(frame, frame_duration, ReadMode::Hard)?;
    if status == ReadStatus::Finished {
        return Ok(status);
    }

    if frame.capture_ts() == 0 {
        // The source does not provide capture timestamps, so we fill them here. The
        // source latency accounts for the recording buffer where the frame spent some
        // time before we read it, and the frame length accounts for the frame itself,
        // which was fully read out of that buffer already.
        let mut capture_latency = 0;

        if source.has_latency() {
            capture_latency =
                source.latency()? + sample_spec.duration_to_ns(frame.duration());
        }

        frame.set_capture_ts(unix_now() - capture_latency);
    }

    // Pass the frame to the sink. If the sink has a clock, we block on it here. Either
    // the source or the sink may have a clock, but not both.
    sink.write(frame)?;

    {
        // Tell the source the playback time of the first sample of the frame. The sink
        // latency accounts for the playback buffer, and the frame length accounts for
        // the frame itself, which was fully written into that buffer already.
        let mut playback_latency = 0;

        if sink.has_latency() {
            playback_latency =
                sink.latency()? - sample_spec.duration_to_ns(frame.duration());
        }

        source.reclock(unix_now() + playback_latency);
    }

    *transferred_bytes += frame.num_bytes() as u64;

    Ok(status)
}
