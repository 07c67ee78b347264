// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `watchdog` module terminates sessions that look dead or hopelessly choppy.

use log::{debug, warn};

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::spec::SampleSpec;
use runnel_core::units::{Nanoseconds, MILLISECOND, SECOND};

const DEFAULT_NO_PLAYBACK_TIMEOUT: Nanoseconds = 2 * SECOND;
const DEFAULT_CHOPPY_PLAYBACK_TIMEOUT: Nanoseconds = 2 * SECOND;
const DEFAULT_CHOPPY_PLAYBACK_WINDOW: Nanoseconds = 300 * MILLISECOND;
const DEFAULT_FRAME_STATUS_WINDOW: usize = 20;

/// Watchdog parameters.
///
/// For the duration fields, zero selects the default value and a negative value
/// disables the check.
#[derive(Copy, Clone, Debug)]
pub struct WatchdogConfig {
    /// Timeout for the lack of playback.
    ///
    /// The maximum allowed period during which every frame is blank. After it the
    /// session is terminated. Detects dead, hanging, or broken clients.
    pub no_playback_timeout: Nanoseconds,

    /// Timeout for frequent stuttering.
    ///
    /// The maximum allowed period during which every detection window overlaps with at
    /// least one frame that caused packet drops and at least one incomplete frame.
    /// After it the session is terminated. Detects the vicious circle where all client
    /// packets are a bit late and are constantly dropped, producing unpleasant noise.
    pub choppy_playback_timeout: Nanoseconds,

    /// Size of the stutter detection window.
    pub choppy_playback_window: Nanoseconds,

    /// Duration of the warmup phase in the beginning of the session.
    ///
    /// While warming up, the no-playback check is suppressed, which allows the
    /// watchdog to coexist with latencies longer than the no-playback timeout. Warmup
    /// also ends at the first non-blank frame. Usually equal to the target latency.
    pub warmup_duration: Nanoseconds,

    /// Number of frames per logged frame-status line. Zero selects the default.
    pub frame_status_window: usize,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            no_playback_timeout: 0,
            choppy_playback_timeout: 0,
            choppy_playback_window: 0,
            warmup_duration: 0,
            frame_status_window: DEFAULT_FRAME_STATUS_WINDOW,
        }
    }
}

impl WatchdogConfig {
    /// Automatically fill missing settings.
    pub fn deduce_defaults(&mut self, target_latency: Nanoseconds) {
        if self.no_playback_timeout == 0 {
            self.no_playback_timeout = DEFAULT_NO_PLAYBACK_TIMEOUT;
        }
        if self.choppy_playback_timeout == 0 {
            self.choppy_playback_timeout = DEFAULT_CHOPPY_PLAYBACK_TIMEOUT;
        }
        if self.choppy_playback_window == 0 {
            self.choppy_playback_window = DEFAULT_CHOPPY_PLAYBACK_WINDOW;
        }
        if self.warmup_duration == 0 {
            self.warmup_duration = target_latency;
        }
        if self.frame_status_window == 0 {
            self.frame_status_window = DEFAULT_FRAME_STATUS_WINDOW;
        }
    }
}

/// Watchdog element of a reading pipeline.
///
/// Tracks the health of the stream and terminates the session when it is considered
/// dead or corrupted: every subsequent read fails with [`Error::Aborted`].
pub struct Watchdog {
    reader: Box<dyn FrameReader>,

    sample_spec: SampleSpec,

    // All positions and durations below are in samples per channel; zero duration
    // means the check is disabled.
    max_blank_duration: usize,
    max_drops_duration: usize,
    drops_detection_window: usize,

    curr_read_pos: u64,
    last_pos_before_blank: u64,
    last_pos_before_drops: u64,

    window_start: u64,
    curr_window_flags: FrameFlags,

    warmup_duration: u64,
    in_warmup: bool,

    status: String,
    frame_status_window: usize,

    alive: bool,
}

impl Watchdog {
    /// Create a watchdog over an underlying reader.
    pub fn new(
        reader: Box<dyn FrameReader>,
        sample_spec: &SampleSpec,
        config: &WatchdogConfig,
    ) -> Result<Self> {
        if !sample_spec.is_complete() {
            return Err(Error::BadConfig("watchdog requires a complete sample spec"));
        }

        let to_samples = |ns: Nanoseconds| -> usize {
            if ns > 0 {
                sample_spec.ns_to_duration(ns)
            }
            else {
                0
            }
        };

        let max_blank_duration = to_samples(config.no_playback_timeout);
        let max_drops_duration = to_samples(config.choppy_playback_timeout);
        let drops_detection_window = to_samples(config.choppy_playback_window);

        if max_drops_duration != 0
            && (drops_detection_window == 0 || drops_detection_window > max_drops_duration)
        {
            return Err(Error::BadConfig(
                "watchdog drop detection window must fit the choppy playback timeout",
            ));
        }

        let warmup_duration = to_samples(config.warmup_duration) as u64;

        debug!(
            "watchdog: initializing: no_playback={} choppy={} window={} warmup={}",
            max_blank_duration, max_drops_duration, drops_detection_window,
            warmup_duration
        );

        Ok(Watchdog {
            reader,
            sample_spec: *sample_spec,
            max_blank_duration,
            max_drops_duration,
            drops_detection_window,
            curr_read_pos: 0,
            last_pos_before_blank: 0,
            last_pos_before_drops: 0,
            window_start: 0,
            curr_window_flags: FrameFlags::empty(),
            warmup_duration,
            in_warmup: warmup_duration > 0,
            status: String::new(),
            frame_status_window: config.frame_status_window,
            alive: true,
        })
    }

    fn update(&mut self, frame: &Frame) -> bool {
        let next_read_pos = self.curr_read_pos + frame.duration() as u64;

        let has_signal = frame.has_flags(FrameFlags::HAS_SIGNAL);

        if self.in_warmup
            && (has_signal || next_read_pos >= self.warmup_duration)
        {
            // Warmup ends at the first signal frame or when its duration elapses; the
            // no-playback countdown starts from here.
            self.in_warmup = false;
            self.last_pos_before_blank = next_read_pos;
        }

        if has_signal {
            self.last_pos_before_blank = next_read_pos;
        }

        if self.max_blank_duration != 0
            && !self.in_warmup
            && next_read_pos - self.last_pos_before_blank
                >= self.max_blank_duration as u64
        {
            warn!(
                "watchdog: no playback during timeout, terminating session: \
                 timeout={}ms",
                self.sample_spec.duration_to_ns(self.max_blank_duration) / MILLISECOND
            );
            return false;
        }

        if self.drops_detection_window != 0 {
            self.curr_window_flags |= frame.flags()
                & (FrameFlags::HAS_DROPS | FrameFlags::HAS_GAPS);

            while next_read_pos - self.window_start
                >= self.drops_detection_window as u64
            {
                let window_flags = std::mem::take(&mut self.curr_window_flags);
                self.window_start += self.drops_detection_window as u64;

                if !(window_flags.contains(FrameFlags::HAS_DROPS)
                    && window_flags.contains(FrameFlags::HAS_GAPS))
                {
                    // A healthy window breaks the choppy streak.
                    self.last_pos_before_drops = self.window_start;
                }
            }
        }

        if self.max_drops_duration != 0
            && next_read_pos - self.last_pos_before_drops
                >= self.max_drops_duration as u64
        {
            warn!(
                "watchdog: constant stuttering during timeout, terminating session: \
                 timeout={}ms",
                self.sample_spec.duration_to_ns(self.max_drops_duration) / MILLISECOND
            );
            return false;
        }

        self.update_status(frame);

        self.curr_read_pos = next_read_pos;

        true
    }

    fn update_status(&mut self, frame: &Frame) {
        if self.frame_status_window == 0 {
            return;
        }

        let c = if frame.has_flags(FrameFlags::HAS_DROPS) {
            'd'
        }
        else if !frame.has_flags(FrameFlags::HAS_SIGNAL) {
            if self.in_warmup {
                'W'
            }
            else {
                'b'
            }
        }
        else if frame.has_flags(FrameFlags::NOT_COMPLETE) {
            'i'
        }
        else {
            '.'
        };

        self.status.push(c);

        if self.status.len() >= self.frame_status_window {
            self.flush_status();
        }
    }

    fn flush_status(&mut self) {
        if !self.status.is_empty() {
            debug!("watchdog: frame status: {}", self.status);
            self.status.clear();
        }
    }
}

impl FrameReader for Watchdog {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        if !self.alive {
            return Err(Error::Aborted);
        }

        let status = self.reader.read(frame, duration, mode)?;

        if status == ReadStatus::Complete || status == ReadStatus::Partial {
            if !self.update(frame) {
                self.alive = false;
                self.flush_status();
                return Err(Error::Aborted);
            }
        }

        Ok(status)
    }
}
