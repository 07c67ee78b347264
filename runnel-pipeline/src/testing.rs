// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mock pipeline elements shared by the unit tests of this crate.

use std::sync::Arc;

use parking_lot::Mutex;

use runnel_core::errors::{ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;
use runnel_core::units::Nanoseconds;

use crate::plc::Plc;

#[derive(Default)]
struct ReaderState {
    values: Vec<Sample>,
    flags: Vec<FrameFlags>,
    pos: usize,
    frames_consumed: usize,
    start_cts: Nanoseconds,
    total_reads: usize,
    last_status: Option<ReadStatus>,
}

/// Scripted reader: yields queued samples, splitting reads at flag boundaries the way
/// the depacketizer does, and refusing to serve gap samples from soft reads.
pub(crate) struct MockReader {
    factory: FrameFactory,
    spec: SampleSpec,
    shared: Arc<Mutex<ReaderState>>,
}

/// Handle to inspect and refill a [`MockReader`] owned by a pipeline stage.
#[derive(Clone)]
pub(crate) struct MockReaderHandle {
    shared: Arc<Mutex<ReaderState>>,
}

impl MockReader {
    pub(crate) fn new(factory: FrameFactory, spec: SampleSpec) -> Self {
        MockReader { factory, spec, shared: Arc::new(Mutex::new(ReaderState::default())) }
    }

    pub(crate) fn handle(&self) -> MockReaderHandle {
        MockReaderHandle { shared: Arc::clone(&self.shared) }
    }
}

impl MockReaderHandle {
    /// Queue `size` samples (counting all channels) of the given value and flags.
    pub(crate) fn add(&self, size: usize, value: Sample, flags: FrameFlags) {
        let mut state = self.shared.lock();

        for _ in 0..size {
            state.values.push(value);
            state.flags.push(flags);
        }
    }

    /// Enable capture timestamps, starting from the given instant.
    pub(crate) fn set_start_cts(&self, cts: Nanoseconds) {
        self.shared.lock().start_cts = cts;
    }

    pub(crate) fn total_reads(&self) -> usize {
        self.shared.lock().total_reads
    }

    pub(crate) fn last_status(&self) -> Option<ReadStatus> {
        self.shared.lock().last_status
    }

    pub(crate) fn num_unread(&self) -> usize {
        let state = self.shared.lock();
        state.values.len() - state.pos
    }
}

impl FrameReader for MockReader {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let mut state = self.shared.lock();

        state.total_reads += 1;

        let num_ch = self.spec.num_channels();
        let remaining = state.values.len() - state.pos;

        if remaining == 0 {
            let status = match mode {
                ReadMode::Hard => ReadStatus::Finished,
                ReadMode::Soft => ReadStatus::Drained,
            };
            state.last_status = Some(status);
            return Ok(status);
        }

        let head_flags = state.flags[state.pos];

        // A soft read only serves samples decoded from packets that actually arrived;
        // at a gap it reports that nothing is buffered yet.
        if mode == ReadMode::Soft && head_flags.contains(FrameFlags::HAS_GAPS) {
            state.last_status = Some(ReadStatus::Drained);
            return Ok(ReadStatus::Drained);
        }

        // Never mix flags within one frame; split the read at the flag boundary.
        let mut run = 0;
        while run < remaining && state.flags[state.pos + run] == head_flags {
            run += 1;
        }

        let requested = duration * num_ch;
        let n = requested.min(run);
        debug_assert!(n % num_ch == 0);

        self.factory.reallocate_frame(frame, self.spec.duration_to_bytes(n / num_ch))?;

        frame.set_raw(true);

        let pos = state.pos;
        frame.samples_mut().copy_from_slice(&state.values[pos..pos + n]);

        frame.set_duration(n / num_ch);

        if state.start_cts != 0 {
            frame.set_capture_ts(
                state.start_cts + self.spec.duration_to_ns(state.frames_consumed),
            );
        }

        state.pos += n;
        state.frames_consumed += n / num_ch;

        let status = if n == requested {
            frame.set_flags(head_flags);
            ReadStatus::Complete
        }
        else {
            frame.set_flags(head_flags | FrameFlags::NOT_COMPLETE);
            ReadStatus::Partial
        };

        state.last_status = Some(status);

        Ok(status)
    }
}

#[derive(Default)]
pub(crate) struct PlcState {
    pub(crate) n_history_samples: usize,
    pub(crate) n_lost_samples: usize,
    pub(crate) n_prev_samples: usize,
    pub(crate) n_next_samples: usize,
    pub(crate) last_prev: Vec<Sample>,
    pub(crate) last_next: Vec<Sample>,
}

/// Scripted PLC: fills each lost frame with a constant and records the context frames
/// it was given.
pub(crate) struct MockPlc {
    spec: SampleSpec,
    lookbehind: usize,
    lookahead: usize,
    fill_value: Sample,
    shared: Arc<Mutex<PlcState>>,
}

#[derive(Clone)]
pub(crate) struct MockPlcHandle {
    shared: Arc<Mutex<PlcState>>,
}

impl MockPlc {
    pub(crate) fn new(
        spec: SampleSpec,
        lookbehind: usize,
        lookahead: usize,
        fill_value: Sample,
    ) -> Self {
        MockPlc {
            spec,
            lookbehind,
            lookahead,
            fill_value,
            shared: Arc::new(Mutex::new(PlcState::default())),
        }
    }

    pub(crate) fn handle(&self) -> MockPlcHandle {
        MockPlcHandle { shared: Arc::clone(&self.shared) }
    }
}

impl MockPlcHandle {
    pub(crate) fn with<R>(&self, f: impl FnOnce(&PlcState) -> R) -> R {
        f(&self.shared.lock())
    }
}

impl Plc for MockPlc {
    fn sample_spec(&self) -> SampleSpec {
        self.spec
    }

    fn lookbehind_len(&self) -> usize {
        self.lookbehind
    }

    fn lookahead_len(&self) -> usize {
        self.lookahead
    }

    fn process_history(&mut self, hist_frame: &Frame) {
        let mut state = self.shared.lock();

        state.n_history_samples += hist_frame.num_samples();
    }

    fn process_loss(
        &mut self,
        lost_frame: &mut Frame,
        prev_frame: Option<&Frame>,
        next_frame: Option<&Frame>,
    ) {
        let mut state = self.shared.lock();

        state.n_lost_samples += lost_frame.num_samples();

        match prev_frame {
            Some(prev) => {
                state.n_prev_samples = prev.num_samples();
                state.last_prev = prev.samples().to_vec();
            }
            None => {
                state.n_prev_samples = 0;
                state.last_prev.clear();
            }
        }

        match next_frame {
            Some(next) => {
                state.n_next_samples = next.num_samples();
                state.last_next = next.samples().to_vec();
            }
            None => {
                state.n_next_samples = 0;
                state.last_next.clear();
            }
        }

        lost_frame.samples_mut().iter_mut().for_each(|s| *s = self.fill_value);
    }
}

/// Read a frame and assert the resulting status, duration, and payload size.
pub(crate) fn expect_frame(
    reader: &mut dyn FrameReader,
    factory: &FrameFactory,
    spec: &SampleSpec,
    requested_samples: usize,
    expected_status: ReadStatus,
    expected_samples: usize,
    mode: ReadMode,
) -> Frame {
    assert!(requested_samples % spec.num_channels() == 0);
    assert!(expected_samples % spec.num_channels() == 0);

    let mut frame = factory.allocate_frame_no_buffer();

    let status = reader
        .read(&mut frame, requested_samples / spec.num_channels(), mode)
        .unwrap();

    assert_eq!(status, expected_status);

    if status == ReadStatus::Complete || status == ReadStatus::Partial {
        assert_eq!(frame.duration(), expected_samples / spec.num_channels());
        assert_eq!(frame.num_bytes(), spec.duration_to_bytes(frame.duration()));
    }

    frame
}

/// Assert that every sample of the frame equals the given value.
pub(crate) fn expect_samples(frame: &Frame, n_samples: usize, value: Sample) {
    assert!(frame.is_raw());
    assert_eq!(frame.num_samples(), n_samples);

    for (n, &s) in frame.samples().iter().enumerate() {
        assert!(
            (s - value).abs() < 1e-5,
            "sample {} is {} instead of {}",
            n,
            s,
            value
        );
    }
}
