// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `resampler_reader` module adapts a [`Resampler`] backend to the `FrameReader`
//! pipeline interface.

use log::debug;

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::{Frame, FrameFlags};
use runnel_core::pool::RawBuffer;
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::spec::SampleSpec;
use runnel_core::units::Nanoseconds;

use crate::resampler::Resampler;

enum PushStatus {
    Pushed,
    Drained,
    Finished,
}

/// Resampler element of a reading pipeline.
///
/// While the output frame is not filled, output is drained from the resampler; when the
/// resampler runs dry, one input chunk is read from the underlying reader and pushed
/// into it. A dynamic scaling multiplier on top of the rate ratio is exposed through
/// [`set_scaling`](ResamplerReader::set_scaling) for clock-drift compensation.
pub struct ResamplerReader {
    reader: Box<dyn FrameReader>,
    resampler: Box<dyn Resampler>,

    factory: FrameFactory,

    in_spec: SampleSpec,
    out_spec: SampleSpec,

    // Input chunk staged for the next push, and how much of it is filled.
    stage: RawBuffer,
    stage_pos: usize,

    in_frame: Frame,

    // Flags of input frames not yet reported in an output frame.
    in_flags: FrameFlags,

    // Timestamp right after the last sample pushed into the resampler.
    last_in_cts: Nanoseconds,

    scaling: f32,
}

impl ResamplerReader {
    /// Create a resampler reader over an underlying reader.
    pub fn new(
        reader: Box<dyn FrameReader>,
        mut resampler: Box<dyn Resampler>,
        factory: FrameFactory,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() || !in_spec.is_raw()
            || !out_spec.is_raw()
        {
            return Err(Error::BadConfig(
                "resampler reader requires complete sample specs with raw format",
            ));
        }

        if in_spec.channels() != out_spec.channels() {
            return Err(Error::BadConfig(
                "resampler reader requires identical input and output channel sets",
            ));
        }

        if !resampler.set_scaling(in_spec.rate(), out_spec.rate(), 1.0) {
            return Err(Error::BadConfig(
                "resampler rejected the nominal rate ratio",
            ));
        }

        // The chunk length is fixed per backend; during the initial filling phase
        // probing it has no side effect.
        let chunk_len = resampler.begin_push_input().len();

        if chunk_len == 0 || chunk_len % in_spec.num_channels() != 0 {
            return Err(Error::BadInterface(
                "resampler input chunk is not a multiple of the channel count",
            ));
        }

        if chunk_len > factory.raw_buffer_size() {
            return Err(Error::NoMemory);
        }

        let mut stage = factory.new_raw_buffer()?;
        stage.set_len(chunk_len);

        debug!(
            "resampler reader: initializing: in_spec={} out_spec={} chunk={}",
            in_spec, out_spec, chunk_len
        );

        let in_frame = factory.allocate_frame_no_buffer();

        Ok(ResamplerReader {
            reader,
            resampler,
            factory,
            in_spec: *in_spec,
            out_spec: *out_spec,
            stage,
            stage_pos: 0,
            in_frame,
            in_flags: FrameFlags::empty(),
            last_in_cts: 0,
            scaling: 1.0,
        })
    }

    /// Set the dynamic part of the scaling factor. Returns false if the backend cannot
    /// support the resulting factor.
    pub fn set_scaling(&mut self, multiplier: f32) -> bool {
        if !self.resampler.set_scaling(self.in_spec.rate(), self.out_spec.rate(),
            multiplier)
        {
            return false;
        }

        self.scaling = multiplier;

        true
    }

    /// Get the current scaling multiplier.
    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    // Fill the staged chunk from the underlying reader and push it into the resampler.
    fn push_input(&mut self, mode: ReadMode) -> Result<PushStatus> {
        let num_ch = self.in_spec.num_channels();

        while self.stage_pos < self.stage.len() {
            let want = (self.stage.len() - self.stage_pos) / num_ch;

            self.factory
                .reallocate_frame(&mut self.in_frame, self.in_spec.duration_to_bytes(want))?;

            match self.reader.read(&mut self.in_frame, want, mode)? {
                ReadStatus::Finished => return Ok(PushStatus::Finished),
                ReadStatus::Drained => return Ok(PushStatus::Drained),
                ReadStatus::Complete | ReadStatus::Partial => {
                    self.in_spec.validate_frame(&self.in_frame);

                    let n = self.in_frame.num_samples();

                    self.stage[self.stage_pos..self.stage_pos + n]
                        .copy_from_slice(self.in_frame.samples());
                    self.stage_pos += n;

                    self.in_flags |= self.in_frame.flags()
                        & (FrameFlags::HAS_SIGNAL
                            | FrameFlags::HAS_GAPS
                            | FrameFlags::HAS_DROPS);

                    if self.in_frame.capture_ts() != 0 {
                        self.last_in_cts = self.in_frame.capture_ts()
                            + self.in_spec.duration_to_ns(self.in_frame.duration());
                    }
                }
            }
        }

        let chunk = self.resampler.begin_push_input();
        chunk.copy_from_slice(&self.stage);
        self.resampler.end_push_input();

        self.stage_pos = 0;

        Ok(PushStatus::Pushed)
    }

    // Timestamp of the first sample of the output frame, derived from the input
    // timestamps and the resampler backlog.
    fn capture_ts(&self, out_samples: usize) -> Nanoseconds {
        if self.last_in_cts == 0 {
            return 0;
        }

        let out_cts = self.last_in_cts
            - self
                .in_spec
                .fract_samples_overall_to_ns(self.resampler.n_left_to_process())
            - self.out_spec.samples_overall_to_ns(out_samples);

        if out_cts < 0 {
            // Can happen in the very beginning of the stream.
            return 0;
        }

        out_cts
    }
}

impl FrameReader for ResamplerReader {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        let capped =
            self.out_spec.cap_frame_duration(duration, self.factory.byte_buffer_size());

        self.factory
            .reallocate_frame(frame, self.out_spec.duration_to_bytes(capped))?;

        frame.set_raw(true);

        let total = capped * self.out_spec.num_channels();
        let mut out_pos = 0;

        let mut finished = false;
        let mut drained = false;

        while out_pos < total {
            let n = {
                let out = &mut frame.samples_mut()[out_pos..total];
                self.resampler.pop_output(out)
            };
            out_pos += n;

            if out_pos == total {
                break;
            }

            if n == 0 {
                match self.push_input(mode)? {
                    PushStatus::Pushed => continue,
                    PushStatus::Drained => {
                        drained = true;
                        break;
                    }
                    PushStatus::Finished => {
                        finished = true;
                        break;
                    }
                }
            }
        }

        if out_pos == 0 {
            if finished {
                return Ok(ReadStatus::Finished);
            }
            debug_assert!(drained && mode == ReadMode::Soft);
            return Ok(ReadStatus::Drained);
        }

        let out_duration = out_pos / self.out_spec.num_channels();

        let mut flags = std::mem::take(&mut self.in_flags);
        if out_duration < duration {
            flags |= FrameFlags::NOT_COMPLETE;
        }

        frame.set_num_bytes(out_pos * std::mem::size_of::<f32>());
        frame.set_duration(out_duration);
        frame.set_flags(flags);
        frame.set_capture_ts(self.capture_ts(out_pos));

        if out_duration == duration {
            Ok(ReadStatus::Complete)
        }
        else {
            Ok(ReadStatus::Partial)
        }
    }
}
