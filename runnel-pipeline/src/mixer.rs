// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `mixer` module sums an arbitrary number of session readers into one stream.

use log::error;

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::frame::Frame;
use runnel_core::pool::RawBuffer;
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::sample::{SAMPLE_MAX, SAMPLE_MIN};
use runnel_core::spec::SampleSpec;
use runnel_core::units::Nanoseconds;

/// Handle of a reader attached to a [`Mixer`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MixerInput {
    id: u64,
}

struct Input {
    id: u64,
    reader: Box<dyn FrameReader>,

    // Samples of the mix buffer this input has already been added to.
    n_mixed: usize,

    // Interpolated capture timestamp of the first unread sample of this input in the
    // mix buffer, or zero when unknown.
    cts: Nanoseconds,

    // The input returned end-of-stream; it is padded with zeros until removed.
    is_finished: bool,
}

/// Mixer.
///
/// Sums raw frames of N attached inputs into one output stream. Inputs are attached and
/// detached dynamically and are addressed by the [`MixerInput`] handle returned from
/// [`add_input`](Mixer::add_input).
///
/// In soft read mode inputs may produce different amounts of samples; the mixer then
/// delivers the prefix present in all inputs and keeps the rest accumulated. The output
/// capture timestamp is the average of the input timestamps, computed relative to the
/// first non-zero one to avoid precision loss.
pub struct Mixer {
    factory: FrameFactory,

    inputs: Vec<Input>,
    next_id: u64,

    in_frame: Frame,
    mix_buffer: RawBuffer,

    sample_spec: SampleSpec,
    enable_timestamps: bool,
}

impl Mixer {
    /// Create a mixer.
    pub fn new(
        sample_spec: &SampleSpec,
        enable_timestamps: bool,
        factory: FrameFactory,
    ) -> Result<Self> {
        if !sample_spec.is_complete() || !sample_spec.is_raw() {
            return Err(Error::BadConfig(
                "mixer requires a complete sample spec with raw format",
            ));
        }

        let in_frame = factory.allocate_frame_no_buffer();

        let mut mix_buffer = factory.new_raw_buffer()?;
        let mix_size = mix_buffer.capacity()
            - mix_buffer.capacity() % sample_spec.num_channels();
        mix_buffer.set_len(mix_size);
        mix_buffer.iter_mut().for_each(|s| *s = 0.0);

        Ok(Mixer {
            factory,
            inputs: Vec::new(),
            next_id: 0,
            in_frame,
            mix_buffer,
            sample_spec: *sample_spec,
            enable_timestamps,
        })
    }

    /// Attach a reader. Returns the handle used to address it later.
    pub fn add_input(&mut self, reader: Box<dyn FrameReader>) -> MixerInput {
        let id = self.next_id;
        self.next_id += 1;

        self.inputs.push(Input { id, reader, n_mixed: 0, cts: 0, is_finished: false });

        MixerInput { id }
    }

    /// Check if the handle refers to an attached input.
    pub fn has_input(&self, handle: MixerInput) -> bool {
        self.inputs.iter().any(|input| input.id == handle.id)
    }

    /// Detach an input and return its reader.
    pub fn remove_input(&mut self, handle: MixerInput) -> Result<Box<dyn FrameReader>> {
        let idx = match self.inputs.iter().position(|input| input.id == handle.id) {
            Some(idx) => idx,
            None => return Err(Error::BadOperation("mixer input not found")),
        };

        let max_mixed = self
            .inputs
            .iter()
            .enumerate()
            .filter(|(n, _)| *n != idx)
            .map(|(_, input)| input.n_mixed)
            .max()
            .unwrap_or(0);

        // Zeroise samples contributed only by the removed input.
        if self.inputs[idx].n_mixed > max_mixed {
            self.mix_buffer[max_mixed..self.inputs[idx].n_mixed]
                .iter_mut()
                .for_each(|s| *s = 0.0);
        }

        Ok(self.inputs.remove(idx).reader)
    }

    // Read and mix samples of one input, until it catches up with `mix_size`.
    fn mix_one(&mut self, idx: usize, mix_size: usize, mode: ReadMode)
        -> Result<ReadStatus> {
        let num_channels = self.sample_spec.num_channels();

        debug_assert!(self.inputs[idx].n_mixed % num_channels == 0);
        debug_assert!(mix_size % num_channels == 0);

        // A finished input is padded with zeros and not read anymore.
        if self.inputs[idx].is_finished && self.inputs[idx].n_mixed < mix_size {
            self.inputs[idx].n_mixed = mix_size;
        }

        // Repeat partial reads until the requested size is reached. The loop stops
        // early on a drained soft read or on end-of-stream.
        while self.inputs[idx].n_mixed < mix_size {
            let remained_duration = (mix_size - self.inputs[idx].n_mixed) / num_channels;
            let capped_duration = self
                .sample_spec
                .cap_frame_duration(remained_duration, self.factory.byte_buffer_size());

            self.factory.reallocate_frame(
                &mut self.in_frame,
                self.sample_spec.duration_to_bytes(capped_duration),
            )?;

            let input = &mut self.inputs[idx];

            let status = match input.reader.read(&mut self.in_frame, capped_duration, mode)
            {
                Ok(status) => status,
                Err(err) => {
                    error!("mixer: can't read frame: {}", err);
                    return Err(err);
                }
            };

            if status == ReadStatus::Finished {
                // The stream ended and will be removed soon; pad it with zeros until
                // then.
                input.n_mixed = mix_size;
                input.is_finished = true;
                break;
            }

            if status == ReadStatus::Drained {
                // Soft read stopped early.
                debug_assert!(mode == ReadMode::Soft);
                break;
            }

            self.sample_spec.validate_frame(&self.in_frame);

            // Mix samples, clamping the sum.
            let in_samples = self.in_frame.samples();
            let mix_samples =
                &mut self.mix_buffer[input.n_mixed..input.n_mixed + in_samples.len()];

            for (mix, &sample) in mix_samples.iter_mut().zip(in_samples) {
                *mix = (*mix + sample).clamp(SAMPLE_MIN, SAMPLE_MAX);
            }

            // Interpolate the capture timestamp of the first sample of this input in
            // the mix buffer.
            let mut in_cts = self.in_frame.capture_ts();
            if in_cts > 0 {
                in_cts -= self.sample_spec.samples_overall_to_ns(input.n_mixed);
            }
            input.cts = if in_cts > 0 { in_cts } else { 0 };

            input.n_mixed += in_samples.len();
        }

        if self.inputs[idx].n_mixed == 0 {
            debug_assert!(mode == ReadMode::Soft);
            return Ok(ReadStatus::Drained);
        }

        if self.inputs[idx].n_mixed < mix_size {
            debug_assert!(mode == ReadMode::Soft);
            return Ok(ReadStatus::Partial);
        }

        Ok(ReadStatus::Complete)
    }

    // Mix all inputs and deliver up to `out.len()` samples. Shrinks `out_size` on a
    // partial mix; reports the averaged capture timestamp via `out_cts`.
    fn mix_all(
        &mut self,
        out: &mut [f32],
        out_cts: &mut Nanoseconds,
        mode: ReadMode,
    ) -> Result<(usize, ReadStatus)> {
        let n_inputs = self.inputs.len();
        let mix_size = out.len();

        debug_assert!(mix_size <= self.mix_buffer.len());

        // With no inputs attached, produce silence.
        if n_inputs == 0 {
            return match mode {
                ReadMode::Hard => {
                    out.iter_mut().for_each(|s| *s = 0.0);
                    Ok((mix_size, ReadStatus::Complete))
                }
                ReadMode::Soft => Ok((0, ReadStatus::Drained)),
            };
        }

        let mut cts_base: Nanoseconds = 0;
        let mut cts_sum: f64 = 0.0;
        let mut cts_count = 0;

        let mut min_mix_size = 0;
        let mut max_mix_size = 0;

        for idx in 0..n_inputs {
            // Each input tracks how many samples it has already added to the mix
            // buffer, and only reads the remainder.
            let status = self.mix_one(idx, mix_size, mode)?;
            debug_assert!(
                status == ReadStatus::Complete
                    || status == ReadStatus::Partial
                    || status == ReadStatus::Drained
            );

            let input = &self.inputs[idx];

            if idx == 0 {
                min_mix_size = input.n_mixed;
            }
            else {
                min_mix_size = min_mix_size.min(input.n_mixed);
            }
            max_mix_size = max_mix_size.max(input.n_mixed);

            if self.enable_timestamps && input.n_mixed != 0 && input.cts != 0 {
                // Subtract the first non-zero timestamp from the others. Since
                // timestamps are used only when the inputs are synchronous and close to
                // each other, this keeps the summed values small, avoiding overflow and
                // rounding errors.
                if cts_base == 0 {
                    cts_base = input.cts;
                }
                cts_sum += (input.cts - cts_base) as f64;
                cts_count += 1;
            }
        }

        if cts_count != 0 {
            // The average timestamp, compensating everything subtracted above.
            *out_cts = (cts_base as f64 * (cts_count as f64 / n_inputs as f64)
                + cts_sum / n_inputs as f64) as Nanoseconds;
        }

        // At this point min_mix_size is the position up to which the mix buffer has
        // samples from every input, and max_mix_size the position up to which it has
        // samples from at least one input. In soft mode they can differ. The first
        // min_mix_size samples are delivered, and the remainder is shifted to the
        // beginning of the mix buffer.
        if min_mix_size != 0 {
            out[..min_mix_size].copy_from_slice(&self.mix_buffer[..min_mix_size]);

            if min_mix_size < max_mix_size {
                self.mix_buffer.copy_within(min_mix_size..max_mix_size, 0);
            }

            for input in &mut self.inputs {
                input.n_mixed -= min_mix_size;
                if input.cts != 0 {
                    input.cts += self.sample_spec.samples_overall_to_ns(min_mix_size);
                }
            }

            // Zeroise the vacated tail.
            self.mix_buffer[max_mix_size - min_mix_size..max_mix_size]
                .iter_mut()
                .for_each(|s| *s = 0.0);
        }

        debug_assert!(min_mix_size <= mix_size);

        if min_mix_size == 0 {
            debug_assert!(mode == ReadMode::Soft);
            return Ok((0, ReadStatus::Drained));
        }

        if min_mix_size < mix_size {
            debug_assert!(mode == ReadMode::Soft);
            return Ok((min_mix_size, ReadStatus::Partial));
        }

        Ok((mix_size, ReadStatus::Complete))
    }

    // The requested output may exceed the mix buffer; repeat mixing until the output is
    // filled.
    fn mix_all_repeat(
        &mut self,
        out: &mut [f32],
        out_cts: &mut Nanoseconds,
        mode: ReadMode,
    ) -> Result<(usize, ReadStatus)> {
        let out_size = out.len();
        let mut out_pos = 0;

        while out_pos < out_size {
            let mix_batch_size = (out_size - out_pos).min(self.mix_buffer.len());
            let mut mix_cts: Nanoseconds = 0;

            let (n_mixed, status) = self.mix_all(
                &mut out[out_pos..out_pos + mix_batch_size],
                &mut mix_cts,
                mode,
            )?;

            if status == ReadStatus::Drained {
                break;
            }

            if out_pos == 0 {
                *out_cts = mix_cts;
            }
            out_pos += n_mixed;

            if status == ReadStatus::Partial {
                break;
            }
        }

        debug_assert!(out_pos <= out_size);

        if out_pos == 0 {
            // Can happen only in soft read mode.
            debug_assert!(mode == ReadMode::Soft);
            return Ok((0, ReadStatus::Drained));
        }

        if out_pos < out_size {
            debug_assert!(mode == ReadMode::Soft);
            return Ok((out_pos, ReadStatus::Partial));
        }

        Ok((out_pos, ReadStatus::Complete))
    }
}

impl FrameReader for Mixer {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        self.factory
            .reallocate_frame(frame, self.sample_spec.duration_to_bytes(duration))?;

        frame.set_raw(true);

        let out_size = duration * self.sample_spec.num_channels();
        let mut out_cts: Nanoseconds = 0;

        let (n_mixed, status) = {
            let out = &mut frame.samples_mut()[..out_size];
            self.mix_all_repeat(out, &mut out_cts, mode)?
        };

        if status != ReadStatus::Complete && status != ReadStatus::Partial {
            return Ok(status);
        }

        frame.set_capture_ts(out_cts);
        frame.set_num_bytes(n_mixed * std::mem::size_of::<f32>());
        frame.set_duration(n_mixed / self.sample_spec.num_channels());

        Ok(status)
    }
}
