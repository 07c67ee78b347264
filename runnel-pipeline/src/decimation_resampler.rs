// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `decimation_resampler` module applies the dynamic part of the scaling factor by
//! duplicating or dropping samples.

use log::{debug, error};

use runnel_core::errors::{Error, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::pool::RawBuffer;
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;

use crate::resampler::Resampler;

const INPUT_FRAME_SIZE: usize = 16;

/// Decimating resampler.
///
/// Acts as a decorator for another resampler instance and performs resampling in two
/// stages:
///  - the inner resampler applies the constant part of the scaling factor, based on the
///    input and output rates; when the rates are equal this stage is skipped entirely;
///  - decimation or duplication applies the dynamic part of the scaling factor, the
///    multiplier, by dropping or duplicating samples.
///
/// When the input and output rates are the same and the multiplier is 1.0, this backend
/// works almost at the speed of a memcpy. Decimation usually degrades quality a lot, but
/// not in this specific case: it is used only for the multiplier, which in practice
/// stays very close to 1.0, amounting to a few dozen inserted or removed samples per
/// second.
pub struct DecimationResampler {
    inner_resampler: Option<Box<dyn Resampler>>,
    use_inner_resampler: bool,

    input_spec: SampleSpec,
    output_spec: SampleSpec,
    multiplier: f32,

    num_ch: usize,

    in_buf: RawBuffer,
    in_size: usize,
    in_pos: usize,

    out_acc: f32,

    last_buf: RawBuffer,
}

impl DecimationResampler {
    /// Create a decimating resampler.
    ///
    /// `inner_resampler` handles the constant rate ratio; it may be omitted when the
    /// input and output rates are equal.
    pub fn new(
        inner_resampler: Option<Box<dyn Resampler>>,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
        frame_factory: &FrameFactory,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() || !in_spec.is_raw()
            || !out_spec.is_raw()
        {
            return Err(Error::BadConfig(
                "decimation resampler requires complete sample specs with raw format",
            ));
        }

        if in_spec.channels() != out_spec.channels() {
            return Err(Error::BadConfig(
                "decimation resampler requires identical input and output channel sets",
            ));
        }

        let use_inner_resampler = in_spec.rate() != out_spec.rate();

        if use_inner_resampler && inner_resampler.is_none() {
            return Err(Error::BadConfig(
                "decimation resampler requires an inner resampler when rates differ",
            ));
        }

        let num_ch = in_spec.num_channels();

        debug!(
            "decimation resampler: initializing: frame_size={} num_ch={} \
             use_inner_resampler={}",
            INPUT_FRAME_SIZE, num_ch, use_inner_resampler
        );

        if frame_factory.raw_buffer_size() < INPUT_FRAME_SIZE * num_ch {
            error!("decimation resampler: can't allocate temporary buffer");
            return Err(Error::NoMemory);
        }

        let mut in_buf = frame_factory.new_raw_buffer()?;
        in_buf.set_len(INPUT_FRAME_SIZE * num_ch);

        let mut last_buf = frame_factory.new_raw_buffer()?;
        last_buf.set_len(num_ch);
        last_buf.iter_mut().for_each(|s| *s = 0.0);

        Ok(DecimationResampler {
            inner_resampler,
            use_inner_resampler,
            input_spec: *in_spec,
            output_spec: *out_spec,
            multiplier: 1.0,
            num_ch,
            in_buf,
            in_size: 0,
            in_pos: 0,
            out_acc: 0.0,
            last_buf,
        })
    }
}

impl Resampler for DecimationResampler {
    fn set_scaling(&mut self, in_rate: u32, out_rate: u32, multiplier: f32) -> bool {
        // No more than num_ch insertions/removals per input frame, because only one
        // sample per channel is inserted or removed at a time.
        if in_rate == 0
            || out_rate == 0
            || multiplier <= 0.0
            || (self.in_buf.len() as f32 / multiplier - self.in_buf.len() as f32).abs()
                > self.num_ch as f32
        {
            error!(
                "decimation resampler: scaling out of range: in_rate={} out_rate={} \
                 mult={:e}",
                in_rate, out_rate, multiplier
            );
            return false;
        }

        self.use_inner_resampler = in_rate != out_rate;

        if self.use_inner_resampler {
            let inner = match self.inner_resampler.as_mut() {
                Some(inner) => inner,
                None => {
                    error!("decimation resampler: no inner resampler for rate change");
                    return false;
                }
            };

            // Always pass 1.0 instead of the multiplier to the inner resampler.
            if !inner.set_scaling(in_rate, out_rate, 1.0) {
                return false;
            }
        }

        self.input_spec =
            SampleSpec::new(in_rate, self.input_spec.format(), self.input_spec.channels());
        self.output_spec = SampleSpec::new(
            out_rate,
            self.output_spec.format(),
            self.output_spec.channels(),
        );

        self.multiplier = multiplier;

        true
    }

    fn begin_push_input(&mut self) -> &mut [Sample] {
        if self.use_inner_resampler {
            // Input goes to the inner resampler.
            return self.inner_resampler.as_mut().unwrap().begin_push_input();
        }

        // Input goes to our own buffer.
        &mut self.in_buf
    }

    fn end_push_input(&mut self) {
        if self.use_inner_resampler {
            // Start reading from the inner resampler.
            self.inner_resampler.as_mut().unwrap().end_push_input();
            return;
        }

        // Start reading from our own buffer.
        self.in_size = self.in_buf.len();
        self.in_pos = 0;
        self.out_acc += self.in_size as f32 / self.multiplier;
    }

    fn pop_output(&mut self, out: &mut [Sample]) -> usize {
        let mut out_pos = 0;

        while out_pos < out.len() {
            debug_assert!(
                self.in_size % self.num_ch == 0
                    && self.in_pos % self.num_ch == 0
                    && self.in_pos <= self.in_size
            );
            debug_assert!(out.len() % self.num_ch == 0 && out_pos % self.num_ch == 0);

            if self.in_pos == self.in_size && self.use_inner_resampler {
                // No more samples in the input frame, but maybe the inner resampler has
                // more. Try to refill our buffer and start reading from it.
                let inner = self.inner_resampler.as_mut().unwrap();

                self.in_size = inner.pop_output(&mut self.in_buf);
                self.in_pos = 0;
                self.out_acc += self.in_size as f32 / self.multiplier;
            }

            if self.in_pos == self.in_size {
                // No more samples in the input frame or the inner resampler. The caller
                // should push more input.
                break;
            }

            if self.out_acc.floor() >= (self.in_size - self.in_pos) as f32
                + self.num_ch as f32
            {
                // The accumulator is ahead of the input by at least one sample per
                // channel. Duplicate one sample per channel to compensate.
                out[out_pos..out_pos + self.num_ch]
                    .copy_from_slice(&self.last_buf[..self.num_ch]);
                out_pos += self.num_ch;
                self.out_acc -= self.num_ch as f32;
            }
            else if self.out_acc.ceil() <= (self.in_size - self.in_pos) as f32
                - self.num_ch as f32
            {
                // The accumulator is behind the input by at least one sample per
                // channel. Skip one sample per channel to compensate.
                self.in_pos += self.num_ch;
            }

            // Copy input samples to the output.
            let copy_size = (self.in_size - self.in_pos).min(out.len() - out_pos);

            if copy_size != 0 {
                debug_assert!(copy_size % self.num_ch == 0);

                out[out_pos..out_pos + copy_size]
                    .copy_from_slice(&self.in_buf[self.in_pos..self.in_pos + copy_size]);

                out_pos += copy_size;
                self.in_pos += copy_size;
                self.out_acc -= copy_size as f32;

                // Remember the last sample of each channel.
                self.last_buf[..self.num_ch]
                    .copy_from_slice(&out[out_pos - self.num_ch..out_pos]);
            }
        }

        out_pos
    }

    fn n_left_to_process(&self) -> f32 {
        // Samples pending in our own buffer.
        let mut n_samples = (self.in_size - self.in_pos) as f32
            / self.output_spec.rate() as f32
            * self.input_spec.rate() as f32;

        if self.use_inner_resampler {
            // Plus samples pending in the inner resampler.
            n_samples += self.inner_resampler.as_ref().unwrap().n_left_to_process();
        }

        n_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnel_core::channels::ChannelSet;
    use runnel_core::sample::PcmFormat;

    fn spec(rate: u32) -> SampleSpec {
        SampleSpec::new(rate, PcmFormat::Raw, ChannelSet::stereo())
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(4096, 16)
    }

    fn run(
        resampler: &mut DecimationResampler,
        input: &[Sample],
        n_out: usize,
    ) -> Vec<Sample> {
        let mut out = Vec::new();
        let mut chunk = [0.0; 64];
        let mut in_pos = 0;

        while out.len() < n_out {
            let n = resampler.pop_output(&mut chunk);

            if n == 0 {
                let buf = resampler.begin_push_input();
                let len = buf.len();

                if in_pos + len > input.len() {
                    break;
                }

                buf.copy_from_slice(&input[in_pos..in_pos + len]);
                in_pos += len;

                resampler.end_push_input();
                continue;
            }

            out.extend_from_slice(&chunk[..n]);
        }

        out
    }

    #[test]
    fn verify_identity_is_bitwise_exact() {
        // Equal rates and a multiplier of exactly 1.0: the memcpy path.
        let factory = factory();
        let mut resampler =
            DecimationResampler::new(None, &spec(48_000), &spec(48_000), &factory)
                .unwrap();

        assert!(resampler.set_scaling(48_000, 48_000, 1.0));

        let input: Vec<Sample> = (0..1_000_000).map(|n| (n % 997) as f32 / 997.0).collect();

        let out = run(&mut resampler, &input, input.len());

        assert_eq!(out.len(), input.len());
        assert_eq!(out, input);
    }

    #[test]
    fn verify_duplication_and_removal_rates() {
        let factory = factory();

        for (mult, expect_longer) in [(1.002f32, false), (0.998f32, true)] {
            let mut resampler =
                DecimationResampler::new(None, &spec(48_000), &spec(48_000), &factory)
                    .unwrap();

            assert!(resampler.set_scaling(48_000, 48_000, mult));

            let input: Vec<Sample> =
                (0..96_000).map(|n| ((n / 2) % 100) as f32 / 100.0).collect();

            let out = run(&mut resampler, &input, usize::MAX);

            // A multiplier below 1.0 stretches the stream (inserts samples), above 1.0
            // shrinks it (drops samples). Expected drift is mult-proportional.
            let expected = (input.len() as f32 / mult) as isize;
            let delta = out.len() as isize - expected;

            assert!(
                delta.abs() <= 64,
                "mult={}: output len {} vs expected {}",
                mult,
                out.len(),
                expected
            );

            if expect_longer {
                assert!(out.len() > input.len());
            }
            else {
                assert!(out.len() < input.len());
            }
        }
    }

    #[test]
    fn verify_scaling_bounds() {
        let factory = factory();
        let mut resampler =
            DecimationResampler::new(None, &spec(48_000), &spec(48_000), &factory)
                .unwrap();

        assert!(resampler.set_scaling(48_000, 48_000, 1.0));
        assert!(resampler.set_scaling(48_000, 48_000, 1.05));

        // More than one insertion/removal per input frame is rejected.
        assert!(!resampler.set_scaling(48_000, 48_000, 2.0));
        assert!(!resampler.set_scaling(48_000, 48_000, 0.0));

        // A rate change without an inner resampler is rejected.
        assert!(!resampler.set_scaling(48_000, 44_100, 1.0));
    }
}
