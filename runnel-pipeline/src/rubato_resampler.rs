// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `rubato_resampler` module adapts the rubato polynomial resampler to the
//! [`Resampler`] interface.

use log::{debug, error};

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoApi};

use runnel_core::errors::{Error, Result};
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;

use crate::resampler::{Resampler, ResamplerConfig, ResamplerProfile};

// Input chunk of the underlying fixed-input resampler, in frames.
const CHUNK_FRAMES: usize = 256;

// Maximum deviation of the resampling ratio from the nominal rate ratio. Covers the
// clock-drift multiplier with a wide margin.
const MAX_RATIO_RELATIVE: f64 = 2.0;

fn degree_for(profile: ResamplerProfile) -> PolynomialDegree {
    match profile {
        ResamplerProfile::Low => PolynomialDegree::Linear,
        ResamplerProfile::Medium => PolynomialDegree::Cubic,
        ResamplerProfile::High => PolynomialDegree::Septic,
    }
}

/// Resampler backend built on `rubato::FastFixedIn`.
///
/// The pipeline works on interleaved samples while rubato works on planar buffers, so
/// the shim stages input in an interleaved buffer, de-interleaves it per chunk, and
/// re-interleaves produced output into a FIFO drained by
/// [`pop_output`](Resampler::pop_output).
pub struct RubatoResampler {
    inner: FastFixedIn<Sample>,

    num_ch: usize,
    in_rate: u32,
    out_rate: u32,
    multiplier: f32,

    in_buf: Vec<Sample>,
    planar_in: Vec<Vec<Sample>>,
    planar_out: Vec<Vec<Sample>>,

    out_fifo: Vec<Sample>,
    out_pos: usize,
}

impl RubatoResampler {
    /// Create a resampler converting between two raw sample specs with identical
    /// channel sets.
    pub fn new(
        config: &ResamplerConfig,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() || !in_spec.is_raw()
            || !out_spec.is_raw()
        {
            return Err(Error::BadConfig(
                "rubato resampler requires complete sample specs with raw format",
            ));
        }

        if in_spec.channels() != out_spec.channels() {
            return Err(Error::BadConfig(
                "rubato resampler requires identical input and output channel sets",
            ));
        }

        let num_ch = in_spec.num_channels();
        let ratio = out_spec.rate() as f64 / in_spec.rate() as f64;

        debug!(
            "rubato resampler: initializing: profile={:?} chunk={} num_ch={} ratio={:.6}",
            config.profile, CHUNK_FRAMES, num_ch, ratio
        );

        let inner = FastFixedIn::new(
            ratio,
            MAX_RATIO_RELATIVE,
            degree_for(config.profile),
            CHUNK_FRAMES,
            num_ch,
        )
        .map_err(|err| {
            error!("rubato resampler: construction failed: {}", err);
            Error::BadConfig("rubato resampler rejected the configuration")
        })?;

        let out_max = inner.output_frames_max();

        Ok(RubatoResampler {
            inner,
            num_ch,
            in_rate: in_spec.rate(),
            out_rate: out_spec.rate(),
            multiplier: 1.0,
            in_buf: vec![0.0; CHUNK_FRAMES * num_ch],
            planar_in: vec![vec![0.0; CHUNK_FRAMES]; num_ch],
            planar_out: vec![vec![0.0; out_max]; num_ch],
            out_fifo: Vec::new(),
            out_pos: 0,
        })
    }
}

impl Resampler for RubatoResampler {
    fn set_scaling(&mut self, in_rate: u32, out_rate: u32, multiplier: f32) -> bool {
        if in_rate == 0 || out_rate == 0 || multiplier <= 0.0 {
            error!("rubato resampler: invalid scaling");
            return false;
        }

        // Scaling is the input consumption factor; rubato's ratio is the inverse, the
        // number of output frames produced per input frame.
        let ratio = out_rate as f64 / (in_rate as f64 * multiplier as f64);

        if let Err(err) = self.inner.set_resample_ratio(ratio, true) {
            error!("rubato resampler: scaling out of range: {}", err);
            return false;
        }

        self.in_rate = in_rate;
        self.out_rate = out_rate;
        self.multiplier = multiplier;

        true
    }

    fn begin_push_input(&mut self) -> &mut [Sample] {
        &mut self.in_buf
    }

    fn end_push_input(&mut self) {
        // De-interleave the staged chunk.
        for (ch, plane) in self.planar_in.iter_mut().enumerate() {
            for (n, sample) in plane.iter_mut().enumerate() {
                *sample = self.in_buf[n * self.num_ch + ch];
            }
        }

        let n_out = match self.inner.process_into_buffer(
            &self.planar_in,
            &mut self.planar_out,
            None,
        ) {
            Ok((_n_in, n_out)) => n_out,
            Err(err) => {
                error!("rubato resampler: processing failed: {}", err);
                return;
            }
        };

        // Interleave produced frames into the output FIFO.
        self.out_fifo.reserve(n_out * self.num_ch);
        for n in 0..n_out {
            for plane in &self.planar_out {
                self.out_fifo.push(plane[n]);
            }
        }
    }

    fn pop_output(&mut self, out: &mut [Sample]) -> usize {
        let avail = self.out_fifo.len() - self.out_pos;
        let n = avail.min(out.len());

        out[..n].copy_from_slice(&self.out_fifo[self.out_pos..self.out_pos + n]);
        self.out_pos += n;

        if self.out_pos == self.out_fifo.len() {
            self.out_fifo.clear();
            self.out_pos = 0;
        }

        n
    }

    fn n_left_to_process(&self) -> f32 {
        // Frames waiting in the output FIFO, converted back to input time.
        let fifo_frames = (self.out_fifo.len() - self.out_pos) as f32 / self.num_ch as f32;

        fifo_frames * self.in_rate as f32 * self.multiplier / self.out_rate as f32
            * self.num_ch as f32
    }
}
