// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `builtin_resampler` module implements bandlimited sinc interpolation after
//! Smith (<https://ccrma.stanford.edu/~jos/resample/resample.pdf>).
//!
//! This backend is quite CPU-hungry, but it maintains the requested scaling factor with
//! very high precision.

use log::{debug, error};

use runnel_core::errors::{Error, Result};
use runnel_core::factory::FrameFactory;
use runnel_core::pool::RawBuffer;
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;

use crate::resampler::{Resampler, ResamplerConfig, ResamplerProfile};

// Fixed-point type for the position of an output sample in terms of input sample
// indexes. The computations need ceil() and floor(), which are much cheaper on a
// fixed-point value than on floats.
type Fixed = u64;

const FRACT_BITS: u32 = 20;
const FRACT_MASK: Fixed = (1 << FRACT_BITS) - 1;
const INTEGER_MASK: Fixed = !FRACT_MASK;

// One in fixed-point terms.
const QT_ONE: Fixed = 1 << FRACT_BITS;

#[inline]
fn float_to_fixed(t: f32) -> Fixed {
    debug_assert!(t >= 0.0);

    (t * QT_ONE as f32) as Fixed
}

#[inline]
fn fixed_to_float(t: Fixed) -> f32 {
    t as f32 / QT_ONE as f32
}

#[inline]
fn fixed_to_size(t: Fixed) -> usize {
    (t >> FRACT_BITS) as usize
}

// Rounds x upward.
#[inline]
fn qceil(x: Fixed) -> Fixed {
    if (x & FRACT_MASK) == 0 {
        x & INTEGER_MASK
    }
    else {
        (x & INTEGER_MASK) + QT_ONE
    }
}

// Rounds x downward.
#[inline]
fn qfloor(x: Fixed) -> Fixed {
    x & INTEGER_MASK
}

// Returns the fractional part of x.
#[inline]
fn fractional(x: Fixed) -> f32 {
    (x & FRACT_MASK) as f32 * (1.0 / QT_ONE as f32)
}

fn window_interp(profile: ResamplerProfile) -> usize {
    match profile {
        ResamplerProfile::Low => 64,
        ResamplerProfile::Medium => 128,
        ResamplerProfile::High => 512,
    }
}

fn window_size(profile: ResamplerProfile) -> usize {
    match profile {
        ResamplerProfile::Low => 16,
        ResamplerProfile::Medium => 32,
        ResamplerProfile::High => 64,
    }
}

// The input frames must accommodate the sinc window at every allowed scaling, with
// some headroom for scaling factors above the nominal rate ratio. When upsampling,
// the window stays at its cutoff-widened nominal size, so the frame never shrinks
// below that.
fn frame_size_for(window_size: usize, in_spec: &SampleSpec, out_spec: &SampleSpec)
    -> usize {
    let scaling = (in_spec.rate() as f32 / out_spec.rate() as f32).max(1.0) * 1.5;

    (window_size as f32 * scaling).ceil() as usize
}

/// Built-in bandlimited sinc resampler.
///
/// Three input frames form a sliding window over the input signal; for each output
/// sample the filter sums contributions of the input samples within the window, with
/// coefficients read from a pre-computed windowed-sinc table using linear interpolation
/// between adjacent entries.
pub struct BuiltinResampler {
    in_spec: SampleSpec,
    out_spec: SampleSpec,

    // prev / curr / next input frames.
    frames: [RawBuffer; 3],
    n_ready_frames: usize,

    scaling: f32,

    window_size: usize,
    window_interp: usize,
    window_interp_bits: u32,

    frame_size_ch: usize,
    frame_size: usize,

    sinc_table: Vec<Sample>,

    // Half window length in fixed point, in terms of input samples.
    qt_half_window_size: Fixed,
    qt_epsilon: Fixed,

    qt_frame_size: Fixed,

    // Time position of the output sample in terms of input sample indexes: zero is the
    // position of the first sample in the current frame.
    qt_sample: Fixed,

    // Time distance between two output samples; equals the resampling factor.
    qt_dt: Fixed,

    // The step with which we iterate over the sinc table.
    qt_sinc_step: Fixed,

    cutoff_freq: f32,
}

impl BuiltinResampler {
    /// Create a resampler converting between two raw sample specs with identical
    /// channel sets.
    pub fn new(
        config: &ResamplerConfig,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
        frame_factory: &FrameFactory,
    ) -> Result<Self> {
        if !in_spec.is_complete() || !out_spec.is_complete() || !in_spec.is_raw()
            || !out_spec.is_raw()
        {
            return Err(Error::BadConfig(
                "builtin resampler requires complete sample specs with raw format",
            ));
        }

        if in_spec.channels() != out_spec.channels() {
            return Err(Error::BadConfig(
                "builtin resampler requires identical input and output channel sets",
            ));
        }

        let window_size = window_size(config.profile);
        let window_interp = window_interp(config.profile);
        let window_interp_bits = window_interp.trailing_zeros();

        let frame_size_ch = frame_size_for(window_size, in_spec, out_spec);
        let frame_size = frame_size_ch * in_spec.num_channels();

        debug!(
            "builtin resampler: initializing: profile={:?} window_interp={} \
             window_size={} frame_size={} channels_num={}",
            config.profile,
            window_interp,
            window_size,
            frame_size,
            in_spec.num_channels()
        );

        if !window_interp.is_power_of_two() {
            return Err(Error::BadConfig(
                "builtin resampler requires power-of-two window interpolation",
            ));
        }

        if frame_size > frame_factory.raw_buffer_size() {
            error!("builtin resampler: can't allocate frame buffers");
            return Err(Error::NoMemory);
        }

        let mut alloc_frame = || -> Result<RawBuffer> {
            let mut buf = frame_factory.new_raw_buffer()?;
            buf.set_len(frame_size);
            buf.iter_mut().for_each(|s| *s = 0.0);
            Ok(buf)
        };

        let frames = [alloc_frame()?, alloc_frame()?, alloc_frame()?];

        let cutoff_freq = 0.9;

        let mut resampler = BuiltinResampler {
            in_spec: *in_spec,
            out_spec: *out_spec,
            frames,
            n_ready_frames: 0,
            scaling: 1.0,
            window_size,
            window_interp,
            window_interp_bits,
            frame_size_ch,
            frame_size,
            sinc_table: Vec::new(),
            qt_half_window_size: float_to_fixed(window_size as f32),
            qt_epsilon: float_to_fixed(5e-8),
            qt_frame_size: (frame_size_ch as Fixed) << FRACT_BITS,
            qt_sample: 0,
            qt_dt: 0,
            qt_sinc_step: 0,
            cutoff_freq,
        };

        resampler.fill_sinc();

        Ok(resampler)
    }

    fn fill_sinc(&mut self) {
        let table_size = self.window_size * self.window_interp + 2;
        self.sinc_table.resize(table_size, 0.0);

        // The table is normalized by the cutoff frequency so that the filter keeps
        // unity gain at DC.
        let sinc_step = 1.0 / self.window_interp as f64;
        let mut sinc_t = sinc_step;

        self.sinc_table[0] = self.cutoff_freq;
        for i in 1..table_size {
            let window = 0.54
                - 0.46
                    * (2.0 * std::f64::consts::PI
                        * ((i - 1) as f64 / 2.0 / table_size as f64 + 0.5))
                        .cos();

            self.sinc_table[i] = (self.cutoff_freq as f64
                * ((std::f64::consts::PI * sinc_t).sin() / std::f64::consts::PI / sinc_t)
                * window) as Sample;

            sinc_t += sinc_step;
        }
        self.sinc_table[table_size - 2] = 0.0;
        self.sinc_table[table_size - 1] = 0.0;
    }

    // Computes the sinc value at position x using linear interpolation between table
    // entries. While going through the input window, only the integer part of the
    // argument changes, so the fractional part is passed in pre-computed.
    #[inline]
    fn sinc(&self, x: Fixed, fract_x: f32) -> Sample {
        let index = (x >> (FRACT_BITS - self.window_interp_bits)) as usize;

        let hl = self.sinc_table[index];
        let hh = self.sinc_table[index + 1];

        let result = hl + fract_x * (hh - hl);

        if self.scaling > 1.0 {
            result / self.scaling
        }
        else {
            result
        }
    }

    // Computes a single output sample of the given channel.
    fn resample(&self, channel_offset: usize) -> Sample {
        assert!(
            self.qt_sinc_step != 0,
            "builtin resampler: set_scaling() must be called before resampling"
        );

        let num_ch = self.in_spec.num_channels();
        let channelize = |i: usize| i * num_ch + channel_offset;

        let prev_frame = &self.frames[0];
        let curr_frame = &self.frames[1];
        let next_frame = &self.frames[2];

        // Index of the first input sample in the window, in the previous frame.
        let ind_begin_prev = if self.qt_sample >= self.qt_half_window_size {
            self.frame_size_ch
        }
        else {
            fixed_to_size(qceil(
                self.qt_sample + (self.qt_frame_size - self.qt_half_window_size),
            ))
        };
        debug_assert!(ind_begin_prev <= self.frame_size_ch);
        let ind_begin_prev = channelize(ind_begin_prev);
        let ind_end_prev = channelize(self.frame_size_ch);

        let ind_begin_cur = if self.qt_sample >= self.qt_half_window_size {
            fixed_to_size(qceil(self.qt_sample - self.qt_half_window_size))
        }
        else {
            0
        };
        debug_assert!(ind_begin_cur <= self.frame_size_ch);
        let ind_begin_cur = channelize(ind_begin_cur);

        let ind_end_cur = if self.qt_sample + self.qt_half_window_size
            > self.qt_frame_size
        {
            self.frame_size_ch - 1
        }
        else {
            fixed_to_size(qfloor(self.qt_sample + self.qt_half_window_size))
        };
        debug_assert!(ind_end_cur <= self.frame_size_ch);
        let ind_end_cur = channelize(ind_end_cur);

        let ind_begin_next = channelize(0);
        let ind_end_next = if self.qt_sample + self.qt_half_window_size
            > self.qt_frame_size
        {
            fixed_to_size(qfloor(
                self.qt_sample + self.qt_half_window_size - self.qt_frame_size,
            )) + 1
        }
        else {
            0
        };
        debug_assert!(ind_end_next <= self.frame_size_ch);
        let ind_end_next = channelize(ind_end_next);

        // Position inside the sinc table at the left edge of the window.
        let qt_cur = self.qt_frame_size + self.qt_sample
            - qceil(self.qt_frame_size + self.qt_sample - self.qt_half_window_size);
        let mut qt_sinc_cur =
            ((qt_cur as u128 * self.qt_sinc_step as u128) >> FRACT_BITS) as Fixed;

        // The sinc table is defined on the positive half-plane: at the beginning of the
        // window qt_sinc_cur decreases, and after crossing zero it increases again till
        // the end of the window.
        let qt_sinc_inc = self.qt_sinc_step;

        // Fractional part of the table position. It doesn't change during the run.
        let mut f_sinc_cur_fract = fractional(qt_sinc_cur << self.window_interp_bits);
        let mut accumulator: Sample = 0.0;

        // Run through the previous frame.
        let mut i = ind_begin_prev;
        while i < ind_end_prev {
            accumulator += prev_frame[i] * self.sinc(qt_sinc_cur, f_sinc_cur_fract);
            qt_sinc_cur -= qt_sinc_inc;
            i += num_ch;
        }

        // Run through the left side of the window in the current frame, with
        // qt_sinc_cur decreasing.
        i = ind_begin_cur;

        accumulator += curr_frame[i] * self.sinc(qt_sinc_cur, f_sinc_cur_fract);
        while qt_sinc_cur >= self.qt_sinc_step {
            i += num_ch;
            qt_sinc_cur -= qt_sinc_inc;
            accumulator += curr_frame[i] * self.sinc(qt_sinc_cur, f_sinc_cur_fract);
        }

        i += num_ch;

        debug_assert!(i <= channelize(self.frame_size_ch));

        // Crossing zero: mirror qt_sinc_cur into the ascending half.
        qt_sinc_cur = self.qt_sinc_step - qt_sinc_cur;
        f_sinc_cur_fract = fractional(qt_sinc_cur << self.window_interp_bits);

        // Run through the right side of the window, with qt_sinc_cur increasing.
        while i <= ind_end_cur {
            accumulator += curr_frame[i] * self.sinc(qt_sinc_cur, f_sinc_cur_fract);
            qt_sinc_cur += qt_sinc_inc;
            i += num_ch;
        }

        // Run through the next frame.
        i = ind_begin_next;
        while i < ind_end_next {
            accumulator += next_frame[i] * self.sinc(qt_sinc_cur, f_sinc_cur_fract);
            qt_sinc_cur += qt_sinc_inc;
            i += num_ch;
        }

        accumulator
    }
}

impl Resampler for BuiltinResampler {
    fn set_scaling(&mut self, in_rate: u32, out_rate: u32, multiplier: f32) -> bool {
        if in_rate == 0 || out_rate == 0 {
            error!("builtin resampler: invalid rate");
            return false;
        }

        let new_scaling = in_rate as f32 / out_rate as f32 * multiplier;

        // Filter out obviously invalid values.
        if new_scaling <= 0.0 {
            error!("builtin resampler: invalid scaling");
            return false;
        }

        // The window size changes with the scaling. If the new window does not fit the
        // frame size, deny the change.
        if self.window_size as f32 * new_scaling > (self.frame_size_ch - 1) as f32 {
            error!(
                "builtin resampler: scaling does not fit frame size: \
                 window_size={} frame_size={} scaling={:.5}",
                self.window_size, self.frame_size, new_scaling
            );
            return false;
        }

        // When upsampling, the edge frequency of the filter must be shifted down, and
        // the window becomes wider accordingly.
        if new_scaling > 1.0 {
            let new_qt_half_window_size =
                float_to_fixed(self.window_size as f32 / self.cutoff_freq * new_scaling);

            // Check that resample() will not go out of frame bounds. Otherwise deny
            // the change.
            let out_of_bounds = new_qt_half_window_size > self.qt_frame_size
                || fixed_to_size(qceil(self.qt_frame_size - new_qt_half_window_size))
                    > self.frame_size_ch
                || fixed_to_size(qfloor(new_qt_half_window_size)) + 1
                    > self.frame_size_ch;

            if out_of_bounds {
                error!(
                    "builtin resampler: scaling does not fit window size: \
                     window_size={} frame_size={} scaling={:.5}",
                    self.window_size, self.frame_size, new_scaling
                );
                return false;
            }

            self.qt_sinc_step = float_to_fixed(self.cutoff_freq / new_scaling);
            self.qt_half_window_size = new_qt_half_window_size;
        }
        else {
            self.qt_sinc_step = float_to_fixed(self.cutoff_freq);
            self.qt_half_window_size =
                float_to_fixed(self.window_size as f32 / self.cutoff_freq);
        }

        self.scaling = new_scaling;
        self.qt_dt = float_to_fixed(new_scaling);

        true
    }

    fn begin_push_input(&mut self) -> &mut [Sample] {
        if self.n_ready_frames < 3 {
            let n = self.n_ready_frames;
            return &mut self.frames[n];
        }

        self.frames.rotate_left(1);

        &mut self.frames[2]
    }

    fn end_push_input(&mut self) {
        if self.n_ready_frames < 3 {
            self.n_ready_frames += 1;
        }

        if self.qt_sample >= self.qt_frame_size {
            self.qt_sample -= self.qt_frame_size;
        }
    }

    fn pop_output(&mut self, out: &mut [Sample]) -> usize {
        if self.n_ready_frames < 3 {
            return 0;
        }

        let num_ch = self.in_spec.num_channels();
        debug_assert!(out.len() % num_ch == 0);

        let mut out_pos = 0;

        while out_pos < out.len() {
            if self.qt_sample >= self.qt_frame_size {
                break;
            }

            // Snap positions within epsilon of an integer onto the integer, to avoid
            // excess interpolation from rounding noise.
            if (self.qt_sample & FRACT_MASK) < self.qt_epsilon {
                self.qt_sample &= INTEGER_MASK;
            }
            else if (QT_ONE - (self.qt_sample & FRACT_MASK)) < self.qt_epsilon {
                self.qt_sample &= INTEGER_MASK;
                self.qt_sample += QT_ONE;
            }

            for channel in 0..num_ch {
                out[out_pos + channel] = self.resample(channel);
            }

            self.qt_sample += self.qt_dt;
            out_pos += num_ch;
        }

        out_pos
    }

    fn n_left_to_process(&self) -> f32 {
        fixed_to_float(2 * self.qt_frame_size - self.qt_sample)
            * self.in_spec.num_channels() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnel_core::channels::ChannelSet;
    use runnel_core::sample::PcmFormat;

    fn spec(rate: u32, channels: ChannelSet) -> SampleSpec {
        SampleSpec::new(rate, PcmFormat::Raw, channels)
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(64 * 1024, 16)
    }

    fn make(in_rate: u32, out_rate: u32, profile: ResamplerProfile) -> BuiltinResampler {
        let config = ResamplerConfig { profile, ..Default::default() };
        let factory = factory();

        BuiltinResampler::new(
            &config,
            &spec(in_rate, ChannelSet::mono()),
            &spec(out_rate, ChannelSet::mono()),
            &factory,
        )
        .unwrap()
    }

    // Run a constant signal through the resampler and collect output samples.
    fn run_dc(resampler: &mut BuiltinResampler, value: Sample, n_out: usize)
        -> Vec<Sample> {
        let mut out = Vec::with_capacity(n_out);
        let mut chunk = [0.0; 64];

        while out.len() < n_out {
            let n = resampler.pop_output(&mut chunk);

            if n == 0 {
                let input = resampler.begin_push_input();
                input.iter_mut().for_each(|s| *s = value);
                resampler.end_push_input();
                continue;
            }

            out.extend_from_slice(&chunk[..n]);
        }

        out.truncate(n_out);
        out
    }

    #[test]
    fn verify_dc_gain() {
        const DC: Sample = 0.33;

        for (in_rate, out_rate, mult) in [
            (44_100, 44_100, 1.0),
            (44_100, 48_000, 1.0),
            (48_000, 44_100, 1.0),
            (88_200, 44_100, 1.0),
            (44_100, 88_200, 1.0),
            (44_100, 44_100, 1.005),
            (44_100, 44_100, 0.995),
        ] {
            let mut resampler = make(in_rate, out_rate, ResamplerProfile::High);
            assert!(resampler.set_scaling(in_rate, out_rate, mult));

            let out = run_dc(&mut resampler, DC, 4000);

            // Skip the transient from the zero-initialized window at the start. The
            // remaining deviation is bounded by the window's spectral leakage.
            for &s in &out[2000..] {
                assert!(
                    (s - DC).abs() < 0.02,
                    "dc level not preserved: got {} for scaling {}/{}x{}",
                    s,
                    in_rate,
                    out_rate,
                    mult
                );
            }
        }
    }

    #[test]
    fn verify_sine_continuity_across_scaling_sweep() {
        const RATE: u32 = 48_000;
        // f < Nyquist/4, amplitude 0.5: the largest sample-to-sample step of the input
        // is bounded by amplitude * 2*pi*f/rate.
        const FREQ: f32 = 3_000.0;
        const AMPLITUDE: f32 = 0.5;

        let mut resampler = make(RATE, RATE, ResamplerProfile::Medium);
        assert!(resampler.set_scaling(RATE, RATE, 1.0));

        let max_step =
            AMPLITUDE * 2.0 * std::f32::consts::PI * FREQ / RATE as f32 * 1.5 + 0.01;

        let mut phase: f64 = 0.0;
        let mut prev_out: Option<Sample> = None;
        let mut chunk = [0.0; 64];

        // Sweep the multiplier across the valid range while feeding a sine.
        for step in 0..400 {
            let mult = 0.95 + 0.1 * (step as f32 / 400.0);
            assert!(resampler.set_scaling(RATE, RATE, mult));

            loop {
                let n = resampler.pop_output(&mut chunk);

                if n == 0 {
                    let input = resampler.begin_push_input();
                    for s in input.iter_mut() {
                        *s = AMPLITUDE
                            * (2.0 * std::f64::consts::PI * FREQ as f64 * phase).sin()
                                as f32;
                        phase += 1.0 / RATE as f64;
                    }
                    resampler.end_push_input();
                    break;
                }

                for &s in &chunk[..n] {
                    if let Some(prev) = prev_out {
                        assert!(
                            (s - prev).abs() <= max_step,
                            "discontinuity at step {}: {} -> {}",
                            step,
                            prev,
                            s
                        );
                    }
                    prev_out = Some(s);
                }
            }
        }
    }

    #[test]
    fn verify_scaling_bounds() {
        let mut resampler = make(44_100, 44_100, ResamplerProfile::Low);

        assert!(resampler.set_scaling(44_100, 44_100, 1.0));
        assert!(resampler.set_scaling(44_100, 44_100, 1.01));
        assert!(resampler.set_scaling(44_100, 44_100, 0.99));

        // A multiplier pushing the window outside the pre-allocated frame is rejected.
        assert!(!resampler.set_scaling(44_100, 44_100, 2.0));
        assert!(!resampler.set_scaling(0, 44_100, 1.0));
        assert!(!resampler.set_scaling(44_100, 0, 1.0));
    }

    #[test]
    fn verify_requires_identical_channel_sets() {
        let config = ResamplerConfig::default();
        let factory = factory();

        let result = BuiltinResampler::new(
            &config,
            &spec(44_100, ChannelSet::mono()),
            &spec(44_100, ChannelSet::stereo()),
            &factory,
        );

        assert!(matches!(result, Err(Error::BadConfig(_))));
    }
}
