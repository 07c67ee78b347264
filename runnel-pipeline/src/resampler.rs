// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `resampler` module defines the resampler backend interface and configuration.

use runnel_core::sample::Sample;

/// Selection of the resampler backend.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResamplerBackend {
    /// Select the best backend automatically.
    #[default]
    Auto,
    /// Built-in bandlimited sinc resampler. CPU-hungry, but maintains the requested
    /// scaling factor with very high precision.
    Builtin,
    /// Third-party resampler (rubato).
    Rubato,
    /// Third-party resampler for the constant rate ratio, combined with decimation for
    /// the dynamic part of the scaling factor. Near-memcpy speed when the rates match.
    RubatoDecim,
}

/// Quality profile of the resampler.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ResamplerProfile {
    /// Lower quality, lower CPU usage.
    Low,
    /// Medium quality, medium CPU usage.
    #[default]
    Medium,
    /// Higher quality, higher CPU usage.
    High,
}

/// Resampler configuration.
#[derive(Copy, Clone, Debug, Default)]
pub struct ResamplerConfig {
    /// Backend to use.
    pub backend: ResamplerBackend,
    /// Quality profile.
    pub profile: ResamplerProfile,
}

/// `Resampler` converts the sample rate of a raw interleaved stream by a non-integer,
/// dynamically changing factor.
///
/// The protocol is push/pull: the caller obtains the internal input buffer via
/// [`begin_push_input`](Resampler::begin_push_input), fills it completely, commits it
/// with [`end_push_input`](Resampler::end_push_input), and then drains output with
/// [`pop_output`](Resampler::pop_output) until it returns zero, which means more input
/// is needed.
pub trait Resampler {
    /// Set the scaling factor to `in_rate / out_rate * multiplier`.
    ///
    /// The multiplier is a dimensionless correction near 1.0 used to compensate clock
    /// drift. Returns false, without modifying state, if the result is out of the range
    /// supported by the backend.
    fn set_scaling(&mut self, in_rate: u32, out_rate: u32, multiplier: f32) -> bool;

    /// Get the internal buffer to be filled with input samples.
    ///
    /// The returned slice must be filled completely before calling
    /// [`end_push_input`](Resampler::end_push_input).
    fn begin_push_input(&mut self) -> &mut [Sample];

    /// Commit the input buffer obtained from
    /// [`begin_push_input`](Resampler::begin_push_input).
    fn end_push_input(&mut self);

    /// Produce up to `out.len()` output samples. Returns the number of samples written;
    /// zero means more input is needed.
    fn pop_output(&mut self, out: &mut [Sample]) -> usize;

    /// How many input samples were pushed but not processed yet.
    ///
    /// Used to propagate capture timestamps across resampling. May be fractional.
    fn n_left_to_process(&self) -> f32;
}
