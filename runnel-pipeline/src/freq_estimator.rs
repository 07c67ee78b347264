// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `freq_estimator` module estimates the clock drift between sender and receiver.

/// Profile of the frequency estimator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FreqEstimatorProfile {
    /// Responds to latency changes faster. Recommended for low latencies, where the
    /// gradual profile can't keep up at all.
    #[default]
    Responsive,
    /// Converges more smoothly and tolerates higher network jitter. Recommended for
    /// higher latencies.
    Gradual,
}

/// Tuning constants of the frequency estimator.
#[derive(Copy, Clone, Debug)]
pub struct FreqEstimatorConfig {
    /// Proportional gain, applied to the latency error in samples.
    pub p: f64,
    /// Integral gain, applied to the accumulated latency error in samples.
    pub i: f64,
    /// Coefficient of the exponential filter applied to the measured latency before it
    /// enters the controller. Lower values smooth more.
    pub smoothing: f64,
}

impl FreqEstimatorConfig {
    /// Get the tuning constants of a profile.
    pub fn for_profile(profile: FreqEstimatorProfile) -> Self {
        match profile {
            FreqEstimatorProfile::Responsive => {
                FreqEstimatorConfig { p: 1e-6, i: 5e-9, smoothing: 0.15 }
            }
            FreqEstimatorProfile::Gradual => {
                FreqEstimatorConfig { p: 2e-7, i: 5e-10, smoothing: 0.03 }
            }
        }
    }
}

/// PI controller deriving the resampler scaling coefficient from the deviation of the
/// actual latency from the target latency.
///
/// When the measured latency stays above the target, the receiver consumes too slowly
/// relative to the sender clock and the coefficient rises above 1.0, draining the
/// queue; below the target it falls under 1.0. The caller is responsible for clamping
/// the coefficient to the allowed deviation range.
pub struct FreqEstimator {
    config: FreqEstimatorConfig,

    target_latency: f64,
    filtered_latency: f64,

    integral: f64,
    coeff: f64,
}

impl FreqEstimator {
    /// Create an estimator for the given profile and target latency in samples.
    pub fn new(profile: FreqEstimatorProfile, target_latency: usize) -> Self {
        FreqEstimator {
            config: FreqEstimatorConfig::for_profile(profile),
            target_latency: target_latency as f64,
            filtered_latency: target_latency as f64,
            integral: 0.0,
            coeff: 1.0,
        }
    }

    /// Feed the measured latency, in samples, and recompute the coefficient.
    pub fn update_current_latency(&mut self, current_latency: usize) {
        self.filtered_latency += self.config.smoothing
            * (current_latency as f64 - self.filtered_latency);

        let error = self.filtered_latency - self.target_latency;

        self.integral += error;

        self.coeff = 1.0 + self.config.p * error + self.config.i * self.integral;
    }

    /// Change the target latency, in samples.
    pub fn update_target_latency(&mut self, target_latency: usize) {
        self.target_latency = target_latency as f64;
    }

    /// Get the current scaling coefficient, near 1.0.
    pub fn freq_coeff(&self) -> f32 {
        self.coeff as f32
    }
}
