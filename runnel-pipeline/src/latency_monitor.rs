// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `latency_monitor` module observes the session latency and steers the resampler
//! to compensate clock drift.

use std::sync::Arc;

use log::{debug, error, warn};

use runnel_core::errors::{Error, ReadStatus, Result};
use runnel_core::frame::Frame;
use runnel_core::reader::{FrameReader, ReadMode};
use runnel_core::spec::SampleSpec;
use runnel_core::units::{unix_now, Nanoseconds, MILLISECOND, SECOND};

use runnel_io::device::DeviceState;

use crate::freq_estimator::{FreqEstimator, FreqEstimatorProfile};
use crate::resampler_reader::ResamplerReader;

/// Narrow view of the packet layer: reports how deep the network incoming queue
/// currently is, in stream time.
///
/// NIQ latency is the distance between the head of the incoming packet queue and the
/// depacketizer read position. The probe is shared with the network thread, hence the
/// thread-safety bounds; readers tolerate slightly stale values.
pub trait QueueProbe: Send + Sync {
    /// Current queue depth in samples per channel, or `None` before any packet arrived.
    fn niq_latency(&self) -> Option<usize>;
}

/// Which latency measurement drives the frequency estimator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FreqEstimatorInput {
    /// Steer on the network incoming queue depth.
    #[default]
    NiqLatency,
    /// Steer on the end-to-end latency derived from capture timestamps.
    E2eLatency,
}

/// Parameters of the latency monitor.
#[derive(Copy, Clone, Debug)]
pub struct LatencyConfig {
    /// Enable the frequency estimator and resampler steering.
    pub fe_enable: bool,
    /// Which latency drives the frequency estimator.
    pub fe_input: FreqEstimatorInput,
    /// Frequency estimator profile.
    pub fe_profile: FreqEstimatorProfile,
    /// How often to run the frequency estimator and update the resampler scaling.
    pub fe_update_interval: Nanoseconds,
    /// Minimum allowed latency. When the latency goes out of bounds, the session is
    /// terminated.
    pub min_latency: Nanoseconds,
    /// Maximum allowed latency. When the latency goes out of bounds, the session is
    /// terminated.
    pub max_latency: Nanoseconds,
    /// Maximum allowed delta of the scaling coefficient around 1.0. The coefficient is
    /// clamped to `[1.0 - max_scaling_delta, 1.0 + max_scaling_delta]`.
    pub max_scaling_delta: f32,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        LatencyConfig {
            fe_enable: true,
            fe_input: FreqEstimatorInput::default(),
            fe_profile: FreqEstimatorProfile::default(),
            fe_update_interval: 5 * MILLISECOND,
            min_latency: 0,
            max_latency: 0,
            max_scaling_delta: 0.005,
        }
    }
}

impl LatencyConfig {
    /// Automatically deduce the frequency estimator profile from the target latency.
    pub fn deduce_fe_profile(&mut self, target_latency: Nanoseconds) {
        self.fe_profile = if target_latency < 30 * MILLISECOND {
            // Prefer the responsive profile on low latencies, because the gradual
            // profile can't keep up at all.
            FreqEstimatorProfile::Responsive
        }
        else {
            // Prefer the gradual profile on higher latencies, because it can handle
            // higher network jitter.
            FreqEstimatorProfile::Gradual
        };
    }

    /// Automatically deduce the minimum latency from the target latency.
    pub fn deduce_min_latency(&mut self, target_latency: Nanoseconds) {
        self.min_latency = target_latency - target_latency;
    }

    /// Automatically deduce the maximum latency from the target latency.
    pub fn deduce_max_latency(&mut self, target_latency: Nanoseconds) {
        self.max_latency = target_latency + target_latency;
    }
}

/// Latency statistics reported to the user.
#[derive(Copy, Clone, Debug, Default)]
pub struct LatencyStats {
    /// Estimated network incoming queue latency.
    pub niq_latency: Nanoseconds,
    /// Estimated end-to-end latency.
    pub e2e_latency: Nanoseconds,
}

const REPORT_INTERVAL: Nanoseconds = 5 * SECOND;

/// Latency monitor element of a reading pipeline.
///
/// Forwards frames from the owned [`ResamplerReader`] and, once per update interval:
///  - measures the NIQ latency through the [`QueueProbe`] and the E2E latency from
///    capture timestamps reported back via [`reclock`](LatencyMonitor::reclock);
///  - feeds the configured measurement to the [`FreqEstimator`], clamps the resulting
///    coefficient, and applies it to the resampler;
///  - terminates the session when the latency leaves the configured bounds: the
///    current and all subsequent reads fail with [`Error::Aborted`].
pub struct LatencyMonitor {
    resampler: ResamplerReader,
    probe: Arc<dyn QueueProbe>,

    fe: Option<FreqEstimator>,

    config: LatencyConfig,
    target_latency: Nanoseconds,

    in_spec: SampleSpec,

    // Stream position and the next update/report positions, in nanoseconds of output
    // stream time.
    stream_pos: Nanoseconds,
    update_pos: Nanoseconds,
    report_pos: Nanoseconds,

    freq_coeff: f32,

    niq_latency: Nanoseconds,
    has_niq: bool,
    e2e_latency: Nanoseconds,
    has_e2e: bool,

    last_cts: Nanoseconds,

    out_spec: SampleSpec,

    alive: bool,
}

impl LatencyMonitor {
    /// Create a latency monitor owning a resampler reader.
    pub fn new(
        mut resampler: ResamplerReader,
        probe: Arc<dyn QueueProbe>,
        config: &LatencyConfig,
        target_latency: Nanoseconds,
        in_spec: &SampleSpec,
        out_spec: &SampleSpec,
    ) -> Result<Self> {
        if target_latency <= 0 {
            return Err(Error::BadConfig(
                "latency monitor requires a positive target latency",
            ));
        }

        if config.fe_update_interval <= 0 {
            return Err(Error::BadConfig(
                "latency monitor requires a positive update interval",
            ));
        }

        debug!(
            "latency monitor: initializing: target={}ms min={}ms max={}ms \
             fe_enable={} fe_profile={:?}",
            target_latency / MILLISECOND,
            config.min_latency / MILLISECOND,
            config.max_latency / MILLISECOND,
            config.fe_enable,
            config.fe_profile
        );

        let fe = if config.fe_enable {
            let target_samples = in_spec.ns_to_duration(target_latency);
            Some(FreqEstimator::new(config.fe_profile, target_samples))
        }
        else {
            None
        };

        if !resampler.set_scaling(1.0) {
            return Err(Error::BadConfig(
                "resampler rejected the initial scaling",
            ));
        }

        Ok(LatencyMonitor {
            resampler,
            probe,
            fe,
            config: *config,
            target_latency,
            in_spec: *in_spec,
            stream_pos: 0,
            update_pos: 0,
            report_pos: REPORT_INTERVAL,
            freq_coeff: 1.0,
            niq_latency: 0,
            has_niq: false,
            e2e_latency: 0,
            has_e2e: false,
            last_cts: 0,
            out_spec: *out_spec,
            alive: true,
        })
    }

    /// Check if the session is still within latency bounds.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Get the state of the session: active, or broken after a bounds violation.
    pub fn state(&self) -> DeviceState {
        if self.alive {
            DeviceState::Active
        }
        else {
            DeviceState::Broken
        }
    }

    /// Get the current latency statistics.
    pub fn stats(&self) -> LatencyStats {
        LatencyStats { niq_latency: self.niq_latency, e2e_latency: self.e2e_latency }
    }

    /// Report the playback timestamp of the last frame returned by
    /// [`read`](FrameReader::read), after it was handed to the playback buffer.
    ///
    /// Returns false if the session has ended.
    pub fn reclock(&mut self, playback_ts: Nanoseconds) -> bool {
        if !self.alive {
            return false;
        }

        if self.last_cts != 0 {
            self.e2e_latency = playback_ts - self.last_cts;
            self.has_e2e = true;
        }

        true
    }

    fn compute_niq_latency(&mut self) {
        if let Some(samples) = self.probe.niq_latency() {
            self.niq_latency = self.in_spec.duration_to_ns(samples);
            self.has_niq = true;
        }
    }

    fn check_bounds(&self, latency: Nanoseconds) -> bool {
        // Bounds are enforced only when configured.
        if self.config.max_latency == 0 {
            return true;
        }

        if latency < self.config.min_latency || latency > self.config.max_latency {
            warn!(
                "latency monitor: latency out of bounds: latency={}ms min={}ms \
                 max={}ms target={}ms",
                latency / MILLISECOND,
                self.config.min_latency / MILLISECOND,
                self.config.max_latency / MILLISECOND,
                self.target_latency / MILLISECOND
            );
            return false;
        }

        true
    }

    fn update_scaling(&mut self, latency: Nanoseconds) -> bool {
        let fe = match self.fe.as_mut() {
            Some(fe) => fe,
            None => return true,
        };

        let latency_samples = self.in_spec.ns_to_duration(latency.max(0));
        fe.update_current_latency(latency_samples);

        let delta = self.config.max_scaling_delta;
        self.freq_coeff = fe.freq_coeff().clamp(1.0 - delta, 1.0 + delta);

        if !self.resampler.set_scaling(self.freq_coeff) {
            error!(
                "latency monitor: resampler rejected scaling: coeff={:.6}",
                self.freq_coeff
            );
            return false;
        }

        true
    }

    fn update(&mut self) -> bool {
        let latency = match self.config.fe_input {
            FreqEstimatorInput::NiqLatency => self.has_niq.then_some(self.niq_latency),
            FreqEstimatorInput::E2eLatency => self.has_e2e.then_some(self.e2e_latency),
        };

        if let Some(latency) = latency {
            if !self.check_bounds(latency) {
                return false;
            }

            if !self.update_scaling(latency) {
                return false;
            }
        }

        if self.stream_pos >= self.report_pos {
            self.report_pos += REPORT_INTERVAL;

            debug!(
                "latency monitor: niq={}ms e2e={}ms target={}ms coeff={:.6}",
                self.niq_latency / MILLISECOND,
                self.e2e_latency / MILLISECOND,
                self.target_latency / MILLISECOND,
                self.freq_coeff
            );
        }

        true
    }
}

impl FrameReader for LatencyMonitor {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        if !self.alive {
            return Err(Error::Aborted);
        }

        let status = self.resampler.read(frame, duration, mode)?;

        if status == ReadStatus::Complete || status == ReadStatus::Partial {
            self.stream_pos += self.out_spec.duration_to_ns(frame.duration());

            if frame.capture_ts() != 0 {
                self.last_cts = frame.capture_ts();
                self.e2e_latency = unix_now() - frame.capture_ts();
                self.has_e2e = true;
            }
        }

        self.compute_niq_latency();

        if self.stream_pos >= self.update_pos {
            self.update_pos += self.config.fe_update_interval;

            if !self.update() {
                self.alive = false;
                return Err(Error::Aborted);
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimation_resampler::DecimationResampler;
    use crate::testing::MockReader;
    use runnel_core::channels::ChannelSet;
    use runnel_core::factory::FrameFactory;
    use runnel_core::frame::FrameFlags;
    use runnel_core::sample::PcmFormat;

    use std::sync::atomic::{AtomicUsize, Ordering};

    const RATE: u32 = 48_000;

    fn spec() -> SampleSpec {
        SampleSpec::new(RATE, PcmFormat::Raw, ChannelSet::mono())
    }

    fn factory() -> FrameFactory {
        FrameFactory::new(64 * 1024, 32)
    }

    struct MockProbe {
        depth: AtomicUsize,
    }

    impl MockProbe {
        fn new(depth: usize) -> Arc<Self> {
            Arc::new(MockProbe { depth: AtomicUsize::new(depth) })
        }

        fn set(&self, depth: usize) {
            self.depth.store(depth, Ordering::Relaxed);
        }
    }

    impl QueueProbe for MockProbe {
        fn niq_latency(&self) -> Option<usize> {
            Some(self.depth.load(Ordering::Relaxed))
        }
    }

    fn make_monitor(
        probe: Arc<MockProbe>,
        config: &LatencyConfig,
        target: Nanoseconds,
        samples: usize,
    ) -> LatencyMonitor {
        let factory = factory();

        let mock = MockReader::new(factory.clone(), spec());
        mock.handle().add(samples, 0.1, FrameFlags::HAS_SIGNAL);

        let resampler = DecimationResampler::new(None, &spec(), &spec(), &factory)
            .unwrap();

        let reader = ResamplerReader::new(
            Box::new(mock),
            Box::new(resampler),
            factory,
            &spec(),
            &spec(),
        )
        .unwrap();

        LatencyMonitor::new(reader, probe, config, target, &spec(), &spec()).unwrap()
    }

    #[test]
    fn verify_forwarding_within_bounds() {
        let target = 50 * MILLISECOND;

        let mut config = LatencyConfig::default();
        config.deduce_fe_profile(target);
        config.deduce_min_latency(target);
        config.deduce_max_latency(target);

        // Queue depth right at the target.
        let probe = MockProbe::new(spec().ns_to_duration(target));

        let mut monitor = make_monitor(Arc::clone(&probe), &config, target, 4800);

        let factory = factory();
        let mut frame = factory.allocate_frame_no_buffer();

        for _ in 0..10 {
            let status = monitor.read(&mut frame, 480, ReadMode::Hard).unwrap();
            assert_eq!(status, ReadStatus::Complete);
        }

        assert!(monitor.is_alive());
        assert_eq!(monitor.state(), DeviceState::Active);

        let stats = monitor.stats();
        assert_eq!(stats.niq_latency, target);
    }

    #[test]
    fn verify_bounds_violation_aborts() {
        let target = 50 * MILLISECOND;

        let mut config = LatencyConfig::default();
        config.min_latency = 10 * MILLISECOND;
        config.max_latency = 100 * MILLISECOND;

        // Queue depth of 150ms, above the allowed maximum.
        let probe = MockProbe::new(spec().ns_to_duration(150 * MILLISECOND));

        let mut monitor = make_monitor(probe, &config, target, 4800);

        let factory = factory();
        let mut frame = factory.allocate_frame_no_buffer();

        let result = monitor.read(&mut frame, 480, ReadMode::Hard);
        assert!(matches!(result, Err(Error::Aborted)));

        assert!(!monitor.is_alive());
        assert_eq!(monitor.state(), DeviceState::Broken);

        // The session stays broken.
        let result = monitor.read(&mut frame, 480, ReadMode::Hard);
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[test]
    fn verify_scaling_steered_by_queue_depth() {
        let target = 50 * MILLISECOND;

        let mut config = LatencyConfig::default();
        config.deduce_max_latency(target);

        // Queue runs consistently above target: the estimator must speed up
        // consumption, clamped by max_scaling_delta.
        let probe = MockProbe::new(spec().ns_to_duration(80 * MILLISECOND));

        let mut monitor = make_monitor(Arc::clone(&probe), &config, target, RATE as usize * 4);

        let factory = factory();
        let mut frame = factory.allocate_frame_no_buffer();

        for _ in 0..200 {
            let status = monitor.read(&mut frame, 480, ReadMode::Hard).unwrap();
            assert_eq!(status, ReadStatus::Complete);
        }

        assert!(monitor.freq_coeff > 1.0);
        assert!(monitor.freq_coeff <= 1.0 + config.max_scaling_delta);

        // Queue drains below target: the coefficient must move down again.
        probe.set(spec().ns_to_duration(20 * MILLISECOND));

        let before = monitor.freq_coeff;

        for _ in 0..100 {
            let status = monitor.read(&mut frame, 480, ReadMode::Hard).unwrap();
            assert_eq!(status, ReadStatus::Complete);
        }

        assert!(monitor.freq_coeff < before);
    }
}
