// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `beep_plc` module replaces lost samples with a loud beep.

use runnel_core::errors::{Error, Result};
use runnel_core::frame::Frame;
use runnel_core::sample::Sample;
use runnel_core::spec::SampleSpec;

use crate::plc::Plc;

const BEEP_FREQ: f64 = 880.0;

/// Beep "PLC".
///
/// Replaces lost samples with a loud beep. Useful for debugging, to distinguish losses
/// easily.
pub struct BeepPlc {
    sample_spec: SampleSpec,
    signal_pos: u32,
}

impl BeepPlc {
    /// Create a beep PLC for a raw stream.
    pub fn new(sample_spec: &SampleSpec) -> Result<Self> {
        if !sample_spec.is_complete() || !sample_spec.is_raw() {
            return Err(Error::BadConfig(
                "beep plc requires a complete sample spec with raw format",
            ));
        }

        Ok(BeepPlc { sample_spec: *sample_spec, signal_pos: 0 })
    }
}

impl Plc for BeepPlc {
    fn sample_spec(&self) -> SampleSpec {
        self.sample_spec
    }

    fn lookbehind_len(&self) -> usize {
        0
    }

    fn lookahead_len(&self) -> usize {
        0
    }

    fn process_history(&mut self, hist_frame: &Frame) {
        self.sample_spec.validate_frame(hist_frame);

        self.signal_pos = self.signal_pos.wrapping_add(hist_frame.duration() as u32);
    }

    fn process_loss(
        &mut self,
        lost_frame: &mut Frame,
        _prev_frame: Option<&Frame>,
        _next_frame: Option<&Frame>,
    ) {
        self.sample_spec.validate_frame(lost_frame);

        let num_channels = self.sample_spec.num_channels();
        let rate = self.sample_spec.rate();

        let lost_samples = lost_frame.samples_mut();
        let frame_count = lost_samples.len() / num_channels;

        for ns in 0..frame_count {
            let s = (2.0 * std::f64::consts::PI / rate as f64
                * BEEP_FREQ
                * self.signal_pos as f64)
                .sin() as Sample;
            self.signal_pos = self.signal_pos.wrapping_add(1);

            for nc in 0..num_channels {
                lost_samples[ns * num_channels + nc] = s;
            }
        }
    }
}
