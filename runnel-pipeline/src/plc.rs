// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `plc` module defines the packet loss concealment interface and configuration.

use std::fmt;

use runnel_core::frame::Frame;
use runnel_core::spec::SampleSpec;

/// Lowest backend id available to user-registered PLC plugins.
pub const MIN_BACKEND_ID: u32 = 1000;

/// Selection of the PLC backend.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PlcBackend {
    /// Use the default backend.
    #[default]
    Default,
    /// Disable PLC: lost frames stay silent.
    None,
    /// Insert a loud beep instead of losses. Useful for debugging, to distinguish
    /// losses easily.
    Beep,
    /// User plugin registered in the processor registry under this id.
    Plugin(u32),
}

impl fmt::Display for PlcBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PlcBackend::Default => f.write_str("default"),
            PlcBackend::None => f.write_str("none"),
            PlcBackend::Beep => f.write_str("beep"),
            PlcBackend::Plugin(id) => write!(f, "plugin:{}", id),
        }
    }
}

/// PLC configuration.
#[derive(Copy, Clone, Debug, Default)]
pub struct PlcConfig {
    /// Backend to use.
    pub backend: PlcBackend,
}

impl PlcConfig {
    /// Automatically fill missing settings.
    pub fn deduce_defaults(&mut self) {
        if self.backend == PlcBackend::Default {
            self.backend = PlcBackend::None;
        }
    }
}

/// Packet loss concealment interface.
///
/// Used to mask the effects of packet loss when lost packets were not recovered by FEC.
/// Unlike FEC, which restores the original packet bit-for-bit (but may fail), PLC is
/// lossy interpolation; it is usually still better than silence.
///
/// A `Plc` implementation is driven by
/// [`PlcReader`](crate::plc_reader::PlcReader): for every frame, the reader invokes
/// either [`process_history`](Plc::process_history) (so the PLC can remember played
/// samples) or [`process_loss`](Plc::process_loss) (to fill a lost frame), depending on
/// whether there was a loss.
pub trait Plc {
    /// Sample spec expected by the PLC.
    fn sample_spec(&self) -> SampleSpec;

    /// How many samples before a lost frame are needed for interpolation.
    ///
    /// If this returns N, the reader remembers the last N samples before a gap and
    /// provides them to [`process_loss`](Plc::process_loss) as `prev_frame`. If it
    /// returns 0, `prev_frame` is always `None`.
    fn lookbehind_len(&self) -> usize;

    /// How many samples after a lost frame are needed for interpolation.
    ///
    /// If this returns N, the reader tries to read ahead up to N samples following a
    /// gap and provides them as `next_frame`. If it returns 0, `next_frame` is always
    /// `None` and no read-ahead is performed.
    fn lookahead_len(&self) -> usize;

    /// Invoked for every frame without losses, so the PLC may remember samples for
    /// later interpolation.
    fn process_history(&mut self, hist_frame: &Frame);

    /// Invoked for every lost frame. The PLC fills `lost_frame` with interpolated data.
    ///
    /// `prev_frame` may be shorter than the look-behind length only in the very
    /// beginning of the stream. `next_frame` may be shorter or absent quite frequently,
    /// depending on whether the packets following the loss have arrived yet.
    fn process_loss(
        &mut self,
        lost_frame: &mut Frame,
        prev_frame: Option<&Frame>,
        next_frame: Option<&Frame>,
    );
}
