// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Project Runnel is a real-time audio streaming toolkit: it carries uncompressed PCM
//! audio across a lossy network while keeping the latency bounded.
//!
//! Receivers accept packets from concurrent senders, conceal losses, compensate clock
//! drift by resampling, mix all active sessions, and hand frames to an audio sink. This
//! facade crate re-exports the Runnel crates under one name:
//!
//! - [`core`] — shared value types and contracts: sample specs, frames, pooled
//!   allocation, the `FrameReader` pipeline interface, and the error taxonomy;
//! - [`io`] — the device boundary: sources, sinks, the WAV backend, and the IO pump;
//! - [`pipeline`] — the receiver pipeline stages: PLC, resampling, mapping, latency
//!   tuning, mixing, and pipeline state tracking.

pub use runnel_core as core;
pub use runnel_io as io;
pub use runnel_pipeline as pipeline;
