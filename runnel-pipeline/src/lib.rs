// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Project Runnel receiver audio pipeline.
//!
//! The pipeline is pull-based: the sink requests frames from the topmost
//! [`FrameReader`](runnel_core::reader::FrameReader), which requests frames from the
//! reader below it, down to the depacketizer. This crate provides the frame-producing
//! stages between the packet layer and the audio sink:
//!
//! - [`plc_reader::PlcReader`] hides gaps left by lost packets using a pluggable
//!   [`plc::Plc`] backend with look-behind and look-ahead context;
//! - [`resampler_reader::ResamplerReader`] converts the sample rate and applies a
//!   dynamic scaling factor through a pluggable [`resampler::Resampler`] backend
//!   (built-in sinc, decimation, or rubato);
//! - [`channel_mapper::ChannelMapperReader`] and [`pcm_mapper::PcmMapperReader`] remap
//!   channel layouts and PCM encodings;
//! - [`latency_monitor::LatencyMonitor`] measures the session latency and steers the
//!   resampler to compensate clock drift, terminating sessions that leave the
//!   configured bounds;
//! - [`mixer::Mixer`] sums concurrent sessions into one output stream;
//! - [`watchdog::Watchdog`] terminates dead or hopelessly stuttering sessions;
//! - [`state_tracker::StateTracker`] aggregates pipeline liveness for idle sinks;
//! - [`registry::ProcessorRegistry`] dispatches PLC and resampler backends, including
//!   user plugins.

pub mod beep_plc;
pub mod builtin_resampler;
pub mod channel_mapper;
pub mod decimation_resampler;
pub mod e2e_latency_monitor;
pub mod freq_estimator;
pub mod latency_monitor;
pub mod mixer;
pub mod pcm_mapper;
pub mod plc;
pub mod plc_reader;
pub mod registry;
pub mod resampler;
pub mod resampler_reader;
pub mod rubato_resampler;
pub mod state_tracker;
pub mod watchdog;

#[cfg(test)]
mod testing;
