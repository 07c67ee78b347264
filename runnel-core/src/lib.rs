// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Shared structs, traits, and primitives of Project Runnel.
//!
//! Runnel is a real-time audio streaming toolkit that carries uncompressed PCM across a
//! lossy network with bounded latency. This crate defines the value types and contracts
//! every other Runnel crate builds on: sample formats and channel sets, the stream
//! [`SampleSpec`](spec::SampleSpec), the [`Frame`](frame::Frame) moving through
//! pipelines, the pooled [`FrameFactory`](factory::FrameFactory), the
//! [`FrameReader`](reader::FrameReader) contract of every pipeline stage, and the
//! error/status taxonomy.

pub mod channels;
pub mod conv;
pub mod errors;
pub mod factory;
pub mod frame;
pub mod pool;
pub mod reader;
pub mod sample;
pub mod spec;
pub mod units;
