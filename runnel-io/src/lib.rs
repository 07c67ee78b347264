// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Project Runnel audio device boundary.
//!
//! This crate defines the [`Device`](device::Device), [`Source`](device::Source), and
//! [`Sink`](device::Sink) traits through which pipelines exchange frames with the
//! outside world, a WAV file backend, and the [`IoPump`](pump::IoPump) that drives a
//! source/sink pair.

pub mod device;
pub mod pump;
pub mod wav;
