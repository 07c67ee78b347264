// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sample` module defines the native sample type and the set of PCM sample formats
//! carried across the wire and through files.

use std::fmt;

/// The native sample type of the processing pipeline.
///
/// All DSP stages operate on interleaved 32-bit floats in the range
/// [[`SAMPLE_MIN`], [`SAMPLE_MAX`]].
pub type Sample = f32;

/// Minimum possible value of a native sample.
pub const SAMPLE_MIN: Sample = -1.0;

/// Maximum possible value of a native sample.
pub const SAMPLE_MAX: Sample = 1.0;

/// `PcmFormat` describes the encoding of a single PCM sample.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PcmFormat {
    /// Native format of the processing pipeline: 32-bit float, native endian.
    #[default]
    Raw,
    /// Signed 8-bit integer.
    S8,
    /// Signed 16-bit integer, little endian.
    S16Le,
    /// Signed 16-bit integer, big endian.
    S16Be,
    /// Signed 24-bit integer, 3 bytes packed, little endian.
    S24Le,
    /// Signed 24-bit integer, 3 bytes packed, big endian.
    S24Be,
    /// Signed 32-bit integer, little endian.
    S32Le,
    /// Signed 32-bit integer, big endian.
    S32Be,
    /// 32-bit float, little endian.
    F32Le,
    /// 32-bit float, big endian.
    F32Be,
    /// 64-bit float, little endian.
    F64Le,
    /// 64-bit float, big endian.
    F64Be,
}

impl PcmFormat {
    /// Get the width of one encoded sample of one channel, in bytes.
    pub fn sample_size(&self) -> usize {
        match *self {
            PcmFormat::Raw => std::mem::size_of::<Sample>(),
            PcmFormat::S8 => 1,
            PcmFormat::S16Le | PcmFormat::S16Be => 2,
            PcmFormat::S24Le | PcmFormat::S24Be => 3,
            PcmFormat::S32Le | PcmFormat::S32Be => 4,
            PcmFormat::F32Le | PcmFormat::F32Be => 4,
            PcmFormat::F64Le | PcmFormat::F64Be => 8,
        }
    }

    /// Check if this is the native in-memory format.
    pub fn is_raw(&self) -> bool {
        *self == PcmFormat::Raw
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            PcmFormat::Raw => "raw",
            PcmFormat::S8 => "s8",
            PcmFormat::S16Le => "s16le",
            PcmFormat::S16Be => "s16be",
            PcmFormat::S24Le => "s24le",
            PcmFormat::S24Be => "s24be",
            PcmFormat::S32Le => "s32le",
            PcmFormat::S32Be => "s32be",
            PcmFormat::F32Le => "f32le",
            PcmFormat::F32Be => "f32be",
            PcmFormat::F64Le => "f64le",
            PcmFormat::F64Be => "f64be",
        };

        f.write_str(name)
    }
}
