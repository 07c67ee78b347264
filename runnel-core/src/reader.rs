// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `reader` module defines the `FrameReader` trait implemented by every pipeline
//! stage.

use crate::errors::{ReadStatus, Result};
use crate::frame::Frame;

/// Mode of a frame read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadMode {
    /// The reader must produce data, block if necessary, or report stream termination or
    /// a fatal error. It never returns [`ReadStatus::Drained`].
    Hard,
    /// The reader must return [`ReadStatus::Drained`] promptly if data is not already
    /// buffered.
    Soft,
}

/// `FrameReader` is the single operation every pipeline stage exposes.
///
/// The pipeline is pull-based: the sink requests frames from the topmost reader, which
/// requests frames from the reader below, down to the depacketizer.
pub trait FrameReader {
    /// Read a frame of up to `duration` samples per channel.
    ///
    /// On `Complete` or `Partial`, the frame's duration, payload length, flags, and,
    /// where applicable, capture timestamp have been set. If the attached buffer is too
    /// small (or absent), the reader reallocates it; the caller must tolerate that.
    fn read(&mut self, frame: &mut Frame, duration: usize, mode: ReadMode)
        -> Result<ReadStatus>;
}

impl<R: FrameReader + ?Sized> FrameReader for Box<R> {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        (**self).read(frame, duration, mode)
    }
}

impl<R: FrameReader + ?Sized> FrameReader for &mut R {
    fn read(
        &mut self,
        frame: &mut Frame,
        duration: usize,
        mode: ReadMode,
    ) -> Result<ReadStatus> {
        (**self).read(frame, duration, mode)
    }
}
