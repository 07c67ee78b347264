// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `factory` module provides `FrameFactory`, the pooled allocator for frames and
//! their backing buffers.

use crate::errors::{no_memory_error, Error, Result};
use crate::frame::Frame;
use crate::pool::{BufferPool, RawBuffer};
use crate::sample::Sample;

/// `FrameFactory` allocates frames and scratch buffers from a pre-sized pool.
///
/// The factory is cheaply cloneable; clones share the same pool. Allocation never
/// blocks: when the pool is exhausted, allocation fails with [`Error::NoMemory`].
/// Audio threads must size the pool at open time and never allocate outside of it.
#[derive(Clone)]
pub struct FrameFactory {
    pool: BufferPool,
}

impl FrameFactory {
    /// Create a factory whose buffers hold `buffer_size` bytes each, with at most
    /// `max_buffers` buffers live at a time.
    pub fn new(buffer_size: usize, max_buffers: usize) -> Self {
        assert!(buffer_size > 0);

        let samples = (buffer_size + std::mem::size_of::<Sample>() - 1)
            / std::mem::size_of::<Sample>();

        FrameFactory { pool: BufferPool::new(samples, max_buffers) }
    }

    /// Get the maximum size of a frame payload in bytes.
    pub fn byte_buffer_size(&self) -> usize {
        self.pool.buffer_samples() * std::mem::size_of::<Sample>()
    }

    /// Get the maximum size of a raw scratch buffer in samples.
    pub fn raw_buffer_size(&self) -> usize {
        self.pool.buffer_samples()
    }

    /// Allocate a raw scratch buffer spanning the full pool buffer size.
    pub fn new_raw_buffer(&self) -> Result<RawBuffer> {
        match self.pool.acquire() {
            Some(buf) => Ok(RawBuffer::new(buf)),
            None => no_memory_error(),
        }
    }

    /// Allocate a frame without a buffer. The caller is responsible for attaching one,
    /// usually via [`FrameFactory::reallocate_frame`].
    pub fn allocate_frame_no_buffer(&self) -> Frame {
        Frame::default()
    }

    /// Allocate a frame with an attached buffer, sized to a payload of `n_bytes` bytes.
    pub fn allocate_frame(&self, n_bytes: usize) -> Result<Frame> {
        let mut frame = Frame::default();
        self.reallocate_frame(&mut frame, n_bytes)?;

        Ok(frame)
    }

    /// Clear the frame's state and ensure it has a buffer able to hold `n_bytes` bytes.
    ///
    /// A pre-attached buffer is kept if it is large enough, even if it came from another
    /// pool. After the call the frame's payload length is `n_bytes`.
    pub fn reallocate_frame(&self, frame: &mut Frame, n_bytes: usize) -> Result<()> {
        if frame.byte_capacity() < n_bytes {
            if n_bytes > self.byte_buffer_size() {
                return Err(Error::NoMemory);
            }

            // Drop any undersized buffer back to its pool and attach a fresh one.
            let _ = frame.take_buffer();

            match self.pool.acquire() {
                Some(buf) => frame.attach_buffer(buf),
                None => return Err(Error::NoMemory),
            }
        }

        frame.clear();
        frame.set_num_bytes(n_bytes);

        Ok(())
    }
}
