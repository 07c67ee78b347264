// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `pool` module implements the fixed-size buffer pool backing frames and scratch
//! buffers.
//!
//! Buffers are backed by `f32` storage so that both byte views and raw sample views are
//! correctly aligned. Acquisition never blocks: a buffer is popped from the free list, or
//! freshly allocated while the pool is below its limit, otherwise acquisition fails.
//! Dropping a buffer returns it to the free list.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

pub(crate) struct PoolShared {
    free: Mutex<Vec<Box<[f32]>>>,
    live: Mutex<usize>,
    buffer_samples: usize,
    max_buffers: usize,
}

/// A shareable pool of fixed-size sample buffers.
#[derive(Clone)]
pub(crate) struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool of up to `max_buffers` buffers of `buffer_samples` samples each.
    pub(crate) fn new(buffer_samples: usize, max_buffers: usize) -> Self {
        assert!(buffer_samples > 0);
        assert!(max_buffers > 0);

        BufferPool {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(max_buffers)),
                live: Mutex::new(0),
                buffer_samples,
                max_buffers,
            }),
        }
    }

    /// Get the size of each buffer in samples.
    pub(crate) fn buffer_samples(&self) -> usize {
        self.shared.buffer_samples
    }

    /// Acquire a buffer, or `None` if the pool is exhausted.
    pub(crate) fn acquire(&self) -> Option<PooledBuffer> {
        let mem = {
            let mut free = self.shared.free.lock();

            if let Some(mem) = free.pop() {
                Some(mem)
            }
            else {
                let mut live = self.shared.live.lock();

                if *live < self.shared.max_buffers {
                    *live += 1;
                    Some(vec![0.0; self.shared.buffer_samples].into_boxed_slice())
                }
                else {
                    None
                }
            }
        };

        mem.map(|mem| PooledBuffer { mem: Some(mem), shared: Arc::clone(&self.shared) })
    }
}

/// A fixed-size sample buffer owned by a pool. Returns to the pool on drop.
pub struct PooledBuffer {
    mem: Option<Box<[f32]>>,
    shared: Arc<PoolShared>,
}

impl PooledBuffer {
    /// Get the capacity in samples.
    pub fn sample_capacity(&self) -> usize {
        self.shared.buffer_samples
    }

    /// Get the capacity in bytes.
    pub fn byte_capacity(&self) -> usize {
        self.sample_capacity() * std::mem::size_of::<f32>()
    }

    /// View the whole buffer as samples.
    pub fn as_samples(&self) -> &[f32] {
        self.mem.as_ref().unwrap()
    }

    /// View the whole buffer as mutable samples.
    pub fn as_samples_mut(&mut self) -> &mut [f32] {
        self.mem.as_mut().unwrap()
    }

    /// View the whole buffer as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_samples())
    }

    /// View the whole buffer as mutable bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.mem.as_mut().unwrap())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(mem) = self.mem.take() {
            self.shared.free.lock().push(mem);
        }
    }
}

/// A pooled buffer of raw samples with an adjustable length, used as pipeline scratch
/// space (mix buffers, resampler windows).
pub struct RawBuffer {
    buf: PooledBuffer,
    len: usize,
}

impl RawBuffer {
    pub(crate) fn new(buf: PooledBuffer) -> Self {
        let len = buf.sample_capacity();
        RawBuffer { buf, len }
    }

    /// Get the capacity in samples.
    pub fn capacity(&self) -> usize {
        self.buf.sample_capacity()
    }

    /// Shrink or grow the visible length, up to the capacity.
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity());

        self.len = len;
    }
}

impl Deref for RawBuffer {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buf.as_samples()[..self.len]
    }
}

impl DerefMut for RawBuffer {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buf.as_samples_mut()[..self.len]
    }
}
