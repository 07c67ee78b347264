// Runnel
// Copyright (c) 2026 The Runnel Project Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `channels` module defines channel positions, layouts, and channel sets.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// A bitmask of audio channels.
    ///
    /// In the surround layout, each bit names a speaker position. The first positions
    /// follow the `WAVEFORMATEXTENSIBLE` channel mask ordering. In the multitrack layout,
    /// bit N simply names track N.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct ChannelMask: u64 {
        /// Front-left (left) channel.
        const FRONT_LEFT   = 1 << 0;
        /// Front-right (right) channel.
        const FRONT_RIGHT  = 1 << 1;
        /// Front-center (center) or the Mono channel.
        const FRONT_CENTER = 1 << 2;
        /// Low-frequency effects (LFE) channel.
        const LFE          = 1 << 3;
        /// Rear-left channel.
        const REAR_LEFT    = 1 << 4;
        /// Rear-right channel.
        const REAR_RIGHT   = 1 << 5;
        /// Side-left channel.
        const SIDE_LEFT    = 1 << 6;
        /// Side-right channel.
        const SIDE_RIGHT   = 1 << 7;
    }
}

impl ChannelMask {
    /// Mask for a mono stream.
    pub const MONO: ChannelMask = ChannelMask::FRONT_CENTER;

    /// Mask for a stereo stream.
    pub const STEREO: ChannelMask =
        ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT);

    /// Mask with the first `n` multitrack channels set.
    pub fn multitrack(n: u32) -> ChannelMask {
        assert!(n <= 64, "multitrack mask supports up to 64 tracks");

        if n == 64 {
            ChannelMask::from_bits_retain(u64::MAX)
        }
        else {
            ChannelMask::from_bits_retain((1u64 << n) - 1)
        }
    }

    /// Get the number of channels in the mask.
    pub fn count(&self) -> usize {
        self.bits().count_ones() as usize
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.bits())
    }
}

/// `ChannelLayout` describes how channel mask bits are interpreted.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChannelLayout {
    /// Channels are assigned to speaker positions.
    #[default]
    Surround,
    /// Channels are unrelated tracks with no spatial meaning.
    Multitrack,
}

/// `ChannelOrder` describes the in-memory ordering of interleaved channels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChannelOrder {
    /// Channels ordered by SMPTE standard (the `WAVEFORMATEXTENSIBLE` ordering).
    #[default]
    Smpte,
    /// Channels ordered as in ALSA.
    Alsa,
}

/// A `ChannelSet` fully describes the channels of a stream: the layout, the in-memory
/// order, and the mask of active channels.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelSet {
    layout: ChannelLayout,
    order: ChannelOrder,
    mask: ChannelMask,
}

impl ChannelSet {
    /// Create a channel set.
    pub fn new(layout: ChannelLayout, order: ChannelOrder, mask: ChannelMask) -> Self {
        ChannelSet { layout, order, mask }
    }

    /// Create a SMPTE-ordered surround set from a mask.
    pub fn surround(mask: ChannelMask) -> Self {
        ChannelSet::new(ChannelLayout::Surround, ChannelOrder::Smpte, mask)
    }

    /// Create a mono surround set.
    pub fn mono() -> Self {
        ChannelSet::surround(ChannelMask::MONO)
    }

    /// Create a stereo surround set.
    pub fn stereo() -> Self {
        ChannelSet::surround(ChannelMask::STEREO)
    }

    /// Get the layout.
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Get the channel order.
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Get the channel mask.
    pub fn mask(&self) -> ChannelMask {
        self.mask
    }

    /// Get the number of active channels.
    pub fn num_channels(&self) -> usize {
        self.mask.count()
    }

    /// Check if no channels are active.
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self.layout {
            ChannelLayout::Surround => "surround",
            ChannelLayout::Multitrack => "multitrack",
        };

        write!(f, "{}:{}", layout, self.mask)
    }
}
