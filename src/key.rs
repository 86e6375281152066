// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bits consumed from the key per trie level.
pub(crate) const SEGMENT_BITS: usize = 6;

/// Segments carved out of a single 64-bit lane. `11 * 6 = 66 > 64`, so the
/// first segment of each lane is padded with two zero bits at the top.
pub(crate) const SEGMENTS_PER_LANE: usize = 11;

/// Total path length of a key: four lanes of eleven segments each.
pub(crate) const MAX_DEPTH: usize = 4 * SEGMENTS_PER_LANE;

const SEGMENT_MASK: u64 = (1 << SEGMENT_BITS) - 1;

/// A fixed-width 256-bit key, stored as four 64-bit lanes with lane 0 most
/// significant. Keys order lexicographically across the lane sequence, which
/// coincides with the numeric order of the 256-bit value.
///
/// The trie indexes keys by their raw bits: the key is split into 44
/// six-bit segments, most significant first, and one segment is consumed
/// per level of descent. Because the segment order follows the bit order,
/// in-trie order and key order agree, which is what makes the ordered
/// operations (min/max, split, leapfrog) possible.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Key([u64; 4]);

impl Key {
    /// The smallest possible key (all zero bits).
    pub const MIN: Key = Key([0; 4]);

    /// The largest possible key (all one bits).
    pub const MAX: Key = Key([u64::MAX; 4]);

    pub const fn new(lanes: [u64; 4]) -> Self {
        Key(lanes)
    }

    pub const fn lanes(&self) -> [u64; 4] {
        self.0
    }

    /// Interpret 32 bytes as a big-endian 256-bit key.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut lanes = [0u64; 4];
        for (lane, chunk) in lanes.iter_mut().zip(bytes.chunks_exact(8)) {
            *lane = u64::from_be_bytes(chunk.try_into().expect("chunks of 8 bytes"));
        }
        Key(lanes)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, lane) in bytes.chunks_exact_mut(8).zip(self.0) {
            chunk.copy_from_slice(&lane.to_be_bytes());
        }
        bytes
    }

    /// The 6-bit path segment consumed at `depth`.
    ///
    /// Segments are emitted from the 6 highest bits of a lane to the 6
    /// lowest; the two excess bits of each lane are absorbed as zero padding
    /// at the top of its first segment. Every operation on the trie derives
    /// segments through this function, so the mapping is the same for
    /// insert, lookup and delete by construction.
    #[inline]
    pub(crate) fn segment(&self, depth: usize) -> u8 {
        debug_assert!(depth < MAX_DEPTH);
        let lane = self.0[depth / SEGMENTS_PER_LANE];
        let slot = depth % SEGMENTS_PER_LANE;
        ((lane >> (60 - SEGMENT_BITS * slot)) & SEGMENT_MASK) as u8
    }
}

impl From<u64> for Key {
    /// Places the value in the least significant lane.
    fn from(value: u64) -> Self {
        Key([0, 0, 0, value])
    }
}

impl From<u128> for Key {
    /// Places the value in the two least significant lanes.
    fn from(value: u128) -> Self {
        Key([0, 0, (value >> 64) as u64, value as u64])
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Key({:016x}.{:016x}.{:016x}.{:016x})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}
