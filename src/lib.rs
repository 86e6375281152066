// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Compact persistent ordered map keyed by fixed 256-bit keys.
//!
//! The map is a bitmap-indexed trie over the raw bits of the key rather
//! than a hash of it, so the trie's radix order coincides with key order
//! and the structure doubles as an ordered map: min/max, three-way range
//! splits, ordered folds and a leapfrog intersection all run directly on
//! the trie.
//!
//! Interior nodes store only their populated child slots, indexed through a
//! 64-bit bitmap, in one of five shapes chosen by population (a single
//! slot, two slots, a sparse array, or all 64). Updates are persistent:
//! every operation returns a new map sharing all untouched sub-tries with
//! its input, which makes versions cheap to keep and safe to read from
//! many threads at once.
//!
//! ```
//! use keytrie::{Key, KeyMap};
//!
//! let map: KeyMap<u64> = (0..100u64).map(|i| (Key::from(i), i)).collect();
//! let (low, at, high) = map.split_lookup(&Key::from(50u64));
//!
//! assert_eq!(low.len(), 50);
//! assert_eq!(at, Some(50));
//! assert_eq!(high.len(), 49);
//! assert_eq!(map.len(), 100); // the input version is untouched
//! ```

mod array;
mod bits;
mod error;
mod iter;
mod key;
mod keymap;
mod merge;
mod node;
mod split;

pub use self::error::InvariantError;
pub use self::iter::Iter;
pub use self::key::Key;
pub use self::keymap::KeyMap;
