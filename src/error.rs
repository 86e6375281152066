// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

/// Structural invariant violation found by [`KeyMap::check_invariants`].
///
/// These never arise from well-formed use of the map; any of them indicates
/// a bug in the trie operations themselves.
///
/// [`KeyMap::check_invariants`]: crate::KeyMap::check_invariants
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// An empty node stored as the child of another node. Empties must
    /// float to the root through the smart constructors.
    #[error("empty child at depth {depth}")]
    EmptyChild { depth: usize },

    /// A node's bitmap population does not match its child array length.
    #[error("bitmap population {bits} does not match child count {children} at depth {depth}")]
    BitmapMismatch {
        bits: u32,
        children: usize,
        depth: usize,
    },

    /// A node variant holds a child count outside its allowed range.
    #[error("node variant with {children} children at depth {depth} is not minimal")]
    WrongArity { children: usize, depth: usize },

    /// A single-slot node holds a leaf; such chains must collapse to the
    /// leaf itself.
    #[error("single-slot node holds a leaf at depth {depth}")]
    LeafUnderOne { depth: usize },

    /// A node sits deeper than any 44-segment path can reach.
    #[error("node nested beyond the maximum path depth {max}")]
    TooDeep { max: usize },
}
