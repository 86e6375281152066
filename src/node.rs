// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Trie node representation and the single-key algorithms.
//!
//! A map is a tagged node; the variant encodes the population of the node's
//! 64 child slots, so dispatch on shape is O(1) and the per-node memory is
//! proportional to the populated slots only. Children are `Arc`-shared:
//! every operation builds a new spine and leaves all untouched sub-tries
//! physically shared with the input.
//!
//! Two invariants tie the variants together. The bitmap population always
//! equals the child array length, and no node other than the root is ever
//! `Empty`. Both are enforced by funnelling all node construction through
//! [`Node::build`] and [`Node::drop_empty`].

use std::sync::Arc;

use crate::array;
use crate::bits::{index_from_segment, sparse_index, test_bit, FULL_MASK};
use crate::error::InvariantError;
use crate::key::{Key, MAX_DEPTH};

pub(crate) type Child<V> = Arc<Node<V>>;

/// One trie node. `Two`, `Sparse` and `Full` keep their children ordered by
/// segment value, which is key order; `One` stores its single segment
/// inline and needs no bitmap word.
#[derive(Debug)]
pub(crate) enum Node<V> {
    Empty,
    Leaf(Key, V),
    One(u8, Child<V>),
    Two(u64, Box<[Child<V>]>),
    Sparse(u64, Box<[Child<V>]>),
    Full(Box<[Child<V>]>),
}

pub(crate) fn empty<V>() -> Child<V> {
    Arc::new(Node::Empty)
}

pub(crate) fn leaf<V>(key: Key, value: V) -> Child<V> {
    Arc::new(Node::Leaf(key, value))
}

impl<V> Node<V> {
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(..))
    }

    /// Uniform `(bitmap, children)` view of an interior node; `None` for
    /// `Empty` and `Leaf`. Most multi-node algorithms dispatch through this
    /// instead of matching all four interior variants.
    #[inline]
    pub(crate) fn parts(&self) -> Option<(u64, &[Child<V>])> {
        match self {
            Node::Empty | Node::Leaf(..) => None,
            Node::One(seg, child) => Some((1u64 << *seg, std::slice::from_ref(child))),
            Node::Two(bitmap, children) | Node::Sparse(bitmap, children) => {
                Some((*bitmap, children))
            }
            Node::Full(children) => Some((FULL_MASK, children)),
        }
    }

    /// Smart constructor: the minimal variant for `(bitmap, children)`.
    ///
    /// A single leaf child collapses to the leaf itself, so chains of
    /// single-slot nodes above a lone entry never survive construction.
    /// The caller must pass a bitmap whose population matches the array.
    pub(crate) fn build(bitmap: u64, children: Box<[Child<V>]>) -> Child<V> {
        assert_eq!(
            bitmap.count_ones() as usize,
            children.len(),
            "build_node: bitmap population {} does not match child count {}",
            bitmap.count_ones(),
            children.len()
        );
        match children.len() {
            0 => empty(),
            1 => {
                let child = children.into_vec().pop().expect("length checked above");
                if child.is_leaf() {
                    child
                } else {
                    Arc::new(Node::One(bitmap.trailing_zeros() as u8, child))
                }
            }
            2 => Arc::new(Node::Two(bitmap, children)),
            _ if bitmap == FULL_MASK => Arc::new(Node::Full(children)),
            _ => Arc::new(Node::Sparse(bitmap, children)),
        }
    }

    /// Delete-side smart constructor: drops `Empty` children, clearing the
    /// matching bitmap bits, before selecting the variant. Operations that
    /// can produce empty subtrees (delete, intersection, split) go through
    /// here so that empties float to the root.
    pub(crate) fn drop_empty(bitmap: u64, children: Box<[Child<V>]>) -> Child<V> {
        if children.iter().all(|child| !child.is_empty()) {
            return Self::build(bitmap, children);
        }
        let mut kept_bitmap = bitmap;
        let mut kept = Vec::with_capacity(children.len());
        let mut bits = bitmap;
        for child in children.into_vec() {
            let bit = bits & bits.wrapping_neg();
            bits ^= bit;
            if child.is_empty() {
                kept_bitmap &= !bit;
            } else {
                kept.push(child);
            }
        }
        Self::build(kept_bitmap, kept.into_boxed_slice())
    }

    pub(crate) fn get(&self, depth: usize, key: &Key) -> Option<&V> {
        match self {
            Node::Empty => None,
            Node::Leaf(stored, value) => {
                if stored == key {
                    Some(value)
                } else {
                    None
                }
            }
            Node::One(seg, child) => {
                if depth < MAX_DEPTH && key.segment(depth) == *seg {
                    child.get(depth + 1, key)
                } else {
                    None
                }
            }
            Node::Two(bitmap, children) | Node::Sparse(bitmap, children) => {
                if depth >= MAX_DEPTH {
                    return None;
                }
                let seg = key.segment(depth);
                if !test_bit(*bitmap, seg) {
                    return None;
                }
                children[index_from_segment(*bitmap, seg)].get(depth + 1, key)
            }
            Node::Full(children) => {
                if depth >= MAX_DEPTH {
                    return None;
                }
                children[key.segment(depth) as usize].get(depth + 1, key)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Node::Empty => 0,
            Node::Leaf(..) => 1,
            Node::One(_, child) => child.len(),
            Node::Two(_, children) | Node::Sparse(_, children) => {
                children.iter().map(|child| child.len()).sum()
            }
            Node::Full(children) => children.iter().map(|child| child.len()).sum(),
        }
    }

    /// Entry with the smallest key: the leftmost leaf.
    pub(crate) fn min_entry(&self) -> Option<(&Key, &V)> {
        match self {
            Node::Empty => None,
            Node::Leaf(key, value) => Some((key, value)),
            Node::One(_, child) => child.min_entry(),
            Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => {
                children.first()?.min_entry()
            }
        }
    }

    /// Entry with the largest key: the rightmost leaf.
    pub(crate) fn max_entry(&self) -> Option<(&Key, &V)> {
        match self {
            Node::Empty => None,
            Node::Leaf(key, value) => Some((key, value)),
            Node::One(_, child) => child.max_entry(),
            Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => {
                children.last()?.max_entry()
            }
        }
    }

    pub(crate) fn fold_asc<A, F>(&self, seed: A, f: &mut F) -> A
    where
        F: FnMut(A, &Key, &V) -> A,
    {
        match self {
            Node::Empty => seed,
            Node::Leaf(key, value) => f(seed, key, value),
            Node::One(_, child) => child.fold_asc(seed, f),
            Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => children
                .iter()
                .fold(seed, |acc, child| child.fold_asc(acc, &mut *f)),
        }
    }

    pub(crate) fn fold_desc<A, F>(&self, seed: A, f: &mut F) -> A
    where
        F: FnMut(A, &Key, &V) -> A,
    {
        match self {
            Node::Empty => seed,
            Node::Leaf(key, value) => f(seed, key, value),
            Node::One(_, child) => child.fold_desc(seed, f),
            Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => children
                .iter()
                .rev()
                .fold(seed, |acc, child| child.fold_desc(acc, &mut *f)),
        }
    }

    pub(crate) fn for_each<F>(&self, f: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(&Key, &V) -> anyhow::Result<()>,
    {
        match self {
            Node::Empty => Ok(()),
            Node::Leaf(key, value) => f(key, value),
            Node::One(_, child) => child.for_each(f),
            Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => {
                for child in children.iter() {
                    child.for_each(&mut *f)?;
                }
                Ok(())
            }
        }
    }

    /// Rebuild the trie with every value mapped; the shape is preserved.
    pub(crate) fn map_with_key<W, F>(&self, f: &mut F) -> Child<W>
    where
        F: FnMut(&Key, &V) -> W,
    {
        Arc::new(match self {
            Node::Empty => Node::Empty,
            Node::Leaf(key, value) => Node::Leaf(*key, f(key, value)),
            Node::One(seg, child) => Node::One(*seg, child.map_with_key(f)),
            Node::Two(bitmap, children) => Node::Two(*bitmap, map_children(children, f)),
            Node::Sparse(bitmap, children) => Node::Sparse(*bitmap, map_children(children, f)),
            Node::Full(children) => Node::Full(map_children(children, f)),
        })
    }

    /// Fallible, shape-preserving traversal; the first error aborts.
    pub(crate) fn try_map_with_key<W, E, F>(&self, f: &mut F) -> Result<Child<W>, E>
    where
        F: FnMut(&Key, &V) -> Result<W, E>,
    {
        Ok(Arc::new(match self {
            Node::Empty => Node::Empty,
            Node::Leaf(key, value) => Node::Leaf(*key, f(key, value)?),
            Node::One(seg, child) => Node::One(*seg, child.try_map_with_key(f)?),
            Node::Two(bitmap, children) => Node::Two(*bitmap, try_map_children(children, f)?),
            Node::Sparse(bitmap, children) => Node::Sparse(*bitmap, try_map_children(children, f)?),
            Node::Full(children) => Node::Full(try_map_children(children, f)?),
        }))
    }

    /// Walk the whole trie checking the structural invariants.
    pub(crate) fn check(&self, depth: usize) -> Result<(), InvariantError> {
        match self {
            Node::Empty | Node::Leaf(..) => Ok(()),
            _ if depth >= MAX_DEPTH => Err(InvariantError::TooDeep { max: MAX_DEPTH }),
            Node::One(_, child) => {
                if child.is_empty() {
                    return Err(InvariantError::EmptyChild { depth });
                }
                if child.is_leaf() {
                    return Err(InvariantError::LeafUnderOne { depth });
                }
                child.check(depth + 1)
            }
            Node::Two(bitmap, children) => check_children(*bitmap, children, 2, 2, depth),
            Node::Sparse(bitmap, children) => check_children(*bitmap, children, 3, 63, depth),
            Node::Full(children) => check_children(FULL_MASK, children, 64, 64, depth),
        }
    }

    /// Count interior nodes by populated-child count into `hist`.
    pub(crate) fn histogram(&self, hist: &mut [usize; 65]) {
        if let Some((_, children)) = self.parts() {
            hist[children.len()] += 1;
            for child in children {
                child.histogram(hist);
            }
        }
    }
}

fn map_children<V, W, F>(children: &[Child<V>], f: &mut F) -> Box<[Child<W>]>
where
    F: FnMut(&Key, &V) -> W,
{
    children
        .iter()
        .map(|child| child.map_with_key(&mut *f))
        .collect()
}

fn try_map_children<V, W, E, F>(children: &[Child<V>], f: &mut F) -> Result<Box<[Child<W>]>, E>
where
    F: FnMut(&Key, &V) -> Result<W, E>,
{
    children
        .iter()
        .map(|child| child.try_map_with_key(&mut *f))
        .collect()
}

fn check_children<V>(
    bitmap: u64,
    children: &[Child<V>],
    min: usize,
    max: usize,
    depth: usize,
) -> Result<(), InvariantError> {
    if children.len() < min || children.len() > max {
        return Err(InvariantError::WrongArity {
            children: children.len(),
            depth,
        });
    }
    if bitmap.count_ones() as usize != children.len() {
        return Err(InvariantError::BitmapMismatch {
            bits: bitmap.count_ones(),
            children: children.len(),
            depth,
        });
    }
    for child in children {
        if child.is_empty() {
            return Err(InvariantError::EmptyChild { depth });
        }
        child.check(depth + 1)?;
    }
    Ok(())
}

/// Insert `key` into the trie below `node`, starting at `depth`.
///
/// On a key hit, `combine` decides the stored value: `Some(v)` replaces it,
/// `None` keeps the existing entry. Whenever a recursive step reports no
/// change (pointer-equal child), the original node is returned unchanged so
/// that no-op updates share the whole spine with the input.
pub(crate) fn insert_node<V, F>(
    node: &Child<V>,
    depth: usize,
    key: Key,
    value: V,
    combine: &mut F,
) -> Child<V>
where
    F: FnMut(&Key, V, &V) -> Option<V>,
{
    match &**node {
        Node::Empty => leaf(key, value),
        Node::Leaf(stored, old) => {
            if *stored == key {
                match combine(&key, value, old) {
                    Some(updated) => leaf(key, updated),
                    None => node.clone(),
                }
            } else {
                join_leaves(depth, leaf(key, value), key, node.clone(), *stored)
            }
        }
        Node::One(seg, child) => {
            let s = key.segment(depth);
            if s == *seg {
                let updated = insert_node(child, depth + 1, key, value, combine);
                if Arc::ptr_eq(&updated, child) {
                    node.clone()
                } else {
                    Arc::new(Node::One(*seg, updated))
                }
            } else {
                // Divergence at this level: the single slot becomes two.
                let new_leaf = leaf(key, value);
                let bitmap = (1u64 << s) | (1u64 << *seg);
                let children: Box<[Child<V>]> = if s < *seg {
                    Box::new([new_leaf, child.clone()])
                } else {
                    Box::new([child.clone(), new_leaf])
                };
                Arc::new(Node::Two(bitmap, children))
            }
        }
        Node::Two(bitmap, children) | Node::Sparse(bitmap, children) => {
            let seg = key.segment(depth);
            let mask = 1u64 << seg;
            let slot = sparse_index(*bitmap, mask);
            if *bitmap & mask != 0 {
                let updated = insert_node(&children[slot], depth + 1, key, value, combine);
                if Arc::ptr_eq(&updated, &children[slot]) {
                    node.clone()
                } else {
                    Node::build(*bitmap, array::update_at(children, slot, updated))
                }
            } else {
                Node::build(
                    *bitmap | mask,
                    array::insert_at(children, slot, leaf(key, value)),
                )
            }
        }
        Node::Full(children) => {
            let slot = key.segment(depth) as usize;
            let updated = insert_node(&children[slot], depth + 1, key, value, combine);
            if Arc::ptr_eq(&updated, &children[slot]) {
                node.clone()
            } else {
                Node::build(FULL_MASK, array::update_at(children, slot, updated))
            }
        }
    }
}

/// Connect two leaves with distinct keys that collided down to `depth`: a
/// chain of single-slot nodes over their common segment prefix, ending in a
/// two-slot node holding both leaves in segment order.
fn join_leaves<V>(
    depth: usize,
    new_leaf: Child<V>,
    new_key: Key,
    old_leaf: Child<V>,
    old_key: Key,
) -> Child<V> {
    let mut diverge = depth;
    while diverge < MAX_DEPTH && new_key.segment(diverge) == old_key.segment(diverge) {
        diverge += 1;
    }
    if diverge == MAX_DEPTH {
        // Paths are bijective with keys, so two distinct keys cannot agree
        // on all 44 segments.
        panic!(
            "insert: distinct keys {:?} and {:?} produced identical paths",
            new_key, old_key
        );
    }
    let (new_seg, old_seg) = (new_key.segment(diverge), old_key.segment(diverge));
    let bitmap = (1u64 << new_seg) | (1u64 << old_seg);
    let children: Box<[Child<V>]> = if new_seg < old_seg {
        Box::new([new_leaf, old_leaf])
    } else {
        Box::new([old_leaf, new_leaf])
    };
    let mut acc: Child<V> = Arc::new(Node::Two(bitmap, children));
    for d in (depth..diverge).rev() {
        acc = Arc::new(Node::One(new_key.segment(d), acc));
    }
    acc
}

/// Remove `key` from the trie below `node`. Returns `None` when the key is
/// absent, so every caller on the path can hand back its original node and
/// keep the input fully shared. Empties produced at the bottom float up
/// through the smart constructors.
pub(crate) fn remove_node<V>(node: &Child<V>, depth: usize, key: &Key) -> Option<Child<V>> {
    match &**node {
        Node::Empty => None,
        Node::Leaf(stored, _) => {
            if stored == key {
                Some(empty())
            } else {
                None
            }
        }
        Node::One(seg, child) => {
            if depth >= MAX_DEPTH || key.segment(depth) != *seg {
                return None;
            }
            let updated = remove_node(child, depth + 1, key)?;
            Some(Node::drop_empty(1u64 << *seg, Box::new([updated])))
        }
        Node::Two(bitmap, children) | Node::Sparse(bitmap, children) => {
            if depth >= MAX_DEPTH {
                return None;
            }
            let seg = key.segment(depth);
            let mask = 1u64 << seg;
            if *bitmap & mask == 0 {
                return None;
            }
            let slot = sparse_index(*bitmap, mask);
            let updated = remove_node(&children[slot], depth + 1, key)?;
            Some(if updated.is_empty() {
                Node::build(*bitmap & !mask, array::remove_at(children, slot))
            } else {
                Node::build(*bitmap, array::update_at(children, slot, updated))
            })
        }
        Node::Full(children) => {
            if depth >= MAX_DEPTH {
                return None;
            }
            let seg = key.segment(depth);
            let slot = seg as usize;
            let updated = remove_node(&children[slot], depth + 1, key)?;
            Some(if updated.is_empty() {
                Node::build(FULL_MASK & !(1u64 << seg), array::remove_at(children, slot))
            } else {
                Node::build(FULL_MASK, array::update_at(children, slot, updated))
            })
        }
    }
}

/// Smallest entry together with the rest of the map, re-normalized.
pub(crate) fn min_view_node<V: Clone>(node: &Child<V>) -> Option<((Key, V), Child<V>)> {
    match &**node {
        Node::Empty => None,
        Node::Leaf(key, value) => Some(((*key, value.clone()), empty())),
        Node::One(seg, child) => {
            let (entry, rest) = min_view_node(child)?;
            Some((entry, Node::drop_empty(1u64 << *seg, Box::new([rest]))))
        }
        _ => {
            let (bitmap, children) = node.parts().expect("interior node");
            let (entry, rest) = min_view_node(&children[0])?;
            let lowest = bitmap & bitmap.wrapping_neg();
            Some((
                entry,
                if rest.is_empty() {
                    Node::build(bitmap & !lowest, array::remove_at(children, 0))
                } else {
                    Node::build(bitmap, array::update_at(children, 0, rest))
                },
            ))
        }
    }
}

/// Largest entry together with the rest of the map, re-normalized.
pub(crate) fn max_view_node<V: Clone>(node: &Child<V>) -> Option<((Key, V), Child<V>)> {
    match &**node {
        Node::Empty => None,
        Node::Leaf(key, value) => Some(((*key, value.clone()), empty())),
        Node::One(seg, child) => {
            let (entry, rest) = max_view_node(child)?;
            Some((entry, Node::drop_empty(1u64 << *seg, Box::new([rest]))))
        }
        _ => {
            let (bitmap, children) = node.parts().expect("interior node");
            let last = children.len() - 1;
            let (entry, rest) = max_view_node(&children[last])?;
            let highest = 1u64 << (63 - bitmap.leading_zeros());
            Some((
                entry,
                if rest.is_empty() {
                    Node::build(bitmap & !highest, array::remove_at(children, last))
                } else {
                    Node::build(bitmap, array::update_at(children, last, rest))
                },
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u64) -> (u64, Vec<Child<u64>>) {
        let mut bitmap = 0u64;
        let mut children = Vec::new();
        for seg in 0..n {
            bitmap |= 1 << seg;
            children.push(leaf(Key::from(seg), seg));
        }
        (bitmap, children)
    }

    #[test]
    fn build_selects_minimal_variant() {
        let (_, children) = leaves(64);

        let node = Node::<u64>::build(0, Box::new([]));
        assert!(node.is_empty());

        let node = Node::build(0b11, children[..2].to_vec().into_boxed_slice());
        assert!(matches!(&*node, Node::Two(0b11, _)));

        let node = Node::build(0b111, children[..3].to_vec().into_boxed_slice());
        assert!(matches!(&*node, Node::Sparse(0b111, kids) if kids.len() == 3));

        let node = Node::build(FULL_MASK, children.clone().into_boxed_slice());
        assert!(matches!(&*node, Node::Full(kids) if kids.len() == 64));
    }

    #[test]
    fn build_collapses_single_leaf() {
        let single = leaf(Key::from(7u64), 7u64);
        let built = Node::build(1 << 5, Box::new([single.clone()]));
        assert!(Arc::ptr_eq(&built, &single));
    }

    #[test]
    fn build_wraps_single_interior() {
        let (bitmap, children) = leaves(2);
        let two = Node::build(bitmap, children.into_boxed_slice());
        let built = Node::build(1 << 9, Box::new([two]));
        assert!(matches!(&*built, Node::One(9, _)));
    }

    #[test]
    #[should_panic(expected = "build_node: bitmap population 1 does not match child count 2")]
    fn build_rejects_bitmap_mismatch() {
        let (_, children) = leaves(2);
        Node::build(0b1, children.into_boxed_slice());
    }

    #[test]
    fn drop_empty_filters_and_degrades() {
        let survivor = leaf(Key::from(3u64), 3u64);
        let dropped = Node::drop_empty(0b101, Box::new([empty(), survivor.clone()]));
        assert!(Arc::ptr_eq(&dropped, &survivor));

        let dropped = Node::<u64>::drop_empty(0b11, Box::new([empty(), empty()]));
        assert!(dropped.is_empty());
    }
}
