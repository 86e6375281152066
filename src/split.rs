// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Ordered range operations: three-way split, least upper bound, and the
//! leapfrog intersection built on top of them.
//!
//! These work because segment order within a node is key order: cutting a
//! node's bitmap around the key's segment cleanly partitions its children
//! into a strictly-smaller and a strictly-greater side.

use std::cmp::Ordering;

use crate::array;
use crate::bits::{sparse_index, split_bitmap};
use crate::key::Key;
use crate::node::{empty, insert_node, min_view_node, Child, Node};

/// Split the trie below `node` into entries with keys below `key`, the
/// value at `key` if present, and entries with keys above it.
///
/// At each level the node's bitmap is cut around the key's segment; the
/// recursion result for the boundary child is spliced back into the two
/// sides as the stack unwinds, re-normalizing through the delete-variant
/// constructor because either side of the boundary can come back empty.
pub(crate) fn split_node<V: Clone>(
    node: &Child<V>,
    depth: usize,
    key: &Key,
) -> (Child<V>, Option<V>, Child<V>) {
    match &**node {
        Node::Empty => (empty(), None, empty()),
        Node::Leaf(stored, value) => match stored.cmp(key) {
            Ordering::Less => (node.clone(), None, empty()),
            Ordering::Equal => (empty(), Some(value.clone()), empty()),
            Ordering::Greater => (empty(), None, node.clone()),
        },
        _ => {
            let (bitmap, children) = node.parts().expect("interior node");
            let seg = key.segment(depth);
            let (low_bitmap, present, high_bitmap) = split_bitmap(bitmap, seg);
            let cut = sparse_index(bitmap, 1u64 << seg);
            if present {
                let (less, found, greater) = split_node(&children[cut], depth + 1, key);
                let bit = 1u64 << seg;
                (
                    Node::drop_empty(low_bitmap | bit, array::low_slice(cut, children, less)),
                    found,
                    Node::drop_empty(high_bitmap | bit, array::high_slice(cut, children, greater)),
                )
            } else {
                (
                    Node::build(low_bitmap, array::slice(children, 0..cut)),
                    None,
                    Node::build(high_bitmap, array::slice(children, cut..children.len())),
                )
            }
        }
    }
}

/// Least upper bound: the smallest entry with key `>= key`, together with
/// the map of everything strictly greater than it.
pub(crate) fn lub_node<V: Clone>(node: &Child<V>, key: &Key) -> Option<((Key, V), Child<V>)> {
    let (_, found, greater) = split_node(node, 0, key);
    match found {
        Some(value) => Some(((*key, value), greater)),
        None => min_view_node(&greater),
    }
}

/// `max(min_key(x), min_key(y))`, or `None` when either map is empty.
/// No key below the result can be common to both maps.
pub(crate) fn max_min<V, U>(x: &Child<V>, y: &Child<U>) -> Option<Key> {
    let (x_min, _) = x.min_entry()?;
    let (y_min, _) = y.min_entry()?;
    Some(*x_min.max(y_min))
}

/// Accumulate the intersection of `x` and `y` into `acc` by alternately
/// leaping each cursor to the other's current bound, starting at `key`.
/// Values are taken from `x`.
///
/// When the two bounds disagree, only the lagging cursor advances (it just
/// leapt past a key the other side may still hold); when they agree the
/// entry is common and both advance. Either way at least one cursor moves
/// strictly past its minimum, so the loop terminates.
pub(crate) fn leapfrog_node<V, U>(
    key: Key,
    x: &Child<V>,
    y: &Child<U>,
    acc: Child<V>,
) -> Child<V>
where
    V: Clone,
    U: Clone,
{
    let mut probe = key;
    let mut x = x.clone();
    let mut y = y.clone();
    let mut acc = acc;
    loop {
        let Some(((x_key, x_value), x_rest)) = lub_node(&x, &probe) else {
            return acc;
        };
        let Some(((y_key, _), y_rest)) = lub_node(&y, &probe) else {
            return acc;
        };
        match x_key.cmp(&y_key) {
            Ordering::Equal => {
                let mut keep_new = |_: &Key, new: V, _: &V| Some(new);
                acc = insert_node(&acc, 0, x_key, x_value, &mut keep_new);
                match max_min(&x_rest, &y_rest) {
                    Some(next) => {
                        probe = next;
                        x = x_rest;
                        y = y_rest;
                    }
                    None => return acc,
                }
            }
            Ordering::Less => {
                probe = y_key;
                x = x_rest;
            }
            Ordering::Greater => {
                probe = x_key;
                y = y_rest;
            }
        }
    }
}

/// Leapfrog-driven intersection of two whole maps, keeping values from `x`.
pub(crate) fn intersect_node<V, U>(x: &Child<V>, y: &Child<U>) -> Child<V>
where
    V: Clone,
    U: Clone,
{
    match max_min(x, y) {
        Some(start) => leapfrog_node(start, x, y, empty()),
        None => empty(),
    }
}
