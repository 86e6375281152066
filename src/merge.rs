// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Two-map structural algorithms: union, intersection and difference.
//!
//! All three walk the two tries in lockstep, pairing children through the
//! node bitmaps. Bits present on only one side are resolved without
//! descending, so disjoint sub-tries transfer into the result as shared
//! `Arc` clones. `combine` callbacks always see values in `(left, right)`
//! argument order regardless of which side the recursion entered from.

use std::sync::Arc;

use crate::bits::sparse_index;
use crate::key::Key;
use crate::node::{empty, insert_node, leaf, Child, Node};

pub(crate) fn union_node<V, F>(a: &Child<V>, b: &Child<V>, depth: usize, combine: &mut F) -> Child<V>
where
    V: Clone,
    F: FnMut(&Key, &V, &V) -> V,
{
    match (&**a, &**b) {
        (Node::Empty, _) => b.clone(),
        (_, Node::Empty) => a.clone(),
        (Node::Leaf(key, value), _) => {
            let mut absorb = |k: &Key, new: V, old: &V| Some(combine(k, &new, old));
            insert_node(b, depth, *key, value.clone(), &mut absorb)
        }
        (_, Node::Leaf(key, value)) => {
            // Flip the arguments so `combine` still sees (left, right).
            let mut absorb = |k: &Key, new: V, old: &V| Some(combine(k, old, &new));
            insert_node(a, depth, *key, value.clone(), &mut absorb)
        }
        _ => {
            let (a_bitmap, a_children) = a.parts().expect("interior node");
            let (b_bitmap, b_children) = b.parts().expect("interior node");
            let merged = a_bitmap | b_bitmap;
            let mut children = Vec::with_capacity(merged.count_ones() as usize);
            let mut bits = merged;
            while bits != 0 {
                let bit = bits & bits.wrapping_neg();
                bits ^= bit;
                let child = match (a_bitmap & bit != 0, b_bitmap & bit != 0) {
                    (true, false) => a_children[sparse_index(a_bitmap, bit)].clone(),
                    (false, true) => b_children[sparse_index(b_bitmap, bit)].clone(),
                    _ => union_node(
                        &a_children[sparse_index(a_bitmap, bit)],
                        &b_children[sparse_index(b_bitmap, bit)],
                        depth + 1,
                        combine,
                    ),
                };
                children.push(child);
            }
            Node::build(merged, children.into_boxed_slice())
        }
    }
}

/// Intersection where `combine` may suppress a key by returning `None`.
/// Sub-recursions can come back empty, so assembly goes through
/// [`Node::drop_empty`].
pub(crate) fn intersection_node<V, U, W, F>(
    a: &Child<V>,
    b: &Child<U>,
    depth: usize,
    combine: &mut F,
) -> Child<W>
where
    F: FnMut(&Key, &V, &U) -> Option<W>,
{
    match (&**a, &**b) {
        (Node::Empty, _) | (_, Node::Empty) => empty(),
        (Node::Leaf(key, value), _) => match b.get(depth, key).and_then(|u| combine(key, value, u))
        {
            Some(joined) => leaf(*key, joined),
            None => empty(),
        },
        (_, Node::Leaf(key, value)) => match a.get(depth, key).and_then(|v| combine(key, v, value))
        {
            Some(joined) => leaf(*key, joined),
            None => empty(),
        },
        _ => {
            let (a_bitmap, a_children) = a.parts().expect("interior node");
            let (b_bitmap, b_children) = b.parts().expect("interior node");
            let common = a_bitmap & b_bitmap;
            if common == 0 {
                return empty();
            }
            let mut children = Vec::with_capacity(common.count_ones() as usize);
            let mut bits = common;
            while bits != 0 {
                let bit = bits & bits.wrapping_neg();
                bits ^= bit;
                children.push(intersection_node(
                    &a_children[sparse_index(a_bitmap, bit)],
                    &b_children[sparse_index(b_bitmap, bit)],
                    depth + 1,
                    combine,
                ));
            }
            Node::drop_empty(common, children.into_boxed_slice())
        }
    }
}

/// Fold over the common keys of two maps in ascending key order, without
/// building a result trie. Disjoint sub-tries short-circuit.
pub(crate) fn fold_intersection_node<V, U, A, F>(
    a: &Child<V>,
    b: &Child<U>,
    depth: usize,
    acc: A,
    f: &mut F,
) -> A
where
    F: FnMut(A, &Key, &V, &U) -> A,
{
    match (&**a, &**b) {
        (Node::Empty, _) | (_, Node::Empty) => acc,
        (Node::Leaf(key, value), _) => match b.get(depth, key) {
            Some(u) => f(acc, key, value, u),
            None => acc,
        },
        (_, Node::Leaf(key, value)) => match a.get(depth, key) {
            Some(v) => f(acc, key, v, value),
            None => acc,
        },
        _ => {
            let (a_bitmap, a_children) = a.parts().expect("interior node");
            let (b_bitmap, b_children) = b.parts().expect("interior node");
            let mut acc = acc;
            let mut bits = a_bitmap & b_bitmap;
            while bits != 0 {
                let bit = bits & bits.wrapping_neg();
                bits ^= bit;
                acc = fold_intersection_node(
                    &a_children[sparse_index(a_bitmap, bit)],
                    &b_children[sparse_index(b_bitmap, bit)],
                    depth + 1,
                    acc,
                    f,
                );
            }
            acc
        }
    }
}

/// Entries of `a` whose keys are absent from `b`. Untouched sub-tries of
/// `a` survive as shared references; when nothing is removed at all the
/// input node itself is returned.
pub(crate) fn difference_node<V, U>(a: &Child<V>, b: &Child<U>, depth: usize) -> Child<V> {
    match (&**a, &**b) {
        (Node::Empty, _) | (_, Node::Empty) => a.clone(),
        (Node::Leaf(key, _), _) => {
            if b.get(depth, key).is_some() {
                empty()
            } else {
                a.clone()
            }
        }
        (_, Node::Leaf(key, _)) => match crate::node::remove_node(a, depth, key) {
            Some(updated) => updated,
            None => a.clone(),
        },
        _ => {
            let (a_bitmap, a_children) = a.parts().expect("interior node");
            let (b_bitmap, b_children) = b.parts().expect("interior node");
            if a_bitmap & b_bitmap == 0 {
                return a.clone();
            }
            let mut changed = false;
            let mut children = Vec::with_capacity(a_children.len());
            let mut bits = a_bitmap;
            while bits != 0 {
                let bit = bits & bits.wrapping_neg();
                bits ^= bit;
                let a_child = &a_children[sparse_index(a_bitmap, bit)];
                if b_bitmap & bit == 0 {
                    children.push(a_child.clone());
                } else {
                    let updated = difference_node(
                        a_child,
                        &b_children[sparse_index(b_bitmap, bit)],
                        depth + 1,
                    );
                    changed |= !Arc::ptr_eq(&updated, a_child);
                    children.push(updated);
                }
            }
            if changed {
                Node::drop_empty(a_bitmap, children.into_boxed_slice())
            } else {
                a.clone()
            }
        }
    }
}
