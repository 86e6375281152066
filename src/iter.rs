// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cmp::Ordering;
use std::iter::FusedIterator;

use crate::bits::{index_from_segment, test_bit};
use crate::key::Key;
use crate::node::Node;

/// Iterator over a [`KeyMap`]. Items are ordered by key, ascending.
///
/// Children within a node are stored in ascending segment order, so a
/// depth-first walk that pushes them right-to-left yields keys in order.
///
/// [`KeyMap`]: crate::KeyMap
pub struct Iter<'a, V> {
    /// Unvisited sub-tries; the back is visited first.
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iter<'a, V> {
    pub(crate) fn new(root: &'a Node<V>) -> Self {
        Self { stack: vec![root] }
    }

    /// Start at the first entry whose key is `>= start`, seeding the stack
    /// with exactly the sub-tries to the right of the descent path.
    pub(crate) fn new_from(root: &'a Node<V>, start: &Key) -> Self {
        let mut stack = Vec::new();
        let mut node = root;
        let mut depth = 0;
        loop {
            match node {
                Node::Empty => break,
                Node::Leaf(key, _) => {
                    if key >= start {
                        stack.push(node);
                    }
                    break;
                }
                Node::One(seg, child) => match start.segment(depth).cmp(seg) {
                    // Every key below this point has a larger segment here.
                    Ordering::Less => {
                        stack.push(node);
                        break;
                    }
                    Ordering::Equal => {
                        node = child.as_ref();
                        depth += 1;
                    }
                    Ordering::Greater => break,
                },
                _ => {
                    let (bitmap, children) = node.parts().expect("interior node");
                    let seg = start.segment(depth);
                    let present = test_bit(bitmap, seg);
                    let cut = index_from_segment(bitmap, seg);
                    let greater_from = cut + usize::from(present);
                    for child in children[greater_from..].iter().rev() {
                        stack.push(child.as_ref());
                    }
                    if present {
                        node = children[cut].as_ref();
                        depth += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        Self { stack }
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a Key, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.pop()? {
                Node::Empty => continue,
                Node::Leaf(key, value) => return Some((key, value)),
                Node::One(_, child) => self.stack.push(child.as_ref()),
                Node::Two(_, children) | Node::Sparse(_, children) | Node::Full(children) => {
                    for child in children.iter().rev() {
                        self.stack.push(child.as_ref());
                    }
                }
            }
        }
    }
}

impl<'a, V> FusedIterator for Iter<'a, V> {}
