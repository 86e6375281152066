// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::InvariantError;
use crate::iter::Iter;
use crate::key::Key;
use crate::merge::{difference_node, fold_intersection_node, intersection_node, union_node};
use crate::node::{
    empty, insert_node, leaf, max_view_node, min_view_node, remove_node, Child,
};
use crate::split::{intersect_node, leapfrog_node, lub_node, max_min, split_node};

/// Persistent ordered map from 256-bit [`Key`]s to values.
///
/// The map is a bitmap-indexed trie over the raw bits of the key. Every
/// update returns a new map that shares all untouched sub-tries with its
/// input; existing versions are never modified and remain valid. Cloning is
/// O(1). Because the trie's radix order is key order, ordered operations
/// (min/max, range split, ordered folds, leapfrog intersection) come for
/// free.
///
/// Immutability makes sharing a map across threads safe without locks:
/// `KeyMap<V>` is `Send + Sync` whenever `V` is.
///
/// # Examples
///
/// ```
/// use keytrie::{Key, KeyMap};
///
/// let map = KeyMap::new().insert(Key::from(1u64), "a".to_string());
/// let bigger = map.insert(Key::from(2u64), "b".to_string());
///
/// // The original version is untouched.
/// assert_eq!(map.len(), 1);
/// assert_eq!(bigger.len(), 2);
/// assert_eq!(bigger.get(&Key::from(1u64)), Some(&"a".to_string()));
///
/// let smaller = bigger.remove(&Key::from(1u64));
/// assert_eq!(smaller.get(&Key::from(1u64)), None);
/// ```
pub struct KeyMap<V> {
    root: Child<V>,
}

impl<V> KeyMap<V> {
    /// The empty map.
    pub fn new() -> Self {
        KeyMap { root: empty() }
    }

    /// Map holding a single entry.
    pub fn singleton(key: Key, value: V) -> Self {
        KeyMap { root: leaf(key, value) }
    }

    /// Build a map from entries; on duplicate keys the last write wins.
    pub fn from_list<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Key, V)>,
    {
        entries.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of entries. Computed by traversal; the map does not cache a
    /// count.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn get(&self, key: &Key) -> Option<&V> {
        self.root.get(0, key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Entry with the smallest key.
    pub fn min_entry(&self) -> Option<(&Key, &V)> {
        self.root.min_entry()
    }

    /// Entry with the largest key.
    pub fn max_entry(&self) -> Option<(&Key, &V)> {
        self.root.max_entry()
    }

    /// Insert an entry, replacing any previous value for the key.
    ///
    /// Inserting a value equal to the stored one returns a map that shares
    /// its root with `self`, so repeated idempotent writes cost no
    /// allocation and preserve physical sharing (observable through
    /// [`ptr_eq`](Self::ptr_eq)).
    ///
    /// # Examples
    ///
    /// ```
    /// use keytrie::{Key, KeyMap};
    ///
    /// let map = KeyMap::new().insert(Key::from(37u64), "a");
    /// let same = map.insert(Key::from(37u64), "a");
    /// assert!(map.ptr_eq(&same));
    /// ```
    pub fn insert(&self, key: Key, value: V) -> Self
    where
        V: PartialEq,
    {
        let mut keep_if_equal = |_: &Key, new: V, old: &V| {
            if old == &new {
                None
            } else {
                Some(new)
            }
        };
        KeyMap {
            root: insert_node(&self.root, 0, key, value, &mut keep_if_equal),
        }
    }

    /// Insert, resolving a key collision with `combine(new, old)`.
    pub fn insert_with<F>(&self, key: Key, value: V, combine: F) -> Self
    where
        F: FnOnce(V, &V) -> V,
    {
        self.insert_with_key(key, value, |_, new, old| combine(new, old))
    }

    /// Insert, resolving a key collision with `combine(key, new, old)`.
    pub fn insert_with_key<F>(&self, key: Key, value: V, combine: F) -> Self
    where
        F: FnOnce(&Key, V, &V) -> V,
    {
        let mut combine = Some(combine);
        let mut step = |k: &Key, new: V, old: &V| {
            let combine = combine.take().expect("collision resolved at most once");
            Some(combine(k, new, old))
        };
        KeyMap {
            root: insert_node(&self.root, 0, key, value, &mut step),
        }
    }

    /// Remove a key. Removing an absent key returns a map sharing its root
    /// with `self`.
    pub fn remove(&self, key: &Key) -> Self {
        match remove_node(&self.root, 0, key) {
            Some(root) => KeyMap { root },
            None => self.clone(),
        }
    }

    /// Smallest entry together with the map without it.
    pub fn min_view(&self) -> Option<((Key, V), Self)>
    where
        V: Clone,
    {
        min_view_node(&self.root).map(|(entry, rest)| (entry, KeyMap { root: rest }))
    }

    /// Largest entry together with the map without it.
    pub fn max_view(&self) -> Option<((Key, V), Self)>
    where
        V: Clone,
    {
        max_view_node(&self.root).map(|(entry, rest)| (entry, KeyMap { root: rest }))
    }

    /// Left-biased union: on a key collision the value from `self` wins.
    pub fn union(&self, other: &Self) -> Self
    where
        V: Clone,
    {
        self.union_with_key(other, |_, left, _| left.clone())
    }

    /// Union resolving collisions with `combine(left, right)`, where `left`
    /// is the value from `self`.
    pub fn union_with<F>(&self, other: &Self, mut combine: F) -> Self
    where
        V: Clone,
        F: FnMut(&V, &V) -> V,
    {
        self.union_with_key(other, |_, left, right| combine(left, right))
    }

    /// Union resolving collisions with `combine(key, left, right)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use keytrie::{Key, KeyMap};
    ///
    /// let a = KeyMap::from_list([(Key::from(1u64), 1), (Key::from(2u64), 2)]);
    /// let b = KeyMap::from_list([(Key::from(2u64), 20), (Key::from(3u64), 30)]);
    /// let joined = a.union_with(&b, |x, y| x + y);
    /// assert_eq!(
    ///     joined.to_list(),
    ///     vec![(Key::from(1u64), 1), (Key::from(2u64), 22), (Key::from(3u64), 30)],
    /// );
    /// ```
    pub fn union_with_key<F>(&self, other: &Self, mut combine: F) -> Self
    where
        V: Clone,
        F: FnMut(&Key, &V, &V) -> V,
    {
        KeyMap {
            root: union_node(&self.root, &other.root, 0, &mut combine),
        }
    }

    /// Keys common to both maps, keeping the values from `self`.
    pub fn intersection<U>(&self, other: &KeyMap<U>) -> Self
    where
        V: Clone,
    {
        self.intersection_when(other, |_, value, _| Some(value.clone()))
    }

    /// Intersection combining both values with `combine(left, right)`.
    pub fn intersection_with<U, W, F>(&self, other: &KeyMap<U>, mut combine: F) -> KeyMap<W>
    where
        F: FnMut(&V, &U) -> W,
    {
        self.intersection_when(other, |_, left, right| Some(combine(left, right)))
    }

    /// Intersection combining both values with `combine(key, left, right)`.
    pub fn intersection_with_key<U, W, F>(&self, other: &KeyMap<U>, mut combine: F) -> KeyMap<W>
    where
        F: FnMut(&Key, &V, &U) -> W,
    {
        self.intersection_when(other, |key, left, right| Some(combine(key, left, right)))
    }

    /// Intersection where `combine` may suppress a key by returning `None`.
    pub fn intersection_when<U, W, F>(&self, other: &KeyMap<U>, mut combine: F) -> KeyMap<W>
    where
        F: FnMut(&Key, &V, &U) -> Option<W>,
    {
        KeyMap {
            root: intersection_node(&self.root, &other.root, 0, &mut combine),
        }
    }

    /// Fold over the common keys of the two maps in ascending key order
    /// without materializing the intersection.
    pub fn fold_over_intersection<U, A, F>(&self, other: &KeyMap<U>, seed: A, mut f: F) -> A
    where
        F: FnMut(A, &Key, &V, &U) -> A,
    {
        fold_intersection_node(&self.root, &other.root, 0, seed, &mut f)
    }

    /// Entries of `self` whose keys appear in `keys`.
    pub fn restrict_keys<U>(&self, keys: &KeyMap<U>) -> Self
    where
        V: Clone,
    {
        self.intersection_when(keys, |_, value, _| Some(value.clone()))
    }

    /// Entries of `self` whose keys do not appear in `keys`.
    pub fn without_keys<U>(&self, keys: &KeyMap<U>) -> Self {
        KeyMap {
            root: difference_node(&self.root, &keys.root, 0),
        }
    }

    /// Split into entries below `key`, the value at `key` if present, and
    /// entries above `key`. The two sides and `self` share sub-tries.
    pub fn split_lookup(&self, key: &Key) -> (Self, Option<V>, Self)
    where
        V: Clone,
    {
        let (less, found, greater) = split_node(&self.root, 0, key);
        (KeyMap { root: less }, found, KeyMap { root: greater })
    }

    /// Least upper bound: the smallest entry with key `>= key`, together
    /// with the map of everything strictly greater than it.
    pub fn lub(&self, key: &Key) -> Option<((Key, V), Self)>
    where
        V: Clone,
    {
        lub_node(&self.root, key).map(|(entry, rest)| (entry, KeyMap { root: rest }))
    }

    /// `max(min_key(self), min_key(other))`, or `None` when either map is
    /// empty. The starting probe for [`leapfrog`](Self::leapfrog).
    pub fn max_min_of<U>(&self, other: &KeyMap<U>) -> Option<Key> {
        max_min(&self.root, &other.root)
    }

    /// Accumulate the intersection of `x` and `y` into `acc`, starting the
    /// probe at `start` and advancing both maps in ascending key order.
    /// Values are taken from `x`. Effective when the two maps have very
    /// different sizes.
    pub fn leapfrog<U>(start: Key, x: &KeyMap<V>, y: &KeyMap<U>, acc: KeyMap<V>) -> KeyMap<V>
    where
        V: Clone,
        U: Clone,
    {
        KeyMap {
            root: leapfrog_node(start, &x.root, &y.root, acc.root),
        }
    }

    /// Leapfrog-driven intersection; agrees with
    /// [`intersection`](Self::intersection).
    pub fn intersect<U>(&self, other: &KeyMap<U>) -> Self
    where
        V: Clone,
        U: Clone,
    {
        KeyMap {
            root: intersect_node(&self.root, &other.root),
        }
    }

    /// Fold entries in ascending key order.
    pub fn fold_asc<A, F>(&self, seed: A, mut f: F) -> A
    where
        F: FnMut(A, &Key, &V) -> A,
    {
        self.root.fold_asc(seed, &mut f)
    }

    /// Fold entries in descending key order.
    pub fn fold_desc<A, F>(&self, seed: A, mut f: F) -> A
    where
        F: FnMut(A, &Key, &V) -> A,
    {
        self.root.fold_desc(seed, &mut f)
    }

    /// Map every value, preserving the trie shape.
    pub fn map_with_key<W, F>(&self, mut f: F) -> KeyMap<W>
    where
        F: FnMut(&Key, &V) -> W,
    {
        KeyMap {
            root: self.root.map_with_key(&mut f),
        }
    }

    /// Shape-preserving fallible traversal; the first error aborts and is
    /// returned.
    pub fn try_map_with_key<W, E, F>(&self, mut f: F) -> Result<KeyMap<W>, E>
    where
        F: FnMut(&Key, &V) -> Result<W, E>,
    {
        Ok(KeyMap {
            root: self.root.try_map_with_key(&mut f)?,
        })
    }

    /// Run `f` on every entry in ascending key order.
    pub fn for_each<F>(&self, mut f: F) -> anyhow::Result<()>
    where
        F: FnMut(&Key, &V) -> anyhow::Result<()>,
    {
        self.root.for_each(&mut f)
    }

    /// Iterate entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(&self.root)
    }

    /// Iterate entries in ascending key order, starting at the first key
    /// `>= start`.
    pub fn iter_from(&self, start: &Key) -> Iter<'_, V> {
        Iter::new_from(&self.root, start)
    }

    /// All entries, ascending by key.
    pub fn to_list(&self) -> Vec<(Key, V)>
    where
        V: Clone,
    {
        self.iter().map(|(key, value)| (*key, value.clone())).collect()
    }

    /// Whether two maps share the same root node. Implies equality; the
    /// converse does not hold.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Verify the structural invariants of the whole trie: no empty child
    /// below the root, bitmap populations matching array lengths, minimal
    /// variants throughout.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.root.check(0)
    }

    /// Frequencies of populated-child counts across the interior nodes,
    /// indexed by child count (1 through 64; a `Full` node counts at 64).
    pub fn child_histogram(&self) -> [usize; 65] {
        let mut hist = [0usize; 65];
        self.root.histogram(&mut hist);
        hist
    }
}

impl<V> Clone for KeyMap<V> {
    fn clone(&self) -> Self {
        KeyMap {
            root: self.root.clone(),
        }
    }
}

impl<V> Default for KeyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for KeyMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Maps compare by their entry sequences.
impl<V: PartialEq> PartialEq for KeyMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<V: Eq> Eq for KeyMap<V> {}

impl<V: PartialOrd> PartialOrd for KeyMap<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<V: Ord> Ord for KeyMap<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<V> FromIterator<(Key, V)> for KeyMap<V> {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (Key, V)>,
    {
        let mut root = empty();
        for (key, value) in iter {
            let mut replace = |_: &Key, new: V, _: &V| Some(new);
            root = insert_node(&root, 0, key, value, &mut replace);
        }
        KeyMap { root }
    }
}

impl<'a, V> IntoIterator for &'a KeyMap<V> {
    type Item = (&'a Key, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Serializes as the ascending entry sequence.
impl<V: Serialize> Serialize for KeyMap<V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for KeyMap<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<(Key, V)>::deserialize(deserializer)?;
        Ok(Self::from_list(entries))
    }
}
