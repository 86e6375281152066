// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use keytrie::{Key, KeyMap};
use quickcheck::{Arbitrary, Gen, TestResult};
use quickcheck_macros::quickcheck;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Key wrapper whose distribution mixes heavy overlap (to exercise
/// collisions and the set operations) with full-width values (to exercise
/// deep paths and lane boundaries).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DenseKey(Key);

impl Arbitrary for DenseKey {
    fn arbitrary(g: &mut Gen) -> Self {
        let key = match u8::arbitrary(g) % 8 {
            0..=3 => Key::from(u64::from(u8::arbitrary(g) % 64)),
            4 => Key::from(u64::from(u16::arbitrary(g))),
            5 => Key::new([u64::from(u8::arbitrary(g) % 4), 0, 0, u64::from(u8::arbitrary(g) % 4)]),
            6 => Key::from(u64::arbitrary(g)),
            _ => Key::new([
                u64::arbitrary(g),
                u64::arbitrary(g),
                u64::arbitrary(g),
                u64::arbitrary(g),
            ]),
        };
        DenseKey(key)
    }
}

#[derive(Clone, Debug)]
enum Operation {
    Set(DenseKey, i32),
    Delete(DenseKey),
}

impl Arbitrary for Operation {
    fn arbitrary(g: &mut Gen) -> Self {
        match bool::arbitrary(g) {
            true => Operation::Set(DenseKey::arbitrary(g), i32::arbitrary(g)),
            false => Operation::Delete(DenseKey::arbitrary(g)),
        }
    }
}

fn build(kvs: &[(DenseKey, i32)]) -> (KeyMap<i32>, BTreeMap<Key, i32>) {
    let map = KeyMap::from_list(kvs.iter().map(|(k, v)| (k.0, *v)));
    let model: BTreeMap<Key, i32> = kvs.iter().map(|(k, v)| (k.0, *v)).collect();
    (map, model)
}

fn key(lanes: [u64; 4]) -> Key {
    Key::new(lanes)
}

#[quickcheck]
fn prop_insert_then_get(kvs: Vec<(DenseKey, i32)>, k: DenseKey, v: i32) -> bool {
    let (map, _) = build(&kvs);
    map.insert(k.0, v).get(&k.0) == Some(&v)
}

#[quickcheck]
fn prop_insert_leaves_other_keys_alone(
    kvs: Vec<(DenseKey, i32)>,
    k1: DenseKey,
    k2: DenseKey,
    v: i32,
) -> TestResult {
    if k1 == k2 {
        return TestResult::discard();
    }
    let (map, _) = build(&kvs);
    TestResult::from_bool(map.insert(k2.0, v).get(&k1.0) == map.get(&k1.0))
}

#[quickcheck]
fn prop_remove_undoes_insert(kvs: Vec<(DenseKey, i32)>, k: DenseKey, v: i32) -> bool {
    let singleton = KeyMap::new().insert(k.0, v);
    let (map, _) = build(&kvs);
    let removed = map.insert(k.0, v).remove(&k.0);
    singleton.remove(&k.0).is_empty() && removed.get(&k.0).is_none()
}

#[quickcheck]
fn prop_to_list_is_sorted_last_write_wins(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, model) = build(&kvs);
    map.to_list() == model.into_iter().collect::<Vec<_>>()
}

#[quickcheck]
fn prop_from_to_list_round_trip(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, _) = build(&kvs);
    KeyMap::from_list(map.to_list()) == map
}

#[quickcheck]
fn prop_structure_independent_of_insert_order(kvs: Vec<(DenseKey, i32)>, seed: u64) -> bool {
    // Shuffling can reorder writes to the same key, so replay the
    // de-duplicated entries rather than the original list.
    let (map, _) = build(&kvs);
    let mut entries = map.to_list();
    entries.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));
    let reshuffled = KeyMap::from_list(entries);
    reshuffled == map && reshuffled.child_histogram() == map.child_histogram()
}

#[quickcheck]
fn prop_union_identities(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, _) = build(&kvs);
    let empty = KeyMap::new();
    map.union(&empty) == map && empty.union(&map) == map && map.union(&map) == map
}

#[quickcheck]
fn prop_union_size_inclusion_exclusion(
    xs: Vec<(DenseKey, i32)>,
    ys: Vec<(DenseKey, i32)>,
) -> bool {
    let (a, _) = build(&xs);
    let (b, _) = build(&ys);
    let union = a.union_with(&b, |x, y| x.wrapping_add(*y));
    union.len() == a.len() + b.len() - a.intersection(&b).len()
}

#[quickcheck]
fn prop_union_matches_model(xs: Vec<(DenseKey, i32)>, ys: Vec<(DenseKey, i32)>) -> bool {
    let (a, model_a) = build(&xs);
    let (b, model_b) = build(&ys);
    let union = a.union_with_key(&b, |_, x, y| x.wrapping_add(*y));
    let mut model = model_b;
    for (k, v) in model_a {
        model
            .entry(k)
            .and_modify(|existing| *existing = v.wrapping_add(*existing))
            .or_insert(v);
    }
    union.to_list() == model.into_iter().collect::<Vec<_>>()
}

#[quickcheck]
fn prop_intersection_matches_model(xs: Vec<(DenseKey, i32)>, ys: Vec<(DenseKey, i32)>) -> bool {
    let (a, model_a) = build(&xs);
    let (b, model_b) = build(&ys);
    let both = a.intersection_with_key(&b, |_, x, y| x.wrapping_mul(*y));
    let model: Vec<(Key, i32)> = model_a
        .into_iter()
        .filter_map(|(k, v)| model_b.get(&k).map(|u| (k, v.wrapping_mul(*u))))
        .collect();
    both.to_list() == model
}

#[quickcheck]
fn prop_intersection_when_can_suppress(xs: Vec<(DenseKey, i32)>, ys: Vec<(DenseKey, i32)>) -> bool {
    let (a, _) = build(&xs);
    let (b, _) = build(&ys);
    let odd_sums = a.intersection_when(&b, |_, x, y| {
        let sum = x.wrapping_add(*y);
        (sum % 2 != 0).then_some(sum)
    });
    odd_sums.check_invariants().is_ok()
        && odd_sums.iter().all(|(_, v)| v % 2 != 0)
        && odd_sums.len() <= a.intersection(&b).len()
}

#[quickcheck]
fn prop_fold_over_intersection_agrees(
    xs: Vec<(DenseKey, i32)>,
    ys: Vec<(DenseKey, i32)>,
) -> bool {
    let (a, _) = build(&xs);
    let (b, _) = build(&ys);
    let folded = a.fold_over_intersection(&b, Vec::new(), |mut acc, k, v, _| {
        acc.push((*k, *v));
        acc
    });
    folded == a.intersection(&b).to_list()
}

#[quickcheck]
fn prop_leapfrog_agrees_with_intersection(
    xs: Vec<(DenseKey, i32)>,
    ys: Vec<(DenseKey, i32)>,
) -> bool {
    let (a, _) = build(&xs);
    let (b, _) = build(&ys);
    a.intersect(&b) == a.intersection(&b)
}

#[quickcheck]
fn prop_restrict_and_without_partition(
    xs: Vec<(DenseKey, i32)>,
    ys: Vec<(DenseKey, i32)>,
) -> bool {
    let (a, _) = build(&xs);
    let (b, _) = build(&ys);
    let kept = a.restrict_keys(&b);
    let dropped = a.without_keys(&b);
    kept.check_invariants().is_ok()
        && dropped.check_invariants().is_ok()
        && kept.union(&dropped) == a
        && kept.len() + dropped.len() == a.len()
        && kept.iter().all(|(k, _)| b.contains_key(k))
        && dropped.iter().all(|(k, _)| !b.contains_key(k))
}

#[quickcheck]
fn prop_split_lookup_partitions(kvs: Vec<(DenseKey, i32)>, at: DenseKey) -> bool {
    let (map, _) = build(&kvs);
    let (low, found, high) = map.split_lookup(&at.0);
    let mut reassembled = low.to_list();
    if let Some(v) = &found {
        reassembled.push((at.0, *v));
    }
    reassembled.extend(high.to_list());
    low.check_invariants().is_ok()
        && high.check_invariants().is_ok()
        && low.iter().all(|(k, _)| *k < at.0)
        && high.iter().all(|(k, _)| *k > at.0)
        && found.as_ref() == map.get(&at.0)
        && KeyMap::from_list(reassembled) == map
}

#[quickcheck]
fn prop_lub_is_least_upper_bound(kvs: Vec<(DenseKey, i32)>, at: DenseKey) -> bool {
    let (map, model) = build(&kvs);
    match map.lub(&at.0) {
        Some(((k, v), rest)) => {
            let expected = model.range(at.0..).next();
            expected == Some((&k, &v))
                && rest.iter().all(|(rk, _)| *rk > k)
                && rest.len() == map.iter_from(&at.0).count() - 1
        }
        None => model.range(at.0..).next().is_none(),
    }
}

#[quickcheck]
fn prop_fold_orders(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, _) = build(&kvs);
    let ascending = map.fold_asc(Vec::new(), |mut acc, k, _| {
        acc.push(*k);
        acc
    });
    let descending = map.fold_desc(Vec::new(), |mut acc, k, _| {
        acc.push(*k);
        acc
    });
    ascending.windows(2).all(|w| w[0] < w[1])
        && descending.windows(2).all(|w| w[0] > w[1])
        && ascending.iter().rev().eq(descending.iter())
        && ascending.len() == map.len()
}

#[quickcheck]
fn prop_iter_from_skips_lower_keys(kvs: Vec<(DenseKey, i32)>, at: DenseKey) -> bool {
    let (map, _) = build(&kvs);
    let from_iter: Vec<Key> = map.iter_from(&at.0).map(|(k, _)| *k).collect();
    let filtered: Vec<Key> = map
        .iter()
        .filter(|(k, _)| **k >= at.0)
        .map(|(k, _)| *k)
        .collect();
    from_iter == filtered
}

#[quickcheck]
fn prop_min_max_views(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, model) = build(&kvs);
    let min_ok = match map.min_view() {
        Some(((k, v), rest)) => {
            Some((&k, &v)) == model.iter().next()
                && rest.check_invariants().is_ok()
                && rest.len() == map.len() - 1
                && rest.get(&k).is_none()
        }
        None => map.is_empty(),
    };
    let max_ok = match map.max_view() {
        Some(((k, v), rest)) => {
            Some((&k, &v)) == model.iter().next_back()
                && rest.check_invariants().is_ok()
                && rest.len() == map.len() - 1
                && rest.get(&k).is_none()
        }
        None => map.is_empty(),
    };
    min_ok && max_ok && map.min_entry().map(|(k, _)| *k) == model.keys().next().copied()
}

#[quickcheck]
fn prop_map_with_key_preserves_shape(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, _) = build(&kvs);
    let doubled = map.map_with_key(|_, v| i64::from(*v) * 2);
    doubled.check_invariants().is_ok()
        && doubled.child_histogram() == map.child_histogram()
        && doubled
            .iter()
            .zip(map.iter())
            .all(|((dk, dv), (k, v))| dk == k && *dv == i64::from(*v) * 2)
}

#[quickcheck]
fn prop_try_map_with_key_short_circuits(kvs: Vec<(DenseKey, i32)>) -> bool {
    let (map, _) = build(&kvs);
    let ok: Result<KeyMap<i32>, ()> = map.try_map_with_key(|_, v| Ok(*v));
    let failing: Result<KeyMap<i32>, &str> = map.try_map_with_key(|_, _| Err("boom"));
    ok.map(|m| m == map).unwrap_or(false) && (map.is_empty() || failing == Err("boom"))
}

/// Every operation must leave the trie structurally valid; replay a random
/// workload against a model map and audit after each step.
#[quickcheck]
fn prop_random_workload_stays_valid(ops: Vec<Operation>) -> bool {
    let mut map = KeyMap::new();
    let mut model: BTreeMap<Key, i32> = BTreeMap::new();
    for op in ops {
        match op {
            Operation::Set(k, v) => {
                map = map.insert(k.0, v);
                model.insert(k.0, v);
            }
            Operation::Delete(k) => {
                map = map.remove(&k.0);
                model.remove(&k.0);
            }
        }
        if map.check_invariants().is_err() {
            return false;
        }
    }
    map.to_list() == model.into_iter().collect::<Vec<_>>()
}

#[test]
fn scenario_insert_and_lookup() {
    let map = KeyMap::new().insert(key([0, 0, 0, 0]), "a");
    assert_eq!(map.get(&key([0, 0, 0, 0])), Some(&"a"));
}

#[test]
fn scenario_two_entries_in_order() {
    let map = KeyMap::new()
        .insert(key([0, 0, 0, 0]), "a")
        .insert(key([0, 0, 0, 1]), "b");
    assert_eq!(
        map.to_list(),
        vec![(key([0, 0, 0, 0]), "a"), (key([0, 0, 0, 1]), "b")]
    );
}

#[test]
fn scenario_delete_one_of_two() {
    let map = KeyMap::new()
        .insert(key([0, 0, 0, 0]), "a")
        .insert(key([0, 0, 0, 1]), "b");
    let map = map.remove(&key([0, 0, 0, 0]));
    assert!(map.check_invariants().is_ok());
    assert_eq!(map.to_list(), vec![(key([0, 0, 0, 1]), "b")]);
}

#[test]
fn scenario_union_with_adds_collisions() {
    let a = KeyMap::from_list([(key([0, 0, 0, 0]), 1), (key([0, 0, 0, 2]), 2)]);
    let b = KeyMap::from_list([(key([0, 0, 0, 2]), 20), (key([0, 0, 0, 3]), 30)]);
    let joined = a.union_with(&b, |x, y| x + y);
    assert_eq!(
        joined.to_list(),
        vec![
            (key([0, 0, 0, 0]), 1),
            (key([0, 0, 0, 2]), 22),
            (key([0, 0, 0, 3]), 30),
        ]
    );
}

#[test]
fn scenario_intersection_with_multiplies_collisions() {
    let a = KeyMap::from_list([(key([0, 0, 0, 0]), 1), (key([0, 0, 0, 2]), 2)]);
    let b = KeyMap::from_list([(key([0, 0, 0, 2]), 20), (key([0, 0, 0, 3]), 30)]);
    let both = a.intersection_with(&b, |x, y| x * y);
    assert_eq!(both.to_list(), vec![(key([0, 0, 0, 2]), 40)]);
}

#[test]
fn scenario_split_lookup_at_64_of_128() {
    let map: KeyMap<u64> = (0..128u64).map(|i| (key([i, 0, 0, 0]), i)).collect();
    let (low, found, high) = map.split_lookup(&key([64, 0, 0, 0]));
    assert_eq!(low.len(), 64);
    assert_eq!(found, Some(64));
    assert_eq!(high.len(), 63);
    assert_eq!(
        low.to_list(),
        (0..64u64).map(|i| (key([i, 0, 0, 0]), i)).collect::<Vec<_>>()
    );
    assert!(low.check_invariants().is_ok());
    assert!(high.check_invariants().is_ok());
}

#[test]
fn idempotent_writes_share_the_root() {
    let map = KeyMap::from_list([
        (key([0, 0, 0, 1]), "a"),
        (key([0, 0, 0, 2]), "b"),
        (key([9, 0, 0, 0]), "c"),
    ]);
    // Re-inserting an equal value is a no-op and returns the same root.
    assert!(map.ptr_eq(&map.insert(key([0, 0, 0, 2]), "b")));
    // Removing an absent key shares the input too.
    assert!(map.ptr_eq(&map.remove(&key([5, 5, 5, 5]))));
    // A real write produces a distinct root.
    assert!(!map.ptr_eq(&map.insert(key([0, 0, 0, 2]), "x")));
}

#[test]
fn adjacent_keys_build_a_deep_shared_spine() {
    // Keys agree on every segment except the last, so the two leaves hang
    // off a two-slot node at the bottom of a chain of single-slot nodes.
    let map = KeyMap::new()
        .insert(key([0, 0, 0, 0]), 0)
        .insert(key([0, 0, 0, 1]), 1);
    let hist = map.child_histogram();
    assert_eq!(hist[1], 43);
    assert_eq!(hist[2], 1);
    assert!(map.check_invariants().is_ok());
}

#[test]
fn top_segment_divergence_keeps_the_trie_shallow() {
    let map = KeyMap::new()
        .insert(key([0, 0, 0, 0]), 0)
        .insert(key([1 << 63, 0, 0, 0]), 1);
    let hist = map.child_histogram();
    assert_eq!(hist[2], 1);
    assert_eq!(hist.iter().sum::<usize>(), 1);
}

#[test]
fn full_node_collapses_back_through_every_variant() {
    // 64 keys sharing their first segment and fanning out across the whole
    // second segment: one single-slot node over one full node of leaves.
    let keys: Vec<Key> = (0..64u64).map(|j| key([j << 54, 0, 0, 0])).collect();
    let mut map: KeyMap<u64> = keys.iter().map(|k| (*k, 0u64)).collect();
    assert_eq!(map.child_histogram()[64], 1);

    map = map.remove(&keys[17]);
    let hist = map.child_histogram();
    assert_eq!((hist[64], hist[63]), (0, 1));

    for k in &keys[1..63] {
        map = map.remove(k);
        assert!(map.check_invariants().is_ok());
    }
    assert_eq!(map.child_histogram()[2], 1);

    map = map.remove(&keys[0]);
    assert_eq!(map.to_list(), vec![(keys[63], 0)]);
    assert_eq!(map.child_histogram().iter().sum::<usize>(), 0);

    map = map.remove(&keys[63]);
    assert!(map.is_empty());
    assert!(map.check_invariants().is_ok());
}

#[test]
fn max_min_of_picks_the_larger_minimum() {
    let a = KeyMap::from_list([(key([0, 0, 0, 2]), ()), (key([0, 0, 0, 9]), ())]);
    let b = KeyMap::from_list([(key([0, 0, 0, 5]), ()), (key([0, 0, 0, 7]), ())]);
    assert_eq!(a.max_min_of(&b), Some(key([0, 0, 0, 5])));
    assert_eq!(a.max_min_of(&KeyMap::<()>::new()), None);
}

#[test]
fn leapfrog_accumulates_from_a_starting_probe() {
    let x = KeyMap::from_list((1..=9u64).map(|i| (Key::from(i), i)));
    let y = KeyMap::from_list([3u64, 5, 8, 11].map(|i| (Key::from(i), ())));
    let all = KeyMap::leapfrog(Key::from(1u64), &x, &y, KeyMap::new());
    assert_eq!(
        all.to_list(),
        vec![(Key::from(3u64), 3), (Key::from(5u64), 5), (Key::from(8u64), 8)]
    );
    // Starting past a common key excludes it.
    let late = KeyMap::leapfrog(Key::from(4u64), &x, &y, KeyMap::new());
    assert_eq!(late.len(), 2);
}

#[test]
fn for_each_visits_in_order_and_propagates_errors() {
    let map: KeyMap<u64> = (0..10u64).map(|i| (Key::from(i), i)).collect();
    let mut seen = Vec::new();
    map.for_each(|k, v| {
        seen.push((*k, *v));
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, map.to_list());

    let aborted = map.for_each(|_, v| {
        if *v == 5 {
            anyhow::bail!("stop at five");
        }
        Ok(())
    });
    assert!(aborted.is_err());
}
