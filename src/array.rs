// Copyright 2021-2023 Protocol Labs
// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Copy-on-write transforms over the immutable child arrays.
//!
//! Every function returns a freshly allocated array and leaves its input
//! untouched; published arrays are never mutated. Out-of-range indices are
//! programmer errors and fail loudly rather than being reported back.

use std::ops::Range;

/// New array with `item` inserted at `index` and later elements shifted
/// right by one.
pub(crate) fn insert_at<T: Clone>(arr: &[T], index: usize, item: T) -> Box<[T]> {
    assert!(
        index <= arr.len(),
        "insert_at: index {} out of range 0..={}",
        index,
        arr.len()
    );
    let mut out = Vec::with_capacity(arr.len() + 1);
    out.extend_from_slice(&arr[..index]);
    out.push(item);
    out.extend_from_slice(&arr[index..]);
    out.into_boxed_slice()
}

/// New array with the element at `index` removed.
pub(crate) fn remove_at<T: Clone>(arr: &[T], index: usize) -> Box<[T]> {
    assert!(
        index < arr.len(),
        "remove_at: index {} out of range 0..{}",
        index,
        arr.len()
    );
    let mut out = Vec::with_capacity(arr.len() - 1);
    out.extend_from_slice(&arr[..index]);
    out.extend_from_slice(&arr[index + 1..]);
    out.into_boxed_slice()
}

/// New array of the same length with the element at `index` replaced.
pub(crate) fn update_at<T: Clone>(arr: &[T], index: usize, item: T) -> Box<[T]> {
    assert!(
        index < arr.len(),
        "update_at: index {} out of range 0..{}",
        index,
        arr.len()
    );
    let mut out = arr.to_vec();
    out[index] = item;
    out.into_boxed_slice()
}

/// Copy of the elements in `range`.
pub(crate) fn slice<T: Clone>(arr: &[T], range: Range<usize>) -> Box<[T]> {
    assert!(
        range.start <= range.end && range.end <= arr.len(),
        "slice: range {}..{} out of range for length {}",
        range.start,
        range.end,
        arr.len()
    );
    arr[range].to_vec().into_boxed_slice()
}

/// The elements below `cut` followed by `item`: the low side of a two-way
/// split with the boundary child replaced. `cut` is clamped to the array.
pub(crate) fn low_slice<T: Clone>(cut: usize, arr: &[T], item: T) -> Box<[T]> {
    let cut = cut.min(arr.len());
    let mut out = Vec::with_capacity(cut + 1);
    out.extend_from_slice(&arr[..cut]);
    out.push(item);
    out.into_boxed_slice()
}

/// `item` followed by the elements above `cut`: the high side of a two-way
/// split with the boundary child replaced. `cut` is clamped to the array.
pub(crate) fn high_slice<T: Clone>(cut: usize, arr: &[T], item: T) -> Box<[T]> {
    let tail = (cut + 1).min(arr.len());
    let mut out = Vec::with_capacity(1 + arr.len() - tail);
    out.push(item);
    out.extend_from_slice(&arr[tail..]);
    out.into_boxed_slice()
}
