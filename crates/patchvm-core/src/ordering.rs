//! Ordering of release directory names.
//!
//! Versions are compared segment by segment after splitting on `.`. Each
//! segment is compared as text left-padded with `*` to a common width, which
//! ranks `10` above `9` without parsing numbers. A segment ending with
//! `-SNAPSHOT` sorts below the release segment with the same stem, and a
//! missing trailing segment sorts below any present one, so `1.0 < 1.0.1`
//! and `1.0.5-SNAPSHOT < 1.0.5 < 1.0.5.1`.
//!
//! The padding character sorts below every ASCII digit and letter as well as
//! `-` and `_`. Identifiers built from those characters get a total order.

use std::cmp::Ordering;
use std::iter;

pub const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

const WILDCARD: char = '*';
const SNAPSHOT_MARKER: char = '-';
const RELEASE_MARKER: char = '_';

/// Compare two version identifiers.
#[must_use]
pub fn compare(left: &str, right: &str) -> Ordering {
    let left: Vec<&str> = left.split('.').collect();
    let right: Vec<&str> = right.split('.').collect();
    let width = left.len().max(right.len());

    (0..width)
        .map(|index| {
            let left = segment_key(left.get(index).copied());
            let right = segment_key(right.get(index).copied());
            compare_padded(&left, &right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Returns `true` when `candidate` sorts strictly after `current`.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(current, candidate).is_lt()
}

#[must_use]
pub fn is_snapshot(version: &str) -> bool {
    version.ends_with(SNAPSHOT_SUFFIX)
}

/// Pick the greatest version of `versions`, or `None` when it is empty.
pub fn latest<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|left, right| compare(left, right))
}

fn segment_key(segment: Option<&str>) -> String {
    let segment = segment.unwrap_or("*");
    match segment.strip_suffix(SNAPSHOT_SUFFIX) {
        Some(stem) => format!("{stem}{SNAPSHOT_MARKER}"),
        None => format!("{segment}{RELEASE_MARKER}"),
    }
}

fn compare_padded(left: &str, right: &str) -> Ordering {
    let left_len = left.chars().count();
    let right_len = right.chars().count();
    let width = left_len.max(right_len);

    let left = iter::repeat_n(WILDCARD, width - left_len).chain(left.chars());
    let right = iter::repeat_n(WILDCARD, width - right_len).chain(right.chars());
    left.cmp(right)
}
