#![forbid(unsafe_code)]
//! Closed numeric intervals and merged interval sets.
//!
//! Selection strings such as `"10-20,25,30-"` pick byte offsets, flog pair
//! indices or blocks out of a caller-supplied universe. A [`RangeSet`] keeps
//! its intervals sorted, disjoint and non-adjacent after every insertion, so
//! iteration never visits an element twice.

use pmp_error::{PmpError, Result};
use pmp_types::parse_size;
use serde::Serialize;
use tracing::debug;

// ── Range ───────────────────────────────────────────────────────────────────

/// Closed interval `[first, last]`; `first <= last` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Range {
    first: u64,
    last: u64,
}

impl Range {
    /// Build an interval, swapping the bounds if they are reversed.
    #[must_use]
    pub const fn new(a: u64, b: u64) -> Self {
        if a <= b {
            Self { first: a, last: b }
        } else {
            Self { first: b, last: a }
        }
    }

    #[must_use]
    pub const fn point(n: u64) -> Self {
        Self { first: n, last: n }
    }

    #[must_use]
    pub const fn first(&self) -> u64 {
        self.first
    }

    #[must_use]
    pub const fn last(&self) -> u64 {
        self.last
    }

    #[must_use]
    pub const fn contains(&self, n: u64) -> bool {
        self.first <= n && n <= self.last
    }

    /// Number of elements, saturating at `u64::MAX` for the full domain.
    #[must_use]
    pub const fn span(&self) -> u64 {
        (self.last - self.first).saturating_add(1)
    }

    /// Clip both bounds into `universe`.
    #[must_use]
    pub fn clamp_to(self, universe: Self) -> Self {
        Self {
            first: self.first.clamp(universe.first, universe.last),
            last: self.last.clamp(universe.first, universe.last),
        }
    }

    /// Overlapping or directly adjacent.
    #[must_use]
    pub const fn touches(&self, other: &Self) -> bool {
        self.first <= other.last.saturating_add(1) && other.first <= self.last.saturating_add(1)
    }
}

// ── RangeSet ────────────────────────────────────────────────────────────────

/// Sorted, disjoint, non-adjacent intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: Vec<Range>,
}

impl RangeSet {
    #[must_use]
    pub const fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// The whole universe, used when no selection was given.
    #[must_use]
    pub fn full(universe: Range) -> Self {
        Self {
            ranges: vec![universe],
        }
    }

    /// Parse a comma-separated selection bounded by `universe`.
    ///
    /// Tokens are `n-m`, `-m`, `n-` or `n`; numbers accept `K`/`M`/`G`/`T`/`P`
    /// suffixes. Interval bounds are clipped into `universe`, a single point
    /// outside it is an error. Any malformed or empty token fails the whole
    /// parse; callers with no selection at all use [`RangeSet::full`].
    pub fn parse(selection: &str, universe: Range) -> Result<Self> {
        let mut set = Self::new();
        for token in selection.split(',').map(str::trim) {
            let range = parse_token(token, universe)?;
            set.insert(range.clamp_to(universe));
        }
        debug!(
            target: "pmp::range",
            selection,
            first = universe.first,
            last = universe.last,
            intervals = set.len(),
            "selection_parsed"
        );
        Ok(set)
    }

    /// Merge-insert `range`, absorbing every interval it overlaps or touches.
    pub fn insert(&mut self, range: Range) {
        let start = self
            .ranges
            .partition_point(|r| r.last.saturating_add(1) < range.first);
        let end = self
            .ranges
            .partition_point(|r| r.first <= range.last.saturating_add(1));

        let merged = if start < end {
            Range {
                first: range.first.min(self.ranges[start].first),
                last: range.last.max(self.ranges[end - 1].last),
            }
        } else {
            range
        };
        self.ranges.splice(start..end, std::iter::once(merged));
    }

    #[must_use]
    pub fn contains(&self, n: u64) -> bool {
        let idx = self.ranges.partition_point(|r| r.last < n);
        self.ranges.get(idx).is_some_and(|r| r.contains(n))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of disjoint intervals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Range> {
        self.ranges.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Range] {
        &self.ranges
    }

    /// Every selected element in ascending order.
    pub fn elements(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|r| r.first..=r.last)
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a Range;
    type IntoIter = std::slice::Iter<'a, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

impl Extend<Range> for RangeSet {
    fn extend<I: IntoIterator<Item = Range>>(&mut self, iter: I) {
        for range in iter {
            self.insert(range);
        }
    }
}

impl FromIterator<Range> for RangeSet {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

// ── Token parsing ───────────────────────────────────────────────────────────

fn parse_token(token: &str, universe: Range) -> Result<Range> {
    let number = |s: &str| {
        parse_size(s.trim()).map_err(|_| PmpError::RangeParse {
            token: token.to_owned(),
        })
    };

    match token.split_once('-') {
        None if token.is_empty() => Err(PmpError::RangeParse {
            token: token.to_owned(),
        }),
        None => {
            let n = number(token)?;
            if !universe.contains(n) {
                return Err(PmpError::OutOfUniverse {
                    value: n,
                    first: universe.first,
                    last: universe.last,
                });
            }
            Ok(Range::point(n))
        }
        Some((lo, hi)) => match (lo.trim(), hi.trim()) {
            ("", "") => Err(PmpError::RangeParse {
                token: token.to_owned(),
            }),
            ("", hi) => Ok(Range::new(universe.first, number(hi)?)),
            (lo, "") => Ok(Range::new(number(lo)?, universe.last)),
            (lo, hi) => Ok(Range::new(number(lo)?, number(hi)?)),
        },
    }
}
