//! Closed integer intervals, interval sets and interval maps
//!
//! Row and column ranges in a table are always expressed as closed intervals
//! `[lower, upper]`. An [`IntervalSet`] keeps a normalized list of disjoint,
//! non-adjacent intervals; an [`IntervalMap`] associates non-overlapping
//! intervals with a value and answers point and range lookups.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A closed interval `[lower, upper]` of indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Interval {
    lower: usize,
    upper: usize,
}

impl Interval {
    /// Create a new interval, rejecting inverted bounds
    pub fn new(lower: usize, upper: usize) -> Result<Self> {
        if lower > upper {
            return Err(Error::InvalidArgument(format!(
                "inverted interval [{lower}, {upper}]"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Interval starting at `start` and holding `len` indices; `len` must be positive
    pub fn with_len(start: usize, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidArgument("empty interval".into()));
        }
        let upper = start
            .checked_add(len - 1)
            .ok_or_else(|| Error::Overflow(format!("interval starting at {start} with {len} indices")))?;
        Ok(Self { lower: start, upper })
    }

    /// Single index interval
    pub fn point(idx: usize) -> Self {
        Self { lower: idx, upper: idx }
    }

    /// Lower bound (inclusive)
    pub fn lower(&self) -> usize {
        self.lower
    }

    /// Upper bound (inclusive)
    pub fn upper(&self) -> usize {
        self.upper
    }

    /// Number of indices covered
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.upper - self.lower + 1
    }

    /// Whether `idx` lies inside the interval
    pub fn contains(&self, idx: usize) -> bool {
        self.lower <= idx && idx <= self.upper
    }

    /// Intersection of two intervals, if they overlap
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        (lower <= upper).then_some(Interval { lower, upper })
    }

    /// Whether the interval fits inside `[0, len-1]`
    pub fn fits(&self, len: usize) -> bool {
        self.upper < len
    }

    /// Shift both bounds right by `by`
    pub fn shifted(&self, by: usize) -> Interval {
        Interval {
            lower: self.lower + by,
            upper: self.upper + by,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

/// A normalized set of indices stored as sorted, disjoint, non-adjacent intervals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every index of `interval`, merging with overlapping or adjacent entries
    pub fn insert(&mut self, interval: Interval) {
        let mut merged = interval;
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);
        let mut placed = false;
        for &iv in &self.intervals {
            if iv.upper.saturating_add(1) < merged.lower {
                kept.push(iv);
            } else if merged.upper.saturating_add(1) < iv.lower {
                if !placed {
                    kept.push(merged);
                    placed = true;
                }
                kept.push(iv);
            } else {
                merged.lower = merged.lower.min(iv.lower);
                merged.upper = merged.upper.max(iv.upper);
            }
        }
        if !placed {
            kept.push(merged);
        }
        self.intervals = kept;
    }

    /// Remove every index of `interval`, splitting entries that straddle it
    pub fn erase(&mut self, interval: Interval) {
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);
        for &iv in &self.intervals {
            if iv.intersect(&interval).is_none() {
                kept.push(iv);
                continue;
            }
            if iv.lower < interval.lower {
                kept.push(Interval {
                    lower: iv.lower,
                    upper: interval.lower - 1,
                });
            }
            if iv.upper > interval.upper {
                kept.push(Interval {
                    lower: interval.upper + 1,
                    upper: iv.upper,
                });
            }
        }
        self.intervals = kept;
    }

    /// Whether `idx` is in the set
    pub fn contains(&self, idx: usize) -> bool {
        self.intervals.iter().any(|iv| iv.contains(idx))
    }

    /// Whether the set holds no index
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of indices covered
    pub fn index_count(&self) -> usize {
        self.intervals.iter().map(Interval::len).sum()
    }

    /// Largest index in the set
    pub fn max(&self) -> Option<usize> {
        self.intervals.last().map(Interval::upper)
    }

    /// Iterate over intervals in increasing order
    pub fn iter(&self) -> impl Iterator<Item = &Interval> + '_ {
        self.intervals.iter()
    }
}

/// Map from non-overlapping intervals to values
#[derive(Debug, Clone)]
pub struct IntervalMap<V> {
    entries: BTreeMap<usize, (Interval, V)>,
}

impl<V> Default for IntervalMap<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> IntervalMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `interval`; overlapping an existing entry is an error
    pub fn insert(&mut self, interval: Interval, value: V) -> Result<()> {
        if self.range(interval).next().is_some() {
            return Err(Error::InvalidArgument(format!(
                "interval {interval} overlaps an existing entry"
            )));
        }
        self.entries.insert(interval.lower, (interval, value));
        Ok(())
    }

    /// Entry containing `idx`
    pub fn find(&self, idx: usize) -> Option<(Interval, &V)> {
        self.entries
            .range(..=idx)
            .next_back()
            .filter(|(_, (iv, _))| iv.contains(idx))
            .map(|(_, (iv, v))| (*iv, v))
    }

    /// Entries intersecting `interval`, in increasing order
    pub fn range(&self, interval: Interval) -> impl Iterator<Item = (Interval, &V)> + '_ {
        // the entry starting before `interval` may still reach into it
        let first = self
            .entries
            .range(..=interval.lower)
            .next_back()
            .map_or(interval.lower, |(&lower, _)| lower);
        self.entries
            .range(first..=interval.upper)
            .filter(move |(_, (iv, _))| iv.intersect(&interval).is_some())
            .map(|(_, (iv, v))| (*iv, v))
    }

    /// All entries in increasing order
    pub fn iter(&self) -> impl Iterator<Item = (Interval, &V)> + '_ {
        self.entries.values().map(|(iv, v)| (*iv, v))
    }

    /// Remove and return every entry in increasing order, leaving the map empty
    pub fn drain(&mut self) -> impl Iterator<Item = (Interval, V)> {
        std::mem::take(&mut self.entries).into_values()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use test_case::test_case;

    fn iv(lower: usize, upper: usize) -> Interval {
        Interval::new(lower, upper).unwrap()
    }

    fn collect(set: &IntervalSet) -> Vec<(usize, usize)> {
        set.iter().map(|i| (i.lower(), i.upper())).collect()
    }

    #[test]
    fn test_interval_rejects_inverted() {
        assert!(Interval::new(3, 2).is_err());
        assert!(Interval::with_len(4, 0).is_err());
        assert_eq!(Interval::with_len(4, 3).unwrap(), iv(4, 6));
    }

    #[test]
    fn test_interval_intersect() {
        assert_eq!(iv(0, 5).intersect(&iv(3, 9)), Some(iv(3, 5)));
        assert_eq!(iv(0, 2).intersect(&iv(3, 9)), None);
        assert_eq!(iv(4, 4).intersect(&iv(0, 9)), Some(iv(4, 4)));
    }

    #[test]
    fn test_set_insert_merges_overlapping_and_adjacent() {
        let mut set = IntervalSet::new();
        set.insert(iv(10, 12));
        set.insert(iv(0, 2));
        set.insert(iv(5, 6));
        assert_eq!(collect(&set), vec![(0, 2), (5, 6), (10, 12)]);

        set.insert(iv(3, 4));
        assert_eq!(collect(&set), vec![(0, 6), (10, 12)]);

        set.insert(iv(6, 11));
        assert_eq!(collect(&set), vec![(0, 12)]);
        assert_eq!(set.index_count(), 13);
    }

    #[test]
    fn test_set_erase_splits() {
        let mut set = IntervalSet::new();
        set.insert(iv(0, 9));
        set.erase(iv(3, 4));
        assert_eq!(collect(&set), vec![(0, 2), (5, 9)]);

        set.erase(iv(0, 0));
        set.erase(iv(9, 20));
        assert_eq!(collect(&set), vec![(1, 2), (5, 8)]);

        set.erase(iv(0, 100));
        assert!(set.is_empty());
    }

    #[test]
    fn test_map_find_and_range() {
        let mut map = IntervalMap::new();
        map.insert(iv(0, 1), 'a').unwrap();
        map.insert(iv(2, 4), 'b').unwrap();
        map.insert(iv(5, 5), 'c').unwrap();

        assert_eq!(map.find(3), Some((iv(2, 4), &'b')));
        assert_eq!(map.find(6), None);

        let hits: Vec<char> = map.range(iv(1, 4)).map(|(_, v)| *v).collect();
        assert_eq!(hits, vec!['a', 'b']);

        let hits: Vec<char> = map.range(iv(3, 9)).map(|(_, v)| *v).collect();
        assert_eq!(hits, vec!['b', 'c']);
    }

    #[test]
    fn test_map_rejects_overlap() {
        let mut map = IntervalMap::new();
        map.insert(iv(0, 3), 1).unwrap();
        assert!(map.insert(iv(3, 5), 2).is_err());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_map_drain_empties() {
        let mut map = IntervalMap::new();
        map.insert(iv(0, 3), 1).unwrap();
        map.insert(iv(4, 5), 2).unwrap();
        let drained: Vec<_> = map.drain().collect();
        assert_eq!(drained, vec![(iv(0, 3), 1), (iv(4, 5), 2)]);
        assert!(map.is_empty());
    }

    #[test_case(iv(0, 3), 4, true)]
    #[test_case(iv(0, 3), 3, false)]
    #[test_case(iv(2, 2), 3, true)]
    fn test_interval_fits(interval: Interval, len: usize, fits: bool) {
        assert_eq!(interval.fits(len), fits);
    }

    proptest! {
        #[test]
        fn prop_set_matches_index_model(
            ops in prop::collection::vec((any::<bool>(), 0usize..40, 0usize..6), 1..30)
        ) {
            let mut set = IntervalSet::new();
            let mut model = BTreeSet::new();
            for (insert, lower, len) in ops {
                let interval = Interval::new(lower, lower + len).unwrap();
                if insert {
                    set.insert(interval);
                    model.extend(lower..=lower + len);
                } else {
                    set.erase(interval);
                    for i in lower..=lower + len {
                        model.remove(&i);
                    }
                }
            }
            prop_assert_eq!(set.index_count(), model.len());
            prop_assert_eq!(set.max(), model.iter().next_back().copied());
            for i in 0..50 {
                prop_assert_eq!(set.contains(i), model.contains(&i));
            }
            // stored intervals stay disjoint and never touch
            let parts: Vec<_> = set.iter().copied().collect();
            for pair in parts.windows(2) {
                prop_assert!(pair[0].upper() + 1 < pair[1].lower());
            }
        }
    }
}
