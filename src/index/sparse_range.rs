//! Sorted, disjoint sets of half-open row ranges.

use std::ops::Range;

use roaring::RoaringBitmap;

/// A normalized set of disjoint, sorted row ranges `[start, end)`.
///
/// Adjacent and overlapping inputs are merged, empty ranges dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SparseRange {
    ranges: Vec<Range<u32>>,
}

impl SparseRange {
    /// Empty set (matches no rows).
    #[must_use]
    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Set holding a single range.
    #[must_use]
    pub fn from_range(range: Range<u32>) -> Self {
        Self::from_ranges(vec![range])
    }

    /// Construct from raw ranges and normalize (sort + merge overlaps/adjacents).
    #[must_use]
    pub fn from_ranges(mut ranges: Vec<Range<u32>>) -> Self {
        ranges.retain(|range| range.start < range.end);
        ranges.sort_by_key(|range| range.start);
        let mut out: Vec<Range<u32>> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match out.last_mut() {
                Some(last) if last.end >= range.start => last.end = last.end.max(range.end),
                _ => out.push(range),
            }
        }
        Self { ranges: out }
    }

    /// Rows set in `bitmap`, grouped into maximal runs.
    #[must_use]
    pub fn from_bitmap(bitmap: &RoaringBitmap) -> Self {
        let mut ranges: Vec<Range<u32>> = Vec::new();
        for row in bitmap {
            match ranges.last_mut() {
                Some(last) if last.end == row => last.end += 1,
                _ => ranges.push(row..row + 1),
            }
        }
        Self { ranges }
    }

    /// Bitmap of all rows in the set.
    #[must_use]
    pub fn to_bitmap(&self) -> RoaringBitmap {
        let mut bitmap = RoaringBitmap::new();
        for range in &self.ranges {
            bitmap.insert_range(range.clone());
        }
        bitmap
    }

    /// Whether the set has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of rows covered.
    #[must_use]
    pub fn span_size(&self) -> u64 {
        self.ranges
            .iter()
            .map(|range| u64::from(range.end - range.start))
            .sum()
    }

    /// Normalized ranges.
    #[must_use]
    pub fn ranges(&self) -> &[Range<u32>] {
        &self.ranges
    }

    /// One past the last row, if any.
    #[must_use]
    pub fn end(&self) -> Option<u32> {
        self.ranges.last().map(|range| range.end)
    }

    /// Whether `row` is covered.
    #[must_use]
    pub fn contains(&self, row: u32) -> bool {
        let idx = self.ranges.partition_point(|range| range.end <= row);
        self.ranges
            .get(idx)
            .is_some_and(|range| range.start <= row)
    }

    /// Intersection with another set.
    #[must_use]
    pub fn intersection(&self, other: &SparseRange) -> SparseRange {
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        while i < self.ranges.len() && j < other.ranges.len() {
            let (a, b) = (&self.ranges[i], &other.ranges[j]);
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            if start < end {
                out.push(start..end);
            }
            if a.end < b.end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { ranges: out }
    }

    /// Narrows `self` in place to its intersection with `other`.
    pub fn intersect_with(&mut self, other: &SparseRange) {
        *self = self.intersection(other);
    }

    /// Union with another set.
    #[must_use]
    pub fn union(&self, other: &SparseRange) -> SparseRange {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut all = self.ranges.clone();
        all.extend(other.ranges.iter().cloned());
        SparseRange::from_ranges(all)
    }

    /// Rows of `self` not covered by `other`.
    #[must_use]
    pub fn difference(&self, other: &SparseRange) -> SparseRange {
        let mut out = Vec::new();
        let mut j = 0;
        for range in &self.ranges {
            let mut start = range.start;
            while j < other.ranges.len() && other.ranges[j].end <= start {
                j += 1;
            }
            let mut k = j;
            while start < range.end {
                match other.ranges.get(k) {
                    Some(cut) if cut.start < range.end => {
                        if cut.start > start {
                            out.push(start..cut.start);
                        }
                        start = start.max(cut.end);
                        k += 1;
                    }
                    _ => {
                        out.push(start..range.end);
                        break;
                    }
                }
            }
        }
        Self { ranges: out }
    }

    /// Consuming iterator handing out contiguous pieces of bounded size.
    #[must_use]
    pub fn into_range_iter(self) -> SparseRangeIterator {
        SparseRangeIterator {
            ranges: self.ranges,
            idx: 0,
            offset: 0,
        }
    }
}

impl From<Range<u32>> for SparseRange {
    fn from(range: Range<u32>) -> Self {
        SparseRange::from_range(range)
    }
}

/// Walks a [`SparseRange`] in chunks of at most a given number of rows.
#[derive(Clone, Debug)]
pub struct SparseRangeIterator {
    ranges: Vec<Range<u32>>,
    idx: usize,
    offset: u32,
}

impl SparseRangeIterator {
    /// Whether rows remain.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.idx < self.ranges.len()
    }

    /// Next contiguous piece of at most `max_rows` rows.
    pub fn next_range(&mut self, max_rows: u32) -> Option<Range<u32>> {
        let range = self.ranges.get(self.idx)?;
        let start = range.start.max(self.offset);
        let end = range.end.min(start.saturating_add(max_rows.max(1)));
        if end >= range.end {
            self.idx += 1;
        }
        self.offset = end;
        Some(start..end)
    }

    /// Up to `max_rows` rows, possibly spanning several ranges.
    pub fn next_ranges(&mut self, max_rows: u32) -> SparseRange {
        let mut remaining = max_rows.max(1);
        let mut out = Vec::new();
        while remaining > 0 {
            let Some(piece) = self.next_range(remaining) else {
                break;
            };
            remaining -= piece.end - piece.start;
            out.push(piece);
        }
        SparseRange { ranges: out }
    }
}
