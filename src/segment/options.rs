//! Read options for a single segment scan.

use std::sync::Arc;

use crate::{index::SparseRange, memory::MemTracker, predicate::ColumnPredicate};

/// Rows per chunk when the caller does not choose.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// What to read from a segment and which pushdown stages may run.
///
/// Predicates are conjunctive: a row is emitted only when every predicate
/// passes.
#[derive(Clone, Debug)]
pub struct SegmentReadOptions {
    pub(crate) predicates: Vec<Arc<dyn ColumnPredicate>>,
    pub(crate) row_ranges: Option<SparseRange>,
    pub(crate) enable_zone_map_pushdown: bool,
    pub(crate) enable_bloom_filter_pushdown: bool,
    pub(crate) enable_bitmap_pushdown: bool,
    pub(crate) pushdown_mandatory: bool,
    pub(crate) chunk_size: usize,
    pub(crate) branchless: bool,
    pub(crate) mem_tracker: Option<Arc<MemTracker>>,
}

impl Default for SegmentReadOptions {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            row_ranges: None,
            enable_zone_map_pushdown: true,
            enable_bloom_filter_pushdown: true,
            enable_bitmap_pushdown: true,
            pushdown_mandatory: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            branchless: true,
            mem_tracker: None,
        }
    }
}

impl SegmentReadOptions {
    /// Replaces the predicate conjunction.
    #[must_use]
    pub fn with_predicates(self, predicates: Vec<Arc<dyn ColumnPredicate>>) -> Self {
        Self { predicates, ..self }
    }

    /// Adds one predicate to the conjunction.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn ColumnPredicate>) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Restricts the scan to `ranges` (row ids within the segment).
    #[must_use]
    pub fn with_row_ranges(self, ranges: SparseRange) -> Self {
        Self {
            row_ranges: Some(ranges),
            ..self
        }
    }

    /// Toggles zone map pruning.
    #[must_use]
    pub fn with_zone_map_pushdown(self, enable_zone_map_pushdown: bool) -> Self {
        Self {
            enable_zone_map_pushdown,
            ..self
        }
    }

    /// Toggles bloom filter pruning.
    #[must_use]
    pub fn with_bloom_filter_pushdown(self, enable_bloom_filter_pushdown: bool) -> Self {
        Self {
            enable_bloom_filter_pushdown,
            ..self
        }
    }

    /// Toggles bitmap index pruning.
    #[must_use]
    pub fn with_bitmap_pushdown(self, enable_bitmap_pushdown: bool) -> Self {
        Self {
            enable_bitmap_pushdown,
            ..self
        }
    }

    /// When set, an index error during pruning fails the scan instead of
    /// disabling the stage.
    #[must_use]
    pub fn with_pushdown_mandatory(self, pushdown_mandatory: bool) -> Self {
        Self {
            pushdown_mandatory,
            ..self
        }
    }

    /// Maximum rows per emitted chunk, clamped to `1..=u16::MAX`.
    #[must_use]
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, usize::from(u16::MAX)),
            ..self
        }
    }

    /// Toggles index compaction for single-predicate chunks.
    #[must_use]
    pub fn with_branchless(self, branchless: bool) -> Self {
        Self { branchless, ..self }
    }

    /// Charges materialized columns and converted predicates to `tracker`.
    #[must_use]
    pub fn with_mem_tracker(self, tracker: Arc<MemTracker>) -> Self {
        Self {
            mem_tracker: Some(tracker),
            ..self
        }
    }

    /// Predicates in the conjunction.
    #[must_use]
    pub fn predicates(&self) -> &[Arc<dyn ColumnPredicate>] {
        &self.predicates
    }

    /// Effective rows per chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Whether index errors fail the scan.
    #[must_use]
    pub fn pushdown_mandatory(&self) -> bool {
        self.pushdown_mandatory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_every_stage() {
        let options = SegmentReadOptions::default();
        assert!(options.enable_zone_map_pushdown);
        assert!(options.enable_bloom_filter_pushdown);
        assert!(options.enable_bitmap_pushdown);
        assert!(!options.pushdown_mandatory());
        assert!(options.branchless);
        assert_eq!(options.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert!(options.predicates().is_empty());
    }

    #[test]
    fn chunk_size_is_clamped() {
        assert_eq!(SegmentReadOptions::default().with_chunk_size(0).chunk_size(), 1);
        assert_eq!(
            SegmentReadOptions::default()
                .with_chunk_size(1 << 20)
                .chunk_size(),
            usize::from(u16::MAX)
        );
    }
}
