//! Segment access and the pull-based scan driver.
//!
//! A segment is an immutable, columnar unit of rows. Storage exposes it to the
//! scan path through [`SegmentSource`]: column materialization over row ranges
//! plus the three pushdown indexes. [`SegmentIterator`] drives one scan:
//!
//! 1. prune the candidate row ranges with zone maps, bloom filters and bitmap
//!    indexes;
//! 2. materialize predicate columns chunk by chunk and evaluate the remaining
//!    predicates;
//! 3. materialize the rest of the projection only for chunks that still hold
//!    rows and emit the filtered Arrow batch.

mod iterator;
mod mem;
mod options;

use std::fmt;

pub use iterator::{ScanStats, SegmentIterator};
pub use mem::{MemSegment, MemSegmentBuilder};
pub use options::{SegmentReadOptions, DEFAULT_CHUNK_SIZE};

use crate::{
    column::Column,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, PageBloomFilter, PageZoneMap, SparseRange, ZoneMapDetail},
    types::{ColumnId, Schema},
};

/// Storage-side contract consumed by the scan path.
///
/// Index accessors fail with [`IndexError::Absent`] when the index was not
/// built for the column; the iterator treats that as "skip this stage".
pub trait SegmentSource: Send + Sync + fmt::Debug {
    /// Stored schema of the segment.
    fn schema(&self) -> &Schema;

    /// Total rows in the segment.
    fn num_rows(&self) -> u32;

    /// Materializes `column` for the rows in `ranges`, in row order.
    ///
    /// Failures are reported as [`ScanError::Decode`].
    fn read_column(&self, column: ColumnId, ranges: &SparseRange) -> Result<Column, ScanError>;

    /// Statistics over the whole segment.
    fn segment_zone_map(&self, column: ColumnId) -> Result<ZoneMapDetail, IndexError>;

    /// Per-page statistics, pages in row order.
    fn page_zone_maps(&self, column: ColumnId) -> Result<Vec<PageZoneMap>, IndexError>;

    /// Per-page bloom filters, pages in row order.
    fn bloom_filters(&self, column: ColumnId) -> Result<Vec<PageBloomFilter>, IndexError>;

    /// Fresh cursor over the column's bitmap index.
    fn bitmap_index(&self, column: ColumnId) -> Result<BitmapIndexIterator, IndexError>;
}
