//! Common fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use arrow::{
    array::{ArrayRef, AsArray, Float64Array, Int32Array, Int64Array, StringArray},
    datatypes::{Float64Type, Int32Type},
    record_batch::RecordBatch,
};
use segscan::{
    index::{BitmapIndexIterator, PageBloomFilter, PageZoneMap, ZoneMapDetail},
    Column, ColumnId, Field, FieldType, IndexError, IndexKind, MemSegment, ScanError, Schema,
    SegmentIterator, SegmentSource, SparseRange,
};

pub const ID: ColumnId = 0;
pub const PRICE: ColumnId = 1;
pub const NAME: ColumnId = 2;
pub const CODE: ColumnId = 3;
pub const SCORE: ColumnId = 4;

/// One generated row, kept alongside the segment for naive evaluation.
#[derive(Clone, Debug)]
pub struct Row {
    pub id: i32,
    pub price: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub score: Option<f64>,
}

pub fn schema() -> Schema {
    Schema::try_new(vec![
        Field::new(ID, "id", FieldType::Int32, false),
        Field::new(PRICE, "price", FieldType::Int64, true),
        Field::new(NAME, "name", FieldType::Varchar, true),
        Field::new(CODE, "code", FieldType::Char { len: 3 }, true),
        Field::new(SCORE, "score", FieldType::Float64, true),
    ])
    .expect("schema should be valid")
}

/// Rows with clustered ids and prices so zone maps have something to prune.
pub fn generate_rows(rng: &mut fastrand::Rng, count: usize) -> Vec<Row> {
    const NAMES: [&str; 6] = ["ash", "birch", "cedar", "elm", "fir", "oak"];
    const CODES: [&str; 4] = ["a", "bb", "ccc", "dd"];
    (0..count)
        .map(|i| Row {
            id: i as i32,
            price: (rng.u8(..) % 8 != 0).then(|| (i as i64) * 10 + rng.i64(0..10)),
            name: (rng.u8(..) % 5 != 0).then(|| NAMES[rng.usize(..NAMES.len())].to_owned()),
            code: (rng.u8(..) % 6 != 0).then(|| CODES[rng.usize(..CODES.len())].to_owned()),
            score: (rng.u8(..) % 7 != 0).then(|| rng.f64() * 100.0),
        })
        .collect()
}

pub fn to_batch(rows: &[Row]) -> RecordBatch {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int32Array::from_iter_values(rows.iter().map(|row| row.id))),
        Arc::new(Int64Array::from_iter(rows.iter().map(|row| row.price))),
        Arc::new(StringArray::from_iter(rows.iter().map(|row| row.name.as_deref()))),
        Arc::new(StringArray::from_iter(rows.iter().map(|row| row.code.as_deref()))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|row| row.score))),
    ];
    RecordBatch::try_new(schema().to_arrow(), columns).expect("batch should match schema")
}

/// Segment with zone maps everywhere, bloom filters on `id` and `name`, and
/// bitmap indexes on `name` and `code`.
pub fn indexed_segment(rows: &[Row], page_size: u32) -> MemSegment {
    MemSegment::builder(schema())
        .page_size(page_size)
        .bloom_filter(ID, 0.01)
        .bloom_filter(NAME, 0.01)
        .bitmap_index(NAME)
        .bitmap_index(CODE)
        .build(&[to_batch(rows)])
        .expect("segment should build")
}

/// Ids of every emitted row, in order.
pub fn scan_ids(iter: SegmentIterator) -> Vec<i32> {
    let mut ids = Vec::new();
    for chunk in iter {
        let chunk = chunk.expect("chunk");
        let column = chunk
            .column_by_name("id")
            .expect("projection should include id");
        ids.extend(column.as_primitive::<Int32Type>().values().iter().copied());
    }
    ids
}

/// Scores of every emitted row, in order.
pub fn scan_scores(iter: SegmentIterator) -> Vec<Option<f64>> {
    let mut scores = Vec::new();
    for chunk in iter {
        let chunk = chunk.expect("chunk");
        let column = chunk
            .column_by_name("score")
            .expect("projection should include score");
        scores.extend(column.as_primitive::<Float64Type>().iter());
    }
    scores
}

/// Wraps a segment to count reads and inject index or decode failures.
#[derive(Debug)]
pub struct InstrumentedSegment {
    inner: MemSegment,
    corrupt: Vec<IndexKind>,
    undecodable: Option<ColumnId>,
    segment_zone_map_lost: bool,
    reads: AtomicUsize,
}

impl InstrumentedSegment {
    pub fn new(inner: MemSegment) -> Self {
        Self {
            inner,
            corrupt: Vec::new(),
            undecodable: None,
            segment_zone_map_lost: false,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn corrupt(mut self, kind: IndexKind) -> Self {
        self.corrupt.push(kind);
        self
    }

    pub fn undecodable(mut self, column: ColumnId) -> Self {
        self.undecodable = Some(column);
        self
    }

    /// Drops only the segment-level zone map; page zone maps stay readable.
    pub fn without_segment_zone_map(mut self) -> Self {
        self.segment_zone_map_lost = true;
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self, column: ColumnId, kind: IndexKind) -> Result<(), IndexError> {
        if self.corrupt.contains(&kind) {
            return Err(IndexError::corrupt(column, kind, "checksum mismatch"));
        }
        Ok(())
    }
}

impl SegmentSource for InstrumentedSegment {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn num_rows(&self) -> u32 {
        self.inner.num_rows()
    }

    fn read_column(&self, column: ColumnId, ranges: &SparseRange) -> Result<Column, ScanError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.undecodable == Some(column) {
            return Err(ScanError::Decode {
                column,
                reason: "truncated page".to_owned(),
            });
        }
        self.inner.read_column(column, ranges)
    }

    fn segment_zone_map(&self, column: ColumnId) -> Result<ZoneMapDetail, IndexError> {
        self.check(column, IndexKind::ZoneMap)?;
        if self.segment_zone_map_lost {
            return Err(IndexError::Absent {
                column,
                kind: IndexKind::ZoneMap,
            });
        }
        self.inner.segment_zone_map(column)
    }

    fn page_zone_maps(&self, column: ColumnId) -> Result<Vec<PageZoneMap>, IndexError> {
        self.check(column, IndexKind::ZoneMap)?;
        self.inner.page_zone_maps(column)
    }

    fn bloom_filters(&self, column: ColumnId) -> Result<Vec<PageBloomFilter>, IndexError> {
        self.check(column, IndexKind::BloomFilter)?;
        self.inner.bloom_filters(column)
    }

    fn bitmap_index(&self, column: ColumnId) -> Result<BitmapIndexIterator, IndexError> {
        self.check(column, IndexKind::Bitmap)?;
        self.inner.bitmap_index(column)
    }
}
