use std::{collections::HashMap, ops::Range, sync::Arc};

use arrow::{
    array::{new_empty_array, Array, ArrayRef, AsArray, BinaryArray},
    compute::{concat, concat_batches},
    record_batch::RecordBatch,
};

use super::SegmentSource;
use crate::{
    column::{Column, DataColumn, PhysicalColumn},
    error::{IndexError, IndexKind, ScanError},
    index::{
        BitmapIndex, BitmapIndexIterator, PageBloomFilter, PageZoneMap, SipBloomFilter,
        SparseRange, ZoneMapDetail,
    },
    observability::{log_info, log_warn},
    types::{ColumnId, Field, FieldType, Schema},
};

/// Rows per page when the builder is not told otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 1024;

/// Indexes kept for one column.
#[derive(Debug, Default)]
struct ColumnIndexes {
    segment_zone_map: Option<ZoneMapDetail>,
    page_zone_maps: Vec<PageZoneMap>,
    bloom_filters: Option<Vec<PageBloomFilter>>,
    bitmap: Option<Arc<BitmapIndex>>,
}

/// Segment held in memory as Arrow arrays, with indexes built on ingest.
///
/// Zone maps are always built, per page and for the whole segment. Bloom
/// filters and bitmap indexes are opt-in per column through
/// [`MemSegmentBuilder`]. CHAR values are stored zero padded to their declared
/// width.
#[derive(Debug)]
pub struct MemSegment {
    schema: Schema,
    columns: Vec<ArrayRef>,
    num_rows: u32,
    page_size: u32,
    indexes: HashMap<ColumnId, ColumnIndexes>,
}

/// Configures which indexes a [`MemSegment`] carries.
#[derive(Clone, Debug)]
pub struct MemSegmentBuilder {
    schema: Schema,
    page_size: u32,
    bloom_filters: Vec<(ColumnId, f64)>,
    bitmap_indexes: Vec<ColumnId>,
}

impl MemSegment {
    /// Starts building a segment with `schema`.
    #[must_use]
    pub fn builder(schema: Schema) -> MemSegmentBuilder {
        MemSegmentBuilder {
            schema,
            page_size: DEFAULT_PAGE_SIZE,
            bloom_filters: Vec::new(),
            bitmap_indexes: Vec::new(),
        }
    }

    /// Rows per page.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages.
    #[must_use]
    pub fn num_pages(&self) -> usize {
        self.num_rows.div_ceil(self.page_size) as usize
    }

    fn position(&self, column: ColumnId) -> Result<(usize, &Field), ScanError> {
        let idx = self
            .schema
            .index_of(column)
            .ok_or(ScanError::UnknownColumn(column))?;
        Ok((idx, &self.schema.fields()[idx]))
    }

    fn indexes(&self, column: ColumnId, kind: IndexKind) -> Result<&ColumnIndexes, IndexError> {
        self.indexes
            .get(&column)
            .ok_or(IndexError::Absent { column, kind })
    }
}

impl MemSegmentBuilder {
    /// Rows per page; zone maps and bloom filters are kept per page.
    #[must_use]
    pub fn page_size(self, page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            ..self
        }
    }

    /// Builds a per-page bloom filter on `column` at false positive rate `fpp`.
    #[must_use]
    pub fn bloom_filter(mut self, column: ColumnId, fpp: f64) -> Self {
        self.bloom_filters.push((column, fpp));
        self
    }

    /// Builds a bitmap index on `column`.
    #[must_use]
    pub fn bitmap_index(mut self, column: ColumnId) -> Self {
        self.bitmap_indexes.push(column);
        self
    }

    /// Concatenates `batches` into one segment and builds its indexes.
    ///
    /// Batches must match the Arrow form of the schema. A column whose values
    /// cannot be ordered (NaN) gets no bitmap index.
    pub fn build(self, batches: &[RecordBatch]) -> Result<MemSegment, ScanError> {
        for column in self
            .bloom_filters
            .iter()
            .map(|(column, _)| column)
            .chain(&self.bitmap_indexes)
        {
            if self.schema.field(*column).is_none() {
                return Err(ScanError::UnknownColumn(*column));
            }
        }
        let batch = concat_batches(&self.schema.to_arrow(), batches)?;
        let num_rows = u32::try_from(batch.num_rows()).map_err(|_| {
            ScanError::invalid(format!(
                "{} rows exceed the segment row id space",
                batch.num_rows()
            ))
        })?;

        let mut columns = Vec::with_capacity(self.schema.len());
        let mut indexes = HashMap::with_capacity(self.schema.len());
        for (idx, field) in self.schema.fields().iter().enumerate() {
            let array = stored_array(batch.column(idx), field)?;
            let mut column_indexes = ColumnIndexes::default();
            let mut segment_zone_map = ZoneMapDetail::empty();
            let fpp = self
                .bloom_filters
                .iter()
                .rev()
                .find(|(column, _)| *column == field.id)
                .map(|(_, fpp)| *fpp);
            let mut blooms = fpp.map(|_| Vec::new());

            for rows in pages(num_rows, self.page_size) {
                let page = array.slice(rows.start as usize, (rows.end - rows.start) as usize);
                let page = Column::from_arrow(&page, field.field_type, field.nullable)?;
                let detail = ZoneMapDetail::from_column(&page, field.field_type);
                segment_zone_map.merge(&detail);
                column_indexes.page_zone_maps.push(PageZoneMap {
                    rows: rows.clone(),
                    detail,
                });
                if let (Some(fpp), Some(blooms)) = (fpp, blooms.as_mut()) {
                    blooms.push(PageBloomFilter {
                        rows,
                        filter: Arc::new(page_bloom_filter(&page, fpp)),
                    });
                }
            }
            column_indexes.segment_zone_map = Some(segment_zone_map);
            column_indexes.bloom_filters = blooms;

            if self.bitmap_indexes.contains(&field.id) {
                let column = Column::from_arrow(&array, field.field_type, field.nullable)?;
                match BitmapIndex::from_column(field.id, &column, field.field_type) {
                    Ok(index) => column_indexes.bitmap = Some(Arc::new(index)),
                    Err(err) => log_warn!(
                        component = "mem_segment",
                        event = "bitmap_index_skipped",
                        column = field.id,
                        error = %err,
                    ),
                }
            }
            columns.push(array);
            indexes.insert(field.id, column_indexes);
        }

        log_info!(
            component = "mem_segment",
            event = "mem_segment_built",
            rows = num_rows,
            columns = columns.len(),
            page_size = self.page_size,
        );
        Ok(MemSegment {
            schema: self.schema,
            columns,
            num_rows,
            page_size: self.page_size,
            indexes,
        })
    }
}

fn pages(num_rows: u32, page_size: u32) -> impl Iterator<Item = Range<u32>> {
    (0..num_rows)
        .step_by(page_size as usize)
        .map(move |start| start..num_rows.min(start.saturating_add(page_size)))
}

/// Storage form of an input column: CHAR values are zero padded to width.
fn stored_array(array: &ArrayRef, field: &Field) -> Result<ArrayRef, ScanError> {
    let FieldType::Char { len } = field.field_type else {
        return Ok(Arc::clone(array));
    };
    let width = len as usize;
    let strings = array.as_string_opt::<i32>().ok_or_else(|| {
        ScanError::invalid(format!(
            "column {} expects utf8 input, got {}",
            field.id,
            array.data_type()
        ))
    })?;
    let mut padded = Vec::with_capacity(strings.len());
    for value in strings.iter() {
        let Some(value) = value else {
            padded.push(None);
            continue;
        };
        if value.len() > width {
            return Err(ScanError::invalid(format!(
                "value of {} bytes exceeds CHAR({len}) in column {}",
                value.len(),
                field.id
            )));
        }
        let mut bytes = value.as_bytes().to_vec();
        bytes.resize(width, 0);
        padded.push(Some(bytes));
    }
    Ok(Arc::new(padded.into_iter().collect::<BinaryArray>()))
}

fn page_bloom_filter(page: &Column, fpp: f64) -> SipBloomFilter {
    fn insert_keys<C: PhysicalColumn>(
        values: &C,
        nulls: Option<&[u8]>,
        filter: &mut SipBloomFilter,
    ) {
        for row in 0..values.len() {
            if nulls.is_some_and(|nulls| nulls[row] != 0) {
                continue;
            }
            filter.insert(&C::bloom_key(values.value_at(row)));
        }
    }

    let nulls = page.null_flags();
    let null_count = nulls.map_or(0, |nulls| nulls.iter().filter(|flag| **flag != 0).count());
    let mut filter = SipBloomFilter::new(page.len() - null_count, fpp);
    match page.data() {
        DataColumn::Boolean(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Int8(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Int16(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Int32(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Int64(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Float32(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Float64(values) => insert_keys(values, nulls, &mut filter),
        DataColumn::Binary(values) => insert_keys(values, nulls, &mut filter),
    }
    filter
}

impl SegmentSource for MemSegment {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn num_rows(&self) -> u32 {
        self.num_rows
    }

    fn read_column(&self, column: ColumnId, ranges: &SparseRange) -> Result<Column, ScanError> {
        let (idx, field) = self.position(column)?;
        let decode = |reason: String| ScanError::Decode { column, reason };
        let array = &self.columns[idx];
        if ranges.end().is_some_and(|end| end > self.num_rows) {
            return Err(decode(format!(
                "rows {:?} beyond segment of {} rows",
                ranges.ranges(),
                self.num_rows
            )));
        }
        let slices: Vec<ArrayRef> = ranges
            .ranges()
            .iter()
            .map(|range| array.slice(range.start as usize, (range.end - range.start) as usize))
            .collect();
        let merged = match slices.as_slice() {
            [] => new_empty_array(array.data_type()),
            [single] => Arc::clone(single),
            many => {
                let refs: Vec<&dyn Array> = many.iter().map(AsRef::as_ref).collect();
                concat(&refs).map_err(|err| decode(err.to_string()))?
            }
        };
        Column::from_arrow(&merged, field.field_type, field.nullable)
            .map_err(|err| decode(err.to_string()))
    }

    fn segment_zone_map(&self, column: ColumnId) -> Result<ZoneMapDetail, IndexError> {
        self.indexes(column, IndexKind::ZoneMap)?
            .segment_zone_map
            .clone()
            .ok_or(IndexError::Absent {
                column,
                kind: IndexKind::ZoneMap,
            })
    }

    fn page_zone_maps(&self, column: ColumnId) -> Result<Vec<PageZoneMap>, IndexError> {
        Ok(self
            .indexes(column, IndexKind::ZoneMap)?
            .page_zone_maps
            .clone())
    }

    fn bloom_filters(&self, column: ColumnId) -> Result<Vec<PageBloomFilter>, IndexError> {
        self.indexes(column, IndexKind::BloomFilter)?
            .bloom_filters
            .clone()
            .ok_or(IndexError::Absent {
                column,
                kind: IndexKind::BloomFilter,
            })
    }

    fn bitmap_index(&self, column: ColumnId) -> Result<BitmapIndexIterator, IndexError> {
        self.indexes(column, IndexKind::Bitmap)?
            .bitmap
            .as_ref()
            .map(|index| BitmapIndexIterator::new(Arc::clone(index)))
            .ok_or(IndexError::Absent {
                column,
                kind: IndexKind::Bitmap,
            })
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{Float64Array, Int32Array, StringArray};

    use super::*;
    use crate::datum::Datum;

    fn schema() -> Schema {
        Schema::try_new(vec![
            Field::new(0, "id", FieldType::Int32, false),
            Field::new(1, "code", FieldType::Char { len: 4 }, true),
        ])
        .expect("schema")
    }

    fn batch(ids: Vec<i32>, codes: Vec<Option<&str>>) -> RecordBatch {
        RecordBatch::try_new(
            schema().to_arrow(),
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(StringArray::from(codes)),
            ],
        )
        .expect("batch")
    }

    #[test]
    fn page_zone_maps_cover_every_row() {
        let segment = MemSegment::builder(schema())
            .page_size(2)
            .build(&[
                batch(vec![1, 2, 3], vec![Some("a"), None, Some("b")]),
                batch(vec![9, 4], vec![Some("c"), Some("d")]),
            ])
            .expect("segment");
        assert_eq!(segment.num_rows(), 5);
        assert_eq!(segment.num_pages(), 3);
        let pages = segment.page_zone_maps(0).expect("pages");
        let rows: Vec<_> = pages.iter().map(|page| page.rows.clone()).collect();
        assert_eq!(rows, vec![0..2, 2..4, 4..5]);
        assert_eq!(pages[1].detail.min, Datum::Int32(3));
        assert_eq!(pages[1].detail.max, Datum::Int32(9));
        let segment_zone = segment.segment_zone_map(0).expect("zone map");
        assert_eq!(segment_zone.min, Datum::Int32(1));
        assert_eq!(segment_zone.max, Datum::Int32(9));
        assert!(segment.segment_zone_map(1).expect("zone map").has_null);
    }

    #[test]
    fn char_values_are_padded_in_storage() {
        let segment = MemSegment::builder(schema())
            .bitmap_index(1)
            .build(&[batch(vec![1, 2], vec![Some("ab"), None])])
            .expect("segment");
        let column = segment
            .read_column(1, &SparseRange::from_range(0..2))
            .expect("column");
        assert_eq!(
            column.datum_at(0, FieldType::Char { len: 4 }),
            Datum::Bytes(b"ab\0\0".to_vec())
        );
        assert!(column.is_null(1));
        let iter = segment.bitmap_index(1).expect("bitmap");
        assert!(iter.has_null_bitmap());
    }

    #[test]
    fn oversized_char_is_rejected() {
        let result = MemSegment::builder(schema()).build(&[batch(vec![1], vec![Some("abcde")])]);
        assert!(matches!(result, Err(ScanError::InvalidArgument(_))));
    }

    #[test]
    fn reads_concatenate_ranges_in_order() {
        let segment = MemSegment::builder(schema())
            .build(&[batch(
                vec![10, 11, 12, 13, 14],
                vec![None, None, None, None, None],
            )])
            .expect("segment");
        let column = segment
            .read_column(0, &SparseRange::from_ranges(vec![3..5, 0..1]))
            .expect("column");
        let values: Vec<_> = (0..column.len())
            .map(|row| column.datum_at(row, FieldType::Int32))
            .collect();
        assert_eq!(values, vec![Datum::Int32(10), Datum::Int32(13), Datum::Int32(14)]);
        assert!(matches!(
            segment.read_column(0, &SparseRange::from_range(4..9)),
            Err(ScanError::Decode { column: 0, .. })
        ));
    }

    #[test]
    fn missing_indexes_are_absent() {
        let segment = MemSegment::builder(schema())
            .build(&[batch(vec![1], vec![Some("a")])])
            .expect("segment");
        assert!(matches!(
            segment.bloom_filters(0),
            Err(IndexError::Absent {
                kind: IndexKind::BloomFilter,
                ..
            })
        ));
        assert!(matches!(
            segment.bitmap_index(0),
            Err(IndexError::Absent {
                kind: IndexKind::Bitmap,
                ..
            })
        ));
        assert!(MemSegment::builder(schema()).bitmap_index(7).build(&[]).is_err());
    }

    #[test]
    fn bloom_filters_hold_page_values() {
        let segment = MemSegment::builder(schema())
            .page_size(2)
            .bloom_filter(0, 0.001)
            .build(&[batch(vec![1, 2, 3], vec![None, None, None])])
            .expect("segment");
        let blooms = segment.bloom_filters(0).expect("blooms");
        assert_eq!(blooms.len(), 2);
        assert!(blooms[0].filter.test_bytes(&1_i32.to_le_bytes()));
        assert!(blooms[1].filter.test_bytes(&3_i32.to_le_bytes()));
    }

    #[test]
    fn nan_column_skips_bitmap_index() {
        let schema =
            Schema::try_new(vec![Field::new(0, "x", FieldType::Float64, false)]).expect("schema");
        let batch = RecordBatch::try_new(
            schema.to_arrow(),
            vec![Arc::new(Float64Array::from(vec![1.0, f64::NAN]))],
        )
        .expect("batch");
        let segment = MemSegment::builder(schema)
            .bitmap_index(0)
            .build(&[batch])
            .expect("segment");
        assert!(segment.bitmap_index(0).is_err());
        assert!(!segment.segment_zone_map(0).expect("zone map").has_bounds());
    }
}
