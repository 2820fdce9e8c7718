use std::{cmp::Ordering, sync::Arc};

use roaring::RoaringBitmap;

use crate::{
    column::Column,
    datum::Datum,
    error::{IndexError, IndexKind},
    types::{ColumnId, FieldType},
};

/// Exact index over a low-cardinality column: a sorted dictionary of the
/// distinct non-null values, one row bitmap per entry, and an optional bitmap
/// of null rows.
#[derive(Clone, Debug)]
pub struct BitmapIndex {
    column: ColumnId,
    dictionary: Vec<Datum>,
    bitmaps: Vec<RoaringBitmap>,
    null_bitmap: Option<RoaringBitmap>,
}

impl BitmapIndex {
    /// Assembles an index from dictionary entries, which must be strictly
    /// ascending.
    pub fn try_new(
        column: ColumnId,
        entries: Vec<(Datum, RoaringBitmap)>,
        null_bitmap: Option<RoaringBitmap>,
    ) -> Result<Self, IndexError> {
        for pair in entries.windows(2) {
            if pair[0].0.compare(&pair[1].0) != Some(Ordering::Less) {
                return Err(IndexError::corrupt(
                    column,
                    IndexKind::Bitmap,
                    format!(
                        "dictionary not strictly ascending at {} / {}",
                        pair[0].0, pair[1].0
                    ),
                ));
            }
        }
        let (dictionary, bitmaps) = entries.into_iter().unzip();
        Ok(Self {
            column,
            dictionary,
            bitmaps,
            null_bitmap,
        })
    }

    /// Builds an index over a materialized column. Values that do not compare
    /// with themselves (NaN) cannot be indexed.
    pub fn from_column(
        column_id: ColumnId,
        column: &Column,
        field_type: FieldType,
    ) -> Result<Self, IndexError> {
        let mut values: Vec<(Datum, u32)> = Vec::with_capacity(column.len());
        let mut nulls = column.is_nullable().then(RoaringBitmap::new);
        for row in 0..column.len() {
            let row_id = row as u32;
            let datum = column.datum_at(row, field_type);
            if datum.is_null() {
                if let Some(nulls) = nulls.as_mut() {
                    nulls.insert(row_id);
                }
                continue;
            }
            if datum.compare(&datum).is_none() {
                return Err(IndexError::corrupt(
                    column_id,
                    IndexKind::Bitmap,
                    format!("value {datum} at row {row} is not orderable"),
                ));
            }
            values.push((datum, row_id));
        }
        values.sort_by(|(lhs, lrow), (rhs, rrow)| {
            lhs.compare(rhs)
                .unwrap_or(Ordering::Equal)
                .then(lrow.cmp(rrow))
        });

        let mut entries: Vec<(Datum, RoaringBitmap)> = Vec::new();
        for (datum, row) in values {
            match entries.last_mut() {
                Some((last, bitmap)) if last.compare(&datum) == Some(Ordering::Equal) => {
                    bitmap.insert(row);
                }
                _ => {
                    let mut bitmap = RoaringBitmap::new();
                    bitmap.insert(row);
                    entries.push((datum, bitmap));
                }
            }
        }
        Self::try_new(column_id, entries, nulls)
    }

    /// Column the index covers.
    #[must_use]
    pub fn column(&self) -> ColumnId {
        self.column
    }

    /// Dictionary entries in ascending order.
    #[must_use]
    pub fn dictionary(&self) -> &[Datum] {
        &self.dictionary
    }

    /// Approximate heap footprint in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        let dictionary: usize = self
            .dictionary
            .iter()
            .map(|datum| std::mem::size_of::<Datum>() + datum.memory_size())
            .sum();
        let bitmaps: usize = self
            .bitmaps
            .iter()
            .chain(self.null_bitmap.iter())
            .map(RoaringBitmap::serialized_size)
            .sum();
        dictionary + bitmaps
    }
}

/// Cursor over a [`BitmapIndex`].
///
/// `seek_dictionary` positions the cursor at the first entry not less than a
/// value; predicates then read bitmaps relative to that ordinal.
#[derive(Clone, Debug)]
pub struct BitmapIndexIterator {
    index: Arc<BitmapIndex>,
    current: usize,
}

impl BitmapIndexIterator {
    /// Cursor positioned at the first dictionary entry.
    #[must_use]
    pub fn new(index: Arc<BitmapIndex>) -> Self {
        Self { index, current: 0 }
    }

    fn corrupt(&self, reason: impl Into<String>) -> IndexError {
        IndexError::corrupt(self.index.column, IndexKind::Bitmap, reason)
    }

    /// Number of dictionary entries (and value bitmaps).
    #[must_use]
    pub fn bitmap_nums(&self) -> usize {
        self.index.dictionary.len()
    }

    /// Ordinal the last seek landed on.
    #[must_use]
    pub fn current_ordinal(&self) -> usize {
        self.current
    }

    /// Moves to the first entry not less than `value` and reports whether that
    /// entry equals it. Lands on `bitmap_nums()` when every entry is smaller.
    pub fn seek_dictionary(&mut self, value: &Datum) -> Result<bool, IndexError> {
        let dictionary = &self.index.dictionary;
        let (mut lo, mut hi) = (0, dictionary.len());
        let mut exact = false;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let ordering = dictionary[mid].compare(value).ok_or_else(|| {
                self.corrupt(format!(
                    "dictionary entry {} is not comparable with {value}",
                    dictionary[mid]
                ))
            })?;
            match ordering {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal => {
                    exact = true;
                    hi = mid;
                }
                Ordering::Greater => hi = mid,
            }
        }
        self.current = lo;
        Ok(exact)
    }

    /// Rows holding dictionary entry `ordinal`.
    pub fn read_bitmap(&self, ordinal: usize) -> Result<RoaringBitmap, IndexError> {
        self.index.bitmaps.get(ordinal).cloned().ok_or_else(|| {
            self.corrupt(format!(
                "bitmap ordinal {ordinal} out of {} entries",
                self.bitmap_nums()
            ))
        })
    }

    /// Rows holding any dictionary entry in `[from, to)`.
    pub fn read_union_bitmap(&self, from: usize, to: usize) -> Result<RoaringBitmap, IndexError> {
        if from > to || to > self.bitmap_nums() {
            return Err(self.corrupt(format!(
                "bitmap ordinals [{from}, {to}) out of {} entries",
                self.bitmap_nums()
            )));
        }
        let mut union = RoaringBitmap::new();
        for bitmap in &self.index.bitmaps[from..to] {
            union |= bitmap;
        }
        Ok(union)
    }

    /// Whether null rows are tracked.
    #[must_use]
    pub fn has_null_bitmap(&self) -> bool {
        self.index.null_bitmap.is_some()
    }

    /// Null rows; empty when the column is not nullable.
    #[must_use]
    pub fn read_null_bitmap(&self) -> RoaringBitmap {
        self.index.null_bitmap.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::{ArrayRef, Int32Array, StringArray};

    use super::*;

    fn int_index(values: Vec<Option<i32>>) -> BitmapIndexIterator {
        let array: ArrayRef = Arc::new(Int32Array::from(values));
        let column = Column::from_arrow(&array, FieldType::Int32, true).expect("column");
        let index = BitmapIndex::from_column(3, &column, FieldType::Int32).expect("index");
        BitmapIndexIterator::new(Arc::new(index))
    }

    #[test]
    fn dictionary_is_sorted_and_distinct() {
        let iter = int_index(vec![Some(7), Some(3), None, Some(7), Some(5)]);
        assert_eq!(
            iter.index.dictionary(),
            &[Datum::Int32(3), Datum::Int32(5), Datum::Int32(7)]
        );
        let sevens: Vec<u32> = iter.read_bitmap(2).expect("bitmap").iter().collect();
        assert_eq!(sevens, vec![0, 3]);
        let nulls: Vec<u32> = iter.read_null_bitmap().iter().collect();
        assert_eq!(nulls, vec![2]);
    }

    #[test]
    fn seek_lands_on_lower_bound() {
        let mut iter = int_index(vec![Some(10), Some(20), Some(30)]);
        assert!(iter.seek_dictionary(&Datum::Int32(20)).expect("seek"));
        assert_eq!(iter.current_ordinal(), 1);
        assert!(!iter.seek_dictionary(&Datum::Int32(25)).expect("seek"));
        assert_eq!(iter.current_ordinal(), 2);
        assert!(!iter.seek_dictionary(&Datum::Int32(5)).expect("seek"));
        assert_eq!(iter.current_ordinal(), 0);
        assert!(!iter.seek_dictionary(&Datum::Int32(99)).expect("seek"));
        assert_eq!(iter.current_ordinal(), 3);
    }

    #[test]
    fn union_covers_ordinal_range() {
        let iter = int_index(vec![Some(1), Some(2), Some(3), Some(2)]);
        let rows: Vec<u32> = iter.read_union_bitmap(1, 3).expect("union").iter().collect();
        assert_eq!(rows, vec![1, 2, 3]);
        assert!(iter.read_union_bitmap(2, 4).is_err());
    }

    #[test]
    fn incomparable_probe_reports_corruption() {
        let mut iter = int_index(vec![Some(1), Some(2)]);
        let err = iter.seek_dictionary(&Datum::from("x")).expect_err("corrupt");
        assert_eq!(err.kind(), IndexKind::Bitmap);
        assert!(iter.read_bitmap(9).is_err());
    }

    #[test]
    fn unsorted_dictionary_is_rejected() {
        let err = BitmapIndex::try_new(
            1,
            vec![
                (Datum::Int32(2), RoaringBitmap::new()),
                (Datum::Int32(1), RoaringBitmap::new()),
            ],
            None,
        )
        .expect_err("unsorted");
        assert!(matches!(err, IndexError::Corrupt { column: 1, .. }));
    }

    #[test]
    fn non_nullable_strings_have_no_null_bitmap() {
        let array: ArrayRef = Arc::new(StringArray::from(vec!["b", "a", "b"]));
        let column = Column::from_arrow(&array, FieldType::Varchar, false).expect("column");
        let index = BitmapIndex::from_column(0, &column, FieldType::Varchar).expect("index");
        let iter = BitmapIndexIterator::new(Arc::new(index));
        assert!(!iter.has_null_bitmap());
        assert_eq!(iter.bitmap_nums(), 2);
    }
}
