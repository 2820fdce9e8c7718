use crate::{
    column::Column,
    datum::Datum,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, BloomFilter, SparseRange, ZoneMapDetail},
    selection::{check_indices, check_range, compact_branchless},
    types::{ColumnId, FieldType},
};

use super::{ColumnPredicate, PredicateType};

/// `IS NULL` / `IS NOT NULL`.
///
/// Unlike operator predicates, the null flag is the value under test, so null
/// rows are not excluded up front.
#[derive(Clone, Debug)]
pub struct NullPredicate {
    column_id: ColumnId,
    field_type: FieldType,
    is_null: bool,
}

impl NullPredicate {
    /// `column IS NULL` when `is_null`, else `column IS NOT NULL`.
    #[must_use]
    pub fn new(column_id: ColumnId, field_type: FieldType, is_null: bool) -> Self {
        Self {
            column_id,
            field_type,
            is_null,
        }
    }
}

impl ColumnPredicate for NullPredicate {
    fn column_id(&self) -> ColumnId {
        self.column_id
    }

    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn predicate_type(&self) -> PredicateType {
        if self.is_null {
            PredicateType::IsNull
        } else {
            PredicateType::NotNull
        }
    }

    fn evaluate(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError> {
        check_range(sel.len(), column.len(), from, to)?;
        match column.null_flags() {
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((nulls[i] != 0) == self.is_null);
                }
            }
            None => sel[from..to].fill(u8::from(!self.is_null)),
        }
        Ok(())
    }

    fn evaluate_and(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError> {
        check_range(sel.len(), column.len(), from, to)?;
        match column.null_flags() {
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) & ((nulls[i] != 0) == self.is_null));
                }
            }
            None => {
                let pass = !self.is_null;
                for flag in &mut sel[from..to] {
                    *flag = u8::from((*flag != 0) & pass);
                }
            }
        }
        Ok(())
    }

    fn evaluate_or(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError> {
        check_range(sel.len(), column.len(), from, to)?;
        match column.null_flags() {
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) | ((nulls[i] != 0) == self.is_null));
                }
            }
            None => {
                let pass = !self.is_null;
                for flag in &mut sel[from..to] {
                    *flag = u8::from((*flag != 0) | pass);
                }
            }
        }
        Ok(())
    }

    fn evaluate_branchless(
        &self,
        column: &Column,
        sel: &mut [u16],
        sel_size: u16,
    ) -> Result<u16, ScanError> {
        check_indices(sel, sel_size, column.len())?;
        let new_size = match column.null_flags() {
            Some(nulls) => {
                compact_branchless(sel, sel_size, |row| (nulls[row] != 0) == self.is_null)
            }
            None => compact_branchless(sel, sel_size, |_| !self.is_null),
        };
        Ok(new_size)
    }

    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool {
        if self.is_null {
            detail.has_null
        } else {
            detail.has_not_null
        }
    }

    fn support_bloom_filter(&self) -> bool {
        false
    }

    fn bloom_filter(&self, _filter: &dyn BloomFilter) -> bool {
        debug_assert!(false, "bloom_filter called on a null test");
        true
    }

    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
        range: &mut SparseRange,
    ) -> Result<(), IndexError> {
        let rows = if self.is_null {
            iter.read_null_bitmap()
        } else {
            iter.read_union_bitmap(0, iter.bitmap_nums())?
        };
        range.intersect_with(&SparseRange::from_bitmap(&rows));
        Ok(())
    }

    fn values(&self) -> Vec<Datum> {
        Vec::new()
    }

    fn can_vectorized(&self) -> bool {
        true
    }

    fn padding_zeros(&mut self, _len: usize) {}

    fn debug_string(&self) -> String {
        format!(
            "column {} {}",
            self.column_id,
            self.predicate_type().as_str()
        )
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}
