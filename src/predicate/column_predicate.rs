use crate::{
    column::{Column, PhysicalColumn},
    datum::Datum,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, BloomFilter, SparseRange, ZoneMapDetail},
    selection::{check_indices, check_range, compact_branchless},
    types::{ColumnId, FieldType},
};

use super::{operator::PredicateOperator, ColumnPredicate, PredicateType};

/// Binds a [`PredicateOperator`] to a column and drives it over row batches.
///
/// The loops here own null handling: the null indicator is unwrapped once per
/// call, and a row whose flag is set fails regardless of its value bits.
/// Combining with a prior selection never short-circuits; the per-row test
/// always runs so the loop body stays free of data-dependent branches.
#[derive(Clone, Debug)]
pub struct ColumnOperatorPredicate<Op: PredicateOperator> {
    column_id: ColumnId,
    field_type: FieldType,
    op: Op,
}

impl<Op: PredicateOperator> ColumnOperatorPredicate<Op> {
    /// Binds `literals` to column `column_id` of `field_type`.
    ///
    /// CHAR literals are zero padded to the declared width.
    pub fn try_new(
        column_id: ColumnId,
        field_type: FieldType,
        literals: &[Datum],
    ) -> Result<Self, ScanError> {
        let expected = <Op::Column as PhysicalColumn>::PHYSICAL_TYPE;
        if field_type.physical() != expected {
            return Err(ScanError::ColumnTypeMismatch {
                expected: expected.to_string(),
                actual: field_type.to_string(),
            });
        }
        let mut op = Op::try_new(field_type, literals)?;
        if let FieldType::Char { len } = field_type {
            op.padding_zeros(len as usize);
        }
        Ok(Self {
            column_id,
            field_type,
            op,
        })
    }

    /// Underlying operator.
    #[must_use]
    pub fn operator(&self) -> &Op {
        &self.op
    }

    fn narrow<'a>(
        &self,
        column: &'a Column,
    ) -> Result<(&'a Op::Column, Option<&'a [u8]>), ScanError> {
        let data = <Op::Column as PhysicalColumn>::narrow(column.data()).ok_or_else(|| {
            ScanError::ColumnTypeMismatch {
                expected: <Op::Column as PhysicalColumn>::PHYSICAL_TYPE.to_string(),
                actual: column.data().physical_type().to_string(),
            }
        })?;
        Ok((data, column.null_flags()))
    }
}

impl<Op: PredicateOperator> ColumnPredicate for ColumnOperatorPredicate<Op> {
    fn column_id(&self) -> ColumnId {
        self.column_id
    }

    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn predicate_type(&self) -> PredicateType {
        Op::PREDICATE_TYPE
    }

    fn evaluate(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError> {
        let (data, nulls) = self.narrow(column)?;
        check_range(sel.len(), data.len(), from, to)?;
        let op = &self.op;
        match nulls {
            None => {
                for i in from..to {
                    sel[i] = u8::from(op.eval_at(data, i));
                }
            }
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((nulls[i] == 0) & op.eval_at(data, i));
                }
            }
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
        let (data, nulls) = self.narrow(column)?;
        check_range(sel.len(), data.len(), from, to)?;
        let op = &self.op;
        match nulls {
            None => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) & op.eval_at(data, i));
                }
            }
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) & (nulls[i] == 0) & op.eval_at(data, i));
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
        let (data, nulls) = self.narrow(column)?;
        check_range(sel.len(), data.len(), from, to)?;
        let op = &self.op;
        match nulls {
            None => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) | op.eval_at(data, i));
                }
            }
            Some(nulls) => {
                for i in from..to {
                    sel[i] = u8::from((sel[i] != 0) | ((nulls[i] == 0) & op.eval_at(data, i)));
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
        let (data, nulls) = self.narrow(column)?;
        check_indices(sel, sel_size, data.len())?;
        let op = &self.op;
        let new_size = match nulls {
            None => compact_branchless(sel, sel_size, |row| op.eval_at(data, row)),
            Some(nulls) => compact_branchless(sel, sel_size, |row| {
                (nulls[row] == 0) & op.eval_at(data, row)
            }),
        };
        Ok(new_size)
    }

    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool {
        self.op.zone_map_filter(detail)
    }

    fn support_bloom_filter(&self) -> bool {
        Op::SUPPORT_BLOOM_FILTER
    }

    fn bloom_filter(&self, filter: &dyn BloomFilter) -> bool {
        debug_assert!(
            Op::SUPPORT_BLOOM_FILTER,
            "bloom_filter called on '{}' predicate",
            Op::PREDICATE_TYPE.as_str()
        );
        if !Op::SUPPORT_BLOOM_FILTER {
            return true;
        }
        self.op.bloom_filter(filter)
    }

    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
        range: &mut SparseRange,
    ) -> Result<(), IndexError> {
        let rows = self.op.seek_bitmap_dictionary(iter)?;
        range.intersect_with(&SparseRange::from_bitmap(&rows));
        Ok(())
    }

    fn values(&self) -> Vec<Datum> {
        self.op.values()
    }

    fn can_vectorized(&self) -> bool {
        Op::CAN_VECTORIZED
    }

    fn padding_zeros(&mut self, len: usize) {
        self.op.padding_zeros(len);
    }

    fn debug_string(&self) -> String {
        format!("column {} {}", self.column_id, self.op.debug_string())
    }

    fn memory_size(&self) -> usize {
        self.op.memory_size()
    }
}
