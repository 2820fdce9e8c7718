use std::{borrow::Borrow, cmp::Ordering, marker::PhantomData};

use roaring::RoaringBitmap;

use super::{
    operator::{bind_literal, PredicateOperator},
    PredicateType,
};
use crate::{
    column::PhysicalColumn,
    datum::Datum,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, BloomFilter, ZoneMapDetail},
    types::FieldType,
};

/// Sorted, deduplicated literal set probed by binary search.
#[derive(Clone, Debug)]
struct LiteralSet<C: PhysicalColumn> {
    field_type: FieldType,
    values: Vec<C::Owned>,
    _column: PhantomData<fn() -> C>,
}

impl<C: PhysicalColumn> LiteralSet<C> {
    /// NULL and NaN literals are dropped: neither equals any row.
    fn try_new(field_type: FieldType, literals: &[Datum]) -> Result<Self, ScanError> {
        let mut values = Vec::with_capacity(literals.len());
        for datum in literals.iter().filter(|datum| !datum.is_null()) {
            let value = bind_literal::<C>(field_type, datum)?;
            let view: &C::Value = value.borrow();
            if view.partial_cmp(view).is_some() {
                values.push(value);
            }
        }
        values.sort_by(|lhs: &C::Owned, rhs: &C::Owned| {
            let (lhs, rhs): (&C::Value, &C::Value) = (lhs.borrow(), rhs.borrow());
            lhs.partial_cmp(rhs).unwrap_or(Ordering::Equal)
        });
        values.dedup_by(|lhs, rhs| {
            let (lhs, rhs): (&C::Value, &C::Value) = ((*lhs).borrow(), (*rhs).borrow());
            lhs == rhs
        });
        Ok(Self {
            field_type,
            values,
            _column: PhantomData,
        })
    }

    #[inline]
    fn contains(&self, value: &C::Value) -> bool {
        self.values
            .binary_search_by(|probe| {
                let probe: &C::Value = probe.borrow();
                probe.partial_cmp(value).unwrap_or(Ordering::Less)
            })
            .is_ok()
    }

    fn any_within(&self, min: &C::Value, max: &C::Value) -> bool {
        self.values.iter().any(|value| {
            let value: &C::Value = value.borrow();
            min <= value && value <= max
        })
    }

    fn datums(&self) -> Vec<Datum> {
        self.values
            .iter()
            .map(|value| C::to_datum(value.borrow(), self.field_type))
            .collect()
    }

    fn pad(&mut self, len: usize) -> bool {
        let mut changed = false;
        for value in &mut self.values {
            changed |= C::pad_zeros(value, len);
        }
        changed
    }

    /// Rows holding any of the literals.
    fn seek(&self, iter: &mut BitmapIndexIterator) -> Result<RoaringBitmap, IndexError> {
        let mut rows = RoaringBitmap::new();
        for value in &self.values {
            let datum = C::to_datum(value.borrow(), self.field_type);
            if iter.seek_dictionary(&datum)? {
                rows |= iter.read_bitmap(iter.current_ordinal())?;
            }
        }
        Ok(rows)
    }

    fn memory_size(&self) -> usize {
        self.values.capacity() * std::mem::size_of::<C::Owned>()
            + self.datums().iter().map(Datum::memory_size).sum::<usize>()
    }

    fn describe(&self, predicate_type: PredicateType, has_null: bool) -> String {
        let mut items: Vec<String> = self.datums().iter().map(ToString::to_string).collect();
        if has_null {
            items.push("NULL".to_owned());
        }
        format!("{} ({})", predicate_type.as_str(), items.join(", "))
    }
}

fn zone_bounds<C: PhysicalColumn>(detail: &ZoneMapDetail) -> Option<(C::Owned, C::Owned)> {
    Some((C::literal(&detail.min)?, C::literal(&detail.max)?))
}

/// `column IN (literals)`.
#[derive(Clone, Debug)]
pub struct InListOperator<C: PhysicalColumn> {
    set: LiteralSet<C>,
}

impl<C: PhysicalColumn> InListOperator<C> {
    /// Number of distinct usable literals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.set.values.len()
    }

    /// Whether no literal can match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.values.is_empty()
    }
}

impl<C: PhysicalColumn> PredicateOperator for InListOperator<C> {
    type Column = C;

    const PREDICATE_TYPE: PredicateType = PredicateType::InList;
    const SUPPORT_BLOOM_FILTER: bool = true;
    const CAN_VECTORIZED: bool = C::FIXED_WIDTH;

    fn try_new(field_type: FieldType, literals: &[Datum]) -> Result<Self, ScanError> {
        Ok(Self {
            set: LiteralSet::try_new(field_type, literals)?,
        })
    }

    #[inline]
    fn eval_at(&self, column: &C, row: usize) -> bool {
        self.set.contains(column.value_at(row))
    }

    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool {
        if !detail.has_not_null || self.set.values.is_empty() {
            return false;
        }
        match zone_bounds::<C>(detail) {
            Some((min, max)) => self.set.any_within(min.borrow(), max.borrow()),
            None => true,
        }
    }

    fn bloom_filter(&self, filter: &dyn BloomFilter) -> bool {
        self.set
            .values
            .iter()
            .any(|value| filter.test_bytes(&C::bloom_key(value.borrow())))
    }

    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
    ) -> Result<RoaringBitmap, IndexError> {
        self.set.seek(iter)
    }

    fn values(&self) -> Vec<Datum> {
        self.set.datums()
    }

    fn padding_zeros(&mut self, len: usize) -> bool {
        self.set.pad(len)
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.set.memory_size()
    }

    fn debug_string(&self) -> String {
        self.set.describe(PredicateType::InList, false)
    }
}

/// `column NOT IN (literals)`.
///
/// A NULL literal makes the predicate unknown for every row, so nothing
/// passes.
#[derive(Clone, Debug)]
pub struct NotInListOperator<C: PhysicalColumn> {
    set: LiteralSet<C>,
    has_null: bool,
}

impl<C: PhysicalColumn> PredicateOperator for NotInListOperator<C> {
    type Column = C;

    const PREDICATE_TYPE: PredicateType = PredicateType::NotInList;
    const CAN_VECTORIZED: bool = C::FIXED_WIDTH;

    fn try_new(field_type: FieldType, literals: &[Datum]) -> Result<Self, ScanError> {
        Ok(Self {
            set: LiteralSet::try_new(field_type, literals)?,
            has_null: literals.iter().any(Datum::is_null),
        })
    }

    #[inline]
    fn eval_at(&self, column: &C, row: usize) -> bool {
        !self.has_null & !self.set.contains(column.value_at(row))
    }

    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool {
        if !detail.has_not_null || self.has_null {
            return false;
        }
        match zone_bounds::<C>(detail) {
            Some((min, max)) => {
                let (min, max): (&C::Value, &C::Value) = (min.borrow(), max.borrow());
                !(min == max && self.set.contains(min))
            }
            None => true,
        }
    }

    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
    ) -> Result<RoaringBitmap, IndexError> {
        if self.has_null {
            return Ok(RoaringBitmap::new());
        }
        let mut rows = iter.read_union_bitmap(0, iter.bitmap_nums())?;
        rows -= self.set.seek(iter)?;
        Ok(rows)
    }

    fn values(&self) -> Vec<Datum> {
        let mut values = self.set.datums();
        if self.has_null {
            values.push(Datum::Null);
        }
        values
    }

    fn padding_zeros(&mut self, len: usize) -> bool {
        self.set.pad(len)
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.set.memory_size()
    }

    fn debug_string(&self) -> String {
        self.set.describe(PredicateType::NotInList, self.has_null)
    }
}
