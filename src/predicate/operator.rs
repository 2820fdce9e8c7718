//! Comparison operators: the per-kind, per-physical-type half of a predicate.
//!
//! Each operator binds one literal of its column's representation. The
//! null-excluding evaluation loops live in
//! [`ColumnOperatorPredicate`](super::ColumnOperatorPredicate); operators only
//! answer for a single non-null row or an index summary.

use std::{borrow::Borrow, fmt, marker::PhantomData};

use roaring::RoaringBitmap;

use super::PredicateType;
use crate::{
    column::PhysicalColumn,
    datum::Datum,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, BloomFilter, ZoneMapDetail},
    types::FieldType,
};

/// Strategy implementing one predicate kind for one physical column type.
pub trait PredicateOperator: Clone + fmt::Debug + Send + Sync + 'static {
    /// Column representation the operator reads.
    type Column: PhysicalColumn;

    /// Logical kind of the operator.
    const PREDICATE_TYPE: PredicateType;
    /// Whether `bloom_filter` gives a meaningful answer.
    const SUPPORT_BLOOM_FILTER: bool = false;
    /// Whether the batch evaluation paths may drive this operator.
    const CAN_VECTORIZED: bool = true;

    /// Binds literals already converted to `field_type`.
    fn try_new(field_type: FieldType, literals: &[Datum]) -> Result<Self, ScanError>;

    /// Tests the non-null value at `row`.
    fn eval_at(&self, column: &Self::Column, row: usize) -> bool;

    /// Whether a page summarized by `detail` could hold a passing row.
    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool;

    /// Whether a page whose values went into `filter` could hold a passing row.
    fn bloom_filter(&self, _filter: &dyn BloomFilter) -> bool {
        true
    }

    /// Exact rows whose dictionary value passes.
    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
    ) -> Result<RoaringBitmap, IndexError>;

    /// Bound literals.
    fn values(&self) -> Vec<Datum>;

    /// Pads fixed-width string literals to `len` bytes; returns whether any
    /// literal changed.
    fn padding_zeros(&mut self, len: usize) -> bool;

    /// Operator and literals, e.g. `> 25`.
    fn debug_string(&self) -> String;

    /// Approximate footprint in bytes.
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.values().iter().map(Datum::memory_size).sum::<usize>()
    }
}

/// Converts one datum into the operator's literal representation.
pub(crate) fn bind_literal<C: PhysicalColumn>(
    field_type: FieldType,
    datum: &Datum,
) -> Result<C::Owned, ScanError> {
    C::literal(datum).ok_or_else(|| {
        ScanError::conversion(
            datum,
            field_type,
            format!("literal is not a {} value", C::PHYSICAL_TYPE),
        )
    })
}

fn single_literal<C: PhysicalColumn>(
    predicate_type: PredicateType,
    field_type: FieldType,
    literals: &[Datum],
) -> Result<C::Owned, ScanError> {
    match literals {
        [Datum::Null] => Err(ScanError::invalid(format!(
            "'{}' against NULL never matches, use IS NULL",
            predicate_type.as_str()
        ))),
        [datum] => bind_literal::<C>(field_type, datum),
        _ => Err(ScanError::invalid(format!(
            "'{}' takes exactly one literal, got {}",
            predicate_type.as_str(),
            literals.len()
        ))),
    }
}

// NaN compares false with everything but passes `!=`.
fn is_unordered<V: PartialOrd + ?Sized>(value: &V) -> bool {
    value.partial_cmp(value).is_none()
}

macro_rules! comparison_operator {
    (
        $(#[$meta:meta])*
        $name:ident => $ptype:ident,
        bloom: $bloom:literal,
        eval: |$value:ident, $literal:ident| $eval:expr,
        zone: |$min:ident, $max:ident, $lit:ident| $zone:expr,
        seek: |$iter:ident, $ordinal:ident, $exact:ident, $total:ident| $seek:expr $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name<C: PhysicalColumn> {
            field_type: FieldType,
            value: C::Owned,
            _column: PhantomData<fn() -> C>,
        }

        impl<C: PhysicalColumn> $name<C> {
            /// Bound literal.
            pub fn literal(&self) -> &C::Value {
                self.value.borrow()
            }
        }

        impl<C: PhysicalColumn> PredicateOperator for $name<C> {
            type Column = C;

            const PREDICATE_TYPE: PredicateType = PredicateType::$ptype;
            const SUPPORT_BLOOM_FILTER: bool = $bloom;

            fn try_new(field_type: FieldType, literals: &[Datum]) -> Result<Self, ScanError> {
                Ok(Self {
                    field_type,
                    value: single_literal::<C>(PredicateType::$ptype, field_type, literals)?,
                    _column: PhantomData,
                })
            }

            #[inline]
            fn eval_at(&self, column: &C, row: usize) -> bool {
                let $value = column.value_at(row);
                let $literal: &C::Value = self.value.borrow();
                $eval
            }

            fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool {
                if !detail.has_not_null {
                    return false;
                }
                let (Some(lo), Some(hi)) = (C::literal(&detail.min), C::literal(&detail.max))
                else {
                    return true;
                };
                let $min: &C::Value = lo.borrow();
                let $max: &C::Value = hi.borrow();
                let $lit: &C::Value = self.value.borrow();
                $zone
            }

            fn bloom_filter(&self, filter: &dyn BloomFilter) -> bool {
                filter.test_bytes(&C::bloom_key(self.value.borrow()))
            }

            fn seek_bitmap_dictionary(
                &self,
                $iter: &mut BitmapIndexIterator,
            ) -> Result<RoaringBitmap, IndexError> {
                let $total = $iter.bitmap_nums();
                if is_unordered::<C::Value>(self.value.borrow()) {
                    return match PredicateType::$ptype {
                        PredicateType::Ne => $iter.read_union_bitmap(0, $total),
                        _ => Ok(RoaringBitmap::new()),
                    };
                }
                let datum = C::to_datum(self.value.borrow(), self.field_type);
                let $exact = usize::from($iter.seek_dictionary(&datum)?);
                let $ordinal = $iter.current_ordinal();
                $seek
            }

            fn values(&self) -> Vec<Datum> {
                vec![C::to_datum(self.value.borrow(), self.field_type)]
            }

            fn padding_zeros(&mut self, len: usize) -> bool {
                C::pad_zeros(&mut self.value, len)
            }

            fn debug_string(&self) -> String {
                format!(
                    "{} {}",
                    PredicateType::$ptype.as_str(),
                    C::to_datum(self.value.borrow(), self.field_type)
                )
            }
        }
    };
}

comparison_operator!(
    /// `column = literal`.
    EqOperator => Eq,
    bloom: true,
    eval: |value, literal| value == literal,
    zone: |min, max, lit| min <= lit && lit <= max,
    seek: |iter, ordinal, exact, _total| if exact == 1 {
        iter.read_bitmap(ordinal)
    } else {
        Ok(RoaringBitmap::new())
    },
);

comparison_operator!(
    /// `column != literal`.
    NeOperator => Ne,
    bloom: false,
    eval: |value, literal| value != literal,
    zone: |min, max, lit| !(min == lit && max == lit),
    seek: |iter, ordinal, exact, total| {
        let mut rows = iter.read_union_bitmap(0, total)?;
        if exact == 1 {
            rows -= iter.read_bitmap(ordinal)?;
        }
        Ok(rows)
    },
);

comparison_operator!(
    /// `column < literal`.
    LtOperator => Lt,
    bloom: false,
    eval: |value, literal| value < literal,
    zone: |min, _max, lit| min < lit,
    seek: |iter, ordinal, _exact, _total| iter.read_union_bitmap(0, ordinal),
);

comparison_operator!(
    /// `column <= literal`.
    LeOperator => Le,
    bloom: false,
    eval: |value, literal| value <= literal,
    zone: |min, _max, lit| min <= lit,
    seek: |iter, ordinal, exact, _total| iter.read_union_bitmap(0, ordinal + exact),
);

comparison_operator!(
    /// `column > literal`.
    GtOperator => Gt,
    bloom: false,
    eval: |value, literal| value > literal,
    zone: |_min, max, lit| max > lit,
    seek: |iter, ordinal, exact, total| iter.read_union_bitmap(ordinal + exact, total),
);

comparison_operator!(
    /// `column >= literal`.
    GeOperator => Ge,
    bloom: false,
    eval: |value, literal| value >= literal,
    zone: |_min, max, lit| max >= lit,
    seek: |iter, ordinal, _exact, total| iter.read_union_bitmap(ordinal, total),
);
