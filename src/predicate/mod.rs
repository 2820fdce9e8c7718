//! Column predicates evaluated against materialized columns and index
//! summaries.
//!
//! A predicate is built once per query through [`new_column_predicate`] (or one
//! of the shorthand constructors), which resolves the predicate kind and the
//! column's physical type into one monomorphized
//! [`ColumnOperatorPredicate`]. The result is shared as
//! `Arc<dyn ColumnPredicate>` and never mutated afterwards.
//!
//! Selection buffers are always owned by the caller:
//!
//! - `evaluate*` work on a byte-per-row 0/1 mask over `[from, to)`;
//! - `evaluate_branchless` works on a compacted array of `u16` row indices.

mod column_predicate;
mod in_list;
mod null;
mod operator;
mod pool;

use std::{fmt, sync::Arc};

use arrow::{array::BinaryArray, buffer::ScalarBuffer};
pub use column_predicate::ColumnOperatorPredicate;
pub use in_list::{InListOperator, NotInListOperator};
pub use null::NullPredicate;
pub use operator::{
    EqOperator, GeOperator, GtOperator, LeOperator, LtOperator, NeOperator, PredicateOperator,
};
pub use pool::PredicatePool;

use crate::{
    column::{Column, PhysicalColumn},
    datum::Datum,
    error::{IndexError, ScanError},
    index::{BitmapIndexIterator, BloomFilter, SparseRange, ZoneMapDetail},
    types::{ColumnId, FieldType, PhysicalType},
};

/// Logical kind of a predicate, independent of the column type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PredicateType {
    /// Equals (`=`).
    Eq,
    /// Not equals (`!=`).
    Ne,
    /// Less than (`<`).
    Lt,
    /// Less than or equal to (`<=`).
    Le,
    /// Greater than (`>`).
    Gt,
    /// Greater than or equal to (`>=`).
    Ge,
    /// Set membership (`IN`).
    InList,
    /// Set exclusion (`NOT IN`).
    NotInList,
    /// `IS NULL`.
    IsNull,
    /// `IS NOT NULL`.
    NotNull,
}

impl PredicateType {
    /// Returns a textual representation of the predicate kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PredicateType::Eq => "=",
            PredicateType::Ne => "!=",
            PredicateType::Lt => "<",
            PredicateType::Le => "<=",
            PredicateType::Gt => ">",
            PredicateType::Ge => ">=",
            PredicateType::InList => "IN",
            PredicateType::NotInList => "NOT IN",
            PredicateType::IsNull => "IS NULL",
            PredicateType::NotNull => "IS NOT NULL",
        }
    }
}

impl fmt::Display for PredicateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over one column, shared read-only across scans.
pub trait ColumnPredicate: Send + Sync + fmt::Debug {
    /// Column the predicate reads.
    fn column_id(&self) -> ColumnId;

    /// Field type the literals are bound to.
    fn field_type(&self) -> FieldType;

    /// Logical kind.
    fn predicate_type(&self) -> PredicateType;

    /// Sets `sel[i]` to whether row `i` passes, for `i` in `[from, to)`.
    fn evaluate(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError>;

    /// `sel[i] = sel[i] && passes(i)`; the test runs for every row.
    fn evaluate_and(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError>;

    /// `sel[i] = sel[i] || passes(i)`; the test runs for every row.
    fn evaluate_or(
        &self,
        column: &Column,
        sel: &mut [u8],
        from: usize,
        to: usize,
    ) -> Result<(), ScanError>;

    /// Compacts the row indices in `sel[..sel_size]` to those that pass,
    /// preserving order, and returns how many remain.
    fn evaluate_branchless(
        &self,
        column: &Column,
        sel: &mut [u16],
        sel_size: u16,
    ) -> Result<u16, ScanError>;

    /// Whether a range summarized by `detail` could hold a passing row.
    fn zone_map_filter(&self, detail: &ZoneMapDetail) -> bool;

    /// Whether [`ColumnPredicate::bloom_filter`] may be called.
    fn support_bloom_filter(&self) -> bool;

    /// Whether a page whose values went into `filter` could hold a passing
    /// row. Only valid when [`ColumnPredicate::support_bloom_filter`].
    fn bloom_filter(&self, filter: &dyn BloomFilter) -> bool;

    /// Narrows `range` to the rows whose dictionary value passes.
    fn seek_bitmap_dictionary(
        &self,
        iter: &mut BitmapIndexIterator,
        range: &mut SparseRange,
    ) -> Result<(), IndexError>;

    /// Rebinds the predicate to `target`, registering the result in `pool`.
    ///
    /// Literals are cast with checked conversion; a lossy cast fails with
    /// [`ScanError::TypeConversion`].
    fn convert_to(
        &self,
        target: FieldType,
        pool: &mut PredicatePool,
    ) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
        let literals = self
            .values()
            .iter()
            .map(|datum| datum.cast_to(target))
            .collect::<Result<Vec<_>, _>>()?;
        let converted =
            new_column_predicate(self.predicate_type(), self.column_id(), target, literals)?;
        pool.add(converted)
    }

    /// The literal when exactly one is bound, otherwise `Null`.
    fn value(&self) -> Datum {
        let mut values = self.values();
        if values.len() == 1 {
            values.pop().unwrap_or(Datum::Null)
        } else {
            Datum::Null
        }
    }

    /// All bound literals.
    fn values(&self) -> Vec<Datum>;

    /// Whether the batch paths (branchless compaction included) suit this
    /// predicate. Membership tests over byte strings answer false.
    fn can_vectorized(&self) -> bool;

    /// Pads CHAR literals with zero bytes up to `len`.
    fn padding_zeros(&mut self, len: usize);

    /// Human readable form, e.g. `column 3 > 25`.
    fn debug_string(&self) -> String;

    /// Approximate footprint in bytes, charged by [`PredicatePool`].
    fn memory_size(&self) -> usize;
}

/// Builds a predicate of `predicate_type` over column `column_id`.
///
/// Non-string literals are cast to `field_type` first (checked); string
/// literals must already be byte strings. CHAR literals are zero padded.
pub fn new_column_predicate(
    predicate_type: PredicateType,
    column_id: ColumnId,
    field_type: FieldType,
    literals: Vec<Datum>,
) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
    match predicate_type {
        PredicateType::IsNull | PredicateType::NotNull => {
            if !literals.is_empty() {
                return Err(ScanError::invalid(format!(
                    "'{predicate_type}' takes no literal, got {}",
                    literals.len()
                )));
            }
            return Ok(Arc::new(NullPredicate::new(
                column_id,
                field_type,
                predicate_type == PredicateType::IsNull,
            )));
        }
        _ => {}
    }
    let literals = if field_type.is_string() {
        literals
    } else {
        literals
            .into_iter()
            .map(|datum| datum.cast_to(field_type))
            .collect::<Result<Vec<_>, _>>()?
    };
    match field_type.physical() {
        PhysicalType::Boolean => {
            build::<ScalarBuffer<u8>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Int8 => {
            build::<ScalarBuffer<i8>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Int16 => {
            build::<ScalarBuffer<i16>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Int32 => {
            build::<ScalarBuffer<i32>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Int64 => {
            build::<ScalarBuffer<i64>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Float32 => {
            build::<ScalarBuffer<f32>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Float64 => {
            build::<ScalarBuffer<f64>>(predicate_type, column_id, field_type, &literals)
        }
        PhysicalType::Binary => {
            build::<BinaryArray>(predicate_type, column_id, field_type, &literals)
        }
    }
}

fn build<C: PhysicalColumn>(
    predicate_type: PredicateType,
    column_id: ColumnId,
    field_type: FieldType,
    literals: &[Datum],
) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
    fn bind<Op: PredicateOperator>(
        column_id: ColumnId,
        field_type: FieldType,
        literals: &[Datum],
    ) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
        Ok(Arc::new(ColumnOperatorPredicate::<Op>::try_new(
            column_id, field_type, literals,
        )?))
    }

    match predicate_type {
        PredicateType::Eq => bind::<EqOperator<C>>(column_id, field_type, literals),
        PredicateType::Ne => bind::<NeOperator<C>>(column_id, field_type, literals),
        PredicateType::Lt => bind::<LtOperator<C>>(column_id, field_type, literals),
        PredicateType::Le => bind::<LeOperator<C>>(column_id, field_type, literals),
        PredicateType::Gt => bind::<GtOperator<C>>(column_id, field_type, literals),
        PredicateType::Ge => bind::<GeOperator<C>>(column_id, field_type, literals),
        PredicateType::InList => bind::<InListOperator<C>>(column_id, field_type, literals),
        PredicateType::NotInList => bind::<NotInListOperator<C>>(column_id, field_type, literals),
        PredicateType::IsNull | PredicateType::NotNull => Ok(Arc::new(NullPredicate::new(
            column_id,
            field_type,
            predicate_type == PredicateType::IsNull,
        ))),
    }
}

macro_rules! comparison_constructor {
    ($($(#[$meta:meta])* $name:ident => $ptype:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $name(
                column_id: ColumnId,
                field_type: FieldType,
                value: impl Into<Datum>,
            ) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
                new_column_predicate(PredicateType::$ptype, column_id, field_type, vec![value.into()])
            }
        )*
    };
}

comparison_constructor!(
    /// `column = value`.
    eq => Eq,
    /// `column != value`.
    ne => Ne,
    /// `column < value`.
    lt => Lt,
    /// `column <= value`.
    le => Le,
    /// `column > value`.
    gt => Gt,
    /// `column >= value`.
    ge => Ge,
);

/// `column IN (values)`.
pub fn in_list<I>(
    column_id: ColumnId,
    field_type: FieldType,
    values: I,
) -> Result<Arc<dyn ColumnPredicate>, ScanError>
where
    I: IntoIterator,
    I::Item: Into<Datum>,
{
    new_column_predicate(
        PredicateType::InList,
        column_id,
        field_type,
        values.into_iter().map(Into::into).collect(),
    )
}

/// `column NOT IN (values)`.
pub fn not_in_list<I>(
    column_id: ColumnId,
    field_type: FieldType,
    values: I,
) -> Result<Arc<dyn ColumnPredicate>, ScanError>
where
    I: IntoIterator,
    I::Item: Into<Datum>,
{
    new_column_predicate(
        PredicateType::NotInList,
        column_id,
        field_type,
        values.into_iter().map(Into::into).collect(),
    )
}

/// `column IS NULL`.
#[must_use]
pub fn is_null(column_id: ColumnId, field_type: FieldType) -> Arc<dyn ColumnPredicate> {
    Arc::new(NullPredicate::new(column_id, field_type, true))
}

/// `column IS NOT NULL`.
#[must_use]
pub fn is_not_null(column_id: ColumnId, field_type: FieldType) -> Arc<dyn ColumnPredicate> {
    Arc::new(NullPredicate::new(column_id, field_type, false))
}
