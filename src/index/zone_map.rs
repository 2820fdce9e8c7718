use std::{cmp::Ordering, ops::Range};

use crate::{
    column::{Column, DataColumn, PhysicalColumn},
    datum::Datum,
    types::FieldType,
};

/// Summary statistics of a page or segment.
///
/// `min`/`max` are only meaningful when `has_not_null`. A `Null` bound on a
/// range holding non-null values means the bound is unknown (for example a
/// float column containing NaN) and every predicate must answer "maybe".
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneMapDetail {
    /// Smallest non-null value.
    pub min: Datum,
    /// Largest non-null value.
    pub max: Datum,
    /// Whether any row is null.
    pub has_null: bool,
    /// Whether any row is not null.
    pub has_not_null: bool,
}

impl ZoneMapDetail {
    /// Statistics of a range holding at least one non-null value.
    #[must_use]
    pub fn new(min: Datum, max: Datum, has_null: bool) -> Self {
        Self {
            min,
            max,
            has_null,
            has_not_null: true,
        }
    }

    /// Statistics of a range where every row is null.
    #[must_use]
    pub fn all_null() -> Self {
        Self {
            min: Datum::Null,
            max: Datum::Null,
            has_null: true,
            has_not_null: false,
        }
    }

    /// Statistics of an empty range.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Datum::Null,
            max: Datum::Null,
            has_null: false,
            has_not_null: false,
        }
    }

    /// Whether min and max are both known.
    #[must_use]
    pub fn has_bounds(&self) -> bool {
        self.has_not_null && !self.min.is_null() && !self.max.is_null()
    }

    /// Computes statistics over a materialized column.
    #[must_use]
    pub fn from_column(column: &Column, field_type: FieldType) -> Self {
        let nulls = column.null_flags();
        let has_null = column.has_null();
        let bounds = match column.data() {
            DataColumn::Boolean(values) => min_max(values, nulls, field_type),
            DataColumn::Int8(values) => min_max(values, nulls, field_type),
            DataColumn::Int16(values) => min_max(values, nulls, field_type),
            DataColumn::Int32(values) => min_max(values, nulls, field_type),
            DataColumn::Int64(values) => min_max(values, nulls, field_type),
            DataColumn::Float32(values) => min_max(values, nulls, field_type),
            DataColumn::Float64(values) => min_max(values, nulls, field_type),
            DataColumn::Binary(values) => min_max(values, nulls, field_type),
        };
        match bounds {
            Bounds::Empty if has_null => Self::all_null(),
            Bounds::Empty => Self::empty(),
            Bounds::Known(min, max) => Self::new(min, max, has_null),
            Bounds::Unknown => Self::new(Datum::Null, Datum::Null, has_null),
        }
    }

    /// Widens `self` to also cover `other`.
    pub fn merge(&mut self, other: &ZoneMapDetail) {
        if other.has_not_null {
            if !self.has_not_null {
                self.min = other.min.clone();
                self.max = other.max.clone();
            } else if !self.has_bounds() || !other.has_bounds() {
                self.min = Datum::Null;
                self.max = Datum::Null;
            } else {
                if other.min.compare(&self.min) == Some(Ordering::Less) {
                    self.min = other.min.clone();
                }
                if other.max.compare(&self.max) == Some(Ordering::Greater) {
                    self.max = other.max.clone();
                }
            }
        }
        self.has_null |= other.has_null;
        self.has_not_null |= other.has_not_null;
    }
}

/// Zone map of one page of a segment.
#[derive(Clone, Debug, PartialEq)]
pub struct PageZoneMap {
    /// Rows of the page.
    pub rows: Range<u32>,
    /// Statistics over those rows.
    pub detail: ZoneMapDetail,
}

enum Bounds {
    Empty,
    Known(Datum, Datum),
    Unknown,
}

fn min_max<C: PhysicalColumn>(values: &C, nulls: Option<&[u8]>, field_type: FieldType) -> Bounds {
    let mut bounds: Option<(&C::Value, &C::Value)> = None;
    for row in 0..values.len() {
        if nulls.is_some_and(|nulls| nulls[row] != 0) {
            continue;
        }
        let value = values.value_at(row);
        // NaN compares with nothing, so neither bound can be trusted.
        if value.partial_cmp(value).is_none() {
            return Bounds::Unknown;
        }
        bounds = match bounds {
            None => Some((value, value)),
            Some((min, max)) => Some((
                if value < min { value } else { min },
                if value > max { value } else { max },
            )),
        };
    }
    match bounds {
        None => Bounds::Empty,
        Some((min, max)) => Bounds::Known(
            C::to_datum(min, field_type),
            C::to_datum(max, field_type),
        ),
    }
}
