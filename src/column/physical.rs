use std::{borrow::Borrow, borrow::Cow, fmt};

use arrow::{array::BinaryArray, buffer::ScalarBuffer};

use super::DataColumn;
use crate::{
    datum::Datum,
    types::{FieldType, PhysicalType},
};

/// Concrete physical column a predicate operator is specialized for.
///
/// Every implementation is one arm of [`DataColumn`]; `narrow` is the safe
/// downcast from the closed enum to that arm.
pub trait PhysicalColumn: Clone + fmt::Debug + Send + Sync + 'static {
    /// Borrowed value type compared by operators.
    type Value: ?Sized + PartialOrd + fmt::Debug;
    /// Owned literal type bound into predicates.
    type Owned: Borrow<Self::Value> + Clone + fmt::Debug + PartialEq + Send + Sync + 'static;

    /// Physical type this column represents.
    const PHYSICAL_TYPE: PhysicalType;
    /// Whether values have a fixed width (and compare without indirection).
    const FIXED_WIDTH: bool;

    /// Narrows a data column to this representation.
    fn narrow(column: &DataColumn) -> Option<&Self>;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Whether the column holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row`.
    fn value_at(&self, row: usize) -> &Self::Value;

    /// Extracts a literal of this representation from a datum.
    fn literal(datum: &Datum) -> Option<Self::Owned>;

    /// Wraps a value back into a datum of `field_type`.
    fn to_datum(value: &Self::Value, field_type: FieldType) -> Datum;

    /// Key bytes used for bloom filter probes.
    fn bloom_key(value: &Self::Value) -> Cow<'_, [u8]>;

    /// Pads a fixed-width string literal with trailing zeros up to `len`.
    fn pad_zeros(_value: &mut Self::Owned, _len: usize) -> bool {
        false
    }
}

/// Little-endian probe bytes; values that compare equal share one key.
trait KeyBytes {
    fn key_bytes(&self) -> Vec<u8>;
}

macro_rules! int_key_bytes {
    ($($native:ty),*) => {
        $(
            impl KeyBytes for $native {
                fn key_bytes(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }
        )*
    };
}

int_key_bytes!(u8, i8, i16, i32, i64);

impl KeyBytes for f32 {
    fn key_bytes(&self) -> Vec<u8> {
        // -0.0 == 0.0
        let value = if *self == 0.0 { 0.0_f32 } else { *self };
        value.to_le_bytes().to_vec()
    }
}

impl KeyBytes for f64 {
    fn key_bytes(&self) -> Vec<u8> {
        let value = if *self == 0.0 { 0.0_f64 } else { *self };
        value.to_le_bytes().to_vec()
    }
}

macro_rules! fixed_width_column {
    ($native:ty, $variant:ident, |$datum:ident| $literal:expr, |$value:ident, $field:ident| $to_datum:expr) => {
        impl PhysicalColumn for ScalarBuffer<$native> {
            type Value = $native;
            type Owned = $native;

            const PHYSICAL_TYPE: PhysicalType = PhysicalType::$variant;
            const FIXED_WIDTH: bool = true;

            fn narrow(column: &DataColumn) -> Option<&Self> {
                match column {
                    DataColumn::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn len(&self) -> usize {
                self.as_ref().len()
            }

            #[inline]
            fn value_at(&self, row: usize) -> &$native {
                &self[row]
            }

            fn literal($datum: &Datum) -> Option<$native> {
                $literal
            }

            fn to_datum($value: &$native, $field: FieldType) -> Datum {
                $to_datum
            }

            fn bloom_key(value: &$native) -> Cow<'_, [u8]> {
                Cow::Owned(value.key_bytes())
            }
        }
    };
}

fixed_width_column!(
    u8,
    Boolean,
    |datum| match datum {
        Datum::Boolean(v) => Some(u8::from(*v)),
        _ => None,
    },
    |value, _field| Datum::Boolean(*value != 0)
);
fixed_width_column!(
    i8,
    Int8,
    |datum| match datum {
        Datum::Int8(v) => Some(*v),
        _ => None,
    },
    |value, _field| Datum::Int8(*value)
);
fixed_width_column!(
    i16,
    Int16,
    |datum| match datum {
        Datum::Int16(v) => Some(*v),
        _ => None,
    },
    |value, _field| Datum::Int16(*value)
);
fixed_width_column!(
    i32,
    Int32,
    |datum| match datum {
        Datum::Int32(v) | Datum::Date(v) => Some(*v),
        _ => None,
    },
    |value, field| match field {
        FieldType::Date => Datum::Date(*value),
        _ => Datum::Int32(*value),
    }
);
fixed_width_column!(
    i64,
    Int64,
    |datum| match datum {
        Datum::Int64(v) | Datum::Timestamp(v) => Some(*v),
        _ => None,
    },
    |value, field| match field {
        FieldType::Timestamp => Datum::Timestamp(*value),
        _ => Datum::Int64(*value),
    }
);
fixed_width_column!(
    f32,
    Float32,
    |datum| match datum {
        Datum::Float32(v) => Some(*v),
        _ => None,
    },
    |value, _field| Datum::Float32(*value)
);
fixed_width_column!(
    f64,
    Float64,
    |datum| match datum {
        Datum::Float64(v) => Some(*v),
        _ => None,
    },
    |value, _field| Datum::Float64(*value)
);

impl PhysicalColumn for BinaryArray {
    type Value = [u8];
    type Owned = Vec<u8>;

    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Binary;
    const FIXED_WIDTH: bool = false;

    fn narrow(column: &DataColumn) -> Option<&Self> {
        match column {
            DataColumn::Binary(values) => Some(values),
            _ => None,
        }
    }

    fn len(&self) -> usize {
        arrow::array::Array::len(self)
    }

    #[inline]
    fn value_at(&self, row: usize) -> &[u8] {
        self.value(row)
    }

    fn literal(datum: &Datum) -> Option<Vec<u8>> {
        match datum {
            Datum::Bytes(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }

    fn to_datum(value: &[u8], _field_type: FieldType) -> Datum {
        Datum::Bytes(value.to_vec())
    }

    fn bloom_key(value: &[u8]) -> Cow<'_, [u8]> {
        Cow::Borrowed(value)
    }

    fn pad_zeros(value: &mut Vec<u8>, len: usize) -> bool {
        if value.len() >= len {
            return false;
        }
        value.resize(len, 0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_rejects_other_representations() {
        let ints = DataColumn::Int32(ScalarBuffer::from(vec![1, 2]));
        assert!(<ScalarBuffer<i32>>::narrow(&ints).is_some());
        assert!(<ScalarBuffer<i64>>::narrow(&ints).is_none());
        assert!(BinaryArray::narrow(&ints).is_none());
    }

    #[test]
    fn date_literals_share_int32_storage() {
        assert_eq!(<ScalarBuffer<i32>>::literal(&Datum::Date(9)), Some(9));
        assert_eq!(
            <ScalarBuffer<i32>>::to_datum(&9, FieldType::Date),
            Datum::Date(9)
        );
        assert_eq!(<ScalarBuffer<i32>>::literal(&Datum::Int64(9)), None);
    }

    #[test]
    fn signed_zero_shares_bloom_key() {
        assert_eq!(
            <ScalarBuffer<f64>>::bloom_key(&-0.0),
            <ScalarBuffer<f64>>::bloom_key(&0.0)
        );
    }

    #[test]
    fn binary_padding_only_grows() {
        let mut value = b"ab".to_vec();
        assert!(BinaryArray::pad_zeros(&mut value, 4));
        assert_eq!(value, b"ab\0\0");
        assert!(!BinaryArray::pad_zeros(&mut value, 3));
    }
}
