//! Read-only column views handed to predicates.
//!
//! A [`DataColumn`] is a closed set of physical representations backed by
//! Arrow buffers. A [`Column`] is either a bare data column or a
//! [`NullableColumn`], which layers a byte-per-row null indicator over any data
//! column. Predicates narrow a data column to their concrete representation via
//! [`PhysicalColumn::narrow`].

mod physical;

use std::sync::Arc;

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Date32Array, Float32Array,
        Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, StringArray,
        TimestampMicrosecondArray,
    },
    buffer::{BooleanBuffer, NullBuffer, ScalarBuffer},
    datatypes::{
        DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
        Int8Type, TimeUnit, TimestampMicrosecondType,
    },
    error::ArrowError,
};
pub use physical::PhysicalColumn;

use crate::{
    datum::{trim_zero_padding, Datum},
    error::ScanError,
    types::{FieldType, PhysicalType},
};

/// Densely packed values of one physical type.
#[derive(Clone, Debug)]
pub enum DataColumn {
    /// Booleans stored as 0/1 bytes.
    Boolean(ScalarBuffer<u8>),
    /// `i8` values.
    Int8(ScalarBuffer<i8>),
    /// `i16` values.
    Int16(ScalarBuffer<i16>),
    /// `i32` values (also DATE).
    Int32(ScalarBuffer<i32>),
    /// `i64` values (also DATETIME).
    Int64(ScalarBuffer<i64>),
    /// `f32` values.
    Float32(ScalarBuffer<f32>),
    /// `f64` values.
    Float64(ScalarBuffer<f64>),
    /// Byte strings without a validity buffer.
    Binary(BinaryArray),
}

impl DataColumn {
    /// Physical type of the stored values.
    #[must_use]
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            DataColumn::Boolean(_) => PhysicalType::Boolean,
            DataColumn::Int8(_) => PhysicalType::Int8,
            DataColumn::Int16(_) => PhysicalType::Int16,
            DataColumn::Int32(_) => PhysicalType::Int32,
            DataColumn::Int64(_) => PhysicalType::Int64,
            DataColumn::Float32(_) => PhysicalType::Float32,
            DataColumn::Float64(_) => PhysicalType::Float64,
            DataColumn::Binary(_) => PhysicalType::Binary,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            DataColumn::Boolean(values) => values.len(),
            DataColumn::Int8(values) => values.len(),
            DataColumn::Int16(values) => values.len(),
            DataColumn::Int32(values) => values.len(),
            DataColumn::Int64(values) => values.len(),
            DataColumn::Float32(values) => values.len(),
            DataColumn::Float64(values) => values.len(),
            DataColumn::Binary(values) => Array::len(values),
        }
    }

    /// Whether the column holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row` as a datum of `field_type`.
    #[must_use]
    pub fn datum_at(&self, row: usize, field_type: FieldType) -> Datum {
        match self {
            DataColumn::Boolean(values) => ScalarBuffer::<u8>::to_datum(&values[row], field_type),
            DataColumn::Int8(values) => ScalarBuffer::<i8>::to_datum(&values[row], field_type),
            DataColumn::Int16(values) => ScalarBuffer::<i16>::to_datum(&values[row], field_type),
            DataColumn::Int32(values) => ScalarBuffer::<i32>::to_datum(&values[row], field_type),
            DataColumn::Int64(values) => ScalarBuffer::<i64>::to_datum(&values[row], field_type),
            DataColumn::Float32(values) => ScalarBuffer::<f32>::to_datum(&values[row], field_type),
            DataColumn::Float64(values) => ScalarBuffer::<f64>::to_datum(&values[row], field_type),
            DataColumn::Binary(values) => BinaryArray::to_datum(values.value(row), field_type),
        }
    }

    /// Bytes covered by the column's rows. Slices of a shared buffer count
    /// only their own range.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            DataColumn::Boolean(values) => values.inner().len(),
            DataColumn::Int8(values) => values.inner().len(),
            DataColumn::Int16(values) => values.inner().len(),
            DataColumn::Int32(values) => values.inner().len(),
            DataColumn::Int64(values) => values.inner().len(),
            DataColumn::Float32(values) => values.inner().len(),
            DataColumn::Float64(values) => values.inner().len(),
            DataColumn::Binary(values) => {
                let offsets = values.value_offsets();
                let bytes = match (offsets.first(), offsets.last()) {
                    (Some(first), Some(last)) => (last - first) as usize,
                    _ => 0,
                };
                bytes + std::mem::size_of_val(offsets)
            }
        }
    }
}

/// Data column paired with a null indicator of equal length.
#[derive(Clone, Debug)]
pub struct NullableColumn {
    data: DataColumn,
    nulls: Vec<u8>,
    has_null: bool,
}

impl NullableColumn {
    /// Pairs `data` with `nulls`, where a non-zero byte marks row i as null.
    pub fn try_new(data: DataColumn, nulls: Vec<u8>) -> Result<Self, ScanError> {
        if data.len() != nulls.len() {
            return Err(ScanError::invalid(format!(
                "null indicator length {} does not match data length {}",
                nulls.len(),
                data.len()
            )));
        }
        let has_null = nulls.iter().any(|flag| *flag != 0);
        Ok(Self {
            data,
            nulls,
            has_null,
        })
    }

    /// Underlying values; rows flagged null hold arbitrary bits.
    #[must_use]
    pub fn data(&self) -> &DataColumn {
        &self.data
    }

    /// Byte-per-row null indicator.
    #[must_use]
    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }

    /// Whether any row is null.
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.has_null
    }
}

/// A batch of values for one field, optionally nullable.
#[derive(Clone, Debug)]
pub enum Column {
    /// Non-nullable column.
    Data(DataColumn),
    /// Nullable column.
    Nullable(NullableColumn),
}

impl Column {
    /// Whether the column carries a null indicator.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Column::Nullable(_))
    }

    /// Whether at least one row is null.
    #[must_use]
    pub fn has_null(&self) -> bool {
        match self {
            Column::Data(_) => false,
            Column::Nullable(column) => column.has_null(),
        }
    }

    /// Underlying data column.
    #[must_use]
    pub fn data(&self) -> &DataColumn {
        match self {
            Column::Data(data) => data,
            Column::Nullable(column) => column.data(),
        }
    }

    /// Null indicator, present only when the column actually contains nulls.
    #[must_use]
    pub fn null_flags(&self) -> Option<&[u8]> {
        match self {
            Column::Nullable(column) if column.has_null() => Some(column.nulls()),
            _ => None,
        }
    }

    /// Whether row `row` is null.
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        self.null_flags().is_some_and(|nulls| nulls[row] != 0)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Value at `row`, `Null` when the row is null.
    #[must_use]
    pub fn datum_at(&self, row: usize, field_type: FieldType) -> Datum {
        if self.is_null(row) {
            return Datum::Null;
        }
        self.data().datum_at(row, field_type)
    }

    /// Whether the column holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes held by the column, null indicator included.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            Column::Data(data) => data.memory_size(),
            Column::Nullable(column) => column.data.memory_size() + column.nulls.len(),
        }
    }

    /// Splits an Arrow array into data and a byte null indicator.
    ///
    /// `nullable` columns always come back as [`Column::Nullable`], even when
    /// the batch has no nulls; a non-nullable column containing nulls is
    /// rejected.
    pub fn from_arrow(
        array: &ArrayRef,
        field_type: FieldType,
        nullable: bool,
    ) -> Result<Column, ArrowError> {
        let data = data_from_arrow(array, field_type)?;
        let nulls = array.logical_nulls();
        if !nullable {
            if nulls.as_ref().is_some_and(|nulls| nulls.null_count() > 0) {
                return Err(ArrowError::InvalidArgumentError(format!(
                    "non-nullable {field_type} column contains nulls"
                )));
            }
            return Ok(Column::Data(data));
        }
        let flags = match nulls {
            Some(nulls) => (0..array.len())
                .map(|row| u8::from(nulls.is_null(row)))
                .collect(),
            None => vec![0; array.len()],
        };
        NullableColumn::try_new(data, flags)
            .map(Column::Nullable)
            .map_err(|err| ArrowError::InvalidArgumentError(err.to_string()))
    }

    /// Rebuilds an Arrow array of `field_type` from this column.
    ///
    /// CHAR values are emitted without their zero padding.
    pub fn to_arrow(&self, field_type: FieldType) -> Result<ArrayRef, ArrowError> {
        let nulls = self.null_flags().map(|flags| {
            NullBuffer::new(BooleanBuffer::from(
                flags.iter().map(|flag| *flag == 0).collect::<Vec<bool>>(),
            ))
        });
        let array: ArrayRef = match (self.data(), field_type) {
            (DataColumn::Boolean(values), FieldType::Boolean) => Arc::new(BooleanArray::new(
                BooleanBuffer::from(values.iter().map(|v| *v != 0).collect::<Vec<bool>>()),
                nulls,
            )),
            (DataColumn::Int8(values), FieldType::Int8) => {
                Arc::new(Int8Array::new(values.clone(), nulls))
            }
            (DataColumn::Int16(values), FieldType::Int16) => {
                Arc::new(Int16Array::new(values.clone(), nulls))
            }
            (DataColumn::Int32(values), FieldType::Int32) => {
                Arc::new(Int32Array::new(values.clone(), nulls))
            }
            (DataColumn::Int32(values), FieldType::Date) => {
                Arc::new(Date32Array::new(values.clone(), nulls))
            }
            (DataColumn::Int64(values), FieldType::Int64) => {
                Arc::new(Int64Array::new(values.clone(), nulls))
            }
            (DataColumn::Int64(values), FieldType::Timestamp) => {
                Arc::new(TimestampMicrosecondArray::new(values.clone(), nulls))
            }
            (DataColumn::Float32(values), FieldType::Float32) => {
                Arc::new(Float32Array::new(values.clone(), nulls))
            }
            (DataColumn::Float64(values), FieldType::Float64) => {
                Arc::new(Float64Array::new(values.clone(), nulls))
            }
            (DataColumn::Binary(values), FieldType::Varchar) => {
                let (offsets, buffer, _) = values.clone().into_parts();
                Arc::new(StringArray::try_new(offsets, buffer, nulls)?)
            }
            (DataColumn::Binary(values), FieldType::Char { .. }) => {
                let rows = Array::len(values);
                let mut strings = Vec::with_capacity(rows);
                for row in 0..rows {
                    if self.is_null(row) {
                        strings.push(None);
                        continue;
                    }
                    let text = std::str::from_utf8(trim_zero_padding(values.value(row)))
                        .map_err(|err| ArrowError::ParseError(err.to_string()))?;
                    strings.push(Some(text));
                }
                Arc::new(StringArray::from(strings))
            }
            (data, field_type) => {
                return Err(ArrowError::InvalidArgumentError(format!(
                    "{} column cannot be emitted as {field_type}",
                    data.physical_type()
                )))
            }
        };
        Ok(array)
    }
}

fn mismatch(array: &ArrayRef, field_type: FieldType) -> ArrowError {
    ArrowError::SchemaError(format!(
        "arrow type {} cannot back a {field_type} column",
        array.data_type()
    ))
}

fn data_from_arrow(array: &ArrayRef, field_type: FieldType) -> Result<DataColumn, ArrowError> {
    let data = match field_type {
        FieldType::Boolean => {
            let values = array
                .as_boolean_opt()
                .ok_or_else(|| mismatch(array, field_type))?
                .values();
            DataColumn::Boolean(ScalarBuffer::from(
                values.iter().map(u8::from).collect::<Vec<u8>>(),
            ))
        }
        FieldType::Int8 => DataColumn::Int8(primitive_values::<Int8Type>(array, field_type)?),
        FieldType::Int16 => DataColumn::Int16(primitive_values::<Int16Type>(array, field_type)?),
        FieldType::Int32 => DataColumn::Int32(primitive_values::<Int32Type>(array, field_type)?),
        FieldType::Date => DataColumn::Int32(primitive_values::<Date32Type>(array, field_type)?),
        FieldType::Int64 => DataColumn::Int64(primitive_values::<Int64Type>(array, field_type)?),
        FieldType::Timestamp => {
            if !matches!(
                array.data_type(),
                DataType::Timestamp(TimeUnit::Microsecond, None)
            ) {
                return Err(mismatch(array, field_type));
            }
            DataColumn::Int64(primitive_values::<TimestampMicrosecondType>(
                array, field_type,
            )?)
        }
        FieldType::Float32 => {
            DataColumn::Float32(primitive_values::<Float32Type>(array, field_type)?)
        }
        FieldType::Float64 => {
            DataColumn::Float64(primitive_values::<Float64Type>(array, field_type)?)
        }
        FieldType::Char { .. } | FieldType::Varchar => {
            let (offsets, values) = if let Some(strings) = array.as_string_opt::<i32>() {
                let (offsets, values, _) = strings.clone().into_parts();
                (offsets, values)
            } else if let Some(bytes) = array.as_binary_opt::<i32>() {
                let (offsets, values, _) = bytes.clone().into_parts();
                (offsets, values)
            } else {
                return Err(mismatch(array, field_type));
            };
            DataColumn::Binary(BinaryArray::new(offsets, values, None))
        }
    };
    Ok(data)
}

fn primitive_values<T>(
    array: &ArrayRef,
    field_type: FieldType,
) -> Result<ScalarBuffer<T::Native>, ArrowError>
where
    T: arrow::datatypes::ArrowPrimitiveType,
{
    array
        .as_primitive_opt::<T>()
        .map(|values| values.values().clone())
        .ok_or_else(|| mismatch(array, field_type))
}
