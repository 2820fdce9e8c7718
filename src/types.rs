//! Logical field types, their physical storage representation, and schemas.

use std::{fmt, sync::Arc};

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef, TimeUnit};

use crate::error::ScanError;

/// Identifier of a column inside a segment.
pub type ColumnId = u32;

/// Logical type of a stored field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Boolean, stored one byte per row.
    Boolean,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Days since UNIX epoch.
    Date,
    /// Microseconds since UNIX epoch, no timezone.
    Timestamp,
    /// Fixed-width string, zero padded to `len` bytes in storage.
    Char {
        /// Declared width in bytes.
        len: u32,
    },
    /// Variable-width string.
    Varchar,
}

/// Physical representation a [`FieldType`] is stored as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalType {
    /// One byte per row, 0 or 1.
    Boolean,
    /// `i8` values.
    Int8,
    /// `i16` values.
    Int16,
    /// `i32` values.
    Int32,
    /// `i64` values.
    Int64,
    /// `f32` values.
    Float32,
    /// `f64` values.
    Float64,
    /// Variable-length byte strings.
    Binary,
}

impl PhysicalType {
    /// Returns a textual representation of the physical type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PhysicalType::Boolean => "boolean",
            PhysicalType::Int8 => "int8",
            PhysicalType::Int16 => "int16",
            PhysicalType::Int32 => "int32",
            PhysicalType::Int64 => "int64",
            PhysicalType::Float32 => "float32",
            PhysicalType::Float64 => "float64",
            PhysicalType::Binary => "binary",
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FieldType {
    /// The physical representation used for values of this type.
    #[must_use]
    pub fn physical(self) -> PhysicalType {
        match self {
            FieldType::Boolean => PhysicalType::Boolean,
            FieldType::Int8 => PhysicalType::Int8,
            FieldType::Int16 => PhysicalType::Int16,
            FieldType::Int32 | FieldType::Date => PhysicalType::Int32,
            FieldType::Int64 | FieldType::Timestamp => PhysicalType::Int64,
            FieldType::Float32 => PhysicalType::Float32,
            FieldType::Float64 => PhysicalType::Float64,
            FieldType::Char { .. } | FieldType::Varchar => PhysicalType::Binary,
        }
    }

    /// Arrow type used when emitting chunks.
    #[must_use]
    pub fn to_arrow(self) -> DataType {
        match self {
            FieldType::Boolean => DataType::Boolean,
            FieldType::Int8 => DataType::Int8,
            FieldType::Int16 => DataType::Int16,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float32 => DataType::Float32,
            FieldType::Float64 => DataType::Float64,
            FieldType::Date => DataType::Date32,
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            FieldType::Char { .. } | FieldType::Varchar => DataType::Utf8,
        }
    }

    /// Whether values are stored as integers (including dates and timestamps).
    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64
        )
    }

    /// Whether values are stored as floats.
    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, FieldType::Float32 | FieldType::Float64)
    }

    /// Whether values are byte strings.
    #[must_use]
    pub fn is_string(self) -> bool {
        matches!(self, FieldType::Char { .. } | FieldType::Varchar)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => f.write_str("BOOLEAN"),
            FieldType::Int8 => f.write_str("TINYINT"),
            FieldType::Int16 => f.write_str("SMALLINT"),
            FieldType::Int32 => f.write_str("INT"),
            FieldType::Int64 => f.write_str("BIGINT"),
            FieldType::Float32 => f.write_str("FLOAT"),
            FieldType::Float64 => f.write_str("DOUBLE"),
            FieldType::Date => f.write_str("DATE"),
            FieldType::Timestamp => f.write_str("DATETIME"),
            FieldType::Char { len } => write!(f, "CHAR({len})"),
            FieldType::Varchar => f.write_str("VARCHAR"),
        }
    }
}

/// One column of a segment schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Column identifier inside the segment.
    pub id: ColumnId,
    /// Column name used for output chunks.
    pub name: Arc<str>,
    /// Logical type.
    pub field_type: FieldType,
    /// Whether rows may be null.
    pub nullable: bool,
}

impl Field {
    /// Creates a new field.
    #[must_use]
    pub fn new<N>(id: ColumnId, name: N, field_type: FieldType, nullable: bool) -> Self
    where
        N: Into<Arc<str>>,
    {
        Self {
            id,
            name: name.into(),
            field_type,
            nullable,
        }
    }

    /// Arrow field used for output chunks.
    #[must_use]
    pub fn to_arrow(&self) -> ArrowField {
        ArrowField::new(self.name.as_ref(), self.field_type.to_arrow(), self.nullable)
    }
}

/// Ordered set of fields; either a full segment schema or a projection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate column ids.
    pub fn try_new(fields: Vec<Field>) -> Result<Self, ScanError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|prev| prev.id == field.id) {
                return Err(ScanError::invalid(format!(
                    "duplicate column id {} in schema",
                    field.id
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Fields in schema order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by column id.
    #[must_use]
    pub fn field(&self, id: ColumnId) -> Option<&Field> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// Position of a column id within the schema.
    #[must_use]
    pub fn index_of(&self, id: ColumnId) -> Option<usize> {
        self.fields.iter().position(|field| field.id == id)
    }

    /// Projects the listed column ids in the given order.
    pub fn project(&self, ids: &[ColumnId]) -> Result<Schema, ScanError> {
        let mut fields = Vec::with_capacity(ids.len());
        for id in ids {
            let field = self.field(*id).ok_or(ScanError::UnknownColumn(*id))?;
            fields.push(field.clone());
        }
        Schema::try_new(fields)
    }

    /// Arrow schema used for output chunks.
    #[must_use]
    pub fn to_arrow(&self) -> SchemaRef {
        Arc::new(ArrowSchema::new(
            self.fields.iter().map(Field::to_arrow).collect::<Vec<_>>(),
        ))
    }
}
