//! Owned literal values carried by predicates and index statistics.

use std::{cmp::Ordering, fmt};

use crate::{error::ScanError, types::FieldType};

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// One value of any supported logical type.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    /// SQL `NULL`.
    Null,
    /// Boolean literal.
    Boolean(bool),
    /// Signed 8-bit integer.
    Int8(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// Days since UNIX epoch.
    Date(i32),
    /// Microseconds since UNIX epoch.
    Timestamp(i64),
    /// Byte string (CHAR / VARCHAR).
    Bytes(Vec<u8>),
}

impl Datum {
    /// Returns true when the datum is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int8(v) => Some(i64::from(*v)),
            Datum::Int16(v) => Some(i64::from(*v)),
            Datum::Int32(v) => Some(i64::from(*v)),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float32(v) => Some(f64::from(*v)),
            Datum::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Compares two datums of compatible types.
    ///
    /// Integers of different widths compare numerically, as do floats. Nulls and
    /// mismatched kinds are incomparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        use Datum::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(lhs), Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (Date(lhs), Date(rhs)) => Some(lhs.cmp(rhs)),
            (Timestamp(lhs), Timestamp(rhs)) => Some(lhs.cmp(rhs)),
            (Bytes(lhs), Bytes(rhs)) => Some(lhs.as_slice().cmp(rhs.as_slice())),
            (lhs, rhs) => {
                if let (Some(l), Some(r)) = (lhs.as_i64(), rhs.as_i64()) {
                    Some(l.cmp(&r))
                } else if let (Some(l), Some(r)) = (lhs.as_f64(), rhs.as_f64()) {
                    l.partial_cmp(&r)
                } else {
                    None
                }
            }
        }
    }

    /// Approximate heap footprint in bytes.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            Datum::Bytes(bytes) => bytes.capacity(),
            _ => 0,
        }
    }

    /// Casts the datum to a value of `target`, failing when information would
    /// be lost.
    pub fn cast_to(&self, target: FieldType) -> Result<Datum, ScanError> {
        if self.is_null() {
            return Ok(Datum::Null);
        }
        let lossy = |reason: &str| ScanError::conversion(self, target, reason);
        match target {
            FieldType::Boolean => match self {
                Datum::Boolean(v) => Ok(Datum::Boolean(*v)),
                other => match other.as_i64() {
                    Some(0) => Ok(Datum::Boolean(false)),
                    Some(1) => Ok(Datum::Boolean(true)),
                    _ => Err(lossy("not a boolean value")),
                },
            },
            FieldType::Int8 => self
                .integral(target)
                .and_then(|v| i8::try_from(v).map_err(|_| lossy("out of range")))
                .map(Datum::Int8),
            FieldType::Int16 => self
                .integral(target)
                .and_then(|v| i16::try_from(v).map_err(|_| lossy("out of range")))
                .map(Datum::Int16),
            FieldType::Int32 => self
                .integral(target)
                .and_then(|v| i32::try_from(v).map_err(|_| lossy("out of range")))
                .map(Datum::Int32),
            FieldType::Int64 => self.integral(target).map(Datum::Int64),
            FieldType::Float32 => {
                let value = self.floating(target)?;
                let narrowed = value as f32;
                if value.is_finite() && f64::from(narrowed) != value {
                    return Err(lossy("not representable as FLOAT"));
                }
                Ok(Datum::Float32(narrowed))
            }
            FieldType::Float64 => self.floating(target).map(Datum::Float64),
            FieldType::Date => match self {
                Datum::Date(v) => Ok(Datum::Date(*v)),
                Datum::Timestamp(micros) => {
                    if micros % MICROS_PER_DAY != 0 {
                        return Err(lossy("timestamp is not at a day boundary"));
                    }
                    i32::try_from(micros / MICROS_PER_DAY)
                        .map(Datum::Date)
                        .map_err(|_| lossy("out of range"))
                }
                _ => Err(lossy("not a temporal value")),
            },
            FieldType::Timestamp => match self {
                Datum::Timestamp(v) => Ok(Datum::Timestamp(*v)),
                Datum::Date(days) => i64::from(*days)
                    .checked_mul(MICROS_PER_DAY)
                    .map(Datum::Timestamp)
                    .ok_or_else(|| lossy("out of range")),
                _ => Err(lossy("not a temporal value")),
            },
            FieldType::Char { len } => match self {
                Datum::Bytes(bytes) => {
                    let trimmed = trim_zero_padding(bytes);
                    let len = len as usize;
                    if trimmed.len() > len {
                        return Err(lossy("value longer than CHAR width"));
                    }
                    let mut padded = Vec::with_capacity(len);
                    padded.extend_from_slice(trimmed);
                    padded.resize(len, 0);
                    Ok(Datum::Bytes(padded))
                }
                _ => Err(lossy("not a string value")),
            },
            FieldType::Varchar => match self {
                Datum::Bytes(bytes) => Ok(Datum::Bytes(trim_zero_padding(bytes).to_vec())),
                _ => Err(lossy("not a string value")),
            },
        }
    }

    fn integral(&self, target: FieldType) -> Result<i64, ScanError> {
        if let Some(v) = self.as_i64() {
            return Ok(v);
        }
        match self {
            Datum::Boolean(v) => Ok(i64::from(*v)),
            Datum::Float32(_) | Datum::Float64(_) => {
                let v = self.as_f64().unwrap_or(f64::NAN);
                if v.fract() != 0.0 || !v.is_finite() || v < i64::MIN as f64 || v > i64::MAX as f64
                {
                    Err(ScanError::conversion(self, target, "not an integral value"))
                } else {
                    Ok(v as i64)
                }
            }
            _ => Err(ScanError::conversion(self, target, "not a numeric value")),
        }
    }

    fn floating(&self, target: FieldType) -> Result<f64, ScanError> {
        if let Some(v) = self.as_f64() {
            return Ok(v);
        }
        match self.as_i64() {
            Some(v) if v.unsigned_abs() <= (1_u64 << 53) => Ok(v as f64),
            Some(_) => Err(ScanError::conversion(self, target, "integer loses precision")),
            None => Err(ScanError::conversion(self, target, "not a numeric value")),
        }
    }
}

/// Strips the zero bytes CHAR storage pads values with.
pub(crate) fn trim_zero_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |pos| pos + 1);
    &bytes[..end]
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("NULL"),
            Datum::Boolean(v) => write!(f, "{v}"),
            Datum::Int8(v) => write!(f, "{v}"),
            Datum::Int16(v) => write!(f, "{v}"),
            Datum::Int32(v) => write!(f, "{v}"),
            Datum::Int64(v) => write!(f, "{v}"),
            Datum::Float32(v) => write!(f, "{v}"),
            Datum::Float64(v) => write!(f, "{v}"),
            Datum::Date(v) => write!(f, "DATE({v})"),
            Datum::Timestamp(v) => write!(f, "DATETIME({v})"),
            Datum::Bytes(v) => write!(f, "'{}'", String::from_utf8_lossy(trim_zero_padding(v))),
        }
    }
}

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$native> for Datum {
                fn from(value: $native) -> Self {
                    Datum::$variant(value)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Boolean,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Vec<u8> => Bytes,
);

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::Bytes(value.into_bytes())
    }
}

impl<T> From<Option<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Datum::Null, Into::into)
    }
}
