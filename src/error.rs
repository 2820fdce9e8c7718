use arrow::error::ArrowError;
use thiserror::Error;

use crate::{memory::MemLimitExceeded, types::ColumnId, types::FieldType};

/// Kind of index consulted by a pushdown stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Per-page and per-segment min/max/null statistics.
    ZoneMap,
    /// Probabilistic membership filter.
    BloomFilter,
    /// Dictionary with one row bitmap per distinct value.
    Bitmap,
}

impl IndexKind {
    /// Returns the snake_case name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::ZoneMap => "zone_map",
            IndexKind::BloomFilter => "bloom_filter",
            IndexKind::Bitmap => "bitmap",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while consulting a pushdown index.
///
/// The segment iterator downgrades these to "skip this optimization" unless the
/// read options mark pushdown as mandatory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The index was never built for the column.
    #[error("{kind} index absent for column {column}")]
    Absent {
        /// Column the index was requested for.
        column: ColumnId,
        /// Kind of index requested.
        kind: IndexKind,
    },
    /// The index exists but cannot be trusted.
    #[error("{kind} index corrupt for column {column}: {reason}")]
    Corrupt {
        /// Column the index covers.
        column: ColumnId,
        /// Kind of index.
        kind: IndexKind,
        /// What failed validation.
        reason: String,
    },
}

impl IndexError {
    /// Construct a corruption error from a message.
    pub fn corrupt(column: ColumnId, kind: IndexKind, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            column,
            kind,
            reason: reason.into(),
        }
    }

    /// Index kind the error refers to.
    #[must_use]
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexError::Absent { kind, .. } | IndexError::Corrupt { kind, .. } => *kind,
        }
    }
}

/// Error returned by predicate evaluation and segment scans.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Pushdown index failure that could not be downgraded.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    /// A materialized column could not be decoded; fatal for the segment scan.
    #[error("failed to decode column {column}: {reason}")]
    Decode {
        /// Column being materialized.
        column: ColumnId,
        /// Underlying failure.
        reason: String,
    },
    /// A predicate cannot be rebound to the stored type.
    #[error("cannot convert {from} to {to}: {reason}")]
    TypeConversion {
        /// Source value or type.
        from: String,
        /// Requested target type.
        to: FieldType,
        /// Why the conversion would lose information.
        reason: String,
    },
    /// The memory tracker rejected an allocation.
    #[error("allocation exceeded: {0}")]
    AllocationExceeded(#[from] MemLimitExceeded),
    /// A column's physical representation does not match the predicate.
    #[error("column type mismatch: expected {expected}, got {actual}")]
    ColumnTypeMismatch {
        /// Representation the caller expected.
        expected: String,
        /// Representation found.
        actual: String,
    },
    /// A predicate or projection names a column the segment does not have.
    #[error("unknown column: {0}")]
    UnknownColumn(ColumnId),
    /// Caller supplied an out-of-range batch, selection or literal.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Arrow failed to assemble or convert a batch.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl ScanError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn conversion(
        from: impl std::fmt::Display,
        to: FieldType,
        reason: impl Into<String>,
    ) -> Self {
        Self::TypeConversion {
            from: from.to_string(),
            to,
            reason: reason.into(),
        }
    }
}
