#![deny(missing_docs)]
//! Predicate evaluation and index pushdown for immutable columnar segments.
//!
//! A scan binds column predicates to a segment, narrows the candidate rows
//! with zone maps, bloom filters and bitmap indexes, and only then decodes
//! columns and evaluates what the indexes could not decide. Output chunks are
//! Arrow `RecordBatch` values.
//!
//! ```rust,ignore
//! use segscan::{predicate, SegmentIterator, SegmentReadOptions};
//!
//! let options = SegmentReadOptions::default()
//!     .with_predicate(predicate::gt(0, FieldType::Int32, 25)?);
//! for chunk in SegmentIterator::open(segment, &projection, options)? {
//!     let chunk = chunk?;
//! }
//! ```

mod observability;

/// Typed column batches handed to predicates.
pub mod column;

/// Literal values.
pub mod datum;

/// Error types for predicate evaluation and scans.
pub mod error;

/// Zone maps, bloom filters, bitmap indexes and row ranges.
pub mod index;

/// Memory trackers and per-scan accounting scopes.
pub mod memory;

/// Column predicates and their operators.
pub mod predicate;

/// Segment sources and the scan iterator.
pub mod segment;

/// Selection vector helpers.
pub mod selection;

/// Field types and schemas.
pub mod types;

pub use crate::{
    column::{Column, DataColumn, NullableColumn},
    datum::Datum,
    error::{IndexError, IndexKind, ScanError},
    index::SparseRange,
    memory::{MemLimitExceeded, MemScope, MemTracker},
    predicate::{new_column_predicate, ColumnPredicate, PredicatePool, PredicateType},
    segment::{
        MemSegment, MemSegmentBuilder, ScanStats, SegmentIterator, SegmentReadOptions,
        SegmentSource,
    },
    types::{ColumnId, Field, FieldType, PhysicalType, Schema},
};
