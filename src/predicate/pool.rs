use std::sync::Arc;

use super::ColumnPredicate;
use crate::{
    error::ScanError,
    memory::{MemScope, MemTracker},
};

/// Scan-scoped owner of predicates created while opening a segment.
///
/// Every predicate added is charged to the pool's memory scope and released
/// when the pool is cleared or dropped.
#[derive(Debug)]
pub struct PredicatePool {
    predicates: Vec<Arc<dyn ColumnPredicate>>,
    scope: MemScope,
}

impl PredicatePool {
    /// Pool charging `tracker`, or only counting locally when `None`.
    #[must_use]
    pub fn new(tracker: Option<Arc<MemTracker>>) -> Self {
        Self {
            predicates: Vec::new(),
            scope: MemScope::new(tracker),
        }
    }

    /// Takes ownership of `predicate`, charging its footprint.
    pub fn add(
        &mut self,
        predicate: Arc<dyn ColumnPredicate>,
    ) -> Result<Arc<dyn ColumnPredicate>, ScanError> {
        self.scope.try_consume(predicate.memory_size())?;
        self.predicates.push(Arc::clone(&predicate));
        Ok(predicate)
    }

    /// Predicates owned by the pool, in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[Arc<dyn ColumnPredicate>] {
        &self.predicates
    }

    /// Number of owned predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether the pool owns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Bytes charged for the owned predicates.
    #[must_use]
    pub fn charged(&self) -> usize {
        self.scope.outstanding()
    }

    /// Flushes pending charges to the tracker.
    pub fn commit(&mut self) {
        self.scope.commit();
    }

    /// Drops every predicate and releases their charges.
    pub fn clear(&mut self) {
        self.predicates.clear();
        self.scope.release_all();
    }
}
