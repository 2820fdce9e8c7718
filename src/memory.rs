//! Memory accounting for scan-scoped allocations.
//!
//! [`MemTracker`] is the shared counter (optionally limited, optionally chained
//! to a parent). [`MemScope`] is the handle a single iterator owns: it batches
//! small deltas locally and only touches the shared atomics once the pending
//! delta reaches [`MemScope::BATCH_SIZE`].

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use thiserror::Error;

/// A tracker rejected an allocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error(
    "memory limit of tracker '{label}' exceeded: limit {limit} bytes, consumed {consumption} \
     bytes, requested {requested} bytes"
)]
pub struct MemLimitExceeded {
    /// Label of the tracker whose limit was hit.
    pub label: String,
    /// Configured limit in bytes.
    pub limit: usize,
    /// Consumption before the request.
    pub consumption: usize,
    /// Bytes requested.
    pub requested: usize,
}

/// Shared memory counter with an optional limit and parent.
pub struct MemTracker {
    label: String,
    limit: Option<usize>,
    consumption: AtomicUsize,
    peak: AtomicUsize,
    parent: Option<Arc<MemTracker>>,
}

impl fmt::Debug for MemTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemTracker")
            .field("label", &self.label)
            .field("limit", &self.limit)
            .field("consumption", &self.consumption())
            .field("peak", &self.peak())
            .field("parent", &self.parent.as_ref().map(|parent| parent.label()))
            .finish()
    }
}

impl MemTracker {
    /// Root tracker, unlimited when `limit` is `None`.
    #[must_use]
    pub fn new(label: impl Into<String>, limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            consumption: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent: None,
        })
    }

    /// Child tracker whose consumption also counts against `parent`.
    #[must_use]
    pub fn with_parent(
        label: impl Into<String>,
        limit: Option<usize>,
        parent: Arc<MemTracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            limit,
            consumption: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent: Some(parent),
        })
    }

    /// Tracker label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Configured limit.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently accounted.
    #[must_use]
    pub fn consumption(&self) -> usize {
        self.consumption.load(Ordering::Relaxed)
    }

    /// Highest consumption observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    fn chain(&self) -> impl Iterator<Item = &MemTracker> {
        std::iter::successors(Some(self), |tracker| tracker.parent.as_deref())
    }

    fn add(&self, bytes: usize) -> usize {
        let now = self.consumption.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.peak.fetch_max(now, Ordering::Relaxed);
        now
    }

    fn sub(&self, bytes: usize) {
        // fetch_update only fails when the closure returns None
        let _ = self
            .consumption
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            });
    }

    /// Accounts `bytes` along the whole chain without checking limits.
    pub fn consume(&self, bytes: usize) {
        for tracker in self.chain() {
            tracker.add(bytes);
        }
    }

    /// Accounts `bytes` along the chain, rolling back if any limit is exceeded.
    pub fn try_consume(&self, bytes: usize) -> Result<(), MemLimitExceeded> {
        for (depth, tracker) in self.chain().enumerate() {
            let now = tracker.add(bytes);
            if let Some(limit) = tracker.limit {
                if now > limit {
                    for charged in self.chain().take(depth + 1) {
                        charged.sub(bytes);
                    }
                    return Err(MemLimitExceeded {
                        label: tracker.label.clone(),
                        limit,
                        consumption: now - bytes,
                        requested: bytes,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns `bytes` to the whole chain.
    pub fn release(&self, bytes: usize) {
        for tracker in self.chain() {
            tracker.sub(bytes);
        }
    }
}

/// Per-iterator accounting handle with local batching.
#[derive(Debug)]
pub struct MemScope {
    tracker: Option<Arc<MemTracker>>,
    /// Delta not yet flushed to the tracker.
    pending: isize,
    /// Bytes charged through this scope and not yet released.
    outstanding: usize,
}

impl MemScope {
    /// Pending delta that triggers a flush to the shared tracker.
    pub const BATCH_SIZE: usize = 2 * 1024 * 1024;

    /// Scope reporting to `tracker`; `None` only counts locally.
    #[must_use]
    pub fn new(tracker: Option<Arc<MemTracker>>) -> Self {
        Self {
            tracker,
            pending: 0,
            outstanding: 0,
        }
    }

    /// Tracker this scope reports to.
    #[must_use]
    pub fn tracker(&self) -> Option<&Arc<MemTracker>> {
        self.tracker.as_ref()
    }

    /// Bytes charged through this scope and not yet released.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Charges `bytes`, flushing to the tracker once the batch threshold is
    /// reached. On failure nothing is charged for this request.
    pub fn try_consume(&mut self, bytes: usize) -> Result<(), MemLimitExceeded> {
        let delta = isize::try_from(bytes).unwrap_or(isize::MAX);
        self.pending = self.pending.saturating_add(delta);
        self.outstanding = self.outstanding.saturating_add(bytes);
        if self.pending >= Self::BATCH_SIZE as isize {
            if let Some(tracker) = &self.tracker {
                if let Err(err) = tracker.try_consume(self.pending.unsigned_abs()) {
                    self.pending -= delta;
                    self.outstanding -= bytes;
                    return Err(err);
                }
            }
            self.pending = 0;
        }
        Ok(())
    }

    /// Returns `bytes` previously charged through this scope.
    pub fn release(&mut self, bytes: usize) {
        let bytes = bytes.min(self.outstanding);
        self.outstanding -= bytes;
        self.pending -= isize::try_from(bytes).unwrap_or(isize::MAX);
        if self.pending <= -(Self::BATCH_SIZE as isize) {
            self.commit();
        }
    }

    /// Flushes the pending delta to the tracker.
    pub fn commit(&mut self) {
        if let Some(tracker) = &self.tracker {
            if self.pending > 0 {
                tracker.consume(self.pending.unsigned_abs());
            } else if self.pending < 0 {
                tracker.release(self.pending.unsigned_abs());
            }
        }
        self.pending = 0;
    }

    /// Releases everything charged through this scope and flushes.
    pub fn release_all(&mut self) {
        self.release(self.outstanding);
        self.commit();
    }
}

impl Drop for MemScope {
    fn drop(&mut self) {
        self.release_all();
    }
}
