//! Structured events emitted by scans and in-memory segments.
//!
//! Every event carries the `segscan` target, a `component` and an `event`
//! name, so a filter such as `segscan[{component=pushdown}]=debug` isolates
//! one stage. No subscriber is installed here.
//!
//! | component | level | events |
//! |---|---|---|
//! | `iterator` | debug | `segment_scan_opened`, `predicate_rebound`, `chunk_skipped`, `chunk_emitted`, `segment_scan_finished`, `segment_scan_closed` |
//! | `iterator` | warn | `segment_scan_failed` |
//! | `pushdown` | debug | `index_stage_skipped` (index absent), `pushdown_finished` |
//! | `pushdown` | warn | `index_stage_disabled` (index corrupt), `mandatory_pushdown_failed` |
//! | `mem_segment` | info | `mem_segment_built` |
//! | `mem_segment` | warn | `bitmap_index_skipped` |
//!
//! Row counts ride along as fields (`rows_emitted`, `rows_remaining`, ...).
//! Anything logged per chunk stays at debug.

pub(crate) const SEGSCAN_TARGET: &str = "segscan";

/// ```ignore
/// log_info!(
///     component = "mem_segment",
///     event = "mem_segment_built",
///     rows = num_rows,
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::SEGSCAN_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::SEGSCAN_TARGET, $($field)*)
    };
}

macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::SEGSCAN_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_info;
pub(crate) use log_warn;
