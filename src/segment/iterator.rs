use std::{collections::HashMap, sync::Arc};

use arrow::{
    array::{ArrayRef, UInt32Array},
    compute::{filter_record_batch, take_record_batch},
    datatypes::SchemaRef,
    record_batch::{RecordBatch, RecordBatchOptions},
};

use super::{SegmentReadOptions, SegmentSource};
use crate::{
    column::Column,
    error::{IndexError, ScanError},
    index::{SparseRange, SparseRangeIterator},
    memory::MemScope,
    observability::{log_debug, log_warn},
    predicate::{ColumnPredicate, PredicatePool},
    selection::{identity_indices, mask_to_boolean_array, selected_count},
    types::{ColumnId, Field, Schema},
};

/// Counters collected over one segment scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows stored in the segment.
    pub rows_in_segment: u64,
    /// Rows outside the requested row ranges.
    pub rows_outside_ranges: u64,
    /// Rows dropped by segment and page zone maps.
    pub rows_pruned_by_zone_map: u64,
    /// Rows dropped by page bloom filters.
    pub rows_pruned_by_bloom_filter: u64,
    /// Rows dropped by bitmap indexes.
    pub rows_pruned_by_bitmap: u64,
    /// Rows read and rejected by predicate evaluation.
    pub rows_filtered: u64,
    /// Rows emitted in chunks.
    pub rows_emitted: u64,
    /// Chunks emitted.
    pub chunks_emitted: u64,
    /// Pushdown stages skipped for a predicate after an index error.
    pub stages_disabled: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanState {
    /// Predicates bound, pruning not yet run.
    Opened,
    Scanning,
    Exhausted,
    Closed,
}

/// Rows of a chunk that survived evaluation.
enum Selection {
    All,
    Indices(UInt32Array),
    Mask(Vec<u8>),
}

/// Pull-based scan over one segment.
///
/// Pruning runs lazily on the first pull. Each pull then reads at most
/// `chunk_size` candidate rows, evaluates the residual predicates on the
/// predicate columns, and only reads the rest of the projection when some row
/// survived. Chunks with no surviving rows are skipped, so every emitted batch
/// has at least one row.
///
/// Errors leave the iterator exhausted; later pulls yield `None`.
#[derive(Debug)]
pub struct SegmentIterator {
    segment: Arc<dyn SegmentSource>,
    projection: Schema,
    output_schema: SchemaRef,
    predicates: Vec<Arc<dyn ColumnPredicate>>,
    options: SegmentReadOptions,
    pool: PredicatePool,
    scope: MemScope,
    ranges: Option<SparseRangeIterator>,
    state: ScanState,
    stats: ScanStats,
}

impl SegmentIterator {
    /// Binds `options` to `segment` and resolves `projection` against the
    /// stored schema.
    ///
    /// Predicates whose field type differs from the stored type are rebound
    /// with checked conversion; a lossy rebind fails the open.
    pub fn open(
        segment: Arc<dyn SegmentSource>,
        projection: &Schema,
        options: SegmentReadOptions,
    ) -> Result<Self, ScanError> {
        let stored = segment.schema();
        let mut fields = Vec::with_capacity(projection.len());
        for field in projection.fields() {
            let stored_field = stored
                .field(field.id)
                .ok_or(ScanError::UnknownColumn(field.id))?;
            if stored_field.field_type != field.field_type {
                return Err(ScanError::ColumnTypeMismatch {
                    expected: stored_field.field_type.to_string(),
                    actual: field.field_type.to_string(),
                });
            }
            fields.push(Field::new(
                field.id,
                Arc::clone(&field.name),
                stored_field.field_type,
                stored_field.nullable,
            ));
        }
        let projection = Schema::try_new(fields)?;

        let mut pool = PredicatePool::new(options.mem_tracker.clone());
        let mut predicates = Vec::with_capacity(options.predicates.len());
        for predicate in &options.predicates {
            let column = predicate.column_id();
            let stored_type = stored
                .field(column)
                .ok_or(ScanError::UnknownColumn(column))?
                .field_type;
            if predicate.field_type() == stored_type {
                predicates.push(Arc::clone(predicate));
                continue;
            }
            let converted = predicate.convert_to(stored_type, &mut pool)?;
            log_debug!(
                component = "iterator",
                event = "predicate_rebound",
                column,
                from = %predicate.field_type(),
                to = %stored_type,
            );
            predicates.push(converted);
        }
        pool.commit();

        log_debug!(
            component = "iterator",
            event = "segment_scan_opened",
            rows = segment.num_rows(),
            predicates = predicates.len(),
            projected = projection.len(),
        );
        Ok(Self {
            output_schema: projection.to_arrow(),
            scope: MemScope::new(options.mem_tracker.clone()),
            segment,
            projection,
            predicates,
            options,
            pool,
            ranges: None,
            state: ScanState::Opened,
            stats: ScanStats::default(),
        })
    }

    /// Arrow schema of emitted chunks.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.output_schema)
    }

    /// Counters collected so far.
    #[must_use]
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Predicates still evaluated row by row. Before the first pull these are
    /// all bound predicates; pruning drops those a bitmap index resolved.
    #[must_use]
    pub fn residual_predicates(&self) -> &[Arc<dyn ColumnPredicate>] {
        &self.predicates
    }

    /// Next non-empty chunk, or `None` once the segment is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<RecordBatch>, ScanError> {
        match self.state {
            ScanState::Exhausted | ScanState::Closed => return Ok(None),
            ScanState::Opened => match self.prune() {
                Ok(range) => {
                    self.ranges = Some(range.into_range_iter());
                    self.state = ScanState::Scanning;
                }
                Err(err) => {
                    self.state = ScanState::Exhausted;
                    return Err(err);
                }
            },
            ScanState::Scanning => {}
        }

        loop {
            let Some(ranges) = self
                .ranges
                .as_mut()
                .filter(|ranges| ranges.has_more())
                .map(|ranges| ranges.next_ranges(self.options.chunk_size as u32))
            else {
                self.finish();
                return Ok(None);
            };
            match self.read_chunk(&ranges) {
                Ok(Some(batch)) => return Ok(Some(batch)),
                Ok(None) => continue,
                Err(err) => {
                    log_warn!(
                        component = "iterator",
                        event = "segment_scan_failed",
                        error = %err,
                    );
                    self.state = ScanState::Exhausted;
                    self.ranges = None;
                    return Err(err);
                }
            }
        }
    }

    /// Releases predicates, cursors and tracked memory. Safe to call more
    /// than once; also run on drop.
    pub fn close(&mut self) {
        if self.state == ScanState::Closed {
            return;
        }
        self.ranges = None;
        self.predicates.clear();
        self.pool.clear();
        self.scope.release_all();
        self.state = ScanState::Closed;
        log_debug!(
            component = "iterator",
            event = "segment_scan_closed",
            rows_emitted = self.stats.rows_emitted,
            chunks_emitted = self.stats.chunks_emitted,
        );
    }

    fn finish(&mut self) {
        self.state = ScanState::Exhausted;
        self.ranges = None;
        self.scope.commit();
        let stats = &self.stats;
        log_debug!(
            component = "iterator",
            event = "segment_scan_finished",
            rows_in_segment = stats.rows_in_segment,
            rows_pruned_by_zone_map = stats.rows_pruned_by_zone_map,
            rows_pruned_by_bloom_filter = stats.rows_pruned_by_bloom_filter,
            rows_pruned_by_bitmap = stats.rows_pruned_by_bitmap,
            rows_filtered = stats.rows_filtered,
            rows_emitted = stats.rows_emitted,
            stages_disabled = stats.stages_disabled,
        );
    }

    /// Narrows the candidate rows through the enabled pushdown stages.
    fn prune(&mut self) -> Result<SparseRange, ScanError> {
        let num_rows = self.segment.num_rows();
        self.stats.rows_in_segment = u64::from(num_rows);
        let mut range = SparseRange::from_range(0..num_rows);
        if let Some(requested) = &self.options.row_ranges {
            range.intersect_with(requested);
        }
        self.stats.rows_outside_ranges = u64::from(num_rows) - range.span_size();

        if self.options.enable_zone_map_pushdown {
            let before = range.span_size();
            self.prune_zone_maps(&mut range)?;
            self.stats.rows_pruned_by_zone_map = before - range.span_size();
        }
        if self.options.enable_bloom_filter_pushdown {
            let before = range.span_size();
            self.prune_bloom_filters(&mut range)?;
            self.stats.rows_pruned_by_bloom_filter = before - range.span_size();
        }
        if self.options.enable_bitmap_pushdown {
            let before = range.span_size();
            self.prune_bitmaps(&mut range)?;
            self.stats.rows_pruned_by_bitmap = before - range.span_size();
        }

        log_debug!(
            component = "pushdown",
            event = "pushdown_finished",
            rows_in_segment = num_rows,
            rows_remaining = range.span_size(),
            residual_predicates = self.predicates.len(),
        );
        Ok(range)
    }

    fn prune_zone_maps(&mut self, range: &mut SparseRange) -> Result<(), ScanError> {
        let predicates = self.predicates.clone();
        for predicate in &predicates {
            if range.is_empty() {
                return Ok(());
            }
            let column = predicate.column_id();
            match self.segment.segment_zone_map(column) {
                Ok(detail) if !predicate.zone_map_filter(&detail) => {
                    *range = SparseRange::empty();
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => self.stage_failed(predicate.as_ref(), err)?,
            }
            // page zone maps are a separate lookup and may survive a bad
            // segment-level summary
            match self.segment.page_zone_maps(column) {
                Ok(pages) => {
                    let rejected = SparseRange::from_ranges(
                        pages
                            .into_iter()
                            .filter(|page| !predicate.zone_map_filter(&page.detail))
                            .map(|page| page.rows)
                            .collect(),
                    );
                    *range = range.difference(&rejected);
                }
                Err(err) => self.stage_failed(predicate.as_ref(), err)?,
            }
        }
        Ok(())
    }

    fn prune_bloom_filters(&mut self, range: &mut SparseRange) -> Result<(), ScanError> {
        let predicates = self.predicates.clone();
        for predicate in predicates
            .iter()
            .filter(|predicate| predicate.support_bloom_filter())
        {
            if range.is_empty() {
                return Ok(());
            }
            match self.segment.bloom_filters(predicate.column_id()) {
                Ok(pages) => {
                    let rejected = SparseRange::from_ranges(
                        pages
                            .into_iter()
                            .filter(|page| !predicate.bloom_filter(page.filter.as_ref()))
                            .map(|page| page.rows)
                            .collect(),
                    );
                    *range = range.difference(&rejected);
                }
                Err(err) => self.stage_failed(predicate.as_ref(), err)?,
            }
        }
        Ok(())
    }

    /// Bitmap indexes are exact, so a predicate they answered leaves the
    /// residual set.
    fn prune_bitmaps(&mut self, range: &mut SparseRange) -> Result<(), ScanError> {
        let predicates = std::mem::take(&mut self.predicates);
        let mut residual = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            if range.is_empty() {
                residual.push(predicate);
                continue;
            }
            let seeked = self
                .segment
                .bitmap_index(predicate.column_id())
                .and_then(|mut iter| {
                    let mut narrowed = range.clone();
                    predicate.seek_bitmap_dictionary(&mut iter, &mut narrowed)?;
                    Ok(narrowed)
                });
            match seeked {
                Ok(narrowed) => *range = narrowed,
                Err(err) => {
                    if let Err(fatal) = self.stage_failed(predicate.as_ref(), err) {
                        residual.push(predicate);
                        self.predicates = residual;
                        return Err(fatal);
                    }
                    residual.push(predicate);
                }
            }
        }
        self.predicates = residual;
        Ok(())
    }

    /// Downgrades an index error to "skip this stage for this predicate"
    /// unless pushdown is mandatory.
    fn stage_failed(
        &mut self,
        predicate: &dyn ColumnPredicate,
        err: IndexError,
    ) -> Result<(), ScanError> {
        if self.options.pushdown_mandatory {
            log_warn!(
                component = "pushdown",
                event = "mandatory_pushdown_failed",
                column = predicate.column_id(),
                kind = %err.kind(),
                error = %err,
            );
            return Err(err.into());
        }
        match &err {
            IndexError::Absent { .. } => log_debug!(
                component = "pushdown",
                event = "index_stage_skipped",
                column = predicate.column_id(),
                kind = %err.kind(),
            ),
            IndexError::Corrupt { .. } => log_warn!(
                component = "pushdown",
                event = "index_stage_disabled",
                column = predicate.column_id(),
                kind = %err.kind(),
                predicate = %predicate.debug_string(),
                error = %err,
            ),
        }
        self.stats.stages_disabled += 1;
        Ok(())
    }

    /// Materializes and filters one chunk; `None` when no row survives.
    fn read_chunk(&mut self, ranges: &SparseRange) -> Result<Option<RecordBatch>, ScanError> {
        let mut charged = 0;
        let result = self.materialize(ranges, &mut charged);
        self.scope.release(charged);
        result
    }

    fn materialize(
        &mut self,
        ranges: &SparseRange,
        charged: &mut usize,
    ) -> Result<Option<RecordBatch>, ScanError> {
        let rows = ranges.span_size() as usize;
        let predicate_columns: Vec<ColumnId> =
            self.predicates.iter().map(|p| p.column_id()).collect();
        let mut columns: HashMap<ColumnId, Column> = HashMap::new();
        for column in predicate_columns {
            if !columns.contains_key(&column) {
                let data = self.read_column(column, ranges, rows, charged)?;
                columns.insert(column, data);
            }
        }

        let selection = self.select(&columns, rows)?;
        let selected = match &selection {
            Selection::All => rows,
            Selection::Indices(indices) => indices.len(),
            Selection::Mask(mask) => selected_count(mask),
        };
        self.stats.rows_filtered += (rows - selected) as u64;
        if selected == 0 {
            log_debug!(
                component = "iterator",
                event = "chunk_skipped",
                rows,
            );
            return Ok(None);
        }

        let fields = self.projection.fields().to_vec();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.len());
        for field in &fields {
            let column = match columns.remove(&field.id) {
                Some(column) => column,
                None => self.read_column(field.id, ranges, rows, charged)?,
            };
            arrays.push(column.to_arrow(field.field_type)?);
        }
        let schema = Arc::clone(&self.output_schema);
        let batch = if arrays.is_empty() {
            let options = RecordBatchOptions::new().with_row_count(Some(selected));
            RecordBatch::try_new_with_options(schema, arrays, &options)?
        } else {
            let batch = RecordBatch::try_new(schema, arrays)?;
            match selection {
                Selection::All => batch,
                Selection::Indices(indices) => take_record_batch(&batch, &indices)?,
                Selection::Mask(mask) => {
                    filter_record_batch(&batch, &mask_to_boolean_array(&mask))?
                }
            }
        };

        self.stats.rows_emitted += batch.num_rows() as u64;
        self.stats.chunks_emitted += 1;
        log_debug!(
            component = "iterator",
            event = "chunk_emitted",
            rows_read = rows,
            rows_emitted = batch.num_rows(),
        );
        Ok(Some(batch))
    }

    fn read_column(
        &mut self,
        column: ColumnId,
        ranges: &SparseRange,
        rows: usize,
        charged: &mut usize,
    ) -> Result<Column, ScanError> {
        let data = self.segment.read_column(column, ranges)?;
        if data.len() != rows {
            return Err(ScanError::Decode {
                column,
                reason: format!("expected {rows} rows, decoded {}", data.len()),
            });
        }
        let bytes = data.memory_size();
        self.scope.try_consume(bytes)?;
        *charged += bytes;
        Ok(data)
    }

    /// Evaluates the residual conjunction over predicate columns read for a
    /// chunk of `rows` rows.
    fn select(
        &self,
        columns: &HashMap<ColumnId, Column>,
        rows: usize,
    ) -> Result<Selection, ScanError> {
        let column_of = |predicate: &Arc<dyn ColumnPredicate>| {
            columns
                .get(&predicate.column_id())
                .ok_or(ScanError::UnknownColumn(predicate.column_id()))
        };
        match self.predicates.as_slice() {
            [] => Ok(Selection::All),
            [single] if self.options.branchless && single.can_vectorized() => {
                let size = u16::try_from(rows)
                    .map_err(|_| ScanError::invalid(format!("chunk of {rows} rows")))?;
                let mut sel = identity_indices(size);
                let kept = single.evaluate_branchless(column_of(single)?, &mut sel, size)?;
                if usize::from(kept) == rows {
                    return Ok(Selection::All);
                }
                Ok(Selection::Indices(
                    sel[..usize::from(kept)]
                        .iter()
                        .map(|row| u32::from(*row))
                        .collect(),
                ))
            }
            [first, rest @ ..] => {
                let mut mask = vec![0_u8; rows];
                first.evaluate(column_of(first)?, &mut mask, 0, rows)?;
                for predicate in rest {
                    predicate.evaluate_and(column_of(predicate)?, &mut mask, 0, rows)?;
                }
                if selected_count(&mask) == rows {
                    return Ok(Selection::All);
                }
                Ok(Selection::Mask(mask))
            }
        }
    }
}

impl Iterator for SegmentIterator {
    type Item = Result<RecordBatch, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

impl Drop for SegmentIterator {
    fn drop(&mut self) {
        self.close();
    }
}
