mod common;

use std::sync::Arc;

use arrow::{
    array::{AsArray, Int32Array, StringArray},
    datatypes::Int32Type,
    record_batch::RecordBatch,
};
use common::{
    generate_rows, indexed_segment, scan_ids, scan_scores, schema, InstrumentedSegment, Row,
    CODE, ID, NAME, PRICE, SCORE,
};
use segscan::{
    predicate::{self, ColumnPredicate},
    Datum, Field, FieldType, IndexError, IndexKind, MemSegment, MemTracker, ScanError, Schema,
    SegmentIterator, SegmentReadOptions, SegmentSource, SparseRange,
};

fn open(
    segment: Arc<dyn SegmentSource>,
    predicates: Vec<Arc<dyn ColumnPredicate>>,
    options: SegmentReadOptions,
) -> SegmentIterator {
    SegmentIterator::open(segment, &schema(), options.with_predicates(predicates))
        .expect("open should succeed")
}

fn no_pushdown() -> SegmentReadOptions {
    SegmentReadOptions::default()
        .with_zone_map_pushdown(false)
        .with_bloom_filter_pushdown(false)
        .with_bitmap_pushdown(false)
}

fn naive(rows: &[Row], keep: impl Fn(&Row) -> bool) -> Vec<i32> {
    rows.iter().filter(|row| keep(row)).map(|row| row.id).collect()
}

#[test]
fn zone_map_skips_segment_without_reading() {
    let schema = Schema::try_new(vec![Field::new(0, "col", FieldType::Int32, false)])
        .expect("schema");
    let batch = RecordBatch::try_new(
        schema.to_arrow(),
        vec![Arc::new(Int32Array::from((10..=20).collect::<Vec<_>>()))],
    )
    .expect("batch");
    let segment = Arc::new(InstrumentedSegment::new(
        MemSegment::builder(schema.clone())
            .build(&[batch])
            .expect("segment"),
    ));
    let options = SegmentReadOptions::default()
        .with_predicate(predicate::gt(0, FieldType::Int32, 25).expect("predicate"));
    let mut iter = SegmentIterator::open(segment.clone(), &schema, options).expect("open");

    assert!(iter.next_chunk().expect("pull").is_none());
    assert_eq!(segment.reads(), 0);
    let stats = iter.stats();
    assert_eq!(stats.rows_in_segment, 11);
    assert_eq!(stats.rows_pruned_by_zone_map, 11);
    assert_eq!(stats.rows_emitted, 0);
}

#[test]
fn pushdown_never_changes_results() {
    let mut rng = fastrand::Rng::with_seed(7);
    let rows = generate_rows(&mut rng, 3000);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 128));

    let cases: Vec<(Vec<Arc<dyn ColumnPredicate>>, Vec<i32>)> = vec![
        (
            vec![predicate::ge(PRICE, FieldType::Int64, 15_000_i64).expect("ge")],
            naive(&rows, |row| row.price.is_some_and(|p| p >= 15_000)),
        ),
        (
            vec![predicate::eq(ID, FieldType::Int32, 1234).expect("eq")],
            vec![1234],
        ),
        (
            vec![predicate::in_list(NAME, FieldType::Varchar, ["elm", "oak"]).expect("in")],
            naive(&rows, |row| {
                matches!(row.name.as_deref(), Some("elm") | Some("oak"))
            }),
        ),
        (
            vec![
                predicate::not_in_list(CODE, FieldType::Char { len: 3 }, ["a", "ccc"])
                    .expect("not in"),
                predicate::lt(ID, FieldType::Int32, 2000).expect("lt"),
            ],
            naive(&rows, |row| {
                row.id < 2000 && matches!(row.code.as_deref(), Some("bb") | Some("dd"))
            }),
        ),
        (
            vec![
                predicate::is_null(NAME, FieldType::Varchar),
                predicate::le(SCORE, FieldType::Float64, 50.0_f64).expect("le"),
            ],
            naive(&rows, |row| {
                row.name.is_none() && row.score.is_some_and(|s| s <= 50.0)
            }),
        ),
        (
            vec![predicate::ne(NAME, FieldType::Varchar, "ash").expect("ne")],
            naive(&rows, |row| row.name.as_deref().is_some_and(|n| n != "ash")),
        ),
    ];

    for (predicates, expected) in cases {
        let description: Vec<String> = predicates.iter().map(|p| p.debug_string()).collect();
        let pruned = scan_ids(open(
            Arc::clone(&segment),
            predicates.clone(),
            SegmentReadOptions::default().with_chunk_size(500),
        ));
        let plain = scan_ids(open(
            Arc::clone(&segment),
            predicates.clone(),
            no_pushdown().with_chunk_size(500),
        ));
        let masked = scan_ids(open(
            Arc::clone(&segment),
            predicates,
            SegmentReadOptions::default().with_branchless(false),
        ));
        assert_eq!(pruned, expected, "{description:?}");
        assert_eq!(plain, expected, "{description:?}");
        assert_eq!(masked, expected, "{description:?}");
    }
}

#[test]
fn every_stage_contributes() {
    let mut rng = fastrand::Rng::with_seed(11);
    let rows = generate_rows(&mut rng, 2048);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 256));

    let mut iter = open(
        Arc::clone(&segment),
        vec![predicate::le(ID, FieldType::Int32, 300).expect("le")],
        SegmentReadOptions::default(),
    );
    while iter.next_chunk().expect("pull").is_some() {}
    assert_eq!(iter.stats().rows_pruned_by_zone_map, 2048 - 512);

    let mut iter = open(
        Arc::clone(&segment),
        vec![predicate::eq(ID, FieldType::Int32, 77).expect("eq")],
        SegmentReadOptions::default().with_zone_map_pushdown(false),
    );
    while iter.next_chunk().expect("pull").is_some() {}
    assert!(iter.stats().rows_pruned_by_bloom_filter >= 1024);

    let mut iter = open(
        Arc::clone(&segment),
        vec![predicate::eq(CODE, FieldType::Char { len: 3 }, "bb").expect("eq")],
        SegmentReadOptions::default(),
    );
    let emitted = {
        let mut emitted = 0;
        while let Some(chunk) = iter.next_chunk().expect("pull") {
            emitted += chunk.num_rows() as u64;
        }
        emitted
    };
    let stats = iter.stats();
    assert_eq!(emitted, naive(&rows, |row| row.code.as_deref() == Some("bb")).len() as u64);
    assert_eq!(stats.rows_pruned_by_bitmap, 2048 - emitted);
    assert_eq!(stats.rows_filtered, 0);
    assert!(iter.residual_predicates().is_empty());
}

#[test]
fn corrupt_indexes_fall_back_to_row_evaluation() {
    let mut rng = fastrand::Rng::with_seed(3);
    let rows = generate_rows(&mut rng, 1000);
    let expected = naive(&rows, |row| {
        row.id >= 500 && matches!(row.name.as_deref(), Some("fir"))
    });
    let predicates = vec![
        predicate::ge(ID, FieldType::Int32, 500).expect("ge"),
        predicate::eq(NAME, FieldType::Varchar, "fir").expect("eq"),
    ];

    for kind in [IndexKind::ZoneMap, IndexKind::BloomFilter, IndexKind::Bitmap] {
        let segment = Arc::new(InstrumentedSegment::new(indexed_segment(&rows, 100)).corrupt(kind));
        let mut iter = open(segment, predicates.clone(), SegmentReadOptions::default());
        let mut ids = Vec::new();
        while let Some(chunk) = iter.next_chunk().expect("pull") {
            ids.extend(chunk.column(0).as_primitive::<Int32Type>().values().iter().copied());
        }
        assert_eq!(ids, expected, "{kind} corrupt");
        assert!(iter.stats().stages_disabled > 0, "{kind} corrupt");
    }
}

#[test]
fn page_zone_maps_survive_a_missing_segment_summary() {
    let mut rng = fastrand::Rng::with_seed(13);
    let rows = generate_rows(&mut rng, 1000);
    let options = || {
        SegmentReadOptions::default()
            .with_bloom_filter_pushdown(false)
            .with_bitmap_pushdown(false)
            .with_predicate(predicate::ge(ID, FieldType::Int32, 500).expect("ge"))
    };

    let segment = Arc::new(
        InstrumentedSegment::new(indexed_segment(&rows, 100)).without_segment_zone_map(),
    );
    let mut iter = SegmentIterator::open(segment, &schema(), options()).expect("open");
    let mut ids = Vec::new();
    while let Some(chunk) = iter.next_chunk().expect("pull") {
        ids.extend(chunk.column(0).as_primitive::<Int32Type>().values().iter().copied());
    }
    assert_eq!(ids, (500..1000).collect::<Vec<_>>());
    let stats = iter.stats();
    assert_eq!(stats.rows_pruned_by_zone_map, 500);
    assert_eq!(stats.stages_disabled, 1);

    // both lookups fail: each one is counted
    let segment = Arc::new(
        InstrumentedSegment::new(indexed_segment(&rows, 100)).corrupt(IndexKind::ZoneMap),
    );
    let mut iter = SegmentIterator::open(segment, &schema(), options()).expect("open");
    assert!(iter.next_chunk().expect("pull").is_some());
    let stats = iter.stats();
    assert_eq!(stats.rows_pruned_by_zone_map, 0);
    assert_eq!(stats.stages_disabled, 2);
}

#[test]
fn mandatory_pushdown_surfaces_index_errors() {
    let mut rng = fastrand::Rng::with_seed(5);
    let rows = generate_rows(&mut rng, 200);
    let segment = Arc::new(
        InstrumentedSegment::new(indexed_segment(&rows, 50)).corrupt(IndexKind::ZoneMap),
    );
    let options = SegmentReadOptions::default()
        .with_pushdown_mandatory(true)
        .with_predicate(predicate::gt(ID, FieldType::Int32, 10).expect("gt"));
    let mut iter = SegmentIterator::open(segment, &schema(), options).expect("open");

    match iter.next_chunk() {
        Err(ScanError::Index(IndexError::Corrupt { column, kind, .. })) => {
            assert_eq!(column, ID);
            assert_eq!(kind, IndexKind::ZoneMap);
        }
        other => panic!("expected corrupt zone map, got {other:?}"),
    }
    assert!(iter.next_chunk().expect("exhausted").is_none());
}

#[test]
fn mandatory_pushdown_with_present_indexes_succeeds() {
    let mut rng = fastrand::Rng::with_seed(6);
    let rows = generate_rows(&mut rng, 400);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 50));
    let options = SegmentReadOptions::default()
        .with_pushdown_mandatory(true)
        .with_bitmap_pushdown(false)
        .with_predicate(predicate::eq(ID, FieldType::Int32, 123).expect("eq"));
    let iter = SegmentIterator::open(segment, &schema(), options).expect("open");
    assert_eq!(scan_ids(iter), vec![123]);
}

#[test]
fn decode_errors_end_the_scan() {
    let mut rng = fastrand::Rng::with_seed(9);
    let rows = generate_rows(&mut rng, 300);
    let segment =
        Arc::new(InstrumentedSegment::new(indexed_segment(&rows, 100)).undecodable(SCORE));
    let mut iter = open(
        segment,
        vec![predicate::ge(ID, FieldType::Int32, 0).expect("ge")],
        SegmentReadOptions::default(),
    );
    assert!(matches!(
        iter.next_chunk(),
        Err(ScanError::Decode { column: SCORE, .. })
    ));
    assert!(iter.next_chunk().expect("exhausted").is_none());
    assert!(iter.next().is_none());
}

#[test]
fn empty_chunks_skip_projected_columns() {
    let mut rng = fastrand::Rng::with_seed(21);
    let rows = generate_rows(&mut rng, 500);
    let segment = Arc::new(InstrumentedSegment::new(indexed_segment(&rows, 100)));
    let options = no_pushdown()
        .with_chunk_size(100)
        .with_predicate(predicate::lt(ID, FieldType::Int32, 50).expect("lt"));
    let iter = SegmentIterator::open(segment.clone(), &schema(), options).expect("open");
    assert_eq!(scan_ids(iter), (0..50).collect::<Vec<_>>());
    // five chunks read the predicate column, only the first reads the other four
    assert_eq!(segment.reads(), 5 + 4);
}

#[test]
fn predicates_are_rebound_to_stored_types() {
    let mut rng = fastrand::Rng::with_seed(13);
    let rows = generate_rows(&mut rng, 300);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 64));

    let iter = open(
        Arc::clone(&segment),
        vec![predicate::lt(ID, FieldType::Int64, 20_i64).expect("lt")],
        SegmentReadOptions::default(),
    );
    assert_eq!(scan_ids(iter), (0..20).collect::<Vec<_>>());

    let options = SegmentReadOptions::default().with_predicate(
        predicate::eq(ID, FieldType::Int64, Datum::Int64(i64::from(i32::MAX) + 1)).expect("eq"),
    );
    assert!(matches!(
        SegmentIterator::open(Arc::clone(&segment), &schema(), options),
        Err(ScanError::TypeConversion { .. })
    ));

    let iter = open(
        segment,
        vec![predicate::eq(CODE, FieldType::Varchar, "bb").expect("eq")],
        no_pushdown(),
    );
    assert_eq!(
        scan_ids(iter),
        naive(&rows, |row| row.code.as_deref() == Some("bb"))
    );
}

#[test]
fn char_columns_emit_unpadded_strings() {
    let rows = vec![
        Row {
            id: 0,
            price: None,
            name: None,
            code: Some("a".to_owned()),
            score: None,
        },
        Row {
            id: 1,
            price: None,
            name: None,
            code: Some("ccc".to_owned()),
            score: None,
        },
    ];
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 8));
    let projection = schema().project(&[CODE]).expect("projection");
    let options = SegmentReadOptions::default()
        .with_predicate(predicate::eq(CODE, FieldType::Char { len: 3 }, "a").expect("eq"));
    let chunks: Vec<RecordBatch> = SegmentIterator::open(segment, &projection, options)
        .expect("open")
        .map(|chunk| chunk.expect("chunk"))
        .collect();
    assert_eq!(chunks.len(), 1);
    let codes = chunks[0].column(0).as_string::<i32>();
    assert_eq!(codes, &StringArray::from(vec!["a"]));
}

#[test]
fn row_ranges_restrict_the_scan() {
    let mut rng = fastrand::Rng::with_seed(17);
    let rows = generate_rows(&mut rng, 1000);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 100));
    let options = SegmentReadOptions::default()
        .with_row_ranges(SparseRange::from_ranges(vec![100..150, 900..2000]))
        .with_chunk_size(32);
    let iter = open(
        segment,
        vec![predicate::is_not_null(SCORE, FieldType::Float64)],
        options,
    );
    let scores = scan_scores(iter);
    let expected = rows[100..150]
        .iter()
        .chain(&rows[900..])
        .filter(|row| row.score.is_some())
        .count();
    assert_eq!(scores.len(), expected);
    assert!(scores.iter().all(Option::is_some));
}

fn blob_segment(rows: usize) -> (Schema, Arc<dyn SegmentSource>) {
    let schema =
        Schema::try_new(vec![Field::new(0, "blob", FieldType::Varchar, false)]).expect("schema");
    let value = "x".repeat(48);
    let batch = RecordBatch::try_new(
        schema.to_arrow(),
        vec![Arc::new(StringArray::from(vec![value.as_str(); rows]))],
    )
    .expect("batch");
    let segment: Arc<dyn SegmentSource> = Arc::new(
        MemSegment::builder(schema.clone())
            .build(&[batch])
            .expect("segment"),
    );
    (schema, segment)
}

#[test]
fn memory_limit_fails_the_scan() {
    let (schema, segment) = blob_segment(60_000);

    let tracker = MemTracker::new("query", Some(1024 * 1024));
    let options = SegmentReadOptions::default()
        .with_chunk_size(60_000)
        .with_mem_tracker(Arc::clone(&tracker));
    let mut iter = SegmentIterator::open(Arc::clone(&segment), &schema, options).expect("open");
    assert!(matches!(
        iter.next_chunk(),
        Err(ScanError::AllocationExceeded(_))
    ));
    drop(iter);
    assert_eq!(tracker.consumption(), 0);

    let roomy = MemTracker::new("query", None);
    let options = SegmentReadOptions::default()
        .with_chunk_size(60_000)
        .with_mem_tracker(Arc::clone(&roomy));
    let iter = SegmentIterator::open(segment, &schema, options).expect("open");
    let rows: usize = iter.map(|chunk| chunk.expect("chunk").num_rows()).sum();
    assert_eq!(rows, 60_000);
    assert!(roomy.peak() >= 60_000 * 48);
    assert_eq!(roomy.consumption(), 0);
}

#[test]
fn small_chunks_of_large_string_segment_fit_the_limit() {
    let (schema, segment) = blob_segment(60_000);
    let tracker = MemTracker::new("query", Some(1024 * 1024));
    let options = SegmentReadOptions::default()
        .with_chunk_size(100)
        .with_mem_tracker(Arc::clone(&tracker));
    let iter = SegmentIterator::open(segment, &schema, options).expect("open");
    let mut chunks = 0;
    let mut rows = 0;
    for chunk in iter {
        let chunk = chunk.expect("chunk within budget");
        chunks += 1;
        rows += chunk.num_rows();
    }
    assert_eq!(chunks, 600);
    assert_eq!(rows, 60_000);
    // 100-row chunks never reach the scope's flush threshold
    assert_eq!(tracker.peak(), 0);
    assert_eq!(tracker.consumption(), 0);
}

#[test]
fn peak_tracks_one_chunk_not_the_segment() {
    let (schema, segment) = blob_segment(200_000);
    let chunk_rows = 50_000;
    let chunk_bytes = chunk_rows * 48 + (chunk_rows + 1) * 4;
    let tracker = MemTracker::new("query", Some(4 * 1024 * 1024));
    let options = SegmentReadOptions::default()
        .with_chunk_size(chunk_rows)
        .with_mem_tracker(Arc::clone(&tracker));
    let iter = SegmentIterator::open(segment, &schema, options).expect("open");
    let rows: usize = iter.map(|chunk| chunk.expect("chunk").num_rows()).sum();
    assert_eq!(rows, 200_000);
    assert_eq!(tracker.peak(), chunk_bytes);
    assert_eq!(tracker.consumption(), 0);
}

#[test]
fn predicates_are_shared_across_threads() {
    let mut rng = fastrand::Rng::with_seed(21);
    let rows = generate_rows(&mut rng, 3000);
    let segment: Arc<dyn SegmentSource> = Arc::new(indexed_segment(&rows, 256));
    let predicates: Vec<Arc<dyn ColumnPredicate>> = vec![
        predicate::ge(ID, FieldType::Int32, 700).expect("predicate"),
        predicate::in_list(NAME, FieldType::Varchar, ["oak", "ash"]).expect("predicate"),
        predicate::is_not_null(SCORE, FieldType::Float64),
    ];
    let expected = naive(&rows, |row| {
        row.id >= 700
            && matches!(row.name.as_deref(), Some("oak" | "ash"))
            && row.score.is_some()
    });

    let (pushed, plain) = std::thread::scope(|scope| {
        let pushed = scope.spawn(|| {
            scan_ids(open(
                Arc::clone(&segment),
                predicates.clone(),
                SegmentReadOptions::default().with_chunk_size(128),
            ))
        });
        let plain = scope.spawn(|| {
            scan_ids(open(
                Arc::clone(&segment),
                predicates.clone(),
                no_pushdown().with_chunk_size(333),
            ))
        });
        (
            pushed.join().expect("pushdown scan"),
            plain.join().expect("row scan"),
        )
    });
    assert_eq!(pushed, expected);
    assert_eq!(plain, expected);
    assert!(predicates.iter().all(|p| Arc::strong_count(p) == 1));
}
