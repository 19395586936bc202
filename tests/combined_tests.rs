use locus::{
    IndexConfig, Locus, LocusBuilder, LocusError, MemoryStore, Query, QueryObserver, QueryShape,
    Rect, RecordId,
};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex};

fn pt(x: f64, y: f64) -> Rect {
    Rect::point(vec![x, y])
}

fn populated(n: i64) -> Locus {
    let index = Locus::new().unwrap();
    for i in 0..n {
        index
            .insert(
                format!("id:{}", i),
                pt((i % 100) as f64, (i / 100) as f64),
                i * 60,
            )
            .unwrap();
    }
    index
}

#[test]
fn test_combined_query_equals_set_intersection() {
    let index = populated(2000);
    let region = Rect::new(vec![10.0, 2.0], vec![45.0, 15.0]).unwrap();
    let (start, end) = (20 * 60, 1500 * 60);

    let combined: FxHashSet<RecordId> = index
        .query(&Query::new().within(region.clone()).between(start, end))
        .unwrap()
        .into_ids()
        .into_iter()
        .collect();

    let spatial: FxHashSet<RecordId> = index
        .query_within(&region)
        .unwrap()
        .into_ids()
        .into_iter()
        .collect();
    let temporal: FxHashSet<RecordId> = index
        .query_between(start, end)
        .unwrap()
        .into_ids()
        .into_iter()
        .collect();
    let expected: FxHashSet<RecordId> = spatial.intersection(&temporal).cloned().collect();

    assert_eq!(combined, expected);
    assert!(!combined.is_empty());
}

#[test]
fn test_remove_restores_both_sub_indexes() {
    let index = populated(100);
    let region = Rect::new(vec![0.0, 0.0], vec![99.0, 0.0]).unwrap();
    let spatial_before = index.query_within(&region).unwrap().len();
    let temporal_before = index.query_between(0, 99 * 60).unwrap().len();

    index.insert("extra", pt(50.0, 0.0), 30 * 60).unwrap();
    index.remove("extra").unwrap();
    index.verify().unwrap();

    assert_eq!(index.query_within(&region).unwrap().len(), spatial_before);
    assert_eq!(
        index.query_between(0, 99 * 60).unwrap().len(),
        temporal_before
    );
}

#[test]
fn test_second_remove_fails_and_changes_nothing() {
    let index = populated(10);
    index.remove("id:3").unwrap();
    let len_after_first = index.len().unwrap();

    assert!(matches!(index.remove("id:3"), Err(LocusError::NotFound)));
    assert_eq!(index.len().unwrap(), len_after_first);
    index.verify().unwrap();
}

#[test]
fn test_hourly_bucket_scenario() {
    let index = Locus::new().unwrap();
    index.insert("a", pt(0.0, 0.0), 0).unwrap();
    index.insert("b", pt(1.0, 1.0), 3600).unwrap();
    index.insert("c", pt(2.0, 2.0), 7200).unwrap();

    assert_eq!(index.query_between(0, 7200).unwrap().len(), 3);
    assert_eq!(index.query_between(3601, 3601).unwrap().len(), 0);
    assert_eq!(index.query_between(3600, 3600).unwrap().len(), 1);
}

#[test]
fn test_rebuild_with_bulk_load_answers_identically() {
    let index = LocusBuilder::new().bulk_load_threshold(1000).build().unwrap();
    for i in 0..5000i64 {
        index
            .insert(
                format!("id:{}", i),
                pt((i % 250) as f64, (i % 97) as f64),
                i * 10,
            )
            .unwrap();
    }

    let region = Rect::new(vec![30.0, 10.0], vec![120.0, 60.0]).unwrap();
    let query = Query::new().within(region).between(4000, 30_000);
    let before: FxHashSet<RecordId> = index
        .query(&query)
        .unwrap()
        .into_ids()
        .into_iter()
        .collect();

    index.rebuild(None).unwrap();
    index.verify().unwrap();

    let after: FxHashSet<RecordId> = index
        .query(&query)
        .unwrap()
        .into_ids()
        .into_iter()
        .collect();
    assert_eq!(before, after);
    assert_eq!(index.len().unwrap(), 5000);
}

#[test]
fn test_rebuild_applies_new_tuning_parameters() {
    let index = populated(500);
    let tuned = IndexConfig::default()
        .with_leaf_capacity(32)
        .with_bucket_width(60);
    index.rebuild(Some(tuned)).unwrap();

    let config = index.config().unwrap();
    assert_eq!(config.leaf_capacity, 32);
    assert_eq!(config.bucket_width, 60);
    assert_eq!(index.query_between(0, 499 * 60).unwrap().len(), 500);
}

#[test]
fn test_no_criteria_query_enumerates_everything() {
    let index = populated(75);
    assert_eq!(index.query(&Query::new()).unwrap().len(), 75);
}

#[test]
fn test_limit_applies_after_intersection() {
    let index = populated(1000);
    let region = Rect::new(vec![0.0, 0.0], vec![99.0, 9.0]).unwrap();
    let query = Query::new().within(region).between(0, 999 * 60).limit(7);
    assert_eq!(index.query(&query).unwrap().len(), 7);
}

#[test]
fn test_record_store_validates_identifiers_at_insert() {
    let store = Arc::new(MemoryStore::new());
    store.put(b"known", b"payload").unwrap();
    let index = LocusBuilder::new().record_store(store).build().unwrap();

    index.insert("known", pt(0.0, 0.0), 0).unwrap();
    assert!(matches!(
        index.insert("unknown", pt(1.0, 1.0), 0),
        Err(LocusError::NotFound)
    ));
    assert_eq!(index.len().unwrap(), 1);
}

#[test]
fn test_predicate_queries_read_payloads() {
    let store = Arc::new(MemoryStore::new());
    let index = LocusBuilder::new()
        .record_store(Arc::clone(&store) as Arc<dyn locus::RecordStore>)
        .build()
        .unwrap();
    for i in 0..20i64 {
        let id = format!("id:{}", i);
        let payload = if i < 5 { "hot" } else { "cold" };
        store.put(id.as_bytes(), payload.as_bytes()).unwrap();
        index.insert(&id, pt(i as f64, 0.0), i).unwrap();
    }

    let query = Query::new().between(0, 19).filter(|payload| payload == b"hot");
    assert_eq!(index.query(&query).unwrap().len(), 5);
}

struct RecordingObserver {
    events: Mutex<Vec<(QueryShape, usize)>>,
}

impl QueryObserver for RecordingObserver {
    fn query_executed(&self, shape: &QueryShape, touched: &[RecordId]) {
        if let Ok(mut events) = self.events.lock() {
            events.push((*shape, touched.len()));
        }
    }
}

#[test]
fn test_observer_sees_shape_and_touched_ids() {
    let observer = Arc::new(RecordingObserver {
        events: Mutex::new(Vec::new()),
    });
    let index = LocusBuilder::new()
        .observer(Arc::clone(&observer) as Arc<dyn QueryObserver>)
        .build()
        .unwrap();
    for i in 0..10i64 {
        index.insert(format!("id:{}", i), pt(i as f64, 0.0), i).unwrap();
    }

    index.query_between(0, 4).unwrap();
    let events = observer.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    let (shape, touched) = &events[0];
    assert!(shape.temporal.is_some());
    assert_eq!(*touched, 5);
}

#[test]
fn test_statistics_feed_back_from_executions() {
    let index = populated(200);
    assert_eq!(index.stats().queries, 0);

    for _ in 0..5 {
        index.query_between(0, 100 * 60).unwrap();
    }
    let snapshot = index.stats();
    assert_eq!(snapshot.queries, 5);
    assert!(
        snapshot
            .strategies
            .iter()
            .any(|s| s.executions > 0 && s.total_rows > 0)
    );
}

#[test]
fn test_clones_share_state() {
    let index = populated(5);
    let other = index.clone();
    other.insert("shared", pt(1.0, 1.0), 1).unwrap();
    assert!(index.contains("shared").unwrap());
}
