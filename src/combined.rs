//! Combined spatio-temporal index.
//!
//! Composes the spatial tree and the temporal buckets under one
//! reader-writer lock: queries proceed in parallel against a stable
//! snapshot, structural mutations are serialized and never observable
//! mid-flight. Insert and remove apply to both sub-indexes as a single
//! logical operation with rollback, so a record is present in the spatial
//! index if and only if it is present in the temporal reverse map.

use crate::engine::{ExecutionEngine, QueryResults};
use crate::error::{LocusError, Result};
use crate::plan::{ExecutionPlan, Planner, PlannerContext, Query};
use crate::rtree::SpatialIndex;
use crate::stats::{StatsSnapshot, Statistics};
use crate::store::{QueryObserver, RecordStore};
use crate::temporal::{TemporalIndex, TimeSeries};
use crate::types::{IndexConfig, RecordId, Rect, Timestamp};
use bytes::Bytes;
use rustc_hash::FxHashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// The combined spatio-temporal index.
///
/// Cheap to clone; clones share the same underlying state.
///
/// # Examples
///
/// ```rust
/// use locus::{Locus, Query, Rect};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let index = Locus::new()?;
/// index.insert("truck:1", Rect::point(vec![2.0, 3.0]), 1_700_000_000)?;
/// index.insert("truck:2", Rect::point(vec![40.0, 41.0]), 1_700_003_600)?;
///
/// let region = Rect::new(vec![0.0, 0.0], vec![10.0, 10.0])?;
/// let results = index.query(&Query::new()
///     .within(region)
///     .between(1_699_999_999, 1_700_000_001))?;
/// assert_eq!(results.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CombinedIndex {
    inner: Arc<RwLock<Inner>>,
    stats: Arc<Statistics>,
    store: Option<Arc<dyn RecordStore>>,
    observer: Option<Arc<dyn QueryObserver>>,
}

struct Inner {
    spatial: SpatialIndex,
    temporal: TemporalIndex,
    config: IndexConfig,
    /// Latched by an observed cross-index mismatch; blocks mutation until
    /// the next rebuild
    halted: bool,
}

impl Inner {
    fn check_active(&self) -> Result<()> {
        if self.halted {
            return Err(LocusError::StructuralInconsistency(
                "index is halted pending rebuild".to_string(),
            ));
        }
        Ok(())
    }

    fn cross_check(&self) -> Result<()> {
        if self.spatial.len() != self.temporal.len() {
            return Err(LocusError::StructuralInconsistency(format!(
                "spatial index holds {} records, temporal index holds {}",
                self.spatial.len(),
                self.temporal.len()
            )));
        }
        for (id, _) in self.spatial.iter() {
            if !self.temporal.contains(id) {
                return Err(LocusError::StructuralInconsistency(
                    "record indexed spatially but missing temporally".to_string(),
                ));
            }
        }
        self.spatial.validate()
    }
}

impl CombinedIndex {
    /// Create an index with default tuning parameters.
    pub fn new() -> Result<Self> {
        Self::with_config(IndexConfig::default())
    }

    /// Create an index with explicit tuning parameters.
    pub fn with_config(config: IndexConfig) -> Result<Self> {
        Self::from_parts(config, None, None)
    }

    pub(crate) fn from_parts(
        config: IndexConfig,
        store: Option<Arc<dyn RecordStore>>,
        observer: Option<Arc<dyn QueryObserver>>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Inner {
            spatial: SpatialIndex::new(&config)?,
            temporal: TemporalIndex::new(config.bucket_width)?,
            config,
            halted: false,
        };
        Ok(Self {
            inner: Arc::new(RwLock::new(inner)),
            stats: Arc::new(Statistics::new()),
            store,
            observer,
        })
    }

    /// Number of indexed records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.spatial.len())
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.spatial.is_empty())
    }

    /// Whether a record identifier is indexed.
    pub fn contains(&self, id: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.read()?.spatial.contains(id))
    }

    /// Current tuning parameters.
    pub fn config(&self) -> Result<IndexConfig> {
        Ok(self.read()?.config.clone())
    }

    /// Shared runtime statistics.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.stats)
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Insert a record into both sub-indexes as one logical operation.
    ///
    /// If a record store is attached, the identifier must exist there.
    /// Failure in either sub-index leaves the combined index unchanged.
    pub fn insert(
        &self,
        id: impl AsRef<[u8]>,
        rect: Rect,
        timestamp: Timestamp,
    ) -> Result<()> {
        let id = Bytes::copy_from_slice(id.as_ref());
        if let Some(store) = &self.store {
            if !store.contains(&id)? {
                return Err(LocusError::NotFound);
            }
        }

        let mut inner = self.write()?;
        let state = &mut *inner;
        state.check_active()?;

        state.spatial.insert(id.clone(), rect)?;
        if let Err(err) = state.temporal.insert(id.clone(), timestamp) {
            if let Err(rollback) = state.spatial.remove(&id) {
                state.halted = true;
                warn!(error = %rollback, "rollback failed, halting index");
                return Err(LocusError::StructuralInconsistency(format!(
                    "spatial rollback failed after temporal insert error: {}",
                    rollback
                )));
            }
            return Err(err);
        }

        self.stats
            .set_records(state.spatial.len() as u64, state.temporal.len() as u64);
        Ok(())
    }

    /// Remove a record from both sub-indexes as one logical operation.
    pub fn remove(&self, id: impl AsRef<[u8]>) -> Result<()> {
        let id = Bytes::copy_from_slice(id.as_ref());
        let mut inner = self.write()?;
        let state = &mut *inner;
        state.check_active()?;

        let rect = state
            .spatial
            .rect_of(&id)
            .cloned()
            .ok_or(LocusError::NotFound)?;
        state.spatial.remove(&id)?;
        if let Err(err) = state.temporal.remove(&id) {
            let _ = state.spatial.insert(id.clone(), rect);
            state.halted = true;
            warn!(error = %err, "cross-index mismatch on remove, halting index");
            return Err(LocusError::StructuralInconsistency(format!(
                "temporal removal failed after spatial removal: {}",
                err
            )));
        }

        self.stats
            .set_records(state.spatial.len() as u64, state.temporal.len() as u64);
        Ok(())
    }

    /// Plan and execute a query.
    ///
    /// With both criteria present the cheaper side (per the planner's
    /// statistics-informed estimate) runs first; `limit` truncates only
    /// after intersection. A query with no criteria enumerates everything.
    pub fn query(&self, query: &Query) -> Result<QueryResults> {
        if query.predicate.is_some() && self.store.is_none() {
            return Err(LocusError::ExecutionAborted(
                "payload predicates require a record store".to_string(),
            ));
        }

        let inner = self.read()?;
        let plan = Planner::optimize(query, &self.planner_context(&inner));
        let engine = ExecutionEngine::new(
            &inner.spatial,
            &inner.temporal,
            self.store.as_deref(),
            &self.stats,
        );
        let results = engine.execute(&plan, query)?;
        drop(inner);

        if let Some(observer) = &self.observer {
            observer.query_executed(&query.shape(), results.ids());
        }
        Ok(results)
    }

    /// Plan a query without executing it.
    pub fn plan(&self, query: &Query) -> Result<ExecutionPlan> {
        let inner = self.read()?;
        Ok(Planner::optimize(query, &self.planner_context(&inner)))
    }

    /// Records whose rectangle intersects `region`.
    pub fn query_within(&self, region: &Rect) -> Result<QueryResults> {
        self.query(&Query::new().within(region.clone()))
    }

    /// Records stamped within `[start, end]`.
    pub fn query_between(&self, start: Timestamp, end: Timestamp) -> Result<QueryResults> {
        self.query(&Query::new().between(start, end))
    }

    /// The `k` records nearest to `point` with their distances, closest
    /// first, optionally capped by `max_distance`.
    pub fn nearest(
        &self,
        point: &[f64],
        k: usize,
        max_distance: Option<f64>,
    ) -> Result<Vec<(RecordId, f64)>> {
        self.read()?.spatial.nearest(point, k, max_distance)
    }

    /// Windowed series of identifier sets over `[start, end)`.
    pub fn query_series(
        &self,
        start: Timestamp,
        end: Timestamp,
        interval: Timestamp,
    ) -> Result<Vec<(Timestamp, FxHashSet<RecordId>)>> {
        let inner = self.read()?;
        let series: TimeSeries<'_> = inner.temporal.query_series(start, end, interval)?;
        Ok(series.collect())
    }

    /// Identifiers stamped at or before `timestamp`.
    pub fn state_at(&self, timestamp: Timestamp) -> Result<FxHashSet<RecordId>> {
        Ok(self.read()?.temporal.state_at(timestamp))
    }

    /// Cross-check both sub-indexes and the spatial tree invariants.
    ///
    /// A detected mismatch halts the index: further mutation fails with
    /// [`LocusError::StructuralInconsistency`] until [`rebuild`] runs.
    ///
    /// [`rebuild`]: CombinedIndex::rebuild
    pub fn verify(&self) -> Result<()> {
        let mut inner = self.write()?;
        let outcome = inner.cross_check();
        if outcome.is_err() {
            inner.halted = true;
        }
        outcome
    }

    /// Drop and reconstruct both sub-indexes from the current records,
    /// optionally under new tuning parameters.
    ///
    /// Batches at or above the bulk-load threshold use spatial bulk
    /// loading. Readers see either the old or the fully rebuilt index.
    /// Statistics reset, and a halted index comes back into service.
    pub fn rebuild(&self, new_config: Option<IndexConfig>) -> Result<()> {
        let mut inner = self.write()?;
        let state = &mut *inner;
        let config = match new_config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => state.config.clone(),
        };

        let mut triples: Vec<(RecordId, Rect, Timestamp)> =
            Vec::with_capacity(state.spatial.len());
        for (id, rect) in state.spatial.iter() {
            let Some(ts) = state.temporal.timestamp_of(id) else {
                state.halted = true;
                return Err(LocusError::StructuralInconsistency(
                    "record indexed spatially but missing temporally".to_string(),
                ));
            };
            triples.push((id.clone(), rect.clone(), ts));
        }

        let spatial = if triples.len() >= config.bulk_load_threshold {
            let items = triples
                .iter()
                .map(|(id, rect, _)| (id.clone(), rect.clone()))
                .collect();
            SpatialIndex::bulk_load(items, &config)?
        } else {
            let mut spatial = SpatialIndex::new(&config)?;
            for (id, rect, _) in &triples {
                spatial.insert(id.clone(), rect.clone())?;
            }
            spatial
        };
        let mut temporal = TemporalIndex::new(config.bucket_width)?;
        for (id, _, ts) in &triples {
            temporal.insert(id.clone(), *ts)?;
        }

        state.spatial = spatial;
        state.temporal = temporal;
        state.config = config;
        state.halted = false;
        self.stats.reset();
        self.stats
            .set_records(state.spatial.len() as u64, state.temporal.len() as u64);
        debug!(records = triples.len(), "rebuilt combined index");
        Ok(())
    }

    fn planner_context(&self, inner: &Inner) -> PlannerContext {
        PlannerContext {
            record_count: inner.spatial.len() as u64,
            spatial_bounds: inner.spatial.bounds(),
            temporal_span: inner.temporal.span(),
            stats: Arc::clone(&self.stats),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| LocusError::Lock)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| LocusError::Lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> Rect {
        Rect::point(vec![x, y])
    }

    #[test]
    fn test_insert_query_remove_roundtrip() {
        let index = CombinedIndex::new().unwrap();
        index.insert("a", pt(1.0, 1.0), 100).unwrap();
        assert!(index.contains("a").unwrap());
        assert_eq!(index.len().unwrap(), 1);

        index.remove("a").unwrap();
        assert!(!index.contains("a").unwrap());
        assert!(index.is_empty().unwrap());
        index.verify().unwrap();
    }

    #[test]
    fn test_remove_twice_is_not_found() {
        let index = CombinedIndex::new().unwrap();
        index.insert("a", pt(1.0, 1.0), 100).unwrap();
        index.remove("a").unwrap();
        assert!(matches!(index.remove("a"), Err(LocusError::NotFound)));
        assert!(index.is_empty().unwrap());
    }

    #[test]
    fn test_failed_insert_leaves_no_trace() {
        let index = CombinedIndex::new().unwrap();
        index.insert("a", pt(1.0, 1.0), 100).unwrap();
        assert!(matches!(
            index.insert("a", pt(2.0, 2.0), 200),
            Err(LocusError::DuplicateIdentifier)
        ));
        assert_eq!(index.len().unwrap(), 1);
        index.verify().unwrap();
    }

    #[test]
    fn test_query_both_dimensions() {
        let index = CombinedIndex::new().unwrap();
        index.insert("near-early", pt(1.0, 1.0), 100).unwrap();
        index.insert("near-late", pt(2.0, 2.0), 90_000).unwrap();
        index.insert("far-early", pt(500.0, 500.0), 100).unwrap();

        let region = Rect::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
        let results = index
            .query(&Query::new().within(region).between(0, 1000))
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.ids()[0].as_ref(), b"near-early");
    }

    #[test]
    fn test_rebuild_preserves_answers() {
        let index = CombinedIndex::new().unwrap();
        for i in 0..300i64 {
            index
                .insert(
                    format!("id:{}", i),
                    pt((i % 50) as f64, (i / 50) as f64),
                    i * 60,
                )
                .unwrap();
        }
        let region = Rect::new(vec![10.0, 0.0], vec![30.0, 3.0]).unwrap();
        let before: FxHashSet<RecordId> =
            index.query_within(&region).unwrap().into_ids().into_iter().collect();

        let tuned = IndexConfig::default()
            .with_leaf_capacity(8)
            .with_bucket_width(600)
            .with_bulk_load_threshold(100);
        index.rebuild(Some(tuned)).unwrap();
        index.verify().unwrap();

        let after: FxHashSet<RecordId> =
            index.query_within(&region).unwrap().into_ids().into_iter().collect();
        assert_eq!(before, after);
        assert_eq!(index.config().unwrap().leaf_capacity, 8);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = IndexConfig::default().with_min_fill_factor(0.9);
        assert!(matches!(
            CombinedIndex::with_config(bad),
            Err(LocusError::CapacityViolation(_))
        ));
    }

    #[test]
    fn test_state_at_and_series() {
        let index = CombinedIndex::new().unwrap();
        index.insert("a", pt(0.0, 0.0), 0).unwrap();
        index.insert("b", pt(1.0, 1.0), 3600).unwrap();
        index.insert("c", pt(2.0, 2.0), 7200).unwrap();

        assert_eq!(index.state_at(3600).unwrap().len(), 2);
        let series = index.query_series(0, 10_800, 3600).unwrap();
        assert_eq!(series.len(), 3);
        assert!(series.iter().all(|(_, ids)| ids.len() == 1));
    }

    #[test]
    fn test_stats_reset_on_rebuild() {
        let index = CombinedIndex::new().unwrap();
        index.insert("a", pt(0.0, 0.0), 0).unwrap();
        index.query(&Query::new()).unwrap();
        assert_eq!(index.stats().queries, 1);

        index.rebuild(None).unwrap();
        assert_eq!(index.stats().queries, 0);
        assert_eq!(index.stats().rebuilds, 1);
        assert_eq!(index.stats().spatial_records, 1);
    }
}
