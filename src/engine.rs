//! Plan execution.
//!
//! The engine walks a plan's steps in order over a small stack of
//! candidate lists: scans push, filters transform the top, merge
//! intersects the top two. Steps of one plan never interleave, the
//! caller's deadline is checked between steps (never mid-step), and any
//! step failure aborts the whole plan with partial results discarded.

use crate::error::{LocusError, Result};
use crate::plan::{ExecutionPlan, Query, SpatialCriteria, Step, TemporalCriteria};
use crate::rtree::SpatialIndex;
use crate::stats::Statistics;
use crate::store::RecordStore;
use crate::temporal::TemporalIndex;
use crate::types::RecordId;
use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};
use tracing::trace;
use uuid::Uuid;

/// Result of executing one plan.
///
/// Identifiers are distance-ordered for nearest-neighbor queries and in
/// arbitrary order otherwise. All steps succeeded; a failed plan yields
/// an error instead, never a partial result.
#[derive(Debug, Clone)]
pub struct QueryResults {
    ids: Vec<RecordId>,
    duration: Duration,
    plan_id: Uuid,
}

impl QueryResults {
    /// Matched record identifiers.
    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }

    /// Number of matches.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Wall-clock execution time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Id of the plan that produced these results.
    pub fn plan_id(&self) -> Uuid {
        self.plan_id
    }

    /// Consume the results, keeping only the identifiers.
    pub fn into_ids(self) -> Vec<RecordId> {
        self.ids
    }

    /// Iterate over matched identifiers.
    pub fn iter(&self) -> impl Iterator<Item = &RecordId> {
        self.ids.iter()
    }
}

impl IntoIterator for QueryResults {
    type Item = RecordId;
    type IntoIter = std::vec::IntoIter<RecordId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

/// Executes plans against a stable snapshot of both indexes.
pub struct ExecutionEngine<'a> {
    spatial: &'a SpatialIndex,
    temporal: &'a TemporalIndex,
    store: Option<&'a dyn RecordStore>,
    stats: &'a Statistics,
}

impl<'a> ExecutionEngine<'a> {
    /// Borrow an engine over the given index snapshot.
    pub fn new(
        spatial: &'a SpatialIndex,
        temporal: &'a TemporalIndex,
        store: Option<&'a dyn RecordStore>,
        stats: &'a Statistics,
    ) -> Self {
        Self {
            spatial,
            temporal,
            store,
            stats,
        }
    }

    /// Execute a plan's steps in order and report the outcome to the
    /// shared statistics.
    pub fn execute(&self, plan: &ExecutionPlan, query: &Query) -> Result<QueryResults> {
        let started = Instant::now();
        let mut stack: Vec<Vec<RecordId>> = Vec::new();

        for planned in &plan.steps {
            self.check_deadline(query)?;
            match &planned.step {
                Step::SpatialScan(criteria) => stack.push(self.spatial_scan(criteria)?),
                Step::TemporalScan(criteria) => stack.push(self.temporal_scan(criteria)),
                Step::FullScan => {
                    stack.push(self.spatial.iter().map(|(id, _)| id.clone()).collect())
                }
                Step::SpatialFilter(region) => {
                    let mut top = pop(&mut stack)?;
                    top.retain(|id| {
                        self.spatial
                            .rect_of(id)
                            .is_some_and(|rect| rect.intersects(region))
                    });
                    stack.push(top);
                }
                Step::TemporalFilter { start, end } => {
                    let mut top = pop(&mut stack)?;
                    top.retain(|id| {
                        self.temporal
                            .timestamp_of(id)
                            .is_some_and(|ts| ts >= *start && ts <= *end)
                    });
                    stack.push(top);
                }
                Step::PredicateFilter => {
                    let top = pop(&mut stack)?;
                    stack.push(self.predicate_filter(top, query)?);
                }
                Step::Merge => {
                    let probe: FxHashSet<RecordId> = pop(&mut stack)?.into_iter().collect();
                    let mut base = pop(&mut stack)?;
                    base.retain(|id| probe.contains(id));
                    stack.push(base);
                }
            }
        }

        let mut ids = stack.pop().ok_or_else(|| {
            LocusError::ExecutionAborted("plan produced no candidate set".to_string())
        })?;
        if !stack.is_empty() {
            return Err(LocusError::ExecutionAborted(
                "plan left unmerged candidate sets".to_string(),
            ));
        }
        if let Some(limit) = query.limit {
            ids.truncate(limit);
        }

        let duration = started.elapsed();
        self.stats.record_execution(plan.strategy, duration, ids.len());
        trace!(
            plan = %plan.id,
            rows = ids.len(),
            micros = duration.as_micros() as u64,
            "executed plan"
        );
        Ok(QueryResults {
            ids,
            duration,
            plan_id: plan.id,
        })
    }

    fn spatial_scan(&self, criteria: &SpatialCriteria) -> Result<Vec<RecordId>> {
        match criteria {
            SpatialCriteria::Within(region) => {
                Ok(self.spatial.range_query(region).into_iter().collect())
            }
            SpatialCriteria::Nearest {
                point,
                k,
                max_distance,
            } => Ok(self
                .spatial
                .nearest(point, *k, *max_distance)?
                .into_iter()
                .map(|(id, _)| id)
                .collect()),
        }
    }

    fn temporal_scan(&self, criteria: &TemporalCriteria) -> Vec<RecordId> {
        let set = match *criteria {
            TemporalCriteria::Between { start, end } => self.temporal.query_range(start, end),
            TemporalCriteria::At(ts) => self.temporal.query_range(ts, ts),
            TemporalCriteria::AsOf(ts) => self.temporal.state_at(ts),
        };
        set.into_iter().collect()
    }

    fn predicate_filter(&self, ids: Vec<RecordId>, query: &Query) -> Result<Vec<RecordId>> {
        let Some(predicate) = &query.predicate else {
            return Err(LocusError::ExecutionAborted(
                "plan carries a predicate filter but the query has none".to_string(),
            ));
        };
        let Some(store) = self.store else {
            return Err(LocusError::ExecutionAborted(
                "payload predicates require a record store".to_string(),
            ));
        };

        let mut kept = Vec::with_capacity(ids.len());
        for id in ids {
            let payload = store.get(&id).map_err(|err| {
                LocusError::ExecutionAborted(format!("record store read failed: {}", err))
            })?;
            if let Some(payload) = payload {
                if predicate(&payload) {
                    kept.push(id);
                }
            }
        }
        Ok(kept)
    }

    fn check_deadline(&self, query: &Query) -> Result<()> {
        if let Some(deadline) = query.deadline {
            if Instant::now() >= deadline {
                return Err(LocusError::ExecutionAborted(
                    "deadline exceeded between steps".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<Vec<RecordId>>) -> Result<Vec<RecordId>> {
    stack.pop().ok_or_else(|| {
        LocusError::ExecutionAborted("filter step ran with no candidate set".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Planner, PlannerContext};
    use crate::store::MemoryStore;
    use crate::types::{IndexConfig, Rect};
    use std::sync::Arc;

    struct Fixture {
        spatial: SpatialIndex,
        temporal: TemporalIndex,
        stats: Arc<Statistics>,
    }

    fn fixture() -> Fixture {
        let config = IndexConfig::default().with_leaf_capacity(4);
        let mut spatial = SpatialIndex::new(&config).unwrap();
        let mut temporal = TemporalIndex::new(config.bucket_width).unwrap();
        for i in 0..40i64 {
            let id = format!("id:{}", i);
            spatial
                .insert(&id, Rect::point(vec![i as f64, (i * 2) as f64]))
                .unwrap();
            temporal.insert(&id, i * 600).unwrap();
        }
        Fixture {
            spatial,
            temporal,
            stats: Arc::new(Statistics::new()),
        }
    }

    fn context(f: &Fixture) -> PlannerContext {
        PlannerContext {
            record_count: f.spatial.len() as u64,
            spatial_bounds: f.spatial.bounds(),
            temporal_span: f.temporal.span(),
            stats: Arc::clone(&f.stats),
        }
    }

    fn run(f: &Fixture, query: &Query) -> Result<QueryResults> {
        let plan = Planner::optimize(query, &context(f));
        ExecutionEngine::new(&f.spatial, &f.temporal, None, &f.stats).execute(&plan, query)
    }

    #[test]
    fn test_combined_query_matches_manual_intersection() {
        let f = fixture();
        let region = Rect::new(vec![0.0, 0.0], vec![10.0, 20.0]).unwrap();
        let query = Query::new().within(region.clone()).between(0, 3000);

        let results = run(&f, &query).unwrap();
        let spatial = f.spatial.range_query(&region);
        let temporal = f.temporal.query_range(0, 3000);
        let expected: FxHashSet<RecordId> =
            spatial.intersection(&temporal).cloned().collect();

        let got: FxHashSet<RecordId> = results.into_ids().into_iter().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_limit_truncates_after_intersection() {
        let f = fixture();
        let region = Rect::new(vec![0.0, 0.0], vec![100.0, 100.0]).unwrap();
        let query = Query::new().within(region).between(0, 600 * 39).limit(3);
        let results = run(&f, &query).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_statistics_updated_after_execution() {
        let f = fixture();
        assert_eq!(f.stats.queries_executed(), 0);
        run(&f, &Query::new()).unwrap();
        assert_eq!(f.stats.queries_executed(), 1);
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let f = fixture();
        let query = Query::new()
            .between(0, 1000)
            .deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(
            run(&f, &query),
            Err(LocusError::ExecutionAborted(_))
        ));
    }

    #[test]
    fn test_predicate_without_store_aborts() {
        let f = fixture();
        let query = Query::new().between(0, 1000).filter(|_| true);
        assert!(matches!(
            run(&f, &query),
            Err(LocusError::ExecutionAborted(_))
        ));
    }

    #[test]
    fn test_predicate_filters_by_payload() {
        let f = fixture();
        let store = MemoryStore::new();
        for i in 0..40i64 {
            let id = format!("id:{}", i);
            let payload = if i % 2 == 0 { "even" } else { "odd" };
            store.put(id.as_bytes(), payload.as_bytes()).unwrap();
        }

        let query = Query::new()
            .between(0, 600 * 39)
            .filter(|payload| payload == b"even");
        let plan = Planner::optimize(&query, &context(&f));
        let engine = ExecutionEngine::new(&f.spatial, &f.temporal, Some(&store), &f.stats);
        let results = engine.execute(&plan, &query).unwrap();
        assert_eq!(results.len(), 20);
    }

    #[test]
    fn test_nearest_results_stay_ordered() {
        let f = fixture();
        let query = Query::new().nearest(vec![0.0, 0.0], 5).between(0, 600 * 39);
        let results = run(&f, &query).unwrap();
        let ids: Vec<&[u8]> = results.ids().iter().map(|id| id.as_ref()).collect();
        assert_eq!(ids[0], b"id:0");
        assert_eq!(results.len(), 5);
    }
}
