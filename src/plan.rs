//! Logical queries, the cost-based planner, and execution plans.
//!
//! The planner turns a [`Query`] into an ordered [`ExecutionPlan`] through
//! three rule passes: index selection (which scans run, filter vs merge
//! strategy), filter pushdown (the non-indexable payload predicate lands
//! right after the first scan), and join order (merge inputs run smallest
//! estimated result first). Costs are estimated as input rows × per-row
//! unit cost, with units taken from measured [`Statistics`] when
//! available. A full scan is always a valid plan of last resort, and the
//! chosen plan's estimate never exceeds it.

use crate::stats::Statistics;
use crate::types::{Rect, Timestamp};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use uuid::Uuid;

/// Spatial side of a query.
#[derive(Debug, Clone)]
pub enum SpatialCriteria {
    /// Records whose rectangle intersects the region
    Within(Rect),
    /// The k records closest to a point, optionally capped by distance
    Nearest {
        point: Vec<f64>,
        k: usize,
        max_distance: Option<f64>,
    },
}

/// Temporal side of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalCriteria {
    /// Records with timestamp in `[start, end]`
    Between { start: Timestamp, end: Timestamp },
    /// Records with exactly this timestamp
    At(Timestamp),
    /// Records with timestamp at or before this instant
    AsOf(Timestamp),
}

impl TemporalCriteria {
    /// Inclusive timestamp window this criteria matches.
    pub(crate) fn window(&self) -> (Timestamp, Timestamp) {
        match *self {
            TemporalCriteria::Between { start, end } => (start, end),
            TemporalCriteria::At(ts) => (ts, ts),
            TemporalCriteria::AsOf(ts) => (Timestamp::MIN, ts),
        }
    }
}

/// Payload predicate evaluated against record store bytes.
pub type Predicate = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// A logical query over the combined index.
///
/// Built incrementally; evaluating it is the combined index's job.
///
/// # Examples
///
/// ```rust
/// use locus::{Query, Rect};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let region = Rect::new(vec![0.0, 0.0], vec![10.0, 10.0])?;
/// let query = Query::new()
///     .within(region)
///     .between(1_000, 2_000)
///     .limit(25);
/// assert!(query.shape().limit == Some(25));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Query {
    pub(crate) spatial: Option<SpatialCriteria>,
    pub(crate) temporal: Option<TemporalCriteria>,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) limit: Option<usize>,
    pub(crate) deadline: Option<Instant>,
}

impl Query {
    /// Start an empty query (a full enumeration until narrowed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Match records whose rectangle intersects `region`.
    pub fn within(mut self, region: Rect) -> Self {
        self.spatial = Some(SpatialCriteria::Within(region));
        self
    }

    /// Match the `k` records nearest to `point`, closest first.
    pub fn nearest(mut self, point: Vec<f64>, k: usize) -> Self {
        self.spatial = Some(SpatialCriteria::Nearest {
            point,
            k,
            max_distance: None,
        });
        self
    }

    /// Match the `k` records nearest to `point` within `max_distance`.
    pub fn nearest_within(mut self, point: Vec<f64>, k: usize, max_distance: f64) -> Self {
        self.spatial = Some(SpatialCriteria::Nearest {
            point,
            k,
            max_distance: Some(max_distance),
        });
        self
    }

    /// Match records with timestamps in `[start, end]`.
    pub fn between(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.temporal = Some(TemporalCriteria::Between { start, end });
        self
    }

    /// Match records stamped exactly `ts`.
    pub fn at(mut self, ts: Timestamp) -> Self {
        self.temporal = Some(TemporalCriteria::At(ts));
        self
    }

    /// Match records stamped at or before `ts`.
    pub fn as_of(mut self, ts: Timestamp) -> Self {
        self.temporal = Some(TemporalCriteria::AsOf(ts));
        self
    }

    /// Filter candidates by a predicate over their store payload.
    ///
    /// Requires a record store to be attached to the index.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Truncate results after all criteria intersect.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Abort execution once this instant passes, checked between steps.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Structural fingerprint of this query.
    pub fn shape(&self) -> QueryShape {
        QueryShape {
            spatial: self.spatial.as_ref().map(|s| match s {
                SpatialCriteria::Within(_) => SpatialShape::Within,
                SpatialCriteria::Nearest { .. } => SpatialShape::Nearest,
            }),
            temporal: self.temporal.as_ref().map(|t| match t {
                TemporalCriteria::Between { .. } => TemporalShape::Between,
                TemporalCriteria::At(_) => TemporalShape::At,
                TemporalCriteria::AsOf(_) => TemporalShape::AsOf,
            }),
            has_predicate: self.predicate.is_some(),
            limit: self.limit,
        }
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("spatial", &self.spatial)
            .field("temporal", &self.temporal)
            .field("has_predicate", &self.predicate.is_some())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Kind of spatial criteria, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpatialShape {
    Within,
    Nearest,
}

/// Kind of temporal criteria, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TemporalShape {
    Between,
    At,
    AsOf,
}

/// Structural fingerprint of a query, used for statistics and observer
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct QueryShape {
    pub spatial: Option<SpatialShape>,
    pub temporal: Option<TemporalShape>,
    pub has_predicate: bool,
    pub limit: Option<usize>,
}

/// Execution strategy chosen by the planner, the granularity at which
/// durations are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Strategy {
    SpatialOnly,
    TemporalOnly,
    SpatialFirst,
    TemporalFirst,
    MergeJoin,
    FullScan,
}

impl Strategy {
    pub(crate) const COUNT: usize = 6;
    pub(crate) const ALL: [Strategy; Self::COUNT] = [
        Strategy::SpatialOnly,
        Strategy::TemporalOnly,
        Strategy::SpatialFirst,
        Strategy::TemporalFirst,
        Strategy::MergeJoin,
        Strategy::FullScan,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Strategy::SpatialOnly => 0,
            Strategy::TemporalOnly => 1,
            Strategy::SpatialFirst => 2,
            Strategy::TemporalFirst => 3,
            Strategy::MergeJoin => 4,
            Strategy::FullScan => 5,
        }
    }
}

/// One concrete operation inside an execution plan.
///
/// A closed set: the engine matches these exhaustively, and a new
/// strategy is a new variant.
#[derive(Debug, Clone)]
pub enum Step {
    /// Scan the spatial index with the given criteria
    SpatialScan(SpatialCriteria),
    /// Scan the temporal index with the given criteria
    TemporalScan(TemporalCriteria),
    /// Enumerate every indexed record
    FullScan,
    /// Drop candidates whose rectangle misses the region
    SpatialFilter(Rect),
    /// Drop candidates stamped outside `[start, end]`
    TemporalFilter { start: Timestamp, end: Timestamp },
    /// Drop candidates whose store payload fails the query predicate
    PredicateFilter,
    /// Intersect the two most recent candidate sets
    Merge,
}

impl Step {
    /// Short machine-readable name of this step.
    pub fn name(&self) -> &'static str {
        match self {
            Step::SpatialScan(_) => "spatial_scan",
            Step::TemporalScan(_) => "temporal_scan",
            Step::FullScan => "full_scan",
            Step::SpatialFilter(_) => "spatial_filter",
            Step::TemporalFilter { .. } => "temporal_filter",
            Step::PredicateFilter => "predicate_filter",
            Step::Merge => "merge",
        }
    }
}

/// A [`Step`] with its planner estimates.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub step: Step,
    /// Estimated candidate rows flowing out of this step
    pub estimated_rows: f64,
    /// Estimated cost of the plan up to and including this step
    pub cumulative_cost: f64,
}

/// Ordered, immutable sequence of steps answering one query.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub(crate) id: Uuid,
    pub(crate) strategy: Strategy,
    pub(crate) steps: Vec<PlannedStep>,
    pub(crate) estimated_cost: f64,
    pub(crate) shape: QueryShape,
}

impl ExecutionPlan {
    /// Unique id of this plan instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Strategy this plan implements.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The ordered steps.
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Total estimated cost.
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Fingerprint of the query this plan answers.
    pub fn shape(&self) -> QueryShape {
        self.shape
    }

    /// Render the plan as JSON for inspection.
    pub fn explain(&self) -> serde_json::Value {
        json!({
            "plan_id": self.id.to_string(),
            "strategy": self.strategy,
            "estimated_cost": self.estimated_cost,
            "steps": self
                .steps
                .iter()
                .map(|planned| {
                    json!({
                        "step": planned.step.name(),
                        "estimated_rows": planned.estimated_rows,
                        "cumulative_cost": planned.cumulative_cost,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// Index state snapshot the planner reads before each plan.
pub struct PlannerContext {
    /// Records currently indexed
    pub record_count: u64,
    /// Bounding rectangle of the whole spatial index
    pub spatial_bounds: Option<Rect>,
    /// Earliest and latest indexed timestamps
    pub temporal_span: Option<(Timestamp, Timestamp)>,
    /// Shared runtime statistics
    pub stats: Arc<Statistics>,
}

// Default per-row unit costs, overridden by measured statistics.
const UNIT_FULL_SCAN: f64 = 1.0;
const UNIT_SPATIAL_SCAN: f64 = 4.0;
const UNIT_TEMPORAL_SCAN: f64 = 2.0;
const UNIT_SPATIAL_FILTER: f64 = 1.5;
const UNIT_TEMPORAL_FILTER: f64 = 1.0;
const UNIT_PREDICATE: f64 = 16.0;
const UNIT_MERGE: f64 = 1.0;
const PREDICATE_SELECTIVITY: f64 = 0.5;

/// The cost-based query planner.
///
/// Stateless per call; reads shared statistics through the supplied
/// context and never mutates any index.
pub struct Planner;

impl Planner {
    /// Choose an execution plan for `query`.
    pub fn optimize(query: &Query, ctx: &PlannerContext) -> ExecutionPlan {
        let full = Self::full_scan_draft(query, ctx);

        let mut best = full.clone();
        for candidate in Self::indexed_drafts(query, ctx) {
            if candidate.cost <= best.cost {
                best = candidate;
            }
        }
        if best.cost > full.cost {
            best = full;
        }

        trace!(
            strategy = ?best.strategy,
            cost = best.cost,
            "selected execution plan"
        );
        best.into_plan(query.shape())
    }

    /// The plan of last resort: enumerate everything, then filter.
    pub fn full_scan_plan(query: &Query, ctx: &PlannerContext) -> ExecutionPlan {
        Self::full_scan_draft(query, ctx).into_plan(query.shape())
    }

    /// Index-selection pass: every indexed strategy applicable to the
    /// query, costs included.
    fn indexed_drafts(query: &Query, ctx: &PlannerContext) -> Vec<Draft> {
        let mut drafts = Vec::new();
        let n = ctx.record_count as f64;

        match (&query.spatial, &query.temporal) {
            (None, None) => {}
            (Some(spatial), None) => {
                let mut draft = DraftBuilder::new();
                draft.scan(
                    Step::SpatialScan(spatial.clone()),
                    Self::spatial_rows(spatial, ctx),
                    Self::scan_unit(ctx, Strategy::SpatialOnly, UNIT_SPATIAL_SCAN),
                );
                Self::push_predicate(&mut draft, query);
                drafts.push(draft.finish(Strategy::SpatialOnly));
            }
            (None, Some(temporal)) => {
                let mut draft = DraftBuilder::new();
                draft.scan(
                    Step::TemporalScan(*temporal),
                    Self::temporal_rows(temporal, ctx),
                    Self::scan_unit(ctx, Strategy::TemporalOnly, UNIT_TEMPORAL_SCAN),
                );
                Self::push_predicate(&mut draft, query);
                drafts.push(draft.finish(Strategy::TemporalOnly));
            }
            (Some(spatial), Some(temporal)) => {
                let spatial_rows = Self::spatial_rows(spatial, ctx);
                let temporal_rows = Self::temporal_rows(temporal, ctx);
                let sel_spatial = if n > 0.0 { spatial_rows / n } else { 0.0 };
                let sel_temporal = if n > 0.0 { temporal_rows / n } else { 0.0 };
                let (start, end) = temporal.window();

                // Spatial scan narrowed by a per-candidate timestamp check.
                let mut draft = DraftBuilder::new();
                draft.scan(
                    Step::SpatialScan(spatial.clone()),
                    spatial_rows,
                    Self::scan_unit(ctx, Strategy::SpatialFirst, UNIT_SPATIAL_SCAN),
                );
                Self::push_predicate(&mut draft, query);
                draft.filter(
                    Step::TemporalFilter { start, end },
                    sel_temporal,
                    UNIT_TEMPORAL_FILTER,
                );
                drafts.push(draft.finish(Strategy::SpatialFirst));

                // Nearest must stay a scan to keep distance order; the
                // remaining strategies need a filterable region.
                if let SpatialCriteria::Within(region) = spatial {
                    let mut draft = DraftBuilder::new();
                    draft.scan(
                        Step::TemporalScan(*temporal),
                        temporal_rows,
                        Self::scan_unit(ctx, Strategy::TemporalFirst, UNIT_TEMPORAL_SCAN),
                    );
                    Self::push_predicate(&mut draft, query);
                    draft.filter(
                        Step::SpatialFilter(region.clone()),
                        sel_spatial,
                        UNIT_SPATIAL_FILTER,
                    );
                    drafts.push(draft.finish(Strategy::TemporalFirst));

                    // Join-order pass: the smaller estimated input scans
                    // first so the merge probes the smaller set.
                    let mut draft = DraftBuilder::new();
                    let spatial_scan = (
                        Step::SpatialScan(spatial.clone()),
                        spatial_rows,
                        Self::scan_unit(ctx, Strategy::MergeJoin, UNIT_SPATIAL_SCAN),
                    );
                    let temporal_scan = (
                        Step::TemporalScan(*temporal),
                        temporal_rows,
                        Self::scan_unit(ctx, Strategy::MergeJoin, UNIT_TEMPORAL_SCAN),
                    );
                    let (first, second) = if spatial_rows <= temporal_rows {
                        (spatial_scan, temporal_scan)
                    } else {
                        (temporal_scan, spatial_scan)
                    };
                    draft.scan(first.0, first.1, first.2);
                    Self::push_predicate(&mut draft, query);
                    draft.scan(second.0, second.1, second.2);
                    draft.merge(n, UNIT_MERGE);
                    drafts.push(draft.finish(Strategy::MergeJoin));
                }
            }
        }
        drafts
    }

    fn full_scan_draft(query: &Query, ctx: &PlannerContext) -> Draft {
        let n = ctx.record_count as f64;
        let mut draft = DraftBuilder::new();
        match &query.spatial {
            // Nearest has no filter form; even the last-resort pipeline is
            // led by the nearest scan itself.
            Some(nearest @ SpatialCriteria::Nearest { .. }) => {
                draft.scan(
                    Step::SpatialScan(nearest.clone()),
                    Self::spatial_rows(nearest, ctx),
                    UNIT_SPATIAL_SCAN,
                );
            }
            Some(SpatialCriteria::Within(region)) => {
                draft.scan(
                    Step::FullScan,
                    n,
                    Self::scan_unit(ctx, Strategy::FullScan, UNIT_FULL_SCAN),
                );
                let sel = if n > 0.0 {
                    Self::spatial_rows(&SpatialCriteria::Within(region.clone()), ctx) / n
                } else {
                    0.0
                };
                draft.filter(Step::SpatialFilter(region.clone()), sel, UNIT_SPATIAL_FILTER);
            }
            None => {
                draft.scan(
                    Step::FullScan,
                    n,
                    Self::scan_unit(ctx, Strategy::FullScan, UNIT_FULL_SCAN),
                );
            }
        }
        if let Some(temporal) = &query.temporal {
            let sel = if n > 0.0 {
                Self::temporal_rows(temporal, ctx) / n
            } else {
                0.0
            };
            let (start, end) = temporal.window();
            draft.filter(
                Step::TemporalFilter { start, end },
                sel,
                UNIT_TEMPORAL_FILTER,
            );
        }
        Self::push_predicate(&mut draft, query);
        draft.finish(Strategy::FullScan)
    }

    /// Filter-pushdown pass: the payload predicate lands immediately
    /// after whatever step the builder holds so far.
    fn push_predicate(draft: &mut DraftBuilder, query: &Query) {
        if query.predicate.is_some() {
            draft.filter(Step::PredicateFilter, PREDICATE_SELECTIVITY, UNIT_PREDICATE);
        }
    }

    fn scan_unit(ctx: &PlannerContext, strategy: Strategy, default: f64) -> f64 {
        ctx.stats
            .measured_cost_per_row(strategy)
            .filter(|m| *m > 0.0)
            .unwrap_or(default)
    }

    /// Estimated candidate rows for spatial criteria.
    fn spatial_rows(criteria: &SpatialCriteria, ctx: &PlannerContext) -> f64 {
        let n = ctx.record_count as f64;
        match criteria {
            SpatialCriteria::Nearest { k, .. } => (*k as f64).min(n),
            SpatialCriteria::Within(region) => match &ctx.spatial_bounds {
                None => 0.0,
                Some(bounds) => {
                    let total = bounds.area();
                    if total <= 0.0 {
                        if bounds.intersects(region) { n } else { 0.0 }
                    } else {
                        let fraction = region.intersection_area(bounds) / total;
                        n * fraction.clamp(0.0, 1.0)
                    }
                }
            },
        }
    }

    /// Estimated candidate rows for temporal criteria.
    fn temporal_rows(criteria: &TemporalCriteria, ctx: &PlannerContext) -> f64 {
        let n = ctx.record_count as f64;
        let Some((lo, hi)) = ctx.temporal_span else {
            return 0.0;
        };
        let width = (hi.saturating_sub(lo)).saturating_add(1) as f64;
        match *criteria {
            TemporalCriteria::Between { start, end } => {
                if end < start {
                    return 0.0;
                }
                let overlap_lo = start.max(lo);
                let overlap_hi = end.min(hi);
                if overlap_hi < overlap_lo {
                    return 0.0;
                }
                let overlap = (overlap_hi - overlap_lo + 1) as f64;
                n * (overlap / width).clamp(0.0, 1.0)
            }
            TemporalCriteria::At(ts) => {
                if ts < lo || ts > hi {
                    0.0
                } else {
                    (n / width).max(1.0).min(n)
                }
            }
            TemporalCriteria::AsOf(ts) => {
                if ts < lo {
                    return 0.0;
                }
                let overlap = (ts.min(hi) - lo + 1) as f64;
                n * (overlap / width).clamp(0.0, 1.0)
            }
        }
    }
}

/// Draft plan under construction: mirrors the engine's candidate stack so
/// row estimates line up with what execution will see.
struct DraftBuilder {
    steps: Vec<PlannedStep>,
    stack: Vec<f64>,
    cost: f64,
}

impl DraftBuilder {
    fn new() -> Self {
        Self {
            steps: Vec::new(),
            stack: Vec::new(),
            cost: 0.0,
        }
    }

    fn scan(&mut self, step: Step, rows: f64, unit: f64) {
        self.cost += rows.max(1.0) * unit;
        self.stack.push(rows);
        self.steps.push(PlannedStep {
            step,
            estimated_rows: rows,
            cumulative_cost: self.cost,
        });
    }

    fn filter(&mut self, step: Step, selectivity: f64, unit: f64) {
        let input = self.stack.pop().unwrap_or(0.0);
        self.cost += input.max(1.0) * unit;
        let output = input * selectivity.clamp(0.0, 1.0);
        self.stack.push(output);
        self.steps.push(PlannedStep {
            step,
            estimated_rows: output,
            cumulative_cost: self.cost,
        });
    }

    fn merge(&mut self, total_records: f64, unit: f64) {
        let second = self.stack.pop().unwrap_or(0.0);
        let first = self.stack.pop().unwrap_or(0.0);
        self.cost += (first + second).max(1.0) * unit;
        let output = if total_records > 0.0 {
            (first * second / total_records).min(first.min(second))
        } else {
            0.0
        };
        self.stack.push(output);
        self.steps.push(PlannedStep {
            step: Step::Merge,
            estimated_rows: output,
            cumulative_cost: self.cost,
        });
    }

    fn finish(self, strategy: Strategy) -> Draft {
        Draft {
            strategy,
            steps: self.steps,
            cost: self.cost,
        }
    }
}

#[derive(Clone)]
struct Draft {
    strategy: Strategy,
    steps: Vec<PlannedStep>,
    cost: f64,
}

impl Draft {
    fn into_plan(self, shape: QueryShape) -> ExecutionPlan {
        ExecutionPlan {
            id: Uuid::new_v4(),
            strategy: self.strategy,
            steps: self.steps,
            estimated_cost: self.cost,
            shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(n: u64) -> PlannerContext {
        PlannerContext {
            record_count: n,
            spatial_bounds: Some(Rect::new(vec![0.0, 0.0], vec![100.0, 100.0]).unwrap()),
            temporal_span: Some((0, 99_999)),
            stats: Arc::new(Statistics::new()),
        }
    }

    fn small_region() -> Rect {
        Rect::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap()
    }

    #[test]
    fn test_no_criteria_is_full_scan() {
        let plan = Planner::optimize(&Query::new(), &ctx(1000));
        assert_eq!(plan.strategy(), Strategy::FullScan);
        assert_eq!(plan.steps().len(), 1);
        assert!(matches!(plan.steps()[0].step, Step::FullScan));
    }

    #[test]
    fn test_selective_spatial_beats_full_scan() {
        let plan = Planner::optimize(&Query::new().within(small_region()), &ctx(10_000));
        assert_eq!(plan.strategy(), Strategy::SpatialOnly);
    }

    #[test]
    fn test_cost_is_monotone_over_steps() {
        let query = Query::new().within(small_region()).between(0, 500);
        let plan = Planner::optimize(&query, &ctx(10_000));
        let mut last = 0.0;
        for step in plan.steps() {
            assert!(step.cumulative_cost >= last);
            last = step.cumulative_cost;
        }
        assert_eq!(plan.estimated_cost(), last);
    }

    #[test]
    fn test_never_worse_than_full_scan() {
        let queries = vec![
            Query::new(),
            Query::new().within(small_region()),
            Query::new().between(10, 20),
            Query::new().within(small_region()).between(0, 99_999),
            Query::new().nearest(vec![5.0, 5.0], 10).between(0, 50),
            Query::new()
                .within(Rect::new(vec![0.0, 0.0], vec![100.0, 100.0]).unwrap())
                .as_of(99_999),
        ];
        let context = ctx(5_000);
        for query in queries {
            let chosen = Planner::optimize(&query, &context);
            let fallback = Planner::full_scan_plan(&query, &context);
            assert!(
                chosen.estimated_cost() <= fallback.estimated_cost(),
                "{:?} cost {} exceeds full scan {}",
                chosen.strategy(),
                chosen.estimated_cost(),
                fallback.estimated_cost()
            );
        }
    }

    #[test]
    fn test_nearest_with_temporal_scans_spatially() {
        let query = Query::new().nearest(vec![1.0, 1.0], 5).between(0, 100);
        let plan = Planner::optimize(&query, &ctx(10_000));
        assert_eq!(plan.strategy(), Strategy::SpatialFirst);
        assert!(matches!(plan.steps()[0].step, Step::SpatialScan(_)));
    }

    #[test]
    fn test_merge_orders_smaller_input_first() {
        // A tight temporal window against a huge region: the temporal
        // scan must come first wherever a merge is drafted.
        let wide = Rect::new(vec![0.0, 0.0], vec![100.0, 100.0]).unwrap();
        let query = Query::new().within(wide).between(0, 9);
        let context = ctx(100_000);
        for draft in Planner::indexed_drafts(&query, &context) {
            if draft.strategy == Strategy::MergeJoin {
                assert!(matches!(draft.steps[0].step, Step::TemporalScan(_)));
            }
        }
    }

    #[test]
    fn test_predicate_lands_after_first_scan() {
        let query = Query::new()
            .within(small_region())
            .between(0, 500)
            .filter(|_| true);
        let plan = Planner::optimize(&query, &ctx(10_000));
        let names: Vec<_> = plan.steps().iter().map(|s| s.step.name()).collect();
        let scan_pos = 0;
        let pred_pos = names
            .iter()
            .position(|n| *n == "predicate_filter")
            .expect("predicate step present");
        assert_eq!(pred_pos, scan_pos + 1);
    }

    #[test]
    fn test_explain_renders_steps() {
        let plan = Planner::optimize(&Query::new().within(small_region()), &ctx(100));
        let explain = plan.explain();
        assert_eq!(explain["strategy"], "SpatialOnly");
        assert!(explain["steps"].as_array().unwrap().len() >= 1);
    }

    #[test]
    fn test_empty_index_plans_cheaply() {
        let context = PlannerContext {
            record_count: 0,
            spatial_bounds: None,
            temporal_span: None,
            stats: Arc::new(Statistics::new()),
        };
        let plan = Planner::optimize(&Query::new().within(small_region()), &context);
        assert!(plan.estimated_cost() > 0.0);
    }
}
