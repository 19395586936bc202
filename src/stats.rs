//! Runtime statistics shared between the execution engine and planner.
//!
//! The engine records (strategy, duration, result size) after every
//! execution; the planner reads the same counters to derive measured
//! per-row costs. Everything is an atomic counter, so many concurrent
//! recorders never contend on a lock and recording never blocks result
//! delivery. Statistics live for the index's lifetime and are reset only
//! on rebuild.

use crate::plan::Strategy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct StrategyCounters {
    executions: AtomicU64,
    total_micros: AtomicU64,
    total_rows: AtomicU64,
}

impl StrategyCounters {
    fn reset(&self) {
        self.executions.store(0, Ordering::Relaxed);
        self.total_micros.store(0, Ordering::Relaxed);
        self.total_rows.store(0, Ordering::Relaxed);
    }
}

/// Process-wide counters for one index instance.
///
/// Created at index construction, shared by reference with the planner
/// and engine, reset only on explicit rebuild.
#[derive(Debug)]
pub struct Statistics {
    spatial_records: AtomicU64,
    temporal_records: AtomicU64,
    queries: AtomicU64,
    rebuilds: AtomicU64,
    strategies: [StrategyCounters; Strategy::COUNT],
}

impl Statistics {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self {
            spatial_records: AtomicU64::new(0),
            temporal_records: AtomicU64::new(0),
            queries: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            strategies: std::array::from_fn(|_| StrategyCounters::default()),
        }
    }

    /// Records currently indexed spatially.
    pub fn record_count(&self) -> u64 {
        self.spatial_records.load(Ordering::Relaxed)
    }

    /// Queries executed since construction or the last rebuild.
    pub fn queries_executed(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Rebuilds performed over the index's lifetime.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    /// Measured cost in microseconds per result row for a strategy, once
    /// at least one execution has been recorded.
    pub fn measured_cost_per_row(&self, strategy: Strategy) -> Option<f64> {
        let counters = &self.strategies[strategy.index()];
        let executions = counters.executions.load(Ordering::Relaxed);
        if executions == 0 {
            return None;
        }
        let micros = counters.total_micros.load(Ordering::Relaxed);
        let rows = counters.total_rows.load(Ordering::Relaxed);
        // Empty result sets still cost at least one execution's work
        Some(micros as f64 / rows.max(executions) as f64)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            spatial_records: self.spatial_records.load(Ordering::Relaxed),
            temporal_records: self.temporal_records.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            strategies: Strategy::ALL
                .iter()
                .map(|strategy| {
                    let counters = &self.strategies[strategy.index()];
                    StrategySnapshot {
                        strategy: *strategy,
                        executions: counters.executions.load(Ordering::Relaxed),
                        total_micros: counters.total_micros.load(Ordering::Relaxed),
                        total_rows: counters.total_rows.load(Ordering::Relaxed),
                    }
                })
                .collect(),
        }
    }

    pub(crate) fn set_records(&self, spatial: u64, temporal: u64) {
        self.spatial_records.store(spatial, Ordering::Relaxed);
        self.temporal_records.store(temporal, Ordering::Relaxed);
    }

    /// Record one execution's outcome; called by the engine after every
    /// query and available to embedders driving the engine directly.
    pub fn record_execution(&self, strategy: Strategy, duration: Duration, rows: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let counters = &self.strategies[strategy.index()];
        counters.executions.fetch_add(1, Ordering::Relaxed);
        counters
            .total_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        counters.total_rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Zero every counter except the rebuild tally.
    pub(crate) fn reset(&self) {
        self.spatial_records.store(0, Ordering::Relaxed);
        self.temporal_records.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        for counters in &self.strategies {
            counters.reset();
        }
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`Statistics`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub spatial_records: u64,
    pub temporal_records: u64,
    pub queries: u64,
    pub rebuilds: u64,
    pub strategies: Vec<StrategySnapshot>,
}

/// Per-strategy execution tallies within a [`StatsSnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct StrategySnapshot {
    pub strategy: Strategy,
    pub executions: u64,
    pub total_micros: u64,
    pub total_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_measure() {
        let stats = Statistics::new();
        assert!(stats.measured_cost_per_row(Strategy::FullScan).is_none());

        stats.record_execution(Strategy::FullScan, Duration::from_micros(100), 50);
        stats.record_execution(Strategy::FullScan, Duration::from_micros(100), 50);
        assert_eq!(stats.queries_executed(), 2);
        let per_row = stats.measured_cost_per_row(Strategy::FullScan).unwrap();
        assert!((per_row - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_results_do_not_divide_by_zero() {
        let stats = Statistics::new();
        stats.record_execution(Strategy::SpatialOnly, Duration::from_micros(30), 0);
        let per_row = stats.measured_cost_per_row(Strategy::SpatialOnly).unwrap();
        assert!((per_row - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_keeps_rebuild_tally() {
        let stats = Statistics::new();
        stats.set_records(10, 10);
        stats.record_execution(Strategy::MergeJoin, Duration::from_micros(5), 1);
        stats.reset();
        assert_eq!(stats.record_count(), 0);
        assert_eq!(stats.queries_executed(), 0);
        assert_eq!(stats.rebuilds(), 1);
        assert!(stats.measured_cost_per_row(Strategy::MergeJoin).is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = Statistics::new();
        stats.set_records(3, 3);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["spatial_records"], 3);
        assert_eq!(json["strategies"].as_array().unwrap().len(), Strategy::COUNT);
    }
}
