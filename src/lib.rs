//! # Locus - an embedded spatio-temporal record index
//!
//! Locus indexes records by two orthogonal dimensions at once - an
//! n-dimensional spatial coordinate and a timestamp - and answers
//! combined range, nearest-neighbor, and time-window queries over
//! millions of records. It is a pure identifier index: payloads stay in
//! an external record store, and the index holds only references.
//!
//! ## Features
//!
//! - **Balanced spatial tree**: R-tree insert/remove/range/nearest with
//!   quadratic splits, condensation, and bottom-up bulk loading
//! - **Bucketed temporal index**: fixed-width time buckets with exact
//!   boundary filtering, windowed series, and as-of snapshots
//! - **Atomic combined mutations**: a record is visible in both
//!   sub-indexes or in neither
//! - **Cost-based planning**: statistics-informed strategy selection with
//!   a full scan as the plan of last resort
//! - **Concurrent reads**: queries run in parallel against a stable
//!   snapshot; structural writes are serialized
//!
//! ## Quick Start
//!
//! ```rust
//! use locus::{Locus, Query, Rect};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Locus::new()?;
//!
//! // Index records by position and timestamp
//! index.insert("bus:12", Rect::point(vec![40.71, -74.00]), 1_700_000_000)?;
//! index.insert("bus:47", Rect::point(vec![40.76, -73.98]), 1_700_000_060)?;
//! index.insert("bus:03", Rect::point(vec![51.50, -0.12]), 1_700_000_120)?;
//!
//! // Combined spatial + temporal query
//! let manhattan = Rect::new(vec![40.5, -74.3], vec![41.0, -73.5])?;
//! let results = index.query(&Query::new()
//!     .within(manhattan)
//!     .between(1_700_000_000, 1_700_000_090))?;
//! assert_eq!(results.len(), 2);
//!
//! // Nearest neighbors in true distance order
//! let closest = index.nearest(&[40.70, -74.01], 1, None)?;
//! assert_eq!(closest[0].0.as_ref(), b"bus:12");
//! # Ok(())
//! # }
//! ```
//!
//! ## Planning and introspection
//!
//! ```rust
//! use locus::{Locus, Query, Rect};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Locus::new()?;
//! for i in 0..100i64 {
//!     index.insert(
//!         format!("r:{}", i),
//!         Rect::point(vec![i as f64, i as f64]),
//!         i * 60,
//!     )?;
//! }
//!
//! let region = Rect::new(vec![0.0, 0.0], vec![9.0, 9.0])?;
//! let plan = index.plan(&Query::new().within(region).between(0, 600))?;
//! println!("{}", plan.explain());
//!
//! // The chosen plan never costs more than a plain full scan
//! assert!(plan.estimated_cost() > 0.0);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod combined;
pub mod engine;
pub mod error;
pub mod plan;
pub mod rtree;
pub mod stats;
pub mod store;
pub mod temporal;
pub mod types;

// Re-export core index types
pub use combined::CombinedIndex;
pub use error::{LocusError, Result};

/// Main index type alias
pub type Locus = CombinedIndex;

// Re-export the sub-indexes for direct use
pub use rtree::{Nearest, SpatialIndex};
pub use temporal::{TemporalIndex, TimeSeries};

// Re-export query, planning, and execution types
pub use engine::{ExecutionEngine, QueryResults};
pub use plan::{
    ExecutionPlan, PlannedStep, Planner, PlannerContext, Query, QueryShape, SpatialCriteria,
    SpatialShape, Step, Strategy, TemporalCriteria, TemporalShape,
};

// Re-export configuration and value types
pub use types::{IndexConfig, RecordId, Rect, Timestamp};

// Re-export statistics types
pub use stats::{StatsSnapshot, Statistics, StrategySnapshot};

// Re-export external collaborator interfaces
pub use builder::LocusBuilder;
pub use store::{MemoryStore, QueryObserver, RecordStore, StoreOp};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        IndexConfig, Locus, LocusBuilder, LocusError, Query, QueryResults, Rect, RecordId,
        Result, Timestamp,
    };
}
