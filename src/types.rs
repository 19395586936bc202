use crate::error::{LocusError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Opaque record identifier, owned by the external record store.
///
/// The index holds only identifiers, never record payloads.
pub type RecordId = Bytes;

/// Timestamp in epoch seconds (or any finer monotonic integer unit).
pub type Timestamp = i64;

/// An n-dimensional axis-aligned rectangle.
///
/// Rectangles are the unit of spatial indexing: points are stored as
/// degenerate rectangles where `min == max`. At least two dimensions are
/// required, and every rectangle in one index must share the same
/// dimensionality.
///
/// # Examples
///
/// ```rust
/// use locus::Rect;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let area = Rect::new(vec![0.0, 0.0], vec![10.0, 5.0])?;
/// assert_eq!(area.dimensions(), 2);
/// assert!(area.contains_point(&[3.0, 4.0]));
///
/// let point = Rect::point(vec![3.0, 4.0]);
/// assert!(area.contains_rect(&point));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    /// Minimum coordinates for each dimension
    pub min: SmallVec<[f64; 4]>,
    /// Maximum coordinates for each dimension
    pub max: SmallVec<[f64; 4]>,
}

impl Rect {
    /// Create a rectangle from per-axis minimum and maximum coordinates.
    ///
    /// Fails with [`LocusError::InvalidGeometry`] if the vectors differ in
    /// length, are empty, contain a non-finite value, or `min > max` on
    /// any axis.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        if min.is_empty() {
            return Err(LocusError::InvalidGeometry(
                "rectangle has no dimensions".to_string(),
            ));
        }
        if min.len() != max.len() {
            return Err(LocusError::InvalidGeometry(format!(
                "min has {} dimensions but max has {}",
                min.len(),
                max.len()
            )));
        }
        for (axis, (lo, hi)) in min.iter().zip(max.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(LocusError::InvalidGeometry(format!(
                    "non-finite coordinate on axis {}",
                    axis
                )));
            }
            if lo > hi {
                return Err(LocusError::InvalidGeometry(format!(
                    "min {} exceeds max {} on axis {}",
                    lo, hi, axis
                )));
            }
        }

        Ok(Self {
            min: min.into(),
            max: max.into(),
        })
    }

    /// Create a degenerate rectangle covering a single point.
    pub fn point(coords: Vec<f64>) -> Self {
        Self {
            min: coords.clone().into(),
            max: coords.into(),
        }
    }

    /// Number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.min.len()
    }

    /// Hyper-volume of the rectangle (product of per-axis extents).
    pub fn area(&self) -> f64 {
        self.min
            .iter()
            .zip(self.max.iter())
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    /// Smallest rectangle enclosing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let min = self
            .min
            .iter()
            .zip(other.min.iter())
            .map(|(a, b)| a.min(*b))
            .collect();
        let max = self
            .max
            .iter()
            .zip(other.max.iter())
            .map(|(a, b)| a.max(*b))
            .collect();
        Rect { min, max }
    }

    /// Area growth needed for this rectangle to also enclose `other`.
    pub fn enlargement(&self, other: &Rect) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Whether the two rectangles overlap (shared boundaries count).
    pub fn intersects(&self, other: &Rect) -> bool {
        if self.dimensions() != other.dimensions() {
            return false;
        }
        for i in 0..self.dimensions() {
            if self.max[i] < other.min[i] || self.min[i] > other.max[i] {
                return false;
            }
        }
        true
    }

    /// Whether `other` lies entirely within this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        if self.dimensions() != other.dimensions() {
            return false;
        }
        for i in 0..self.dimensions() {
            if other.min[i] < self.min[i] || other.max[i] > self.max[i] {
                return false;
            }
        }
        true
    }

    /// Whether a point lies within this rectangle (boundaries inclusive).
    pub fn contains_point(&self, point: &[f64]) -> bool {
        if point.len() != self.dimensions() {
            return false;
        }
        for (i, &p) in point.iter().enumerate() {
            if p < self.min[i] || p > self.max[i] {
                return false;
            }
        }
        true
    }

    /// Euclidean distance from a point to the nearest edge of the
    /// rectangle, zero if the point is inside.
    pub fn distance_to_point(&self, point: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (i, &p) in point.iter().enumerate().take(self.dimensions()) {
            let d = if p < self.min[i] {
                self.min[i] - p
            } else if p > self.max[i] {
                p - self.max[i]
            } else {
                0.0
            };
            sum += d * d;
        }
        sum.sqrt()
    }

    /// Center coordinate along one axis.
    pub fn center(&self, axis: usize) -> f64 {
        (self.min[axis] + self.max[axis]) * 0.5
    }

    /// Area of the overlap with `other`, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f64 {
        if !self.intersects(other) {
            return 0.0;
        }
        let mut area = 1.0;
        for i in 0..self.dimensions() {
            let lo = self.min[i].max(other.min[i]);
            let hi = self.max[i].min(other.max[i]);
            area *= hi - lo;
        }
        area
    }
}

/// Tuning parameters for index construction.
///
/// Validated when an index is built; configurations that cannot produce a
/// legal tree are rejected with [`LocusError::CapacityViolation`].
///
/// # Examples
///
/// ```rust
/// use locus::IndexConfig;
///
/// let config = IndexConfig::default()
///     .with_leaf_capacity(32)
///     .with_bucket_width(60);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum entries per spatial tree node
    pub leaf_capacity: usize,

    /// Minimum fraction of capacity a non-root node must hold
    pub min_fill_factor: f64,

    /// Width of a temporal bucket, in timestamp units
    pub bucket_width: Timestamp,

    /// Batch size at or above which rebuilds use bulk loading
    pub bulk_load_threshold: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: 16,
            min_fill_factor: 0.4,
            bucket_width: 3600,
            bulk_load_threshold: 1000,
        }
    }
}

impl IndexConfig {
    /// Set the maximum number of entries per spatial tree node.
    pub fn with_leaf_capacity(mut self, capacity: usize) -> Self {
        self.leaf_capacity = capacity;
        self
    }

    /// Set the minimum fill fraction for non-root tree nodes.
    pub fn with_min_fill_factor(mut self, factor: f64) -> Self {
        self.min_fill_factor = factor;
        self
    }

    /// Set the temporal bucket width.
    pub fn with_bucket_width(mut self, width: Timestamp) -> Self {
        self.bucket_width = width;
        self
    }

    /// Set the batch size at which rebuilds switch to bulk loading.
    pub fn with_bulk_load_threshold(mut self, threshold: usize) -> Self {
        self.bulk_load_threshold = threshold;
        self
    }

    /// Minimum entry count per non-root node implied by the fill factor.
    pub fn min_fill(&self) -> usize {
        ((self.leaf_capacity as f64 * self.min_fill_factor).floor() as usize).max(1)
    }

    /// Check that these parameters can produce a legal tree.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity < 2 {
            return Err(LocusError::CapacityViolation(format!(
                "leaf capacity {} is below the minimum of 2",
                self.leaf_capacity
            )));
        }
        if !(self.min_fill_factor > 0.0 && self.min_fill_factor <= 0.5) {
            return Err(LocusError::CapacityViolation(format!(
                "min fill factor {} must lie in (0, 0.5]; a split of an \
                 overflowing node could not satisfy both halves otherwise",
                self.min_fill_factor
            )));
        }
        if self.bucket_width < 1 {
            return Err(LocusError::CapacityViolation(format!(
                "bucket width {} must be at least 1",
                self.bucket_width
            )));
        }
        if self.bulk_load_threshold < 1 {
            return Err(LocusError::CapacityViolation(
                "bulk load threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
