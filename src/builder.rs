//! Builder for combined index instances.
//!
//! Wires tuning parameters and the optional external collaborators
//! together before construction, validating the configuration once at
//! build time.

use crate::combined::CombinedIndex;
use crate::error::Result;
use crate::store::{QueryObserver, RecordStore};
use crate::types::{IndexConfig, Timestamp};
use std::sync::Arc;

/// Builder for [`CombinedIndex`] instances with custom configuration.
///
/// # Examples
///
/// ```rust
/// use locus::LocusBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let index = LocusBuilder::new()
///     .leaf_capacity(32)
///     .bucket_width(60)
///     .build()?;
/// assert!(index.is_empty()?);
/// # Ok(())
/// # }
/// ```
///
/// Attaching a record store enables identifier validation at insert time
/// and payload predicates at query time:
///
/// ```rust
/// use locus::{LocusBuilder, MemoryStore, Rect};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// store.put(b"sensor:1", b"{\"kind\":\"lidar\"}")?;
///
/// let index = LocusBuilder::new().record_store(store).build()?;
/// index.insert("sensor:1", Rect::point(vec![4.0, 2.0]), 1_700_000_000)?;
/// assert!(index.insert("unknown", Rect::point(vec![0.0, 0.0]), 0).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct LocusBuilder {
    config: IndexConfig,
    store: Option<Arc<dyn RecordStore>>,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl LocusBuilder {
    /// Start from default configuration.
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
            store: None,
            observer: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Maximum entries per spatial tree node.
    pub fn leaf_capacity(mut self, capacity: usize) -> Self {
        self.config.leaf_capacity = capacity;
        self
    }

    /// Minimum fill fraction for non-root tree nodes.
    pub fn min_fill_factor(mut self, factor: f64) -> Self {
        self.config.min_fill_factor = factor;
        self
    }

    /// Temporal bucket width.
    pub fn bucket_width(mut self, width: Timestamp) -> Self {
        self.config.bucket_width = width;
        self
    }

    /// Batch size at which rebuilds switch to bulk loading.
    pub fn bulk_load_threshold(mut self, threshold: usize) -> Self {
        self.config.bulk_load_threshold = threshold;
        self
    }

    /// Attach an external record store.
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a post-execution query observer.
    pub fn observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and build the index.
    pub fn build(self) -> Result<CombinedIndex> {
        CombinedIndex::from_parts(self.config, self.store, self.observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocusError;

    #[test]
    fn test_builder_applies_config() {
        let index = LocusBuilder::new()
            .leaf_capacity(8)
            .min_fill_factor(0.3)
            .bucket_width(60)
            .bulk_load_threshold(10)
            .build()
            .unwrap();
        let config = index.config().unwrap();
        assert_eq!(config.leaf_capacity, 8);
        assert_eq!(config.bucket_width, 60);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(matches!(
            LocusBuilder::new().leaf_capacity(0).build(),
            Err(LocusError::CapacityViolation(_))
        ));
    }
}
