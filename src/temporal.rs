//! Bucketed temporal index.
//!
//! Record identifiers are grouped into fixed-width time buckets keyed by
//! `floor(timestamp / bucket_width)`, with a reverse identifier→timestamp
//! map so removal finds its bucket without scanning. A record id lives in
//! exactly one bucket at any time, matching its reverse-map entry.

use crate::error::{LocusError, Result};
use crate::types::{RecordId, Timestamp};
use bytes::Bytes;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

/// Bucketed map from time ranges to record identifier sets.
///
/// # Examples
///
/// ```rust
/// use locus::TemporalIndex;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut index = TemporalIndex::new(3600)?;
/// index.insert("morning", 1000)?;
/// index.insert("evening", 70_000)?;
///
/// let early = index.query_range(0, 3600);
/// assert_eq!(early.len(), 1);
/// assert!(early.contains("morning".as_bytes()));
/// # Ok(())
/// # }
/// ```
pub struct TemporalIndex {
    bucket_width: Timestamp,
    buckets: BTreeMap<Timestamp, FxHashSet<RecordId>>,
    stamps: FxHashMap<RecordId, Timestamp>,
}

impl TemporalIndex {
    /// Create an empty index with the given bucket width.
    pub fn new(bucket_width: Timestamp) -> Result<Self> {
        if bucket_width < 1 {
            return Err(LocusError::CapacityViolation(format!(
                "bucket width {} must be at least 1",
                bucket_width
            )));
        }
        Ok(Self {
            bucket_width,
            buckets: BTreeMap::new(),
            stamps: FxHashMap::default(),
        })
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Configured bucket width.
    pub fn bucket_width(&self) -> Timestamp {
        self.bucket_width
    }

    /// Whether a record identifier is indexed.
    pub fn contains(&self, id: impl AsRef<[u8]>) -> bool {
        self.stamps.contains_key(id.as_ref())
    }

    /// Timestamp recorded for an identifier, if indexed.
    pub fn timestamp_of(&self, id: impl AsRef<[u8]>) -> Option<Timestamp> {
        self.stamps.get(id.as_ref()).copied()
    }

    /// Iterate over all (identifier, timestamp) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, Timestamp)> {
        self.stamps.iter().map(|(id, ts)| (id, *ts))
    }

    /// Earliest and latest recorded timestamps.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        let (first_key, first_set) = self.buckets.first_key_value()?;
        let (last_key, last_set) = self.buckets.last_key_value()?;
        let min = exact_bound(first_set, &self.stamps, *first_key, true);
        let max = exact_bound(last_set, &self.stamps, *last_key, false);
        Some((min, max))
    }

    /// Insert a record with its timestamp.
    pub fn insert(&mut self, id: impl AsRef<[u8]>, timestamp: Timestamp) -> Result<()> {
        let id = Bytes::copy_from_slice(id.as_ref());
        if self.stamps.contains_key(&id) {
            return Err(LocusError::DuplicateIdentifier);
        }
        let key = self.bucket_key(timestamp);
        self.buckets.entry(key).or_default().insert(id.clone());
        self.stamps.insert(id, timestamp);
        Ok(())
    }

    /// Remove a record by identifier.
    ///
    /// The bucket is located through the reverse map, never by scanning,
    /// and is destroyed when emptied.
    pub fn remove(&mut self, id: impl AsRef<[u8]>) -> Result<()> {
        let id = id.as_ref();
        let timestamp = self.stamps.remove(id).ok_or(LocusError::NotFound)?;
        let key = self.bucket_key(timestamp);
        let emptied = match self.buckets.get_mut(&key) {
            Some(bucket) => {
                bucket.remove(id);
                bucket.is_empty()
            }
            None => {
                return Err(LocusError::StructuralInconsistency(format!(
                    "reverse map points at missing bucket {}",
                    key
                )));
            }
        };
        if emptied {
            self.buckets.remove(&key);
        }
        Ok(())
    }

    /// All record identifiers whose timestamp lies in `[start, end]`.
    ///
    /// Every bucket intersecting the range is scanned; entries in the
    /// partial buckets at either end are filtered by exact timestamp.
    pub fn query_range(&self, start: Timestamp, end: Timestamp) -> FxHashSet<RecordId> {
        let mut out = FxHashSet::default();
        if start > end {
            return out;
        }
        let first = self.bucket_key(start);
        let last = self.bucket_key(end);
        for (key, bucket) in self.buckets.range(first..=last) {
            let boundary = *key == first || *key == last;
            for id in bucket {
                if boundary {
                    match self.stamps.get(id) {
                        Some(ts) if *ts >= start && *ts <= end => {
                            out.insert(id.clone());
                        }
                        _ => {}
                    }
                } else {
                    out.insert(id.clone());
                }
            }
        }
        out
    }

    /// All record identifiers whose recorded timestamp is at or before
    /// `timestamp` (snapshot semantics: one timestamp per identifier).
    pub fn state_at(&self, timestamp: Timestamp) -> FxHashSet<RecordId> {
        let mut out = FxHashSet::default();
        let last = self.bucket_key(timestamp);
        for (key, bucket) in self.buckets.range(..=last) {
            let boundary = *key == last;
            for id in bucket {
                if boundary {
                    match self.stamps.get(id) {
                        Some(ts) if *ts <= timestamp => {
                            out.insert(id.clone());
                        }
                        _ => {}
                    }
                } else {
                    out.insert(id.clone());
                }
            }
        }
        out
    }

    /// Lazy series of `(interval_start, ids)` windows covering
    /// `[start, end)` in `interval`-sized steps.
    ///
    /// A pure, restartable read: each window is computed on demand from
    /// bucket lookups, and iterating twice yields the same sequence.
    pub fn query_series(
        &self,
        start: Timestamp,
        end: Timestamp,
        interval: Timestamp,
    ) -> Result<TimeSeries<'_>> {
        if interval < 1 {
            return Err(LocusError::CapacityViolation(format!(
                "series interval {} must be at least 1",
                interval
            )));
        }
        Ok(TimeSeries {
            index: self,
            cursor: start,
            end,
            interval,
        })
    }

    fn bucket_key(&self, timestamp: Timestamp) -> Timestamp {
        timestamp.div_euclid(self.bucket_width)
    }
}

fn exact_bound(
    bucket: &FxHashSet<RecordId>,
    stamps: &FxHashMap<RecordId, Timestamp>,
    key: Timestamp,
    min: bool,
) -> Timestamp {
    let mut bound = None;
    for id in bucket {
        if let Some(ts) = stamps.get(id) {
            bound = Some(match bound {
                None => *ts,
                Some(b) if min => (*ts).min(b),
                Some(b) => (*ts).max(b),
            });
        }
    }
    bound.unwrap_or(key)
}

/// Restartable iterator over fixed-interval time windows.
///
/// Produced by [`TemporalIndex::query_series`]; yields one entry per
/// interval boundary until the end of the requested range.
pub struct TimeSeries<'a> {
    index: &'a TemporalIndex,
    cursor: Timestamp,
    end: Timestamp,
    interval: Timestamp,
}

impl Iterator for TimeSeries<'_> {
    type Item = (Timestamp, FxHashSet<RecordId>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let window_start = self.cursor;
        let window_end = window_start
            .saturating_add(self.interval)
            .min(self.end);
        self.cursor = window_end;
        let ids = self.index.query_range(window_start, window_end - 1);
        Some((window_start, ids))
    }
}
