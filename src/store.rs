//! External collaborator interfaces.
//!
//! The index never stores record payloads; it talks to an external record
//! store for identifier validation at insert time and payload fetches
//! during predicate filtering, and emits post-execution events to an
//! optional observer (cache/prefetch layers build access-pattern
//! predictions from them; they do not call back in).

use crate::error::{LocusError, Result};
use crate::plan::QueryShape;
use crate::types::RecordId;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use std::sync::RwLock;

/// Storage operation for batch processing
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Put a payload under an identifier
    Put { id: RecordId, payload: Bytes },
    /// Delete an identifier
    Delete { id: RecordId },
}

/// External record store collaborator.
///
/// Implementations own the payload bytes and their durability; the index
/// only reads through this trait.
pub trait RecordStore: Send + Sync {
    /// Fetch the payload for an identifier.
    fn get(&self, id: &[u8]) -> Result<Option<Bytes>>;

    /// Insert or replace the payload for an identifier.
    fn put(&self, id: &[u8], payload: &[u8]) -> Result<()>;

    /// Delete an identifier and its payload.
    fn delete(&self, id: &[u8]) -> Result<()>;

    /// Whether an identifier exists.
    fn contains(&self, id: &[u8]) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Apply a batch of operations atomically.
    fn batch(&self, ops: &[StoreOp]) -> Result<()>;
}

/// Observer of executed queries.
///
/// Receives `(query shape, touched ids)` after each successful execution,
/// outside the index's structural lock.
pub trait QueryObserver: Send + Sync {
    /// Called once per completed query execution.
    fn query_executed(&self, shape: &QueryShape, touched: &[RecordId]);
}

/// In-memory [`RecordStore`] for tests and embedders without their own
/// backing store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<FxHashMap<RecordId, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub fn len(&self) -> usize {
        match self.data.read() {
            Ok(data) => data.len(),
            Err(_) => 0,
        }
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &[u8]) -> Result<Option<Bytes>> {
        let data = self.data.read().map_err(|_| LocusError::Lock)?;
        Ok(data.get(id).cloned())
    }

    fn put(&self, id: &[u8], payload: &[u8]) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| LocusError::Lock)?;
        data.insert(
            Bytes::copy_from_slice(id),
            Bytes::copy_from_slice(payload),
        );
        Ok(())
    }

    fn delete(&self, id: &[u8]) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| LocusError::Lock)?;
        data.remove(id);
        Ok(())
    }

    fn batch(&self, ops: &[StoreOp]) -> Result<()> {
        let mut data = self
            .data
            .write()
            .map_err(|_| LocusError::Lock)?;
        for op in ops {
            match op {
                StoreOp::Put { id, payload } => {
                    data.insert(id.clone(), payload.clone());
                }
                StoreOp::Delete { id } => {
                    data.remove(id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put(b"a", b"payload").unwrap();
        assert_eq!(store.get(b"a").unwrap().as_deref(), Some(&b"payload"[..]));
        assert!(store.contains(b"a").unwrap());
        store.delete(b"a").unwrap();
        assert!(!store.contains(b"a").unwrap());
    }

    #[test]
    fn test_memory_store_batch() {
        let store = MemoryStore::new();
        store
            .batch(&[
                StoreOp::Put {
                    id: Bytes::from_static(b"a"),
                    payload: Bytes::from_static(b"1"),
                },
                StoreOp::Put {
                    id: Bytes::from_static(b"b"),
                    payload: Bytes::from_static(b"2"),
                },
                StoreOp::Delete {
                    id: Bytes::from_static(b"a"),
                },
            ])
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains(b"b").unwrap());
    }
}
