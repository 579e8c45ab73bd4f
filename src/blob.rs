//! In-memory blob store backing downloadable artifacts.
//!
//! A [`BlobHandle`] is an opaque, revocable reference into a [`BlobStore`].
//! Revoking frees the bytes immediately; reads through a revoked handle
//! return `None`. The orchestrator revokes the previous artifact whenever a
//! new episode starts or the state is reset, so a long session holds at most
//! one spreadsheet in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Revocable reference to bytes held by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobHandle {
    id: u64,
    len: usize,
}

impl BlobHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Shared store of live blobs. Cloning shares the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: AtomicU64,
    blobs: Mutex<HashMap<u64, Arc<[u8]>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `data` and return a handle to it.
    pub fn create(&self, data: Vec<u8>) -> BlobHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let len = data.len();
        self.blobs().insert(id, Arc::from(data));
        debug!("Created blob #{} ({} bytes)", id, len);
        BlobHandle { id, len }
    }

    /// Bytes behind `handle`, or `None` once revoked.
    pub fn read(&self, handle: &BlobHandle) -> Option<Arc<[u8]>> {
        self.blobs().get(&handle.id).cloned()
    }

    /// Release the bytes behind `handle`. Returns `false` if already released.
    pub fn revoke(&self, handle: &BlobHandle) -> bool {
        let removed = self.blobs().remove(&handle.id).is_some();
        if removed {
            debug!("Revoked blob #{} ({} bytes)", handle.id, handle.len);
        }
        removed
    }

    pub fn is_live(&self, handle: &BlobHandle) -> bool {
        self.blobs().contains_key(&handle.id)
    }

    /// Number of blobs not yet revoked.
    pub fn live_count(&self) -> usize {
        self.blobs().len()
    }

    /// Total bytes held by live blobs.
    pub fn live_bytes(&self) -> usize {
        self.blobs().values().map(|b| b.len()).sum()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<u64, Arc<[u8]>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .blobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
