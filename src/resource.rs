//! Ephemeral object handles backing result previews and downloads.
//!
//! A handle is issued per result by a [`ResourceTracker`] and must be released
//! when the result is discarded or replaced. `release()` is the explicit path;
//! `Drop` releases whatever was not released explicitly, so a handle can never
//! outlive its result.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct TrackerInner {
    next_id: AtomicU64,
    live: AtomicUsize,
}

/// Issues object handles and counts how many are still live.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    inner: Arc<TrackerInner>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a fresh handle.
    pub fn acquire(&self) -> ObjectHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.live.fetch_add(1, Ordering::SeqCst);
        debug!("Acquired object handle #{id}");
        ObjectHandle {
            id,
            tracker: Arc::clone(&self.inner),
            released: false,
        }
    }

    /// Handles acquired and not yet released.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }
}

/// Exclusively-owned reference to a result's in-memory payload.
pub struct ObjectHandle {
    id: u64,
    tracker: Arc<TrackerInner>,
    released: bool,
}

impl ObjectHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Opaque locator for preview/download, e.g. `object://7`.
    pub fn url(&self) -> String {
        format!("object://{}", self.id)
    }

    /// Release the handle now.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.live.fetch_sub(1, Ordering::SeqCst);
            debug!("Released object handle #{}", self.id);
        }
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}
