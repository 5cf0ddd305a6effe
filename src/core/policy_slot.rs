//! Versioned publication of policy-parameter snapshots.
//!
//! The learner publishes an immutable snapshot after each update; actors
//! read the current one at the start of every segment. Reads are cheap
//! (`Arc` clone under a read lock) and never block publication for long.
//!
//! The version number is how staleness becomes observable: a segment
//! collected under version `v` may be consumed when the learner is already
//! at `v + k`, which is exactly what the off-policy correction compensates
//! for.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::model::Policy;

/// Shared, versioned policy snapshot.
pub struct PolicySlot {
    current: RwLock<Arc<dyn Policy>>,
    version: AtomicU64,
    published_count: AtomicUsize,
    snapshot_count: AtomicUsize,
}

impl PolicySlot {
    /// Create a slot holding the initial parameters at version 1.
    pub fn new(initial: Arc<dyn Policy>) -> Self {
        Self {
            current: RwLock::new(initial),
            version: AtomicU64::new(1),
            published_count: AtomicUsize::new(1),
            snapshot_count: AtomicUsize::new(0),
        }
    }

    /// Publish new parameters, returning the new version.
    ///
    /// Called by the learner inside its critical section, so concurrent
    /// learner threads never interleave partial publications.
    pub fn publish(&self, policy: Arc<dyn Policy>) -> u64 {
        let mut guard = self.current.write();
        *guard = policy;
        self.published_count.fetch_add(1, Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::Release) + 1
    }

    /// Read the current snapshot and its version.
    pub fn snapshot(&self) -> (Arc<dyn Policy>, u64) {
        let guard = self.current.read();
        let policy = Arc::clone(&guard);
        let version = self.version.load(Ordering::Acquire);
        self.snapshot_count.fetch_add(1, Ordering::Relaxed);
        (policy, version)
    }

    /// Current version without taking a snapshot.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Instrumentation: (publications, snapshots taken).
    pub fn stats(&self) -> (usize, usize) {
        (
            self.published_count.load(Ordering::Relaxed),
            self.snapshot_count.load(Ordering::Relaxed),
        )
    }
}

/// Shared handle to a policy slot.
pub type SharedPolicySlot = Arc<PolicySlot>;
