//! Process-wide failure points on the commit path.
//!
//! A write commit passes two points: one before its change log reaches the
//! storage backend, and one inside the SQLite transaction after every
//! `rdf_triples` row is written. Arming a point makes the next commits fail
//! there with a retryable [`TripleStoreError::StorageIo`], so tests can check
//! that a failed commit publishes nothing and releases the writer slot.

use std::sync::OnceLock;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::TripleStoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Before a write transaction hands its changes to the storage backend.
    CommitBeforePersist,
    /// Inside the SQLite commit, after all rows are written but before the
    /// SQLite transaction is committed.
    SqliteBeforeFlush,
}

impl FaultPoint {
    fn stage(self) -> &'static str {
        match self {
            FaultPoint::CommitBeforePersist => "before persisting the change log",
            FaultPoint::SqliteBeforeFlush => "before committing the SQLite transaction",
        }
    }
}

/// Remaining injected failures per armed point. Disarmed points are absent.
fn armed() -> &'static Mutex<AHashMap<FaultPoint, usize>> {
    static ARMED: OnceLock<Mutex<AHashMap<FaultPoint, usize>>> = OnceLock::new();
    ARMED.get_or_init(|| Mutex::new(AHashMap::new()))
}

/// Disarms every point.
pub fn reset_faults() {
    armed().lock().clear();
}

/// Makes the next `failures` commits that reach `point` fail. Zero disarms it.
pub fn configure_fault(point: FaultPoint, failures: usize) {
    let mut armed = armed().lock();
    if failures == 0 {
        armed.remove(&point);
    } else {
        armed.insert(point, failures);
    }
}

/// Failures still pending at `point`.
pub fn pending_faults(point: FaultPoint) -> usize {
    armed().lock().get(&point).copied().unwrap_or(0)
}

pub(crate) fn check_fault(point: FaultPoint) -> Result<(), TripleStoreError> {
    let mut armed = armed().lock();
    let Some(remaining) = armed.get_mut(&point) else {
        return Ok(());
    };
    *remaining -= 1;
    if *remaining == 0 {
        armed.remove(&point);
    }
    Err(TripleStoreError::storage_io(format!(
        "commit failed {} (injected at {point:?})",
        point.stage()
    )))
}
