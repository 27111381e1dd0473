//! Transaction bookkeeping: single-writer exclusion, the active-transaction
//! registry, pending write sets and the commit protocol.
//!
//! State machine per transaction: `Active -> {Committed, Aborted}`. Terminal
//! states have no outgoing transitions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use ahash::AHashMap;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::{
    TripleStoreError,
    catalog::GraphCatalog,
    config::{TransactionConfig, WriterPolicy},
    fault_injection::{self, FaultPoint},
    index::TripleIndex,
    storage::StorageBackend,
    triple::Triple,
};

pub type TxnId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnMode {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
}

impl TxnState {
    pub fn is_terminal(self) -> bool {
        self != TxnState::Active
    }
}

/// One effective mutation, in the order it was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Insert { graph: String, triple: Triple },
    Remove { graph: String, triple: Triple },
}

impl Change {
    pub fn graph(&self) -> &str {
        match self {
            Change::Insert { graph, .. } | Change::Remove { graph, .. } => graph,
        }
    }

    pub fn triple(&self) -> &Triple {
        match self {
            Change::Insert { triple, .. } | Change::Remove { triple, .. } => triple,
        }
    }
}

/// Pending state of a write transaction.
///
/// Touched graphs are held as copy-on-write working copies so the writer reads
/// its own changes; the change log records only mutations that altered a graph.
#[derive(Debug, Default)]
pub struct WriteSet {
    graphs: BTreeMap<String, Arc<TripleIndex>>,
    changes: Vec<Change>,
}

impl WriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn touched_graphs(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn graph(&self, name: &str) -> Option<&Arc<TripleIndex>> {
        self.graphs.get(name)
    }

    pub fn insert<F>(&mut self, graph: &str, triple: Triple, base: F) -> bool
    where
        F: FnOnce() -> Arc<TripleIndex>,
    {
        let added = self.working_copy(graph, base).add(&triple);
        if added {
            self.changes.push(Change::Insert {
                graph: graph.to_string(),
                triple,
            });
        }
        added
    }

    pub fn remove<F>(&mut self, graph: &str, triple: Triple, base: F) -> bool
    where
        F: FnOnce() -> Arc<TripleIndex>,
    {
        let removed = self.working_copy(graph, base).remove(&triple);
        if removed {
            self.changes.push(Change::Remove {
                graph: graph.to_string(),
                triple,
            });
        }
        removed
    }

    fn working_copy<F>(&mut self, graph: &str, base: F) -> &mut TripleIndex
    where
        F: FnOnce() -> Arc<TripleIndex>,
    {
        let slot = self.graphs.entry(graph.to_string()).or_insert_with(base);
        Arc::make_mut(slot)
    }

    fn into_parts(self) -> (BTreeMap<String, Arc<TripleIndex>>, Vec<Change>) {
        (self.graphs, self.changes)
    }
}

/// Serialises writers and tracks every live transaction.
pub struct TransactionManager {
    config: TransactionConfig,
    writer: Mutex<Option<TxnId>>,
    writer_released: Condvar,
    active: Mutex<AHashMap<TxnId, TxnMode>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl TransactionManager {
    pub fn new(config: TransactionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            writer_released: Condvar::new(),
            active: Mutex::new(AHashMap::new()),
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> WriterPolicy {
        self.config.writer_policy
    }

    /// Registers a new transaction. A write transaction also takes the writer
    /// slot, failing or waiting per [`WriterPolicy`] while another holds it.
    pub fn begin(&self, mode: TxnMode) -> Result<TxnId, TripleStoreError> {
        self.ensure_running()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if mode == TxnMode::Write {
            self.acquire_writer(id)?;
        }
        self.active.lock().insert(id, mode);
        debug!("begin {mode:?} transaction {id}");
        Ok(id)
    }

    /// Applies a write set: persists it, then publishes the new snapshot.
    /// Returns the committed version. On error nothing becomes visible.
    pub fn commit(
        &self,
        id: TxnId,
        writes: WriteSet,
        catalog: &GraphCatalog,
        storage: &mut dyn StorageBackend,
    ) -> Result<u64, TripleStoreError> {
        if *self.writer.lock() != Some(id) {
            return Err(TripleStoreError::stale(format!(
                "transaction {id} does not hold the writer slot"
            )));
        }
        if writes.is_empty() {
            return Ok(catalog.version());
        }
        let version = catalog.version() + 1;
        let (graphs, changes) = writes.into_parts();
        let names: Vec<&str> = graphs.keys().map(String::as_str).collect();

        let persisted = fault_injection::check_fault(FaultPoint::CommitBeforePersist)
            .and_then(|()| storage.persist(version, &names, &changes));
        if let Err(err) = persisted {
            warn!("commit of transaction {id} failed: {err}");
            return Err(err);
        }

        catalog.publish(version, graphs);
        debug!(
            "transaction {id} committed version {version} ({} changes)",
            changes.len()
        );
        Ok(version)
    }

    /// Releases everything `id` holds. Safe to call more than once.
    pub fn finish(&self, id: TxnId) {
        let mode = self.active.lock().remove(&id);
        if mode == Some(TxnMode::Write) {
            let mut writer = self.writer.lock();
            if *writer == Some(id) {
                *writer = None;
                self.writer_released.notify_one();
            }
        }
    }

    pub fn is_active(&self, id: TxnId) -> bool {
        self.active.lock().contains_key(&id)
    }

    pub fn active_writer(&self) -> Option<TxnId> {
        *self.writer.lock()
    }

    pub fn active_readers(&self) -> usize {
        self.active
            .lock()
            .values()
            .filter(|mode| **mode == TxnMode::Read)
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Stops accepting transactions and wakes queued writers.
    /// Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _writer = self.writer.lock();
        self.writer_released.notify_all();
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), TripleStoreError> {
        if self.is_shut_down() {
            return Err(TripleStoreError::DatasetClosed);
        }
        Ok(())
    }

    fn acquire_writer(&self, id: TxnId) -> Result<(), TripleStoreError> {
        let deadline = self.config.queue_timeout.map(|timeout| Instant::now() + timeout);
        let mut writer = self.writer.lock();
        while let Some(holder) = *writer {
            self.ensure_running()?;
            match (self.config.writer_policy, deadline) {
                (WriterPolicy::FailFast, _) => {
                    debug!("rejecting writer {id}: transaction {holder} is active");
                    return Err(TripleStoreError::concurrency(format!(
                        "write transaction {holder} is already active"
                    )));
                }
                (WriterPolicy::Queue, None) => self.writer_released.wait(&mut writer),
                (WriterPolicy::Queue, Some(deadline)) => {
                    if self
                        .writer_released
                        .wait_until(&mut writer, deadline)
                        .timed_out()
                        && writer.is_some()
                    {
                        return Err(TripleStoreError::concurrency(format!(
                            "timed out waiting for write transaction {holder}"
                        )));
                    }
                }
            }
        }
        self.ensure_running()?;
        *writer = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    fn manager(policy: WriterPolicy) -> TransactionManager {
        TransactionManager::new(TransactionConfig {
            writer_policy: policy,
            queue_timeout: Some(Duration::from_millis(20)),
        })
    }

    #[test]
    fn test_second_writer_fails_fast() {
        let manager = manager(WriterPolicy::FailFast);
        let first = manager.begin(TxnMode::Write).unwrap();
        let err = manager.begin(TxnMode::Write).unwrap_err();
        assert!(matches!(err, TripleStoreError::Concurrency(_)));
        manager.finish(first);
        assert!(manager.begin(TxnMode::Write).is_ok());
    }

    #[test]
    fn test_readers_never_wait_for_writer() {
        let manager = manager(WriterPolicy::FailFast);
        let _writer = manager.begin(TxnMode::Write).unwrap();
        let r1 = manager.begin(TxnMode::Read).unwrap();
        let r2 = manager.begin(TxnMode::Read).unwrap();
        assert_ne!(r1, r2);
        assert_eq!(manager.active_readers(), 2);
        assert_eq!(manager.active_count(), 3);
    }

    #[test]
    fn test_queue_times_out() {
        let manager = manager(WriterPolicy::Queue);
        let holder = manager.begin(TxnMode::Write).unwrap();
        let err = manager.begin(TxnMode::Write).unwrap_err();
        assert!(matches!(err, TripleStoreError::Concurrency(_)));
        assert_eq!(manager.active_writer(), Some(holder));
    }

    #[test]
    fn test_finish_is_idempotent() {
        let manager = manager(WriterPolicy::FailFast);
        let id = manager.begin(TxnMode::Write).unwrap();
        manager.finish(id);
        manager.finish(id);
        assert!(!manager.is_active(id));
        assert_eq!(manager.active_writer(), None);
    }

    #[test]
    fn test_shutdown_rejects_new_transactions() {
        let manager = manager(WriterPolicy::FailFast);
        assert!(manager.shutdown());
        assert!(!manager.shutdown());
        assert!(matches!(
            manager.begin(TxnMode::Read),
            Err(TripleStoreError::DatasetClosed)
        ));
    }

    #[test]
    fn test_commit_requires_writer_slot() {
        let manager = manager(WriterPolicy::FailFast);
        let catalog = GraphCatalog::new();
        let mut storage = MemoryStorage::new();
        let reader = manager.begin(TxnMode::Read).unwrap();
        let err = manager
            .commit(reader, WriteSet::new(), &catalog, &mut storage)
            .unwrap_err();
        assert!(matches!(err, TripleStoreError::StaleTransaction(_)));
    }

    #[test]
    fn test_commit_publishes_new_version() {
        let manager = manager(WriterPolicy::FailFast);
        let catalog = GraphCatalog::new();
        let mut storage = MemoryStorage::new();
        let id = manager.begin(TxnMode::Write).unwrap();

        let mut writes = WriteSet::new();
        assert!(writes.insert("g", Triple::new("a", "p", "b"), || catalog.get_or_create("g")));
        assert!(!writes.insert("g", Triple::new("a", "p", "b"), || catalog.get_or_create("g")));
        assert_eq!(writes.changes().len(), 1);

        let version = manager.commit(id, writes, &catalog, &mut storage).unwrap();
        assert_eq!(version, 1);
        assert_eq!(catalog.snapshot().triple_count(), 1);
    }

    #[test]
    fn test_empty_write_set_keeps_version() {
        let manager = manager(WriterPolicy::FailFast);
        let catalog = GraphCatalog::new();
        let mut storage = MemoryStorage::new();
        let id = manager.begin(TxnMode::Write).unwrap();
        let version = manager
            .commit(id, WriteSet::new(), &catalog, &mut storage)
            .unwrap();
        assert_eq!(version, 0);
    }

    #[test]
    fn test_working_copy_does_not_touch_committed_index() {
        let catalog = GraphCatalog::new();
        let committed = catalog.get_or_create("g");
        let mut writes = WriteSet::new();
        writes.insert("g", Triple::new("a", "p", "b"), || Arc::clone(&committed));
        assert!(committed.is_empty());
        assert_eq!(writes.graph("g").unwrap().len(), 1);
        assert_eq!(writes.touched_graphs().collect::<Vec<_>>(), vec!["g"]);
    }
}
