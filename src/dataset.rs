//! Public facade: [`Dataset`], its [`Transaction`] handles and query results.
//!
//! A `Dataset` is a cheap, cloneable handle; every clone shares the same
//! catalog, transaction manager and storage, so it can be handed to as many
//! threads as needed. Every `begin` is paired with exactly one terminal
//! outcome: an explicit commit or abort, or an abort when the handle drops.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    TripleStoreError,
    catalog::{CatalogSnapshot, GraphCatalog},
    config::{BackendKind, DatasetConfig, WriterPolicy, open_dataset},
    index::{Scan, TripleIndex},
    intern::Interner,
    storage::{MemoryStorage, StorageBackend},
    triple::{Pattern, Triple, validate_graph_name, validate_triple},
    txn::{Change, TransactionManager, TxnId, TxnMode, TxnState, WriteSet},
};

pub(crate) struct DatasetInner {
    config: DatasetConfig,
    backend: BackendKind,
    catalog: GraphCatalog,
    manager: TransactionManager,
    interner: Interner,
    storage: Mutex<Option<Box<dyn StorageBackend>>>,
}

impl DatasetInner {
    fn ensure_open(&self) -> Result<(), TripleStoreError> {
        if self.manager.is_shut_down() {
            return Err(TripleStoreError::DatasetClosed);
        }
        Ok(())
    }
}

/// Handle to an open dataset.
#[derive(Clone)]
pub struct Dataset {
    inner: Arc<DatasetInner>,
}

impl Dataset {
    /// Opens (or creates) a SQLite-backed dataset at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TripleStoreError> {
        open_dataset(path, &DatasetConfig::sqlite())
    }

    /// Opens an empty dataset whose commits live only in this process.
    pub fn open_in_memory() -> Result<Self, TripleStoreError> {
        Self::with_storage(Box::new(MemoryStorage::new()), DatasetConfig::memory())
    }

    /// Opens a dataset over an already constructed backend, reloading its
    /// committed state.
    pub fn with_storage(
        mut storage: Box<dyn StorageBackend>,
        config: DatasetConfig,
    ) -> Result<Self, TripleStoreError> {
        let interner = Interner::new();
        let state = storage.load(&interner)?;
        let backend = storage.kind();
        info!(
            "opened {backend:?} dataset at version {} with {} graphs",
            state.version,
            state.graphs.len()
        );
        let inner = DatasetInner {
            backend,
            catalog: GraphCatalog::with_state(state.version, state.graphs),
            manager: TransactionManager::new(config.transactions.clone()),
            interner,
            storage: Mutex::new(Some(storage)),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> BackendKind {
        self.inner.backend
    }

    pub fn is_closed(&self) -> bool {
        self.inner.manager.is_shut_down()
    }

    /// Starts a transaction. `Read` never waits; `Write` fails or queues per
    /// the configured [`WriterPolicy`] while another writer is active.
    pub fn begin(&self, mode: TxnMode) -> Result<Transaction, TripleStoreError> {
        let id = self.inner.manager.begin(mode)?;
        let snapshot = self.inner.catalog.snapshot();
        Ok(Transaction {
            id,
            mode,
            state: TxnState::Active,
            writes: (mode == TxnMode::Write).then(WriteSet::new),
            snapshot,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn get_statements(
        &self,
        txn: &Transaction,
        graph: &str,
        pattern: &Pattern,
    ) -> Result<Statements, TripleStoreError> {
        self.check_owner(txn)?;
        txn.get_statements(graph, pattern)
    }

    pub fn add_statement(
        &self,
        txn: &mut Transaction,
        graph: &str,
        triple: &Triple,
    ) -> Result<bool, TripleStoreError> {
        self.check_owner(txn)?;
        txn.add_statement(graph, triple)
    }

    pub fn remove_statement(
        &self,
        txn: &mut Transaction,
        graph: &str,
        triple: &Triple,
    ) -> Result<bool, TripleStoreError> {
        self.check_owner(txn)?;
        txn.remove_statement(graph, triple)
    }

    pub fn commit(&self, txn: &mut Transaction) -> Result<u64, TripleStoreError> {
        self.check_owner(txn)?;
        txn.commit()
    }

    pub fn abort(&self, txn: &mut Transaction) -> Result<(), TripleStoreError> {
        self.check_owner(txn)?;
        txn.abort()
    }

    /// Aborts `txn` unless it already reached a terminal state. The handle
    /// is released even when the dataset is closed, which is then reported.
    pub fn end(&self, txn: &mut Transaction) -> Result<(), TripleStoreError> {
        self.check_owner(txn)?;
        txn.end();
        self.inner.ensure_open()
    }

    /// Runs `f` in a read transaction.
    pub fn read<T, F>(&self, f: F) -> Result<T, TripleStoreError>
    where
        F: FnOnce(&Transaction) -> Result<T, TripleStoreError>,
    {
        let mut txn = self.begin(TxnMode::Read)?;
        let value = f(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Runs `f` in a write transaction, committing on `Ok`. An `Err` (or a
    /// panic) aborts every change `f` made.
    pub fn write<T, F>(&self, f: F) -> Result<T, TripleStoreError>
    where
        F: FnOnce(&mut Transaction) -> Result<T, TripleStoreError>,
    {
        let mut txn = self.begin(TxnMode::Write)?;
        let value = f(&mut txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Adds every triple to `graph` in one write transaction and returns how
    /// many were new.
    pub fn load_statements<I>(&self, graph: &str, triples: I) -> Result<usize, TripleStoreError>
    where
        I: IntoIterator<Item = Triple>,
    {
        let added = self.write(|txn| {
            let mut added = 0;
            for triple in triples {
                if txn.add_statement(graph, &triple)? {
                    added += 1;
                }
            }
            Ok(added)
        })?;
        info!("loaded {added} new triples into {graph}");
        Ok(added)
    }

    pub fn graph_names(&self) -> Result<Vec<String>, TripleStoreError> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .catalog
            .snapshot()
            .graph_names()
            .map(str::to_string)
            .collect())
    }

    pub fn contains_graph(&self, name: &str) -> Result<bool, TripleStoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.catalog.exists(name))
    }

    /// Last committed version.
    pub fn version(&self) -> Result<u64, TripleStoreError> {
        self.inner.ensure_open()?;
        Ok(self.inner.catalog.version())
    }

    pub fn stats(&self) -> Result<DatasetStats, TripleStoreError> {
        self.inner.ensure_open()?;
        let snapshot = self.inner.catalog.snapshot();
        Ok(DatasetStats {
            backend: self.inner.backend,
            writer_policy: self.inner.manager.policy(),
            version: snapshot.version(),
            graphs: snapshot.graph_count(),
            triples: snapshot.triple_count(),
            interned_identifiers: self.inner.interner.len(),
            active_readers: self.inner.manager.active_readers(),
            writer_active: self.inner.manager.active_writer().is_some(),
        })
    }

    /// Releases the storage backend. Every later operation on this dataset,
    /// or on any clone of it, fails with [`TripleStoreError::DatasetClosed`].
    /// Transactions still open are aborted when they next commit or drop.
    pub fn close(&self) -> Result<(), TripleStoreError> {
        if !self.inner.manager.shutdown() {
            return Err(TripleStoreError::DatasetClosed);
        }
        let storage = self.inner.storage.lock().take();
        if let Some(mut storage) = storage {
            storage.close()?;
        }
        info!("dataset closed at version {}", self.inner.catalog.version());
        Ok(())
    }

    /// Reads stored counts under the storage lock, so no commit interleaves
    /// with the returned snapshot.
    pub(crate) fn persisted_counts(
        &self,
    ) -> Result<(Arc<CatalogSnapshot>, Option<BTreeMap<String, usize>>), TripleStoreError> {
        let mut storage = self.inner.storage.lock();
        let backend = storage.as_mut().ok_or(TripleStoreError::DatasetClosed)?;
        let counts = backend.persisted_counts()?;
        Ok((self.inner.catalog.snapshot(), counts))
    }

    fn check_owner(&self, txn: &Transaction) -> Result<(), TripleStoreError> {
        if !Arc::ptr_eq(&self.inner, &txn.inner) {
            return Err(TripleStoreError::no_active(format!(
                "transaction {} was not started by this dataset",
                txn.id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("backend", &self.inner.backend)
            .field("version", &self.inner.catalog.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Counters describing a dataset at one instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub backend: BackendKind,
    pub writer_policy: WriterPolicy,
    pub version: u64,
    pub graphs: usize,
    pub triples: usize,
    pub interned_identifiers: usize,
    pub active_readers: usize,
    pub writer_active: bool,
}

/// An in-flight unit of work.
///
/// Reads observe the snapshot captured at `begin`; a write transaction also
/// sees its own pending changes. Dropping an active handle aborts it.
pub struct Transaction {
    id: TxnId,
    mode: TxnMode,
    state: TxnState,
    snapshot: Arc<CatalogSnapshot>,
    writes: Option<WriteSet>,
    inner: Arc<DatasetInner>,
}

impl Transaction {
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Version of the snapshot this transaction reads from. After a write
    /// commit this is the version that commit left current.
    pub fn version(&self) -> u64 {
        self.snapshot.version()
    }

    /// Graphs visible to this transaction, including ones it has written to.
    pub fn graph_names(&self) -> Result<Vec<String>, TripleStoreError> {
        self.ensure_usable("list graphs in")?;
        let mut names: Vec<String> = self.snapshot.graph_names().map(str::to_string).collect();
        if let Some(writes) = &self.writes {
            names.extend(writes.touched_graphs().map(str::to_string));
            names.sort();
            names.dedup();
        }
        Ok(names)
    }

    /// Triples of `graph` matching `pattern`. An unknown graph is registered
    /// and reads as empty.
    pub fn get_statements(
        &self,
        graph: &str,
        pattern: &Pattern,
    ) -> Result<Statements, TripleStoreError> {
        self.ensure_usable("read from")?;
        validate_graph_name(graph)?;
        let index = self
            .writes
            .as_ref()
            .and_then(|writes| writes.graph(graph))
            .or_else(|| self.snapshot.graph(graph))
            .cloned()
            .unwrap_or_else(|| {
                self.inner.catalog.get_or_create(graph);
                self.inner.catalog.empty_index()
            });
        Ok(Statements {
            graph: graph.to_string(),
            pattern: pattern.clone(),
            index,
        })
    }

    /// Adds `triple` to `graph`; returns `false` if it was already present.
    pub fn add_statement(&mut self, graph: &str, triple: &Triple) -> Result<bool, TripleStoreError> {
        let inner = Arc::clone(&self.inner);
        let writes = self.writable("add to")?;
        validate_graph_name(graph)?;
        validate_triple(triple)?;
        let triple = inner.interner.intern_triple(triple);
        Ok(writes.insert(graph, triple, || inner.catalog.get_or_create(graph)))
    }

    /// Removes `triple` from `graph`; returns `false` if it was absent.
    pub fn remove_statement(
        &mut self,
        graph: &str,
        triple: &Triple,
    ) -> Result<bool, TripleStoreError> {
        let inner = Arc::clone(&self.inner);
        let writes = self.writable("remove from")?;
        validate_graph_name(graph)?;
        validate_triple(triple)?;
        Ok(writes.remove(graph, triple.clone(), || {
            inner.catalog.get_or_create(graph)
        }))
    }

    /// Makes every pending change visible atomically and returns the
    /// committed version. A read transaction returns its snapshot version.
    /// On failure the transaction ends up aborted and nothing is visible.
    pub fn commit(&mut self) -> Result<u64, TripleStoreError> {
        if self.inner.manager.is_shut_down() {
            self.end();
            return Err(TripleStoreError::DatasetClosed);
        }
        self.ensure_active("commit")?;
        if self.mode == TxnMode::Read {
            self.finish(TxnState::Committed);
            return Ok(self.snapshot.version());
        }

        let writes = self.writes.take().unwrap_or_default();
        let removed = writes
            .changes()
            .iter()
            .any(|change| matches!(change, Change::Remove { .. }));
        let result = {
            let mut storage = self.inner.storage.lock();
            match storage.as_mut() {
                Some(backend) => self.inner.manager.commit(
                    self.id,
                    writes,
                    &self.inner.catalog,
                    &mut **backend,
                ),
                None => Err(TripleStoreError::DatasetClosed),
            }
        };
        match result {
            Ok(version) => {
                self.snapshot = self.inner.catalog.snapshot();
                self.conclude(TxnState::Committed, removed);
                Ok(version)
            }
            Err(err) => {
                self.conclude(TxnState::Aborted, true);
                Err(err)
            }
        }
    }

    /// Discards pending changes. After `close()` the handle is still aborted
    /// but the call reports [`TripleStoreError::DatasetClosed`].
    pub fn abort(&mut self) -> Result<(), TripleStoreError> {
        if self.inner.manager.is_shut_down() {
            self.end();
            return Err(TripleStoreError::DatasetClosed);
        }
        self.ensure_active("abort")?;
        self.finish(TxnState::Aborted);
        Ok(())
    }

    /// Aborts unless already committed or aborted. Never fails.
    pub fn end(&mut self) {
        if self.state == TxnState::Active {
            self.finish(TxnState::Aborted);
        }
    }

    fn writable(&mut self, op: &str) -> Result<&mut WriteSet, TripleStoreError> {
        self.ensure_usable(op)?;
        let id = self.id;
        self.writes.as_mut().ok_or_else(|| {
            TripleStoreError::read_only(format!("cannot {op} a graph in read transaction {id}"))
        })
    }

    fn ensure_usable(&self, op: &str) -> Result<(), TripleStoreError> {
        self.inner.ensure_open()?;
        self.ensure_active(op)
    }

    fn ensure_active(&self, op: &str) -> Result<(), TripleStoreError> {
        if self.state.is_terminal() {
            return Err(TripleStoreError::stale(format!(
                "cannot {op} transaction {}: already {:?}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn finish(&mut self, state: TxnState) {
        let pending = self.writes.take().is_some_and(|writes| !writes.is_empty());
        self.conclude(state, pending);
    }

    /// Identifiers dropped by this transaction are pruned while it still
    /// holds the writer slot, so no concurrent `add_statement` can intern.
    fn conclude(&mut self, state: TxnState, prune: bool) {
        self.state = state;
        self.writes = None;
        if prune {
            let pruned = self.inner.interner.prune();
            if pruned > 0 {
                debug!("transaction {} pruned {pruned} identifiers", self.id);
            }
        }
        self.inner.manager.finish(self.id);
        debug!("transaction {} {:?}", self.id, state);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            debug!("transaction {} dropped while active", self.id);
            self.finish(TxnState::Aborted);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("version", &self.snapshot.version())
            .finish()
    }
}

/// Result of [`Transaction::get_statements`].
///
/// Holds the graph state it was produced from, so it stays valid after the
/// transaction ends and can be iterated any number of times with the same
/// result.
#[derive(Clone, Debug)]
pub struct Statements {
    graph: String,
    pattern: Pattern,
    index: Arc<TripleIndex>,
}

impl Statements {
    pub fn graph(&self) -> &str {
        &self.graph
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn iter(&self) -> Scan<'_> {
        self.index.scan(&self.pattern)
    }

    pub fn len(&self) -> usize {
        if self.pattern.is_wildcard() {
            return self.index.len();
        }
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn to_vec(&self) -> Vec<Triple> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a Statements {
    type Item = Triple;
    type IntoIter = Scan<'a>;

    fn into_iter(self) -> Scan<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(s, p, o)
    }

    #[test]
    fn test_write_transaction_reads_its_own_changes() {
        let dataset = Dataset::open_in_memory().unwrap();
        let mut txn = dataset.begin(TxnMode::Write).unwrap();
        txn.add_statement("g", &t("a", "p", "b")).unwrap();
        let seen = txn.get_statements("g", &Pattern::any()).unwrap();
        assert_eq!(seen.to_vec(), vec![t("a", "p", "b")]);
        txn.commit().unwrap();
    }

    #[test]
    fn test_statements_survive_later_writes_in_same_transaction() {
        let dataset = Dataset::open_in_memory().unwrap();
        let mut txn = dataset.begin(TxnMode::Write).unwrap();
        txn.add_statement("g", &t("a", "p", "b")).unwrap();
        let before = txn.get_statements("g", &Pattern::any()).unwrap();
        txn.add_statement("g", &t("a", "p", "c")).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(txn.get_statements("g", &Pattern::any()).unwrap().len(), 2);
    }

    #[test]
    fn test_drop_releases_writer_slot() {
        let dataset = Dataset::open_in_memory().unwrap();
        {
            let mut txn = dataset.begin(TxnMode::Write).unwrap();
            txn.add_statement("g", &t("a", "p", "b")).unwrap();
        }
        let stats = dataset.stats().unwrap();
        assert!(!stats.writer_active);
        assert_eq!(stats.triples, 0);
        assert!(dataset.begin(TxnMode::Write).is_ok());
    }

    #[test]
    fn test_interning_shares_identifier_storage() {
        let dataset = Dataset::open_in_memory().unwrap();
        dataset
            .load_statements("g", vec![t("a", "p", "b"), t("b", "p", "c")])
            .unwrap();
        let triples = dataset
            .read(|txn| Ok(txn.get_statements("g", &Pattern::any())?.to_vec()))
            .unwrap();
        assert!(triples[0].object().shares_storage(triples[1].subject()));
        assert_eq!(dataset.stats().unwrap().interned_identifiers, 4);
    }

    #[test]
    fn test_aborted_and_removed_identifiers_are_released() {
        let dataset = Dataset::open_in_memory().unwrap();
        for round in 0..100 {
            let mut txn = dataset.begin(TxnMode::Write).unwrap();
            txn.add_statement("g", &t(&format!("s{round}"), "p", "o")).unwrap();
            txn.abort().unwrap();
        }
        assert_eq!(dataset.stats().unwrap().interned_identifiers, 0);

        for round in 0..100 {
            {
                let mut txn = dataset.begin(TxnMode::Write).unwrap();
                txn.add_statement("g", &t(&format!("d{round}"), "p", "o")).unwrap();
            }
            let triple = t(&format!("s{round}"), "p", "o");
            dataset.load_statements("g", vec![triple.clone()]).unwrap();
            dataset.write(|txn| txn.remove_statement("g", &triple)).unwrap();
        }
        let stats = dataset.stats().unwrap();
        assert_eq!(stats.triples, 0);
        assert_eq!(stats.interned_identifiers, 0);
    }

    #[test]
    fn test_removal_keeps_identifiers_of_remaining_triples() {
        let dataset = Dataset::open_in_memory().unwrap();
        dataset
            .load_statements("g", vec![t("a", "p", "b"), t("b", "q", "c")])
            .unwrap();
        dataset
            .write(|txn| txn.remove_statement("g", &t("b", "q", "c")))
            .unwrap();
        assert_eq!(dataset.stats().unwrap().interned_identifiers, 3);
    }

    #[test]
    fn test_transaction_graph_names_include_pending_graphs() {
        let dataset = Dataset::open_in_memory().unwrap();
        dataset.load_statements("a", vec![t("s", "p", "o")]).unwrap();
        let mut txn = dataset.begin(TxnMode::Write).unwrap();
        txn.add_statement("b", &t("s", "p", "o")).unwrap();
        assert_eq!(txn.graph_names().unwrap(), vec!["a", "b"]);
    }
}
