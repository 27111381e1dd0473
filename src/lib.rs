//! Embeddable RDF triple store with snapshot-isolated transactions.
//!
//! A [`Dataset`] holds named graphs of `(subject, predicate, object)` triples.
//! Any number of read transactions run concurrently against immutable
//! snapshots while at most one write transaction is active; a commit becomes
//! visible atomically to every transaction that begins after it.
//!
//! ```rust
//! use triplestore::{Dataset, Pattern, Triple, TxnMode};
//!
//! let dataset = Dataset::open_in_memory()?;
//! let mut txn = dataset.begin(TxnMode::Write)?;
//! txn.add_statement("people", &Triple::new("alice", "knows", "bob"))?;
//! txn.commit()?;
//!
//! let reader = dataset.begin(TxnMode::Read)?;
//! let found = reader.get_statements("people", &Pattern::any().predicate("knows"))?;
//! assert_eq!(found.len(), 1);
//! # Ok::<(), triplestore::TripleStoreError>(())
//! ```
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod bench_utils;
pub mod catalog;
pub mod client;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod fault_injection;
pub mod index;
pub mod intern;
pub mod safety;
pub mod schema;
pub mod storage;
pub mod triple;
pub mod txn;

pub use crate::catalog::{CatalogSnapshot, GraphCatalog};
pub use crate::client::{CommandLineConfig, TripleClient};
pub use crate::config::{
    BackendKind, DatasetConfig, SqliteConfig, TransactionConfig, WriterPolicy, open_dataset,
};
pub use crate::dataset::{Dataset, DatasetStats, Statements, Transaction};
pub use crate::errors::TripleStoreError;
pub use crate::index::{IndexOrder, Scan, TripleIndex};
pub use crate::intern::Interner;
pub use crate::safety::{IntegrityReport, check_integrity};
pub use crate::storage::{MemoryStorage, SqliteStorage, StorageBackend};
pub use crate::triple::{Identifier, Pattern, Triple};
pub use crate::txn::{TransactionManager, TxnId, TxnMode, TxnState};
