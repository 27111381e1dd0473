//! Configuration for storage backend selection and transaction behaviour.
//!
//! A [`DatasetConfig`] combines the backend choice with backend-specific and
//! transaction options; [`open_dataset`] turns it into a [`Dataset`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TripleStoreError;
use crate::dataset::Dataset;
use crate::storage::{MemoryStorage, SqliteStorage, StorageBackend};

/// Backend selection for committed state.
///
/// # Examples
///
/// ```rust
/// use triplestore::{BackendKind, DatasetConfig};
///
/// let cfg = DatasetConfig::new(BackendKind::Memory);
/// assert_eq!(cfg.backend, BackendKind::Memory);
/// assert_eq!(DatasetConfig::default().backend, BackendKind::SQLite);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Process-local only. A commit is visible to every later transaction but
    /// does not survive a restart.
    Memory,

    /// SQLite file storage. A commit survives process restart once
    /// `commit` has returned.
    #[default]
    SQLite,
}

/// How a second `begin(Write)` behaves while a writer is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriterPolicy {
    /// Reject immediately with [`TripleStoreError::Concurrency`].
    #[default]
    FailFast,
    /// Block until the active writer commits or aborts.
    Queue,
}

impl WriterPolicy {
    pub fn parse(value: &str) -> Result<Self, TripleStoreError> {
        match value {
            "fail-fast" | "fail_fast" => Ok(WriterPolicy::FailFast),
            "queue" => Ok(WriterPolicy::Queue),
            other => Err(TripleStoreError::invalid_input(format!(
                "unknown writer policy {other}"
            ))),
        }
    }
}

/// Transaction scheduling options.
///
/// ```rust
/// use triplestore::{TransactionConfig, WriterPolicy};
/// let config = TransactionConfig::default();
/// assert_eq!(config.writer_policy, WriterPolicy::FailFast);
/// assert!(config.queue_timeout.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TransactionConfig {
    /// **Default:** [`WriterPolicy::FailFast`]
    pub writer_policy: WriterPolicy,

    /// Upper bound on how long a queued writer waits before failing with
    /// [`TripleStoreError::Concurrency`]. `None` waits indefinitely. Ignored
    /// under [`WriterPolicy::FailFast`].
    pub queue_timeout: Option<Duration>,
}

/// Options for the SQLite backend.
///
/// ```rust
/// use triplestore::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(config.create_if_missing);
/// assert!(config.cache_size.is_none());
/// assert!(config.pragma_settings.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Create the database file when it does not exist.
    ///
    /// **Default:** `true`. With `false`, opening a missing file fails with
    /// [`TripleStoreError::StorageIo`].
    pub create_if_missing: bool,

    /// Capacity of the prepared statement cache.
    ///
    /// **Default:** `None` (rusqlite's default)
    pub cache_size: Option<usize>,

    /// Extra PRAGMA settings applied right after the connection opens, e.g.
    /// `journal_mode = WAL` or `synchronous = NORMAL`.
    ///
    /// ```rust
    /// use triplestore::DatasetConfig;
    ///
    /// let mut cfg = DatasetConfig::sqlite();
    /// cfg.sqlite.pragma_settings.insert("journal_mode".to_string(), "WAL".to_string());
    /// cfg.sqlite.pragma_settings.insert("synchronous".to_string(), "NORMAL".to_string());
    /// ```
    pub pragma_settings: HashMap<String, String>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            cache_size: None,
            pragma_settings: HashMap::new(),
        }
    }
}

/// Complete configuration for opening a dataset.
#[derive(Clone, Debug, Default)]
pub struct DatasetConfig {
    /// **Default:** [`BackendKind::SQLite`]
    pub backend: BackendKind,

    /// Only read when `backend` is [`BackendKind::SQLite`].
    pub sqlite: SqliteConfig,

    pub transactions: TransactionConfig,
}

impl DatasetConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn memory() -> Self {
        Self::new(BackendKind::Memory)
    }

    pub fn sqlite() -> Self {
        Self::new(BackendKind::SQLite)
    }

    pub fn with_writer_policy(mut self, policy: WriterPolicy) -> Self {
        self.transactions.writer_policy = policy;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.transactions.queue_timeout = Some(timeout);
        self
    }
}

/// Open a dataset with the specified configuration.
///
/// `path` is ignored for [`BackendKind::Memory`].
///
/// ```rust,no_run
/// use triplestore::{DatasetConfig, open_dataset};
///
/// let dataset = open_dataset("triples.db", &DatasetConfig::sqlite())?;
/// # Ok::<(), triplestore::TripleStoreError>(())
/// ```
pub fn open_dataset<P: AsRef<Path>>(
    path: P,
    cfg: &DatasetConfig,
) -> Result<Dataset, TripleStoreError> {
    let storage: Box<dyn StorageBackend> = match cfg.backend {
        BackendKind::Memory => Box::new(MemoryStorage::new()),
        BackendKind::SQLite => Box::new(SqliteStorage::open(path, &cfg.sqlite)?),
    };
    Dataset::with_storage(storage, cfg.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dataset_config_default() {
        let cfg = DatasetConfig::default();
        assert_eq!(cfg.backend, BackendKind::SQLite);
        assert!(cfg.sqlite.create_if_missing);
        assert!(cfg.sqlite.cache_size.is_none());
        assert_eq!(cfg.transactions.writer_policy, WriterPolicy::FailFast);
    }

    #[test]
    fn test_builder_helpers() {
        let cfg = DatasetConfig::memory()
            .with_writer_policy(WriterPolicy::Queue)
            .with_queue_timeout(Duration::from_millis(50));
        assert_eq!(cfg.backend, BackendKind::Memory);
        assert_eq!(cfg.transactions.writer_policy, WriterPolicy::Queue);
        assert_eq!(cfg.transactions.queue_timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_writer_policy_parse() {
        assert_eq!(WriterPolicy::parse("queue").unwrap(), WriterPolicy::Queue);
        assert_eq!(WriterPolicy::parse("fail-fast").unwrap(), WriterPolicy::FailFast);
        assert!(WriterPolicy::parse("block").is_err());
    }

    #[test]
    fn test_open_dataset_sqlite_creates_file() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let dataset = open_dataset(&db_path, &DatasetConfig::sqlite());
        assert!(dataset.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_dataset_missing_file_without_create() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("missing.db");

        let mut cfg = DatasetConfig::sqlite();
        cfg.sqlite.create_if_missing = false;
        let err = open_dataset(&db_path, &cfg).unwrap_err();
        assert!(matches!(err, TripleStoreError::StorageIo(_)));
    }

    #[test]
    fn test_sqlite_config_pragmas() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test_pragmas.db");

        let mut cfg = DatasetConfig::sqlite();
        cfg.sqlite
            .pragma_settings
            .insert("journal_mode".to_string(), "WAL".to_string());
        cfg.sqlite
            .pragma_settings
            .insert("synchronous".to_string(), "NORMAL".to_string());
        cfg.sqlite.cache_size = Some(64);

        assert!(open_dataset(&db_path, &cfg).is_ok());
    }
}
