//! Storage backends for committed state.
//!
//! The in-memory indexes are always the query path. A backend only has to
//! reload committed state on open and durably apply each commit's change log;
//! [`crate::txn::TransactionManager::commit`] publishes a new snapshot only
//! after `persist` succeeded.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, info};
use rusqlite::{Connection, OpenFlags, params};

use crate::{
    TripleStoreError,
    config::{BackendKind, SqliteConfig},
    fault_injection::{self, FaultPoint},
    index::TripleIndex,
    intern::Interner,
    schema::ensure_schema,
    triple::Triple,
    txn::Change,
};

/// Committed state read back from a backend.
#[derive(Debug, Default)]
pub struct LoadedState {
    pub version: u64,
    pub graphs: BTreeMap<String, TripleIndex>,
}

pub trait StorageBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Reads every committed graph and the last committed version.
    fn load(&mut self, interner: &Interner) -> Result<LoadedState, TripleStoreError>;

    /// Atomically records `graphs` as existing, applies `changes` in order and
    /// stores `version`. Either all of it is durable or none of it is.
    fn persist(
        &mut self,
        version: u64,
        graphs: &[&str],
        changes: &[Change],
    ) -> Result<(), TripleStoreError>;

    /// Per-graph triple counts as stored, or `None` when nothing is stored.
    fn persisted_counts(&mut self) -> Result<Option<BTreeMap<String, usize>>, TripleStoreError> {
        Ok(None)
    }

    fn close(&mut self) -> Result<(), TripleStoreError> {
        Ok(())
    }
}

/// Backend that keeps nothing beyond the in-memory snapshots.
#[derive(Debug, Default)]
pub struct MemoryStorage;

impl MemoryStorage {
    pub fn new() -> Self {
        Self
    }
}

impl StorageBackend for MemoryStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn load(&mut self, _interner: &Interner) -> Result<LoadedState, TripleStoreError> {
        Ok(LoadedState::default())
    }

    fn persist(
        &mut self,
        _version: u64,
        _graphs: &[&str],
        _changes: &[Change],
    ) -> Result<(), TripleStoreError> {
        Ok(())
    }
}

pub struct SqliteStorage {
    conn: Option<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P, cfg: &SqliteConfig) -> Result<Self, TripleStoreError> {
        let path = path.as_ref();
        let flags = if cfg.create_if_missing {
            OpenFlags::default()
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            TripleStoreError::storage_io(format!("open {}: {e}", path.display()))
        })?;
        if let Some(capacity) = cfg.cache_size {
            conn.set_prepared_statement_cache_capacity(capacity);
        }
        apply_pragmas(&conn, cfg)?;
        ensure_schema(&conn)?;
        info!("opened sqlite storage at {}", path.display());
        Ok(Self { conn: Some(conn) })
    }

    pub fn open_in_memory() -> Result<Self, TripleStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&mut self) -> Result<&mut Connection, TripleStoreError> {
        self.conn.as_mut().ok_or(TripleStoreError::DatasetClosed)
    }
}

impl StorageBackend for SqliteStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::SQLite
    }

    fn load(&mut self, interner: &Interner) -> Result<LoadedState, TripleStoreError> {
        let conn = self.connection()?;
        let version: i64 = conn
            .query_row("SELECT value FROM rdf_meta WHERE key='version'", [], |row| {
                row.get(0)
            })
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;

        let mut graphs = BTreeMap::new();
        let mut stmt = conn
            .prepare("SELECT name FROM rdf_graphs ORDER BY name")
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        for name in names {
            let name = name.map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            graphs.insert(name, TripleIndex::new());
        }

        let mut stmt = conn
            .prepare(
                "SELECT graph, subject, predicate, object FROM rdf_triples \
                 ORDER BY graph, subject, predicate, object",
            )
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        let mut loaded = 0usize;
        while let Some(row) = rows
            .next()
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?
        {
            let (graph, subject, predicate, object) =
                row_to_quad(row).map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            let triple = Triple::new(
                interner.intern_str(&subject),
                interner.intern_str(&predicate),
                interner.intern_str(&object),
            );
            graphs.entry(graph).or_default().add(&triple);
            loaded += 1;
        }
        debug!(
            "loaded {loaded} triples in {} graphs at version {version}",
            graphs.len()
        );
        Ok(LoadedState {
            version: version as u64,
            graphs,
        })
    }

    fn persist(
        &mut self,
        version: u64,
        graphs: &[&str],
        changes: &[Change],
    ) -> Result<(), TripleStoreError> {
        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        {
            let mut register = tx
                .prepare_cached("INSERT OR IGNORE INTO rdf_graphs(name) VALUES(?1)")
                .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            for graph in graphs {
                register
                    .execute(params![graph])
                    .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            }

            let mut insert = tx
                .prepare_cached(
                    "INSERT OR IGNORE INTO rdf_triples(graph, subject, predicate, object) \
                     VALUES(?1, ?2, ?3, ?4)",
                )
                .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            let mut delete = tx
                .prepare_cached(
                    "DELETE FROM rdf_triples \
                     WHERE graph=?1 AND subject=?2 AND predicate=?3 AND object=?4",
                )
                .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            for change in changes {
                let stmt = match change {
                    Change::Insert { .. } => &mut insert,
                    Change::Remove { .. } => &mut delete,
                };
                let triple = change.triple();
                stmt.execute(params![
                    change.graph(),
                    triple.subject().as_str(),
                    triple.predicate().as_str(),
                    triple.object().as_str(),
                ])
                .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            }

            tx.execute(
                "UPDATE rdf_meta SET value=?1 WHERE key='version'",
                params![version as i64],
            )
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        }
        fault_injection::check_fault(FaultPoint::SqliteBeforeFlush)?;
        tx.commit()
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))
    }

    fn persisted_counts(&mut self) -> Result<Option<BTreeMap<String, usize>>, TripleStoreError> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT g.name, COUNT(t.subject) FROM rdf_graphs g \
                 LEFT JOIN rdf_triples t ON t.graph = g.name \
                 GROUP BY g.name ORDER BY g.name",
            )
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (name, count) = row.map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
            counts.insert(name, count as usize);
        }
        Ok(Some(counts))
    }

    fn close(&mut self) -> Result<(), TripleStoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| TripleStoreError::storage_io(e.to_string()))?;
        }
        Ok(())
    }
}

fn row_to_quad(
    row: &rusqlite::Row<'_>,
) -> Result<(String, String, String, String), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn apply_pragmas(conn: &Connection, cfg: &SqliteConfig) -> Result<(), TripleStoreError> {
    for (key, value) in &cfg.pragma_settings {
        let pragma_sql = format!("PRAGMA {key} = {value}");
        match conn.execute(&pragma_sql, []) {
            Ok(_) => {}
            // journal_mode and friends report the new value as a row
            Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(TripleStoreError::storage_io(format!(
                    "PRAGMA {key} = {value}: {e}"
                )));
            }
        }
    }
    Ok(())
}
