use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::TripleStoreError;

pub const SCHEMA_VERSION: i64 = 1;

pub fn ensure_schema(conn: &Connection) -> Result<(), TripleStoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS rdf_graphs (
            name      TEXT PRIMARY KEY NOT NULL
        );
        CREATE TABLE IF NOT EXISTS rdf_triples (
            graph     TEXT NOT NULL,
            subject   TEXT NOT NULL,
            predicate TEXT NOT NULL,
            object    TEXT NOT NULL,
            PRIMARY KEY (graph, subject, predicate, object)
        ) WITHOUT ROWID;
        CREATE TABLE IF NOT EXISTS rdf_meta (
            key       TEXT PRIMARY KEY NOT NULL,
            value     INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_triples_object ON rdf_triples(graph, object);
        INSERT OR IGNORE INTO rdf_meta(key, value) VALUES('version', 0);
        "#,
    )
    .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;

    let stored: Option<i64> = conn
        .query_row(
            "SELECT value FROM rdf_meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
    match stored {
        None => {
            conn.execute(
                "INSERT INTO rdf_meta(key, value) VALUES('schema_version', ?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(|e| TripleStoreError::storage_io(e.to_string()))?;
        }
        Some(version) if version > SCHEMA_VERSION => {
            return Err(TripleStoreError::storage_io(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        Some(_) => {}
    }
    Ok(())
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, TripleStoreError> {
    conn.query_row(
        "SELECT value FROM rdf_meta WHERE key='schema_version'",
        [],
        |row| row.get(0),
    )
    .map_err(|e| TripleStoreError::storage_io(e.to_string()))
}
