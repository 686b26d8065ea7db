//! Forward-only migration sequence (spec §6.4). There is presently one migration: it creates
//! the five tables from §3 and the indexes the spec calls out as required for acceptable
//! performance on large repositories.

use rusqlite::Connection;

use crate::error::Result;

const MIGRATIONS: &[&str] = &[MIGRATION_0001_INITIAL_SCHEMA];

const MIGRATION_0001_INITIAL_SCHEMA: &str = r#"
CREATE TABLE roots (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE objects (
    id                INTEGER PRIMARY KEY,
    root_id           INTEGER NOT NULL REFERENCES roots(id) ON DELETE CASCADE,
    object_id         TEXT NOT NULL,
    storage_path      TEXT NOT NULL,
    version_padding   INTEGER NOT NULL,
    digest_algorithm  TEXT NOT NULL,
    inventory_digest  TEXT NOT NULL,
    indexed_at        INTEGER NOT NULL,
    UNIQUE (root_id, object_id),
    UNIQUE (root_id, storage_path)
);

CREATE INDEX idx_objects_indexed_at ON objects (indexed_at);
CREATE INDEX idx_objects_inventory_digest ON objects (inventory_digest);

CREATE TABLE content_files (
    id           INTEGER PRIMARY KEY,
    object_id    INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
    content_path TEXT NOT NULL,
    digest       TEXT NOT NULL,
    size         INTEGER NOT NULL DEFAULT -1,
    UNIQUE (object_id, content_path)
);

CREATE INDEX idx_content_files_object_digest ON content_files (object_id, digest);

CREATE TABLE versions (
    id           INTEGER PRIMARY KEY,
    object_id    INTEGER NOT NULL REFERENCES objects(id) ON DELETE CASCADE,
    version_num  INTEGER NOT NULL,
    state_digest TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    user_name    TEXT,
    user_address TEXT,
    message      TEXT,
    UNIQUE (object_id, version_num)
);

CREATE TABLE version_files (
    id              INTEGER PRIMARY KEY,
    version_id      INTEGER NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
    path            TEXT NOT NULL,
    content_file_id INTEGER REFERENCES content_files(id) ON DELETE SET NULL,
    deleted         INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_version_files_version_id ON version_files (version_id);
CREATE INDEX idx_version_files_path ON version_files (path);
CREATE INDEX idx_version_files_path_version_id ON version_files (path, version_id);
CREATE INDEX idx_version_files_content_file_id ON version_files (content_file_id);
"#;

/// Applies every migration the connection hasn't seen yet, tracked via `user_version`. Forward
/// only: there is no down-migration path, matching the spec's "migrations are a forward-only
/// sequence".
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = current as usize;

    for (i, migration) in MIGRATIONS.iter().enumerate().skip(current) {
        conn.execute_batch(migration)?;
        conn.pragma_update(None, "user_version", (i + 1) as i64)?;
    }

    Ok(())
}
