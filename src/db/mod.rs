//! The Index Store (spec §4.2): relational persistence for the five entities in §3, exposed as
//! the query/write operations the Sync Controller, Diff Computer, and Access Service compose.
//! Built on `rusqlite` + `r2d2`/`r2d2_sqlite` -- the spec's configuration section (§6.5) names
//! "database URI (file path or in-memory form)", classic SQLite phrasing, and no repo in the
//! retrieval pack runs a heavier embedded/client-server database for a similarly-scoped job.

mod schema;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::digest_state::compute_state_digest;
use crate::error::{IndexError, Result};
use crate::ocfl::{DigestAlgorithm, VersionNum};

/// Sentinel stored in `content_files.size` for "unknown"; surfaced to callers as `size = 0,
/// has_size = false` rather than a negative number (spec §4.2).
const SIZE_UNKNOWN: i64 = -1;

const OBJECT_BRIEF_COLUMNS: &str = "
  o.id AS id,
  o.object_id AS object_id,
  o.storage_path AS storage_path,
  o.version_padding AS version_padding,
  o.digest_algorithm AS digest_algorithm,
  o.inventory_digest AS inventory_digest,
  o.indexed_at AS indexed_at,
  (SELECT MAX(version_num) FROM versions WHERE object_id = o.id) AS head,
  (SELECT MIN(created_at) FROM versions WHERE object_id = o.id) AS created_at,
  (SELECT MAX(created_at) FROM versions WHERE object_id = o.id) AS updated_at
FROM objects o
JOIN roots r ON r.id = o.root_id";

/// A summary row joining `objects` with a window aggregate over its `versions` (spec §4.2:
/// "ObjectBrief by (root, id)").
#[derive(Debug, Clone)]
pub struct ObjectBrief {
    pub(crate) id: i64,
    pub root: String,
    pub object_id: String,
    pub storage_path: String,
    pub version_padding: u32,
    pub digest_algorithm: DigestAlgorithm,
    pub inventory_digest: String,
    pub indexed_at: i64,
    pub head: VersionNum,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct VersionSummary {
    pub version_num: VersionNum,
    pub state_digest: String,
    pub created_at: DateTime<Local>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
}

/// One row from the central "list version files with directory scoping" query (spec §4.2):
/// the live (or tombstoned) row for a path at the greatest version number not exceeding the
/// caller's ceiling.
#[derive(Debug, Clone)]
pub struct VersionFileRow {
    pub path: String,
    pub deleted: bool,
    pub content_path: Option<String>,
    pub digest: Option<String>,
    /// `None` means size is not yet known (the sentinel), not that the file is empty.
    pub size: Option<u64>,
    pub version_num: VersionNum,
    pub created_at: DateTime<Local>,
}

/// The full set of data the OCFL collaborator produces for one object (spec §6.2), shaped for
/// `SetObject` to write in a single transaction.
#[derive(Debug, Clone)]
pub struct NewObject {
    pub object_id: String,
    pub storage_path: String,
    pub version_padding: u32,
    pub digest_algorithm: DigestAlgorithm,
    pub inventory_digest: String,
    /// (content path, digest) pairs; a digest may appear more than once.
    pub manifest: Vec<(String, String)>,
    /// Ascending by version number, 1..=head with no gaps.
    pub versions: Vec<NewVersion>,
}

#[derive(Debug, Clone)]
pub struct NewVersion {
    pub version_num: VersionNum,
    /// The version's full live `path -> digest` mapping (not a delta -- the Index store
    /// computes the delta against the previous version itself).
    pub state: Vec<(String, String)>,
    pub created_at: DateTime<Local>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
}

pub struct IndexStore {
    pool: Pool<SqliteConnectionManager>,
}

impl IndexStore {
    /// Opens (and migrates) the index database at `database_uri`. `:memory:` is treated
    /// specially: in-memory SQLite databases are private per-connection, so the pool is capped
    /// at a single connection to keep every caller looking at the same database. This is
    /// documented here rather than in `DESIGN.md` alone since it governs `StatConcurrency`-style
    /// expectations: a `:memory:` store serializes all index writes/reads onto one connection.
    pub fn open(database_uri: &str) -> Result<Self> {
        let is_memory = database_uri == ":memory:";

        let manager = if is_memory {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(database_uri)
        };
        let manager = manager.with_init(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            if !is_memory {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(if is_memory { 1 } else { 8 })
            .build(manager)?;

        {
            let conn = pool.get()?;
            schema::migrate(&conn)?;
        }

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn get_object_brief(&self, root: &str, object_id: &str) -> Result<Option<ObjectBrief>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} WHERE r.name = ?1 AND o.object_id = ?2",
            OBJECT_BRIEF_COLUMNS
        );
        conn.query_row(&sql, params![root, object_id], |row| {
            Self::row_to_brief(root, row)
        })
        .optional()
        .map_err(Into::into)
    }

    /// Symmetric lookup by storage path, used by `IndexRoot` (spec §4.2).
    pub fn get_object_brief_by_path(
        &self,
        root: &str,
        storage_path: &str,
    ) -> Result<Option<ObjectBrief>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} WHERE r.name = ?1 AND o.storage_path = ?2",
            OBJECT_BRIEF_COLUMNS
        );
        conn.query_row(&sql, params![root, storage_path], |row| {
            Self::row_to_brief(root, row)
        })
        .optional()
        .map_err(Into::into)
    }

    fn row_to_brief(root: &str, row: &rusqlite::Row) -> rusqlite::Result<ObjectBrief> {
        let algorithm_str: String = row.get("digest_algorithm")?;
        Ok(ObjectBrief {
            id: row.get("id")?,
            root: root.to_string(),
            object_id: row.get("object_id")?,
            storage_path: row.get("storage_path")?,
            version_padding: row.get("version_padding")?,
            digest_algorithm: algorithm_str
                .parse()
                .expect("digest algorithm persisted by SetObject is always valid"),
            inventory_digest: row.get("inventory_digest")?,
            indexed_at: row.get("indexed_at")?,
            head: VersionNum::with_width(row.get("head")?, row.get("version_padding")?),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Bumps `indexed_at` without touching anything else (the soft-fresh / unchanged-sidecar
    /// path of the sync protocol, spec §4.3 step 4).
    pub fn touch_object(&self, object_db_id: i64, indexed_at: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE objects SET indexed_at = ?1 WHERE id = ?2",
            params![indexed_at, object_db_id],
        )?;
        Ok(())
    }

    pub fn unset_object(&self, root: &str, object_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM objects WHERE root_id = (SELECT id FROM roots WHERE name = ?1) \
             AND object_id = ?2",
            params![root, object_id],
        )?;
        Ok(())
    }

    pub fn unset_object_by_path(&self, root: &str, storage_path: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM objects WHERE root_id = (SELECT id FROM roots WHERE name = ?1) \
             AND storage_path = ?2",
            params![root, storage_path],
        )?;
        Ok(())
    }

    /// Upserts the object row, its content files, and its versions/version-files in one
    /// transaction (spec §4.2 "Writes go through a transaction"). Returns the resulting brief.
    pub fn set_object(
        &self,
        root: &str,
        new_object: &NewObject,
        indexed_at: i64,
    ) -> Result<ObjectBrief> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let root_id = Self::ensure_root(&tx, root)?;
        let object_db_id = Self::upsert_object(&tx, root_id, new_object, indexed_at)?;
        Self::upsert_content_files(&tx, object_db_id, &new_object.manifest)?;
        Self::rewrite_versions(&tx, object_db_id, &new_object.versions)?;

        tx.commit()?;

        self.get_object_brief(root, &new_object.object_id)?
            .ok_or_else(|| {
                IndexError::Conflict(format!(
                    "object {} vanished during indexing",
                    new_object.object_id
                ))
            })
    }

    fn ensure_root(tx: &Transaction, name: &str) -> Result<i64> {
        tx.execute("INSERT OR IGNORE INTO roots(name) VALUES (?1)", params![name])?;
        let id: i64 = tx.query_row(
            "SELECT id FROM roots WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn upsert_object(
        tx: &Transaction,
        root_id: i64,
        new_object: &NewObject,
        indexed_at: i64,
    ) -> Result<i64> {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM objects WHERE root_id = ?1 AND object_id = ?2",
                params![root_id, new_object.object_id],
                |row| row.get(0),
            )
            .optional()?;

        let algorithm = new_object.digest_algorithm.to_string();

        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE objects SET storage_path = ?1, version_padding = ?2, \
                     digest_algorithm = ?3, inventory_digest = ?4, indexed_at = ?5 WHERE id = ?6",
                    params![
                        new_object.storage_path,
                        new_object.version_padding,
                        algorithm,
                        new_object.inventory_digest,
                        indexed_at,
                        id
                    ],
                )?;
                Ok(id)
            }
            None => {
                tx.execute(
                    "INSERT INTO objects(root_id, object_id, storage_path, version_padding, \
                     digest_algorithm, inventory_digest, indexed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        root_id,
                        new_object.object_id,
                        new_object.storage_path,
                        new_object.version_padding,
                        algorithm,
                        new_object.inventory_digest,
                        indexed_at
                    ],
                )?;
                Ok(tx.last_insert_rowid())
            }
        }
    }

    fn upsert_content_files(
        tx: &Transaction,
        object_db_id: i64,
        manifest: &[(String, String)],
    ) -> Result<()> {
        let mut existing_paths: HashSet<String> = HashSet::new();
        {
            let mut stmt =
                tx.prepare("SELECT content_path FROM content_files WHERE object_id = ?1")?;
            let rows = stmt.query_map(params![object_db_id], |row| row.get::<_, String>(0))?;
            for row in rows {
                existing_paths.insert(row?);
            }
        }

        let mut new_paths: HashSet<&str> = HashSet::with_capacity(manifest.len());
        for (path, digest) in manifest {
            new_paths.insert(path.as_str());
            tx.execute(
                "INSERT INTO content_files(object_id, content_path, digest, size) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(object_id, content_path) DO UPDATE SET digest = excluded.digest",
                params![object_db_id, path, digest, SIZE_UNKNOWN],
            )?;
        }

        for stale in existing_paths.iter().filter(|p| !new_paths.contains(p.as_str())) {
            tx.execute(
                "DELETE FROM content_files WHERE object_id = ?1 AND content_path = ?2",
                params![object_db_id, stale],
            )?;
        }

        Ok(())
    }

    fn content_file_id_for_digest(
        tx: &Transaction,
        object_db_id: i64,
        digest: &str,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = tx.query_row(
            "SELECT MIN(id) FROM content_files WHERE object_id = ?1 AND digest = ?2",
            params![object_db_id, digest],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Rewrites version rows 1..head and, for every version whose state digest changed, its
    /// version-file delta against the previous version (spec §4.2 incremental storage policy).
    fn rewrite_versions(
        tx: &Transaction,
        object_db_id: i64,
        versions: &[NewVersion],
    ) -> Result<()> {
        let head = versions.last().map(|v| v.version_num.number).unwrap_or(0);
        tx.execute(
            "DELETE FROM versions WHERE object_id = ?1 AND version_num > ?2",
            params![object_db_id, head],
        )?;

        let mut prev_state: HashMap<String, String> = HashMap::new();

        for version in versions {
            let digest = compute_state_digest(
                version.state.iter().map(|(p, d)| (p.as_str(), d.as_str())),
            )?;

            let existing: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, state_digest FROM versions WHERE object_id = ?1 AND version_num = ?2",
                    params![object_db_id, version.version_num.number],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let unchanged = matches!(&existing, Some((_, existing_digest)) if *existing_digest == digest);

            let version_db_id = match existing {
                Some((id, _)) if unchanged => id,
                Some((id, _)) => {
                    tx.execute(
                        "UPDATE versions SET state_digest = ?1, created_at = ?2, user_name = ?3, \
                         user_address = ?4, message = ?5 WHERE id = ?6",
                        params![
                            digest,
                            version.created_at,
                            version.user_name,
                            version.user_address,
                            version.message,
                            id
                        ],
                    )?;
                    tx.execute("DELETE FROM version_files WHERE version_id = ?1", params![id])?;
                    id
                }
                None => {
                    tx.execute(
                        "INSERT INTO versions(object_id, version_num, state_digest, created_at, \
                         user_name, user_address, message) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            object_db_id,
                            version.version_num.number,
                            digest,
                            version.created_at,
                            version.user_name,
                            version.user_address,
                            version.message
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            if !unchanged {
                let new_state: HashMap<&str, &str> = version
                    .state
                    .iter()
                    .map(|(p, d)| (p.as_str(), d.as_str()))
                    .collect();

                for (path, digest_val) in &new_state {
                    let changed = prev_state.get(*path).map(|d| d.as_str()) != Some(*digest_val);
                    if changed {
                        let content_file_id =
                            Self::content_file_id_for_digest(tx, object_db_id, digest_val)?;
                        tx.execute(
                            "INSERT INTO version_files(version_id, path, content_file_id, deleted) \
                             VALUES (?1, ?2, ?3, 0)",
                            params![version_db_id, path, content_file_id],
                        )?;
                    }
                }

                for path in prev_state.keys() {
                    if !new_state.contains_key(path.as_str()) {
                        tx.execute(
                            "INSERT INTO version_files(version_id, path, content_file_id, deleted) \
                             VALUES (?1, ?2, NULL, 1)",
                            params![version_db_id, path],
                        )?;
                    }
                }
            }

            prev_state = version
                .state
                .iter()
                .map(|(p, d)| (p.clone(), d.clone()))
                .collect();
        }

        Ok(())
    }

    pub fn list_versions(&self, object_db_id: i64, padding: u32) -> Result<Vec<VersionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT version_num, state_digest, created_at, user_name, user_address, message \
             FROM versions WHERE object_id = ?1 ORDER BY version_num ASC",
        )?;
        let rows = stmt.query_map(params![object_db_id], |row| {
            Ok(VersionSummary {
                version_num: VersionNum::with_width(row.get(0)?, padding),
                state_digest: row.get(1)?,
                created_at: row.get(2)?,
                user_name: row.get(3)?,
                user_address: row.get(4)?,
                message: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_version(
        &self,
        object_db_id: i64,
        version_num: u32,
        padding: u32,
    ) -> Result<Option<VersionSummary>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT version_num, state_digest, created_at, user_name, user_address, message \
             FROM versions WHERE object_id = ?1 AND version_num = ?2",
            params![object_db_id, version_num],
            |row| {
                Ok(VersionSummary {
                    version_num: VersionNum::with_width(row.get(0)?, padding),
                    state_digest: row.get(1)?,
                    created_at: row.get(2)?,
                    user_name: row.get(3)?,
                    user_address: row.get(4)?,
                    message: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// The central query (spec §4.2): every logical path beginning with `dir/` (or the whole
    /// tree when `dir` is empty), at the row from the greatest version number <= `max_v` that
    /// modified it. Powers `ReadVersionDir` and, with `dir = ""`, full version-state reads.
    pub fn list_version_files(
        &self,
        object_db_id: i64,
        max_v: u32,
        dir: &str,
        padding: u32,
    ) -> Result<Vec<VersionFileRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT path, deleted, content_path, digest, size, version_num, created_at FROM (
                 SELECT
                   vf.path AS path,
                   vf.deleted AS deleted,
                   cf.content_path AS content_path,
                   cf.digest AS digest,
                   COALESCE(cf.size, -1) AS size,
                   v.version_num AS version_num,
                   v.created_at AS created_at,
                   ROW_NUMBER() OVER (
                     PARTITION BY vf.path ORDER BY v.version_num DESC, vf.deleted ASC
                   ) AS rn
                 FROM version_files vf
                 JOIN versions v ON v.id = vf.version_id
                 LEFT JOIN content_files cf ON cf.id = vf.content_file_id
                 WHERE v.object_id = ?1 AND v.version_num <= ?2
                   AND (?3 = '' OR vf.path LIKE ?3 || '/%')
             ) ranked
             WHERE rn = 1
             ORDER BY path ASC, deleted ASC",
        )?;

        let rows = stmt.query_map(params![object_db_id, max_v, dir], |row| {
            let size: i64 = row.get("size")?;
            Ok(VersionFileRow {
                path: row.get("path")?,
                deleted: row.get::<_, i64>("deleted")? != 0,
                content_path: row.get("content_path")?,
                digest: row.get("digest")?,
                size: if size < 0 { None } else { Some(size as u64) },
                version_num: VersionNum::with_width(row.get("version_num")?, padding),
                created_at: row.get("created_at")?,
            })
        })?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Exact-path lookup for `StatVersionFile`/`OpenVersionFile`: the row from the greatest
    /// version <= `max_v` that modified exactly `path` (live or tombstoned).
    pub fn get_version_file(
        &self,
        object_db_id: i64,
        max_v: u32,
        path: &str,
        padding: u32,
    ) -> Result<Option<VersionFileRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT path, deleted, content_path, digest, size, version_num, created_at FROM (
                 SELECT
                   vf.path AS path,
                   vf.deleted AS deleted,
                   cf.content_path AS content_path,
                   cf.digest AS digest,
                   COALESCE(cf.size, -1) AS size,
                   v.version_num AS version_num,
                   v.created_at AS created_at,
                   ROW_NUMBER() OVER (
                     PARTITION BY vf.path ORDER BY v.version_num DESC, vf.deleted ASC
                   ) AS rn
                 FROM version_files vf
                 JOIN versions v ON v.id = vf.version_id
                 LEFT JOIN content_files cf ON cf.id = vf.content_file_id
                 WHERE v.object_id = ?1 AND v.version_num <= ?2 AND vf.path = ?3
             ) ranked
             WHERE rn = 1",
            params![object_db_id, max_v, path],
            |row| {
                let size: i64 = row.get("size")?;
                Ok(VersionFileRow {
                    path: row.get("path")?,
                    deleted: row.get::<_, i64>("deleted")? != 0,
                    content_path: row.get("content_path")?,
                    digest: row.get("digest")?,
                    size: if size < 0 { None } else { Some(size as u64) },
                    version_num: VersionNum::with_width(row.get("version_num")?, padding),
                    created_at: row.get("created_at")?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    /// Digest-keyed set of content files still missing a size (spec §4.4), one representative
    /// content path per digest since the physical bytes are identical.
    pub fn list_missing_sizes(&self, object_db_id: i64) -> Result<Vec<(String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT digest, MIN(content_path) FROM content_files \
             WHERE object_id = ?1 AND size < 0 GROUP BY digest",
        )?;
        let rows = stmt.query_map(params![object_db_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Writes backfilled sizes keyed by digest, in one transaction. Idempotent: only rows
    /// still carrying the sentinel are updated, so a known size can never regress to unknown
    /// (spec §8 "SetObjectFileSize is idempotent").
    pub fn set_content_file_sizes(&self, object_db_id: i64, sizes: &[(String, u64)]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (digest, size) in sizes {
            tx.execute(
                "UPDATE content_files SET size = ?1 WHERE object_id = ?2 AND digest = ?3 AND size < 0",
                params![*size as i64, object_db_id, digest],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Derives a (path, digest) pair iterator's live state as a `path -> digest` map, filtering out
/// tombstones. Shared by the Diff Computer and `ReadVersionDir(".")`.
pub fn rows_to_state(rows: &[VersionFileRow]) -> HashMap<String, String> {
    rows.iter()
        .filter(|r| !r.deleted)
        .filter_map(|r| r.digest.clone().map(|d| (r.path.clone(), d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocfl::DigestAlgorithm;

    fn new_version(num: u32, state: &[(&str, &str)]) -> NewVersion {
        NewVersion {
            version_num: VersionNum::new(num),
            state: state.iter().map(|(p, d)| (p.to_string(), d.to_string())).collect(),
            created_at: Local::now(),
            user_name: Some("tester".to_string()),
            user_address: Some("mailto:tester@example.org".to_string()),
            message: Some(format!("version {num}")),
        }
    }

    fn new_object(object_id: &str, storage_path: &str, versions: Vec<NewVersion>) -> NewObject {
        let mut manifest: HashMap<String, String> = HashMap::new();
        for version in &versions {
            for (_path, digest) in &version.state {
                manifest.entry(digest.clone()).or_insert_with(|| digest.clone());
            }
        }
        let manifest: Vec<(String, String)> =
            manifest.into_iter().map(|(digest, content_path)| (content_path, digest)).collect();
        NewObject {
            object_id: object_id.to_string(),
            storage_path: storage_path.to_string(),
            version_padding: 0,
            digest_algorithm: DigestAlgorithm::Sha512,
            inventory_digest: "deadbeef".to_string(),
            manifest,
            versions,
        }
    }

    fn version_file_count(store: &IndexStore, object_db_id: i64) -> i64 {
        let conn = store.conn().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM version_files vf \
             JOIN versions v ON v.id = vf.version_id WHERE v.object_id = ?1",
            params![object_db_id],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn set_object_inserts_then_updates_in_place() {
        let store = IndexStore::open(":memory:").unwrap();
        let v1 = vec![new_version(1, &[("a.txt", "digest-a")])];
        let object = new_object("obj-1", "obj-1-path", v1);
        let first = store.set_object("default", &object, 100).unwrap();

        let v1_and_v2 = vec![
            new_version(1, &[("a.txt", "digest-a")]),
            new_version(2, &[("a.txt", "digest-a"), ("b.txt", "digest-b")]),
        ];
        let updated_object = new_object("obj-1", "obj-1-path", v1_and_v2);
        let second = store.set_object("default", &updated_object, 200).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.head.number, 2);
        assert_eq!(200, second.indexed_at);
    }

    #[test]
    fn rewrite_versions_only_persists_deltas() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![
            new_version(1, &[("a.txt", "digest-a"), ("b.txt", "digest-b")]),
            new_version(2, &[("a.txt", "digest-a"), ("b.txt", "digest-b")]),
            new_version(3, &[("a.txt", "digest-a2")]),
        ];
        let object = new_object("obj-1", "obj-1-path", versions);
        let brief = store.set_object("default", &object, 0).unwrap();

        // v2 is identical to v1, so it contributes no rows. v1 inserts 2 rows (a, b added);
        // v3 inserts 2 rows (a changed, b tombstoned).
        assert_eq!(4, version_file_count(&store, brief.id));
    }

    #[test]
    fn rewrite_versions_is_idempotent_when_state_is_unchanged() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![new_version(1, &[("a.txt", "digest-a")])];
        let object = new_object("obj-1", "obj-1-path", versions.clone());
        let first = store.set_object("default", &object, 0).unwrap();
        let before = version_file_count(&store, first.id);

        let object = new_object("obj-1", "obj-1-path", versions);
        let second = store.set_object("default", &object, 500).unwrap();
        let after = version_file_count(&store, second.id);

        assert_eq!(before, after);
        assert_eq!(500, second.indexed_at);
    }

    #[test]
    fn list_version_files_scopes_by_directory_prefix() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![new_version(
            1,
            &[("top.txt", "d1"), ("sub/a.txt", "d2"), ("sub/nested/b.txt", "d3")],
        )];
        let object = new_object("obj-1", "obj-1-path", versions);
        let brief = store.set_object("default", &object, 0).unwrap();

        let root_rows = store.list_version_files(brief.id, 1, "", 0).unwrap();
        assert_eq!(3, root_rows.len());

        let sub_rows = store.list_version_files(brief.id, 1, "sub", 0).unwrap();
        let mut paths: Vec<&str> = sub_rows.iter().map(|r| r.path.as_str()).collect();
        paths.sort();
        assert_eq!(vec!["sub/a.txt", "sub/nested/b.txt"], paths);
    }

    #[test]
    fn get_version_file_honors_the_version_ceiling() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![
            new_version(1, &[("a.txt", "digest-a")]),
            new_version(2, &[]),
        ];
        let object = new_object("obj-1", "obj-1-path", versions);
        let brief = store.set_object("default", &object, 0).unwrap();

        let at_v1 = store.get_version_file(brief.id, 1, "a.txt", 0).unwrap().unwrap();
        assert!(!at_v1.deleted);

        let at_v2 = store.get_version_file(brief.id, 2, "a.txt", 0).unwrap().unwrap();
        assert!(at_v2.deleted);
    }

    #[test]
    fn set_content_file_sizes_never_regresses_a_known_size() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![new_version(1, &[("a.txt", "digest-a")])];
        let object = new_object("obj-1", "obj-1-path", versions);
        let brief = store.set_object("default", &object, 0).unwrap();

        assert_eq!(1, store.list_missing_sizes(brief.id).unwrap().len());

        store.set_content_file_sizes(brief.id, &[("digest-a".to_string(), 42)]).unwrap();
        assert!(store.list_missing_sizes(brief.id).unwrap().is_empty());

        // A stale backfill result racing in after a fresher one must not clobber it.
        store.set_content_file_sizes(brief.id, &[("digest-a".to_string(), 7)]).unwrap();
        let rows = store.list_version_files(brief.id, 1, "", 0).unwrap();
        assert_eq!(Some(42), rows[0].size);
    }

    #[test]
    fn unset_object_removes_it_from_the_root() {
        let store = IndexStore::open(":memory:").unwrap();
        let versions = vec![new_version(1, &[("a.txt", "digest-a")])];
        let object = new_object("obj-1", "obj-1-path", versions);
        store.set_object("default", &object, 0).unwrap();
        assert!(store.get_object_brief("default", "obj-1").unwrap().is_some());

        store.unset_object("default", "obj-1").unwrap();
        assert!(store.get_object_brief("default", "obj-1").unwrap().is_none());
    }

    #[test]
    fn memory_databases_are_private_per_store() {
        let a = IndexStore::open(":memory:").unwrap();
        let b = IndexStore::open(":memory:").unwrap();

        let versions = vec![new_version(1, &[("a.txt", "digest-a")])];
        let object = new_object("obj-1", "obj-1-path", versions);
        a.set_object("default", &object, 0).unwrap();

        assert!(a.get_object_brief("default", "obj-1").unwrap().is_some());
        assert!(b.get_object_brief("default", "obj-1").unwrap().is_none());
    }
}
