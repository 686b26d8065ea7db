//! The Access Service (spec §4.1): the public, read-only query surface over an indexed root.
//! Composes `sync::SyncController`, `db::IndexStore`, and `diff::compute`; method shapes mirror
//! the read-path methods of `rocfl`'s `OcflRepo` (`get_object`, `list_versions`, `diff`, the
//! version-state accessors) narrowed to go through the index rather than a freshly-parsed
//! inventory.

use std::collections::HashMap;
use std::io::Read;

use chrono::{DateTime, Local};

use crate::cancel::CancelToken;
use crate::clock::SystemClock;
use crate::db::{IndexStore, ObjectBrief, VersionFileRow, VersionSummary};
use crate::diff;
use crate::error::{IndexError, Result};
use crate::ocfl::{BackingStore, Diff, InventoryPath, InventoryReader, LogicalPath, VersionNum};
use crate::sync::{ObjectKey, SyncController};

/// One entry in a `ReadVersionDir` listing (spec §4.1 "Directory entry"). Also the shape
/// `StatVersionFile` returns for a single path.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    /// `None` for directories, and for files the Index store hasn't resolved a content file for.
    pub digest: Option<String>,
    pub modifying_version: VersionNum,
    pub modified: DateTime<Local>,
    /// The sentinel (spec §4.2) is never surfaced; an unknown size reads as `0` with
    /// `has_size = false`.
    pub size: u64,
    pub has_size: bool,
    pub is_directory: bool,
}

impl DirEntry {
    fn from_file_row(name: &str, row: &VersionFileRow) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            digest: row.digest.clone(),
            modifying_version: row.version_num,
            modified: row.created_at,
            size: row.size.unwrap_or(0),
            has_size: row.size.is_some(),
            is_directory: false,
        }
    }
}

/// Accumulates the roll-up for one immediate subdirectory while grouping `list_version_files`
/// rows (spec §4.2: "directory size is the sum of contained file sizes; directory has-size is
/// the logical AND of its files' has-size flags").
struct DirAggregate {
    modifying_version: VersionNum,
    modified: DateTime<Local>,
    total_size: u64,
    has_size: bool,
}

impl DirAggregate {
    fn seed(row: &VersionFileRow) -> DirAggregate {
        let mut agg = DirAggregate {
            modifying_version: row.version_num,
            modified: row.created_at,
            total_size: 0,
            has_size: true,
        };
        agg.consider(row);
        agg
    }

    /// Any descendant event -- including a tombstone -- can bump the directory's modifying
    /// version; only live files contribute to its size and has-size flag.
    fn consider(&mut self, row: &VersionFileRow) {
        if row.version_num.number > self.modifying_version.number {
            self.modifying_version = row.version_num;
            self.modified = row.created_at;
        }
        if !row.deleted {
            match row.size {
                Some(size) => self.total_size += size,
                None => self.has_size = false,
            }
        }
    }

    fn into_entry(self, name: &str) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            digest: None,
            modifying_version: self.modifying_version,
            modified: self.modified,
            size: self.total_size,
            has_size: self.has_size,
            is_directory: true,
        }
    }
}

pub struct AccessService<R, S, C> {
    db: std::sync::Arc<IndexStore>,
    sync: SyncController<R, S, C>,
    store: S,
}

impl<R, S, C> AccessService<R, S, C>
where
    R: InventoryReader,
    S: BackingStore + Clone,
    C: SystemClock,
{
    pub fn new(db: std::sync::Arc<IndexStore>, sync: SyncController<R, S, C>, store: S) -> Self {
        Self { db, sync, store }
    }

    /// `SyncObject` (spec §4.1).
    pub fn sync_object(&self, id: &str, cancel: &CancelToken) -> Result<ObjectBrief> {
        self.sync.sync(ObjectKey::Id(id.to_string()), cancel)
    }

    /// `ListVersions` (spec §4.1): explicitly syncs, then returns v1..head in order.
    pub fn list_versions(&self, id: &str, cancel: &CancelToken) -> Result<Vec<VersionSummary>> {
        let brief = self.sync_object(id, cancel)?;
        self.db.list_versions(brief.id, brief.version_padding)
    }

    /// `GetVersionInfo` (spec §4.1): `v<1` means head, NotFound if `v` exceeds head.
    pub fn get_version_info(&self, id: &str, v: i64, cancel: &CancelToken) -> Result<VersionSummary> {
        let brief = self.sync_object(id, cancel)?;
        let version_num = self.resolve_version(&brief, v)?;
        self.db
            .get_version(brief.id, version_num, brief.version_padding)?
            .ok_or_else(|| IndexError::not_found(format!("{id} v{version_num}")))
    }

    /// `ReadVersionDir` (spec §4.1). `dir = "."` or `""` is the root. NotFound if the directory
    /// does not exist in the resolved version's state, or if `dir` names a live file instead.
    pub fn read_version_dir(
        &self,
        id: &str,
        v: i64,
        dir: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<DirEntry>> {
        let brief = self.sync_object(id, cancel)?;
        let version_num = self.resolve_version(&brief, v)?;
        let dir_path = normalize_dir(dir)?;

        if !dir_path.is_empty() {
            if let Some(row) =
                self.db
                    .get_version_file(brief.id, version_num, &dir_path, brief.version_padding)?
            {
                if !row.deleted {
                    return Err(IndexError::not_found(format!(
                        "{id} v{version_num} {dir}"
                    )));
                }
            }
        }

        let rows =
            self.db
                .list_version_files(brief.id, version_num, &dir_path, brief.version_padding)?;

        if rows.is_empty() && !dir_path.is_empty() {
            return Err(IndexError::not_found(format!("{id} v{version_num} {dir}")));
        }

        Ok(group_into_entries(&dir_path, &rows))
    }

    /// `StatVersionFile` (spec §4.1). NotFound if `path` is absent, or tombstoned, in the
    /// resolved version's state.
    pub fn stat_version_file(
        &self,
        id: &str,
        v: i64,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<DirEntry> {
        let brief = self.sync_object(id, cancel)?;
        let version_num = self.resolve_version(&brief, v)?;
        let file_path = validate_path(path)?;

        let row = self
            .db
            .get_version_file(brief.id, version_num, &file_path, brief.version_padding)?
            .filter(|row| !row.deleted)
            .ok_or_else(|| IndexError::not_found(format!("{id} v{version_num} {path}")))?;

        Ok(DirEntry::from_file_row(basename(&file_path), &row))
    }

    /// `OpenVersionFile` (spec §4.1): stats first (NotFound propagates from there), then opens
    /// the resolved content path for reading through the backing store.
    pub fn open_version_file(
        &self,
        id: &str,
        v: i64,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<(Box<dyn Read + Send>, u64)> {
        let brief = self.sync_object(id, cancel)?;
        let version_num = self.resolve_version(&brief, v)?;
        let file_path = validate_path(path)?;

        let row = self
            .db
            .get_version_file(brief.id, version_num, &file_path, brief.version_padding)?
            .filter(|row| !row.deleted)
            .ok_or_else(|| IndexError::not_found(format!("{id} v{version_num} {path}")))?;

        let content_path = row
            .content_path
            .ok_or_else(|| IndexError::Conflict(format!("{path} has no resolved content file")))?;

        let full_path = join_path(&brief.storage_path, &content_path);
        let reader = self.store.open_file(&full_path)?;
        Ok((reader, row.size.unwrap_or(0)))
    }

    /// `GetVersionChanges` (spec §4.1/§4.5). `from_v = 0` means "before version 1".
    pub fn get_version_changes(
        &self,
        id: &str,
        from_v: u32,
        to_v: i64,
        cancel: &CancelToken,
    ) -> Result<Vec<Diff>> {
        let brief = self.sync_object(id, cancel)?;
        let to_resolved = self.resolve_version(&brief, to_v)?;

        if from_v > brief.head.number {
            return Err(IndexError::not_found(format!("{id} v{from_v}")));
        }

        diff::compute(&self.db, brief.id, brief.version_padding, from_v, to_resolved)
    }

    /// `IndexRoot` (spec §4.1): full-scan reconciliation of every object declaration under the
    /// configured storage root.
    pub fn index_root(&self, cancel: &CancelToken) -> Result<usize> {
        self.sync.index_root(cancel)
    }

    /// Resolves a `v<1 means head` parameter against the synced object's head, bounding it to
    /// `1..=head`.
    fn resolve_version(&self, brief: &ObjectBrief, v: i64) -> Result<u32> {
        if v < 1 {
            Ok(brief.head.number)
        } else if v as u32 > brief.head.number {
            Err(IndexError::not_found(format!(
                "{} v{v}",
                brief.object_id
            )))
        } else {
            Ok(v as u32)
        }
    }
}

/// Rejects non-canonical paths (empty, absolute, or containing `.`/`..` segments) the same way
/// `LogicalPath::try_from` does, translated into `BadRequest` (spec §7).
fn validate_path(path: &str) -> Result<String> {
    let logical = LogicalPath::try_from(path)
        .map_err(|e| IndexError::BadRequest(format!("invalid path '{path}': {e}")))?;
    if logical.is_empty() {
        return Err(IndexError::BadRequest(format!("invalid path '{path}'")));
    }
    Ok(logical.as_str().to_string())
}

/// Normalizes a `ReadVersionDir` directory argument: `"."` and `""` both mean the object root.
/// Otherwise validated the same way a file path is.
fn normalize_dir(dir: &str) -> Result<String> {
    if dir.is_empty() || dir == "." {
        return Ok(String::new());
    }
    validate_path(dir)
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join_path(root: &str, relative: &str) -> String {
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{root}/{relative}")
    }
}

/// Groups rows already scoped to `dir` (by `list_version_files`) into one entry per immediate
/// child: a file entry for a row with no further `/`, a roll-up `DirAggregate` for everything
/// else, keyed by the first path segment below `dir`.
fn group_into_entries(dir: &str, rows: &[VersionFileRow]) -> Vec<DirEntry> {
    let mut files = Vec::new();
    let mut dirs: HashMap<&str, DirAggregate> = HashMap::new();

    for row in rows {
        let relative = match dir.is_empty() {
            true => row.path.as_str(),
            false => row.path.strip_prefix(dir).and_then(|p| p.strip_prefix('/')).unwrap_or(&row.path),
        };

        match relative.split_once('/') {
            None => {
                if !row.deleted {
                    files.push(DirEntry::from_file_row(relative, row));
                }
            }
            Some((child, _rest)) => {
                dirs.entry(child)
                    .and_modify(|agg| agg.consider(row))
                    .or_insert_with(|| DirAggregate::seed(row));
            }
        }
    }

    let mut entries = files;
    entries.extend(dirs.into_iter().map(|(name, agg)| agg.into_entry(name)));
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::clock::FakeClock;
    use crate::db::{NewObject, NewVersion};
    use crate::ocfl::{DigestAlgorithm, FileStat, HexDigest, Inventory, Listing, Result as OcflResult};

    #[derive(Clone)]
    struct EmptyStore;

    impl BackingStore for EmptyStore {
        fn open_file(&self, _path: &str) -> OcflResult<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(b"hello".to_vec())))
        }

        fn stat_file(&self, _path: &str) -> OcflResult<FileStat> {
            Ok(FileStat {
                size: 5,
                modified: Some(SystemTime::now()),
            })
        }

        fn list(&self, _path: &str, _recursive: bool) -> OcflResult<Vec<Listing>> {
            Ok(Vec::new())
        }
    }

    struct EmptyReader;

    impl InventoryReader for EmptyReader {
        fn read_sidecar(
            &self,
            _object_root: &str,
            _algorithm: DigestAlgorithm,
        ) -> OcflResult<Option<HexDigest>> {
            Ok(None)
        }

        fn read_inventory(&self, _object_root: &str) -> OcflResult<Option<Inventory>> {
            Ok(None)
        }
    }

    fn new_version(num: u32, state: &[(&str, &str)]) -> NewVersion {
        NewVersion {
            version_num: VersionNum::new(num),
            state: state.iter().map(|(p, d)| (p.to_string(), d.to_string())).collect(),
            created_at: Local::now(),
            user_name: None,
            user_address: None,
            message: None,
        }
    }

    fn seed(db: &IndexStore, object_id: &str, versions: Vec<NewVersion>) -> ObjectBrief {
        // One content file per distinct digest, keyed by the digest itself -- content-addressed
        // storage never has two physical paths for what the manifest treats as the same digest
        // sharing a content path, unlike the logical (version-state) paths that point at them.
        let mut manifest: HashMap<String, String> = HashMap::new();
        for version in &versions {
            for (_path, digest) in &version.state {
                manifest.entry(digest.clone()).or_insert_with(|| digest.clone());
            }
        }
        let manifest: Vec<(String, String)> =
            manifest.into_iter().map(|(digest, content_path)| (content_path, digest)).collect();
        let new_object = NewObject {
            object_id: object_id.to_string(),
            storage_path: object_id.to_string(),
            version_padding: 0,
            digest_algorithm: DigestAlgorithm::Sha512,
            inventory_digest: "deadbeef".to_string(),
            manifest,
            versions,
        };
        db.set_object("default", &new_object, 0).unwrap()
    }

    fn service(db: Arc<IndexStore>) -> AccessService<EmptyReader, EmptyStore, FakeClock> {
        let sync = SyncController::new(
            Arc::clone(&db),
            EmptyReader,
            EmptyStore,
            Arc::new(FakeClock::new(0)),
            "default",
            Duration::from_secs(20),
            4,
        );
        AccessService::new(db, sync, EmptyStore)
    }

    #[test]
    fn directory_roll_up_reflects_the_latest_descendant_event() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(
            &db,
            "obj-rollup",
            vec![
                new_version(1, &[("src/utils/lib1.go", "d2"), ("src/utils/lib2.go", "d3")]),
                new_version(2, &[("src/utils/lib1.go", "d2")]),
            ],
        );

        let svc = service(db);
        let cancel = CancelToken::new();
        let entries = svc
            .read_version_dir("obj-rollup", 2, "src", &cancel)
            .unwrap();

        assert_eq!(1, entries.len());
        assert_eq!("utils", entries[0].name);
        assert!(entries[0].is_directory);
        assert_eq!(2, entries[0].modifying_version.number);
    }

    #[test]
    fn read_version_dir_on_a_live_file_is_not_found() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(&db, "obj-file", vec![new_version(1, &[("a.txt", "d1")])]);

        let svc = service(db);
        let cancel = CancelToken::new();
        let err = svc.read_version_dir("obj-file", 1, "a.txt", &cancel).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn stat_on_a_tombstoned_path_is_not_found() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(
            &db,
            "obj-c",
            vec![
                new_version(1, &[("readme.txt", "d1")]),
                new_version(2, &[]),
                new_version(3, &[("readme.txt", "d2")]),
            ],
        );

        let svc = service(db);
        let cancel = CancelToken::new();

        let gone = svc.stat_version_file("obj-c", 2, "readme.txt", &cancel);
        assert!(matches!(gone, Err(IndexError::NotFound(_))));

        let restored = svc.stat_version_file("obj-c", 3, "readme.txt", &cancel).unwrap();
        assert_eq!(3, restored.modifying_version.number);
        assert_eq!(Some("d2".to_string()), restored.digest);
    }

    #[test]
    fn get_version_changes_before_v1_reports_everything_added() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(&db, "obj-c", vec![new_version(3, &[("readme.txt", "d2")])]);

        let svc = service(db);
        let cancel = CancelToken::new();
        let changes = svc.get_version_changes("obj-c", 0, 3, &cancel).unwrap();

        assert_eq!(1, changes.len());
        assert!(matches!(&changes[0], Diff::Added(p) if p.as_str() == "readme.txt"));
    }

    #[test]
    fn empty_root_version_lists_empty_not_not_found() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(&db, "obj-empty", vec![new_version(1, &[])]);

        let svc = service(db);
        let cancel = CancelToken::new();
        let entries = svc.read_version_dir("obj-empty", 1, ".", &cancel).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn version_beyond_head_is_not_found() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(&db, "obj-a", vec![new_version(1, &[("a.txt", "d1")])]);

        let svc = service(db);
        let cancel = CancelToken::new();
        let err = svc.get_version_info("obj-a", 2, &cancel).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn open_version_file_reads_through_the_backing_store() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        seed(&db, "obj-a", vec![new_version(1, &[("a.txt", "d1")])]);

        let svc = service(db);
        let cancel = CancelToken::new();
        let (mut reader, _size) = svc.open_version_file("obj-a", 1, "a.txt", &cancel).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(b"hello".to_vec(), buf);
    }
}
