//! The Sync Controller (spec §4.3): keeps an object's index rows coherent with its backing-store
//! inventory, lazily and with single-flight de-duplication. Composes `db::IndexStore`,
//! `singleflight::SingleFlight`, `backfill::backfill_sizes`, and the `ocfl` collaborators.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::backfill::backfill_sizes;
use crate::cancel::CancelToken;
use crate::clock::SystemClock;
use crate::db::{IndexStore, NewObject, NewVersion, ObjectBrief};
use crate::error::{IndexError, Result};
use crate::ocfl::{find_object_roots, BackingStore, Inventory, InventoryPath, InventoryReader};
use crate::singleflight::SingleFlight;

/// How an object is addressed for one sync pass: by its OCFL identifier (the common case, used
/// once an object is already indexed) or by storage path (the only thing a root scan has before
/// it has read the object's inventory -- spec §4.3: "a root scan does not know object IDs up
/// front").
#[derive(Debug, Clone)]
pub enum ObjectKey {
    Id(String),
    Path(String),
}

impl ObjectKey {
    fn display(&self) -> &str {
        match self {
            ObjectKey::Id(id) => id,
            ObjectKey::Path(path) => path,
        }
    }
}

pub struct SyncController<R, S, C> {
    db: Arc<IndexStore>,
    reader: R,
    store: S,
    clock: Arc<C>,
    root: String,
    refresh_interval: Duration,
    stat_concurrency: usize,
    singleflight: SingleFlight<ObjectBrief>,
}

impl<R, S, C> SyncController<R, S, C>
where
    R: InventoryReader,
    S: BackingStore,
    C: SystemClock,
{
    pub fn new(
        db: Arc<IndexStore>,
        reader: R,
        store: S,
        clock: Arc<C>,
        root: impl Into<String>,
        refresh_interval: Duration,
        stat_concurrency: usize,
    ) -> Self {
        Self {
            db,
            reader,
            store,
            clock,
            root: root.into(),
            refresh_interval,
            stat_concurrency,
            singleflight: SingleFlight::new(),
        }
    }

    /// `SyncObject` (spec §4.3): returns the object's current brief, performing at most one
    /// reconciliation per concurrent caller group and at most one real re-index per refresh
    /// window.
    pub fn sync(&self, key: ObjectKey, cancel: &CancelToken) -> Result<ObjectBrief> {
        cancel.check()?;

        if let Some(brief) = self.lookup_existing(&key)? {
            let now = self.clock.now_secs();
            if now < brief.indexed_at + self.refresh_interval.as_secs() as i64 {
                return Ok(brief);
            }
        }

        let singleflight_key = match &key {
            ObjectKey::Id(id) => format!("obj:{id}"),
            ObjectKey::Path(path) => format!("path:{path}"),
        };

        self.singleflight
            .join(&singleflight_key, || self.do_sync(&key, cancel))
    }

    /// Full-scan reconciliation of every object declaration under the root (spec §4.1
    /// `IndexRoot`). Per-object failures are logged and do not abort the scan.
    pub fn index_root(&self, cancel: &CancelToken) -> Result<usize> {
        let object_roots = find_object_roots(&self.store, "")?;
        let mut indexed = 0;

        for object_root in object_roots {
            if cancel.is_cancelled() {
                break;
            }

            match self.sync(ObjectKey::Path(object_root.clone()), cancel) {
                Ok(_) => indexed += 1,
                Err(e) => warn!("failed to index object at '{object_root}': {e}"),
            }
        }

        Ok(indexed)
    }

    fn lookup_existing(&self, key: &ObjectKey) -> Result<Option<ObjectBrief>> {
        match key {
            ObjectKey::Id(id) => self.db.get_object_brief(&self.root, id),
            ObjectKey::Path(path) => self.db.get_object_brief_by_path(&self.root, path),
        }
    }

    fn unset(&self, key: &ObjectKey) -> Result<()> {
        match key {
            ObjectKey::Id(id) => self.db.unset_object(&self.root, id),
            ObjectKey::Path(path) => self.db.unset_object_by_path(&self.root, path),
        }
    }

    /// The elected single-flight leader's actual work: steps 1-7 of the sync protocol.
    fn do_sync(&self, key: &ObjectKey, cancel: &CancelToken) -> Result<ObjectBrief> {
        let existing = self.lookup_existing(key)?;

        let storage_path = match (&existing, key) {
            (Some(brief), _) => brief.storage_path.clone(),
            (None, ObjectKey::Path(path)) => path.clone(),
            // No prior index row and no path to scan from: this object has never been seen
            // under this root. Layout-extension resolution is out of scope (only local-disk
            // backing storage ships, and only the flat-direct convention is supported here),
            // so the object id is used as its own storage path.
            (None, ObjectKey::Id(id)) => id.clone(),
        };

        match existing {
            Some(brief) => {
                cancel.check()?;
                match self.reader.read_sidecar(&storage_path, brief.digest_algorithm) {
                    Ok(Some(sidecar_digest)) if sidecar_digest.to_string() == brief.inventory_digest => {
                        let now = self.clock.now_secs();
                        self.db.touch_object(brief.id, now)?;
                        self.db
                            .get_object_brief(&self.root, &brief.object_id)?
                            .ok_or_else(|| IndexError::not_found(brief.object_id.clone()))
                    }
                    Ok(None) => {
                        self.unset(key)?;
                        Err(IndexError::not_found(key.display().to_string()))
                    }
                    // Sidecar differs, or couldn't be read cheaply: fall through to a full
                    // re-index, which will itself discover a missing object.
                    _ => self.reindex(key, &storage_path, cancel),
                }
            }
            None => self.reindex(key, &storage_path, cancel),
        }
    }

    fn reindex(&self, key: &ObjectKey, storage_path: &str, cancel: &CancelToken) -> Result<ObjectBrief> {
        cancel.check()?;

        match self.reader.read_inventory(storage_path)? {
            None => {
                self.unset(key)?;
                Err(IndexError::not_found(key.display().to_string()))
            }
            Some(inventory) => {
                let new_object = build_new_object(&inventory)?;
                let now = self.clock.now_secs();
                let brief = self.db.set_object(&self.root, &new_object, now)?;
                info!(
                    "indexed object '{}' at '{}' (head v{})",
                    brief.object_id, brief.storage_path, brief.head.number
                );
                self.backfill(&brief, cancel);
                Ok(brief)
            }
        }
    }

    /// Content-size backfill (spec §4.4). Best-effort: a failed backfill pass leaves the
    /// affected content files at "size unknown", which is a legal index state, and does not
    /// fail the sync that triggered it.
    fn backfill(&self, brief: &ObjectBrief, cancel: &CancelToken) {
        let missing = match self.db.list_missing_sizes(brief.id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("failed to list missing sizes for '{}': {e}", brief.object_id);
                return;
            }
        };

        if missing.is_empty() {
            return;
        }

        let requests: Vec<(String, String)> = missing
            .into_iter()
            .map(|(digest, content_path)| (digest, join_path(&brief.storage_path, &content_path)))
            .collect();

        match backfill_sizes(&self.store, requests, self.stat_concurrency, cancel) {
            Ok(sizes) if sizes.is_empty() => {}
            Ok(sizes) => {
                if let Err(e) = self.db.set_content_file_sizes(brief.id, &sizes) {
                    warn!("failed to persist backfilled sizes for '{}': {e}", brief.object_id);
                }
            }
            Err(e) => warn!("size backfill failed for '{}': {e}", brief.object_id),
        }
    }
}

fn join_path(root: &str, relative: &str) -> String {
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{root}/{relative}")
    }
}

fn build_new_object(inventory: &Inventory) -> Result<NewObject> {
    let manifest = inventory
        .manifest_iter()
        .map(|(path, digest)| (path.as_str().to_string(), digest.to_string()))
        .collect();

    let mut versions = Vec::with_capacity(inventory.versions.len());
    for (version_num, version) in inventory.versions.iter() {
        let state = version
            .state_iter()
            .map(|(path, digest)| (path.as_str().to_string(), digest.to_string()))
            .collect();

        versions.push(NewVersion {
            version_num: *version_num,
            state,
            created_at: version.created,
            user_name: version.user.as_ref().and_then(|u| u.name.clone()),
            user_address: version.user.as_ref().and_then(|u| u.address.clone()),
            message: version.message.clone(),
        });
    }

    Ok(NewObject {
        object_id: inventory.id.clone(),
        storage_path: inventory.storage_path.clone(),
        version_padding: inventory.head.width,
        digest_algorithm: inventory.digest_algorithm,
        inventory_digest: inventory.inventory_digest.to_string(),
        manifest,
        versions,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc as StdArc, Barrier};
    use std::time::SystemTime;

    use super::*;
    use crate::clock::FakeClock;
    use crate::ocfl::{DigestAlgorithm, FileStat, HexDigest, Listing, Result as OcflResult};

    /// An `InventoryReader` over a fixed set of JSON templates, counting invocations the way
    /// spec §8 scenarios 5-6 require. Parses a fresh `Inventory` from JSON on every call, the
    /// same as `FsInventoryReader` would from bytes on disk -- `Inventory` has no public
    /// constructor, since it's a read model populated only by parsing.
    struct FakeReader {
        templates: HashMap<String, serde_json::Value>,
        sidecar_reads: AtomicUsize,
        inventory_reads: AtomicUsize,
    }

    impl FakeReader {
        fn new(templates: HashMap<String, serde_json::Value>) -> Self {
            Self {
                templates,
                sidecar_reads: AtomicUsize::new(0),
                inventory_reads: AtomicUsize::new(0),
            }
        }

        fn parse(&self, object_root: &str) -> Option<Inventory> {
            self.templates.get(object_root).map(|json| {
                let mut inventory: Inventory = serde_json::from_value(json.clone()).unwrap();
                inventory.object_root = object_root.to_string();
                inventory.storage_path = object_root.to_string();
                inventory.inventory_digest = HexDigest::from("deadbeef".to_string());
                inventory
            })
        }
    }

    impl InventoryReader for FakeReader {
        fn read_sidecar(
            &self,
            object_root: &str,
            _algorithm: DigestAlgorithm,
        ) -> OcflResult<Option<HexDigest>> {
            self.sidecar_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.parse(object_root).map(|inv| inv.inventory_digest))
        }

        fn read_inventory(&self, object_root: &str) -> OcflResult<Option<Inventory>> {
            self.inventory_reads.fetch_add(1, Ordering::SeqCst);
            // A slight delay widens the window for concurrent callers to race in the dedup test.
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(self.parse(object_root))
        }
    }

    struct FakeStore;

    impl BackingStore for FakeStore {
        fn open_file(&self, _path: &str) -> OcflResult<Box<dyn Read + Send>> {
            Ok(Box::new(Cursor::new(Vec::new())))
        }

        fn stat_file(&self, _path: &str) -> OcflResult<FileStat> {
            Ok(FileStat {
                size: 0,
                modified: Some(SystemTime::now()),
            })
        }

        fn list(&self, _path: &str, _recursive: bool) -> OcflResult<Vec<Listing>> {
            Ok(Vec::new())
        }
    }

    fn inventory_template(object_id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": object_id,
            "type": "https://ocfl.io/1.0/spec/#inventory",
            "digestAlgorithm": "sha512",
            "head": "v1",
            "manifest": {},
            "versions": {
                "v1": {
                    "created": "2020-01-01T00:00:00Z",
                    "state": {},
                    "message": "initial",
                    "user": {"name": "tester", "address": null}
                }
            }
        })
    }

    fn seed_inventory(object_id: &str, storage_path: &str) -> Inventory {
        let mut inventory: Inventory =
            serde_json::from_value(inventory_template(object_id)).unwrap();
        inventory.object_root = storage_path.to_string();
        inventory.storage_path = storage_path.to_string();
        inventory.inventory_digest = HexDigest::from("deadbeef".to_string());
        inventory
    }

    #[test]
    fn refresh_interval_coalesces_repeat_syncs() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        let inventory = seed_inventory("obj-refresh", "obj-refresh");
        let new_object = build_new_object(&inventory).unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let brief = db.set_object("default", &new_object, clock.now_secs()).unwrap();

        // Sidecar digest always matches the stored one, so this only ever exercises the touch
        // path -- no full re-index should occur.
        let reader = FakeReader::new(HashMap::from([(
            "obj-refresh".to_string(),
            inventory_template("obj-refresh"),
        )]));

        let controller = SyncController::new(
            Arc::clone(&db),
            reader,
            FakeStore,
            Arc::clone(&clock),
            "default",
            Duration::from_secs(20),
            4,
        );

        let cancel = CancelToken::new();
        let first = controller
            .sync(ObjectKey::Id("obj-refresh".to_string()), &cancel)
            .unwrap();
        assert_eq!(brief.indexed_at, first.indexed_at);

        clock.advance(1);
        let second = controller
            .sync(ObjectKey::Id("obj-refresh".to_string()), &cancel)
            .unwrap();
        assert_eq!(first.indexed_at, second.indexed_at, "within refresh interval");

        clock.advance(21);
        let third = controller
            .sync(ObjectKey::Id("obj-refresh".to_string()), &cancel)
            .unwrap();
        assert!(third.indexed_at > second.indexed_at, "past refresh interval");
        assert_eq!(
            0,
            controller.reader.inventory_reads.load(Ordering::SeqCst),
            "unchanged sidecar never triggers a full inventory read"
        );
    }

    #[test]
    fn concurrent_sync_on_a_cold_object_reads_the_inventory_exactly_once() {
        let db = Arc::new(IndexStore::open(":memory:").unwrap());
        let clock = Arc::new(FakeClock::new(0));
        let reader = FakeReader::new(HashMap::from([(
            "obj-cold".to_string(),
            inventory_template("obj-cold"),
        )]));

        let controller = StdArc::new(SyncController::new(
            db,
            reader,
            FakeStore,
            clock,
            "default",
            Duration::from_secs(20),
            4,
        ));

        const CALLERS: usize = 100;
        let barrier = StdArc::new(Barrier::new(CALLERS));

        let briefs: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let controller = StdArc::clone(&controller);
                    let barrier = StdArc::clone(&barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        let cancel = CancelToken::new();
                        controller
                            .sync(ObjectKey::Id("obj-cold".to_string()), &cancel)
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(
            1,
            controller.reader.inventory_reads.load(Ordering::SeqCst),
            "exactly one inventory read across all concurrent callers"
        );
        let first_indexed_at = briefs[0].indexed_at;
        for brief in &briefs {
            assert_eq!("obj-cold", brief.object_id);
            assert_eq!(first_indexed_at, brief.indexed_at);
        }
    }

    #[test]
    fn object_key_displays_its_identifier() {
        assert_eq!("obj-a", ObjectKey::Id("obj-a".to_string()).display());
        assert_eq!("a/b", ObjectKey::Path("a/b".to_string()).display());
    }
}
