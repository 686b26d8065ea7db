use std::collections::hash_map::Iter;
use std::collections::BTreeMap;
use std::io::Read;
use std::rc::Rc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::ocfl::bimap::PathBiMap;
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::{ContentPath, LogicalPath, VersionNum};

/// The deserialized shape of an OCFL `inventory.json`, as produced by the inventory-reader
/// collaborator (see the crate's service-level `InventoryReader` trait). This type is a read
/// model only -- nothing in this crate constructs or mutates an `Inventory` for writing.
#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: String,
    #[serde(rename = "type")]
    pub type_declaration: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    pub content_directory: Option<String>,
    manifest: PathBiMap<ContentPath>,
    pub versions: BTreeMap<VersionNum, Version>,

    #[serde(skip)]
    /// Path to the object's root relative the storage root, using `/` as separator.
    pub object_root: String,
    #[serde(skip)]
    /// Physical path to the object's root, using the filesystem's path separator.
    pub storage_path: String,
    #[serde(skip)]
    /// The digest of the inventory file itself, as read from its sidecar. Populated by the
    /// inventory-reader collaborator, not derivable from the inventory body alone.
    pub inventory_digest: HexDigest,
}

/// OCFL version serialization object
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Version {
    pub created: DateTime<Local>,
    state: PathBiMap<LogicalPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

/// OCFL user serialization object
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct User {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl Inventory {
    /// Returns true if the HEAD version is equal to 1
    pub fn is_new(&self) -> bool {
        self.head.number == 1
    }

    /// Returns a reference to the HEAD version
    pub fn head_version(&self) -> &Version {
        // The head version must exist because we look for it when the Inventory is deserialized
        self.versions.get(&self.head).unwrap()
    }

    /// Returns a reference to the specified version or an error if it does not exist.
    pub fn get_version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// Returns true if the path exists in the manifest
    pub fn contains_content_path(&self, content_path: &ContentPath) -> bool {
        self.manifest.contains_path(content_path)
    }

    /// Returns every content path registered to the given digest, in manifest order. A digest
    /// may legitimately map to more than one content path (the same bytes stored under distinct
    /// logical paths across versions); the index store keeps one content-file row per path.
    pub fn content_paths_for_digest(&self, digest: &HexDigest) -> Vec<Rc<ContentPath>> {
        match self.manifest.get_paths(digest) {
            Some(paths) => paths.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Iterates the manifest as (digest, content path) pairs, the shape the index store writes
    /// content-file rows from.
    pub fn manifest_iter(&self) -> impl Iterator<Item = (&Rc<ContentPath>, &Rc<HexDigest>)> {
        self.manifest.iter()
    }

    pub fn defaulted_content_dir(&self) -> &str {
        match &self.content_directory {
            Some(dir) => dir.as_str(),
            None => crate::ocfl::consts::DEFAULT_CONTENT_DIR,
        }
    }

    /// Performs a spot check on the inventory to see if it appears valid. This is not an
    /// exhaustive check, and does not guarantee that the inventory is valid.
    pub fn validate(&self) -> Result<()> {
        if !self.versions.contains_key(&self.head) {
            return Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("HEAD version {} was not found", self.head),
            });
        }
        Ok(())
    }
}

impl Version {
    /// Returns non-consuming iterator for the version's state
    pub fn state_iter(&self) -> Iter<Rc<LogicalPath>, Rc<HexDigest>> {
        self.state.iter()
    }

    /// Returns a reference to the digest associated to a logical path, or None if the logical
    /// path does not exist in the version's state.
    pub fn lookup_digest(&self, logical_path: &LogicalPath) -> Option<&Rc<HexDigest>> {
        self.state.get_id(logical_path)
    }

    /// Returns true if the specified path exists as a logical file
    pub fn is_file(&self, path: &LogicalPath) -> bool {
        self.state.contains_path(path)
    }

    /// Returns true if the version's state contains an entry for the digest
    pub fn contains_digest(&self, digest: &HexDigest) -> bool {
        self.state.contains_id(digest)
    }

    /// The number of live paths in this version's state.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }
}

/// The OCFL parser collaborator. Given a backing store and an object's storage path, produces
/// the object's identity, manifest, and per-version state -- the minimum the index engine needs
/// to populate its own tables. This crate never reads an inventory by any path other than through
/// this trait.
pub trait InventoryReader {
    /// Reads just the inventory's sidecar digest, the cheap fingerprint the sync controller
    /// compares against the stored `inventory_digest` before committing to a full parse.
    /// Returns `Ok(None)` if the object has no inventory at this path.
    fn read_sidecar(
        &self,
        object_root: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<Option<HexDigest>>;

    /// Parses the full inventory at `object_root`. `must_exist` controls whether a missing
    /// inventory is an error or an `Ok` sentinel the caller inspects via `Option`.
    fn read_inventory(&self, object_root: &str) -> Result<Option<Inventory>>;
}

/// Reads a storage root's NAMASTE declaration (`0=ocfl_1.0`), returning its content verbatim
/// (e.g. `"ocfl_1.0"`) or `None` if the root has no declaration file. This is the "spec version"
/// half of the root-scan capability the Sync Controller's `IndexRoot` operation needs before it
/// can enumerate objects underneath a storage root.
pub fn read_storage_root_declaration<S: crate::ocfl::store::BackingStore>(
    store: &S,
    root_path: &str,
) -> Result<Option<String>> {
    let path = join(root_path, crate::ocfl::consts::REPO_NAMASTE_FILE);

    match store.open_file(&path) {
        Ok(mut reader) => {
            let mut contents = String::new();
            reader.read_to_string(&mut contents)?;
            Ok(Some(contents.trim().to_string()))
        }
        Err(OcflError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Walks a storage root looking for object declaration files (`0=ocfl_object_1.0`), returning
/// the storage path of every object root found, sorted. This is the "object-declaration
/// iterator" half of the root-scan capability (the other half is `read_storage_root_declaration`)
/// -- together they let `IndexRoot` discover every object under a root without this crate ever
/// interpreting OCFL storage layout extensions itself; it simply looks for the declaration file
/// everywhere beneath `root_path`.
pub fn find_object_roots<S: crate::ocfl::store::BackingStore>(
    store: &S,
    root_path: &str,
) -> Result<Vec<String>> {
    use crate::ocfl::store::Listing;

    let namaste = crate::ocfl::consts::OBJECT_NAMASTE_FILE;
    let suffix = format!("/{namaste}");

    let mut roots: Vec<String> = store
        .list(root_path, true)?
        .into_iter()
        .filter_map(|entry| match entry {
            Listing::File(path) if path.as_ref() == namaste => Some(String::new()),
            Listing::File(path) => path
                .strip_suffix(suffix.as_str())
                .map(|object_root| object_root.to_string()),
            _ => None,
        })
        .map(|relative| join(root_path, &relative))
        .collect();

    roots.sort();
    Ok(roots)
}

fn join(root_path: &str, relative: &str) -> String {
    if root_path.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        root_path.to_string()
    } else {
        format!("{root_path}/{relative}")
    }
}

/// An `InventoryReader` over a `BackingStore`, parsing the standard `inventory.json` layout.
pub struct FsInventoryReader<S> {
    store: S,
}

impl<S> FsInventoryReader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: crate::ocfl::store::BackingStore> InventoryReader for FsInventoryReader<S> {
    fn read_sidecar(
        &self,
        object_root: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<Option<HexDigest>> {
        let sidecar_name = format!(
            "{}.{}",
            crate::ocfl::consts::INVENTORY_FILE,
            algorithm.to_string().replace('-', "").replace('/', "")
        );
        let path = format!("{}/{}", object_root, sidecar_name);

        match self.store.open_file(&path) {
            Ok(mut reader) => {
                let mut contents = String::new();
                reader.read_to_string(&mut contents)?;
                // Sidecar format is `<digest>  <inventory filename>\n`
                let digest = contents
                    .split_whitespace()
                    .next()
                    .unwrap_or(contents.trim());
                Ok(Some(HexDigest::from(digest.to_string())))
            }
            Err(OcflError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_inventory(&self, object_root: &str) -> Result<Option<Inventory>> {
        let path = format!("{}/{}", object_root, crate::ocfl::consts::INVENTORY_FILE);

        let mut contents = Vec::new();
        match self.store.open_file(&path) {
            Ok(mut reader) => {
                reader.read_to_end(&mut contents)?;
            }
            Err(OcflError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        }

        let mut inventory: Inventory = serde_json::from_slice(&contents)?;
        inventory.object_root = object_root.to_string();
        inventory.storage_path = object_root.to_string();
        inventory.inventory_digest = inventory.digest_algorithm.hash_hex(&mut contents.as_slice())?;
        inventory.validate()?;

        Ok(Some(inventory))
    }
}
