#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use sha2::{Digest, Sha512};

/// One version of a fixture object, in commit order: its live `path -> content` mapping plus
/// the version metadata. Content is plain text; only its digest is meaningful to the index.
pub struct FixtureVersion {
    pub state: &'static [(&'static str, &'static str)],
    pub message: &'static str,
    pub user_name: &'static str,
    pub user_address: &'static str,
    pub created: &'static str,
}

/// Writes a storage root's NAMASTE declaration at `root`.
pub fn write_storage_root(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join("0=ocfl_1.0"), "ocfl_1.0\n").unwrap();
}

/// Writes a minimal, spec-valid OCFL object under `root/object_path`: the object NAMASTE
/// declaration, one version directory per `versions` entry with its content files, and an
/// `inventory.json` (with a matching sidecar) reflecting `versions` in commit order. Content
/// already seen at an earlier version is reused by content path rather than rewritten, the way
/// a real OCFL client never stores the same digest twice.
pub fn write_object(root: &Path, object_path: &str, object_id: &str, versions: &[FixtureVersion]) {
    let object_root = root.join(object_path);
    fs::create_dir_all(&object_root).unwrap();
    fs::write(object_root.join("0=ocfl_object_1.0"), "ocfl_object_1.0\n").unwrap();

    let head = versions.len() as u32;
    let mut digest_to_content_path: BTreeMap<String, String> = BTreeMap::new();
    let mut manifest: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut versions_json = serde_json::Map::new();

    for (idx, version) in versions.iter().enumerate() {
        let num = idx as u32 + 1;
        let version_dir = object_root.join(format!("v{num}"));
        fs::create_dir_all(version_dir.join("content")).unwrap();

        let mut state: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (path, content) in version.state {
            let digest = hex::encode(Sha512::digest(content.as_bytes()));

            digest_to_content_path.entry(digest.clone()).or_insert_with(|| {
                let content_path = format!("v{num}/content/{path}");
                let full_path = version_dir.join("content").join(path);
                if let Some(parent) = full_path.parent() {
                    fs::create_dir_all(parent).unwrap();
                }
                fs::write(&full_path, content).unwrap();
                manifest.entry(digest.clone()).or_default().push(content_path.clone());
                content_path
            });

            state.entry(digest).or_default().push((*path).to_string());
        }

        versions_json.insert(
            format!("v{num}"),
            serde_json::json!({
                "created": version.created,
                "state": state,
                "message": version.message,
                "user": {
                    "name": version.user_name,
                    "address": version.user_address,
                },
            }),
        );
    }

    let inventory = serde_json::json!({
        "id": object_id,
        "type": "https://ocfl.io/1.0/spec/#inventory",
        "digestAlgorithm": "sha512",
        "contentDirectory": null,
        "head": format!("v{head}"),
        "manifest": manifest,
        "versions": versions_json,
    });

    let body = serde_json::to_vec_pretty(&inventory).unwrap();
    let digest = hex::encode(Sha512::digest(&body));

    fs::write(object_root.join("inventory.json"), &body).unwrap();
    fs::write(
        object_root.join("inventory.json.sha512"),
        format!("{digest}  inventory.json\n"),
    )
    .unwrap();
}
