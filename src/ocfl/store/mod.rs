use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::ocfl::error::{OcflError, Result};

/// Abstraction over reading files and listing directory contents on the physical filesystem
/// backing an OCFL storage root. `/` _must_ be used as the path separator regardless of the
/// host platform.
///
/// This is the only seam between the index engine and a concrete storage medium (local disk,
/// S3, HTTP); only a local-disk implementation ships with this crate.
pub trait BackingStore: Send + Sync {
    /// Opens the file at `path` for reading.
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Returns size and modification time for the file at `path`.
    fn stat_file(&self, path: &str) -> Result<FileStat>;

    /// Reads the file at `path` in full and writes it to `sink`.
    fn read(&self, path: &str, sink: &mut dyn Write) -> Result<()> {
        let mut file = self.open_file(path)?;
        std::io::copy(&mut file, sink)?;
        Ok(())
    }

    /// Lists the contents of the directory at `path`. If `recursive` is `true`, every leaf node
    /// beneath `path` is returned; otherwise only the immediate children. Returned paths are
    /// relative to `path`. An absent or empty directory yields an empty vector, not an error.
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Listing>>;
}

/// Size and modification time for a file on the backing store.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// An entry encountered while listing a directory on the backing store.
#[derive(Debug, Hash, Eq, PartialEq)]
pub enum Listing<'a> {
    /// A regular file
    File(Cow<'a, str>),
    /// A directory
    Directory(Cow<'a, str>),
    /// Anything that is not a regular file or directory, e.g. a symbolic link
    Other(Cow<'a, str>),
}

impl<'a> Listing<'a> {
    pub fn file(path: &str) -> Listing {
        Listing::File(Cow::Borrowed(path))
    }

    pub fn dir(path: &str) -> Listing {
        Listing::Directory(Cow::Borrowed(path))
    }

    pub fn file_owned(path: String) -> Listing<'a> {
        Listing::File(Cow::Owned(path))
    }

    pub fn dir_owned(path: String) -> Listing<'a> {
        Listing::Directory(Cow::Owned(path))
    }

    pub fn path(&self) -> &str {
        match self {
            Listing::File(path) => path,
            Listing::Directory(path) => path,
            Listing::Other(path) => path,
        }
    }
}

/// A `BackingStore` over a directory on the local filesystem.
#[derive(Clone)]
pub struct LocalStore {
    root: std::path::PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path)
    }
}

impl BackingStore for LocalStore {
    fn open_file(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let full = self.resolve(path);
        match File::open(&full) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn stat_file(&self, path: &str) -> Result<FileStat> {
        let full = self.resolve(path);
        match std::fs::metadata(&full) {
            Ok(meta) => Ok(FileStat {
                size: meta.len(),
                modified: meta.modified().ok(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcflError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<Listing>> {
        let full = self.resolve(path);

        if !full.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(&full).min_depth(1);
        let walker = if recursive { walker } else { walker.max_depth(1) };

        for entry in walker {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&full)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            if entry.file_type().is_dir() {
                entries.push(Listing::dir_owned(relative));
            } else if entry.file_type().is_file() {
                entries.push(Listing::file_owned(relative));
            } else {
                entries.push(Listing::Other(Cow::Owned(relative)));
            }
        }

        Ok(entries)
    }
}
