//! Clap-derive CLI argument definitions, narrowed from `rocfl`'s `cmd/opts.rs` to the read-only
//! operation set the Access Service exposes (spec §4.1): no `new`/`cp`/`mv`/`rm`/`commit`, no
//! S3/staging flags.

use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;

/// A CLI for browsing an indexed, read-only view of an OCFL repository.
///
/// `ocfl-index` keeps a relational index of an OCFL storage root's inventories and answers
/// directory-listing, file-stat, version-history, and version-diff queries against that index
/// instead of rescanning inventories on every call. The index is refreshed lazily: each query
/// first syncs the object it addresses against the backing store's inventory sidecar.
#[derive(Debug, Parser)]
#[command(name = "ocfl-index", author = "Peter Winckles <pwinckles@pm.me>", version)]
pub struct IndexArgs {
    /// Name of the index scope ("root") to query. Roots are created on first write.
    #[arg(short, long, value_name = "NAME", default_value = "default")]
    pub name: String,

    /// Absolute or relative path to the OCFL storage root on the local filesystem.
    #[arg(short, long, value_name = "ROOT_PATH")]
    pub root: Option<String>,

    /// Path to the SQLite index database, or ':memory:' for a private in-memory index.
    #[arg(short, long, value_name = "DB_PATH")]
    pub database: Option<String>,

    /// Minimum delay, in seconds, between re-checks of one object's inventory sidecar.
    #[arg(long, value_name = "SECONDS")]
    pub refresh_interval_secs: Option<u64>,

    /// Number of worker threads used to backfill unknown content-file sizes after a re-index.
    #[arg(long, value_name = "N")]
    pub stat_concurrency: Option<usize>,

    /// Suppress error messages and other command-specific logging
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase log level
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Disable all output styling
    #[arg(short = 'S', long)]
    pub no_styles: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[enum_dispatch(Cmd)]
#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "ls")]
    List(ListCmd),
    #[command(name = "log")]
    Log(LogCmd),
    #[command(name = "show")]
    Show(ShowCmd),
    #[command(name = "diff")]
    Diff(DiffCmd),
    #[command(name = "cat")]
    Cat(CatCmd),
    #[command(name = "sync")]
    Sync(SyncCmd),
    #[command(name = "index")]
    Index(IndexCmd),
}

/// List the contents of a directory within an indexed version's state, or stat a single file.
///
/// Reads through the index, syncing the object against the backing store first. A `PATH` that
/// resolves to a live file is stat'd directly rather than treated as an empty directory.
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Enable long output: Version, Updated, Size, Name
    #[arg(short, long)]
    pub long: bool,

    /// Display the digest of each file in the format 'algorithm:digest'
    #[arg(short, long)]
    pub digest: bool,

    /// Display a header row
    #[arg(short = 'H', long)]
    pub header: bool,

    /// Version of the object to list. Defaults to the head version.
    #[arg(short, long, value_name = "VERSION")]
    pub version: Option<i64>,

    /// ID of the object to list
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,

    /// Directory, or file, path within the object. Defaults to the object root.
    #[arg(value_name = "PATH")]
    pub path: Option<String>,
}

/// Display version history of an object.
#[derive(Args, Debug)]
pub struct LogCmd {
    /// Compact format
    #[arg(short, long)]
    pub compact: bool,

    /// Reverse the order the versions are displayed
    #[arg(short, long)]
    pub reverse: bool,

    /// ID of the object
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,
}

/// Show a version's metadata and its changes relative to the previous version.
#[derive(Args, Debug)]
pub struct ShowCmd {
    /// Suppress the version metadata output
    #[arg(short, long)]
    pub minimal: bool,

    /// ID of the object
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,

    /// The version to show. Defaults to the head version.
    #[arg(value_name = "VERSION")]
    pub version: Option<i64>,
}

/// Show the files that changed between two versions of an object.
#[derive(Args, Debug)]
pub struct DiffCmd {
    /// ID of the object
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,

    /// Left-hand side version. 0 means "before version 1".
    #[arg(value_name = "LEFT_VERSION")]
    pub left: u32,

    /// Right-hand side version
    #[arg(value_name = "RIGHT_VERSION")]
    pub right: i64,
}

/// Print the contents of a file within an object to stdout.
#[derive(Args, Debug)]
pub struct CatCmd {
    /// The version of the object to retrieve the file from. Defaults to the head version.
    #[arg(short, long, value_name = "VERSION")]
    pub version: Option<i64>,

    /// ID of the object
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,

    /// Logical path of the file
    #[arg(value_name = "PATH")]
    pub path: String,
}

/// Force a sync of a single object against the backing store and print its current brief.
#[derive(Args, Debug)]
pub struct SyncCmd {
    /// ID of the object
    #[arg(value_name = "OBJ_ID")]
    pub object_id: String,
}

/// Reconcile the index against every object declaration under the configured storage root.
#[derive(Args, Debug)]
pub struct IndexCmd {}
