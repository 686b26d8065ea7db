//! Entry point for the `ocfl-index` CLI, wiring the `clap`-parsed arguments, resolved
//! configuration, and concrete collaborators (local-disk backing store, `inventory.json`
//! reader, SQLite index store, real wall clock) into one `cmd::Service` and dispatching to it.

use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use ocfl_index::cancel::CancelToken;
use ocfl_index::clock::RealClock;
use ocfl_index::cmd::opts::IndexArgs;
use ocfl_index::cmd::{exec_command, print_err};
use ocfl_index::config::{load_config, PartialConfig};
use ocfl_index::db::IndexStore;
use ocfl_index::ocfl::{FsInventoryReader, LocalStore};
use ocfl_index::service::AccessService;
use ocfl_index::sync::SyncController;

fn main() {
    let args = IndexArgs::parse();

    init_logging(&args);

    if let Err(e) = run(&args) {
        print_err(&e, args.quiet);
        exit(1);
    }
}

fn run(args: &IndexArgs) -> ocfl_index::Result<()> {
    let config = load_config(PartialConfig {
        refresh_interval_secs: args.refresh_interval_secs,
        stat_concurrency: args.stat_concurrency,
        database_uri: args.database.clone(),
        backing_store_location: args.root.clone(),
    })?
    .resolve()?;

    let store = LocalStore::new(&config.backing_store_location);
    let reader = FsInventoryReader::new(store.clone());
    let db = Arc::new(IndexStore::open(&config.database_uri)?);
    let clock = Arc::new(RealClock);

    let sync = SyncController::new(
        db.clone(),
        reader,
        store.clone(),
        clock,
        args.name.clone(),
        config.refresh_interval,
        config.stat_concurrency,
    );
    let service = AccessService::new(db, sync, store);

    let cancel = CancelToken::new();
    let ctrlc_token = cancel.clone();
    // Best-effort: if a handler is already installed in this process, proceed uncancellable.
    let _ = ctrlc::set_handler(move || ctrlc_token.cancel());

    exec_command(args, &service, &cancel)
}

fn init_logging(args: &IndexArgs) {
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new().filter_level(level).init();
}
