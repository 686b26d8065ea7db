//! Bounded-concurrency content-file size backfill (spec §4.4). There's no prior art for a scoped
//! stat pool in the corpus, so this is built directly on `std::thread::scope` and `std::sync::mpsc`
//! rather than reaching for a new channel/executor dependency -- nothing else in the stack pulls
//! one in, and the job is simple enough (a bounded fan-out over `stat_file` calls) that std
//! suffices.

use std::sync::Mutex;

use crate::cancel::CancelToken;
use crate::error::{IndexError, Result};
use crate::ocfl::BackingStore;

/// Stats the file at `content_path` (already resolved to a path the backing store can open --
/// callers are responsible for joining an object's storage path onto its manifest-relative
/// content paths) for every `(digest, content_path)` pair, using up to `concurrency` worker
/// threads, and returns `(digest, size)` pairs. One stat per unique digest: callers should
/// de-duplicate by digest before calling this (`db::IndexStore::list_missing_sizes` already does).
///
/// If cancellation is observed partway through, returns `Err(IndexError::Cancelled)` and
/// discards any sizes already collected -- the backfill writes its results in one transaction,
/// so a cancelled run must not produce a partial one.
pub fn backfill_sizes<S: BackingStore>(
    store: &S,
    requests: Vec<(String, String)>,
    concurrency: usize,
    cancel: &CancelToken,
) -> Result<Vec<(String, u64)>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let worker_count = concurrency.max(1).min(requests.len());
    let work = Mutex::new(requests.into_iter());
    let (result_tx, result_rx) = std::sync::mpsc::channel::<Result<(String, u64)>>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let work = &work;
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();

            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    return;
                }

                let next = work.lock().unwrap().next();
                let (digest, content_path) = match next {
                    Some(item) => item,
                    None => return,
                };

                let outcome = store
                    .stat_file(&content_path)
                    .map(|stat| (digest, stat.size))
                    .map_err(IndexError::from);

                if result_tx.send(outcome).is_err() {
                    return;
                }
            });
        }
        drop(result_tx);

        let mut sizes = Vec::new();
        for outcome in result_rx {
            sizes.push(outcome?);
        }

        cancel.check()?;
        Ok(sizes)
    })
}
