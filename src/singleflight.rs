//! Single-flight de-duplication (spec §4.3/§9): concurrent `SyncObject` calls against the same
//! object id coalesce onto one underlying sync, with every caller waiting on and receiving that
//! sync's outcome. There's no direct analog in the teacher repo (it has no concurrent-caller
//! story at all); this is a keyed in-progress map guarded by a short lock, built directly on
//! `std::sync::{Mutex, Condvar}` the way the rest of the new concurrency-control code in this
//! crate avoids pulling in an async runtime or channel crate for a small, bounded job.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{IndexError, Result};

enum WaiterState<T> {
    Pending,
    Done(std::result::Result<T, String>),
}

struct Waiter<T> {
    state: Mutex<WaiterState<T>>,
    condvar: Condvar,
}

impl<T> Waiter<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(WaiterState::Pending),
            condvar: Condvar::new(),
        }
    }
}

/// A keyed single-flight group. One `SingleFlight` instance is shared by every caller of the
/// Sync Controller; `join` is called with the object's key (`"obj:" + id`, per spec §4.3).
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Arc<Waiter<T>>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` for `key` if no sync for that key is already in flight, otherwise blocks until
    /// the in-flight call completes and returns its outcome. The caller that actually runs `f`
    /// (the "leader") gets `f`'s real error on failure; callers that joined (the "followers")
    /// get an `IndexError::Conflict` wrapping the leader's rendered message, since `IndexError`
    /// itself isn't `Clone` (it carries driver error types that aren't).
    pub fn join<F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let (waiter, is_leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let waiter = Arc::new(Waiter::new());
                    inflight.insert(key.to_string(), Arc::clone(&waiter));
                    (waiter, true)
                }
            }
        };

        if is_leader {
            let outcome = f();

            let rendered = match &outcome {
                Ok(value) => Ok(value.clone()),
                Err(e) => Err(e.to_string()),
            };
            *waiter.state.lock().unwrap() = WaiterState::Done(rendered);
            waiter.condvar.notify_all();

            self.inflight.lock().unwrap().remove(key);
            return outcome;
        }

        let mut state = waiter.state.lock().unwrap();
        loop {
            match &*state {
                WaiterState::Pending => {
                    state = waiter.condvar.wait(state).unwrap();
                }
                WaiterState::Done(result) => {
                    return result.clone().map_err(|msg| {
                        IndexError::Conflict(format!(
                            "joined an in-flight sync that failed: {msg}"
                        ))
                    });
                }
            }
        }
    }
}
