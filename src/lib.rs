//! `ocfl-index`: an indexed, read-only access engine for [OCFL](https://ocfl.io/) repositories.
//! A relational index over inventories is kept coherent with the backing store lazily, by the
//! sync controller, and queried through the access service -- the crate never mutates an OCFL
//! repository itself.

pub mod backfill;
pub mod cancel;
pub mod clock;
pub mod cmd;
pub mod config;
pub mod db;
pub mod diff;
pub mod digest_state;
pub mod error;
pub mod ocfl;
pub mod service;
pub mod singleflight;
pub mod sync;

pub use error::{IndexError, Result};
pub use service::AccessService;
