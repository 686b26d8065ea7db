//! Storage-agnostic read model over [OCFL repositories](https://ocfl.io/): inventory parsing,
//! path types, digests, and the `BackingStore` abstraction the index engine builds on.

pub use self::digest::{DigestAlgorithm, HexDigest};
pub use self::error::{OcflError, Result};
pub use self::inventory::{
    find_object_roots, read_storage_root_declaration, FsInventoryReader, Inventory,
    InventoryReader, User, Version,
};
pub use self::store::{BackingStore, FileStat, Listing, LocalStore};
pub use self::types::*;

mod bimap;
pub(crate) mod consts;
mod digest;
mod error;
mod inventory;
pub mod store;
mod types;
