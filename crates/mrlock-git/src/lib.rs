//! Git object hashing and a subprocess-backed Git cache.
//!
//! # Crate layout
//!
//! - [`oid`] — the [`GitOid`] object identifier and tree-entry types.
//! - [`codec`] — SHA-1 object hashing and the canonical tree encoding.
//! - [`object_store`] — hand-written loose-object writes, used when
//!   importing a directory tree that must be staged byte-for-byte.
//! - [`cache`] — the shared bare repository, driven through `git` itself
//!   for everything that needs real history (fetch, tag, commit-tree).
//! - [`error`] — the [`GitError`] enum returned by all operations here.

pub mod cache;
pub mod codec;
pub mod error;
pub mod object_store;
pub mod oid;

pub use cache::GitCache;
pub use error::GitError;
pub use oid::{EntryMode, GitOid, OidParseError, TreeEntry};
