//! Ambient infrastructure shared by the rest of the workspace.
//!
//! This crate has no knowledge of Git objects, lockfiles, or repository
//! graphs — it provides the plumbing everything else is built on: advisory
//! file locks, a uniform subprocess launcher, an immutable invocation
//! context, and a feature-gated failpoint registry for deterministic tests.

pub mod context;
pub mod error;
pub mod failpoints;
pub mod locking;
pub mod process;

pub use context::InvocationContext;
pub use error::CoreError;
pub use locking::{FileLock, LockMode};
pub use process::{Launcher, RunOutput};
