//! mrlock library crate — re-exports the domain modules that implement
//! multi-repository lockfile generation.
//!
//! The primary interface is the `mrlock` CLI binary (in the mrlock-cli
//! crate), which wires these modules together in [`orchestrator`].

pub mod checkout;
pub mod closure;
pub mod clone;
pub mod dedup;
pub mod error;
pub mod import;
pub mod lockfile;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod rewrite;
