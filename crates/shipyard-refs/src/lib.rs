//! Branch policy for the shipyard worker.
//!
//! Merge tasks name branches that end up as git arguments and decide which
//! long-lived branches this worker may touch. This crate holds both checks:
//!
//! - [`filter`]: [`BranchFilter`], the allow/deny predicate evaluated
//!   before any repository work starts
//! - [`names`]: git-style validation of task-supplied branch names
//! - [`error`]: Error types

pub mod error;
pub mod filter;
pub mod names;

pub use error::{RefError, Result};
pub use filter::{BranchFilter, BranchPolicy};
pub use names::validate_branch_name;
