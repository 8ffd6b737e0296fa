//! Merge engine for the shipyard worker.
//!
//! A merge task touches every tracked repository at once. The worker keeps
//! one clone of each repository per worker instance (a
//! [`RepositoryWorkspace`]), drives the same git step through all of them,
//! and reads the combined, delimited transcript when something goes wrong.
//!
//! # Modules
//!
//! - [`catalog`]: [`RepositoryCatalog`]: where the list of tracked repositories comes from
//! - [`workspace`]: [`RepositoryWorkspace`], clone bootstrap and per-repository fan-out
//! - [`training`]: Conflict training (rerere replay) with per-branch markers
//! - [`parse`]: Merge transcript parser and report renderer
//! - [`resolver`]: [`MergeConflictResolver`], the merge state machine and branch creation
//! - [`error`]: Error types

pub mod catalog;
pub mod error;
pub mod parse;
pub mod resolver;
pub mod training;
pub mod workspace;

pub use catalog::{repository_name, ManifestCatalog, RepositoryCatalog, StaticCatalog};
pub use error::{MergeError, Result};
pub use parse::{parse_merge_output, MergeReport, NO_OP_BODIES};
pub use resolver::{MergeConflictResolver, ResolverSettings, AUTO_RESOLVE_MESSAGE, PUBLISH_GATE};
pub use training::{marker_path, TrainingSettings};
pub use workspace::{FanOut, Repository, RepositoryWorkspace, SECTION_DELIMITER};
