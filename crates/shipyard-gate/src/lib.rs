//! Exclusive publish gate for the shipyard worker.
//!
//! Pushing to the mainline is the one action that several worker processes
//! on a host may race for. An [`ExclusiveGate`] names that resource and maps
//! it to a lock file under a shared lock directory; [`ExclusiveGate::lock`]
//! blocks until this process holds an exclusive `flock` on the file, and the
//! returned [`GateGuard`] releases it when dropped.
//!
//! # Modules
//!
//! - [`gate`]: [`ExclusiveGate`] and [`GateGuard`]
//! - [`error`]: Error types

pub mod error;
pub mod gate;

pub use error::{GateError, Result};
pub use gate::{ExclusiveGate, GateGuard};
