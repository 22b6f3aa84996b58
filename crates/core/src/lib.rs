//! Domain types for the SonicTwin conversion client.
//!
//! Everything here is synchronous and runtime-free: job identifiers,
//! statuses, the [`job::Job`] state machine, and the source / result
//! artifacts it carries.

pub mod artifact;
pub mod error;
pub mod job;
pub mod status;
pub mod types;
