//! Conversion service client and job orchestration.
//!
//! Submits a source document to the SonicTwin conversion service,
//! polls its progress on a fixed cadence, and fetches the rendered
//! audio exactly once when the job finishes. [`store::JobStateStore`]
//! is the entry point; the other modules are its parts.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod poller;
pub mod store;
pub mod submitter;

pub use config::ClientConfig;
pub use error::JobError;
pub use store::{JobSnapshot, JobStateStore};
