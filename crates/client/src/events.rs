//! Job lifecycle events broadcast by the state store.
//!
//! The consuming context subscribes via
//! [`JobStateStore::subscribe`](crate::store::JobStateStore::subscribe)
//! and renders notifications from these. Each failed job or submission
//! produces exactly one [`JobEvent::Failed`].

use std::path::PathBuf;

use serde::Serialize;
use sonictwin_core::status::{FailureKind, JobStatus};
use sonictwin_core::types::JobId;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new source document replaced the previous one.
    SourceSelected { file_name: String, bytes: usize },

    /// The service accepted the source and assigned an id.
    Submitted { job_id: JobId },

    /// A poll tick reported progress.
    Progress {
        job_id: JobId,
        status: JobStatus,
        /// Completion percentage (0-100).
        percent: u8,
    },

    /// The result was fetched and is available locally.
    Completed {
        job_id: JobId,
        artifact_path: PathBuf,
        bytes: u64,
    },

    /// The job or its submission failed.
    Failed {
        /// `None` when the submission itself failed.
        job_id: Option<JobId>,
        kind: FailureKind,
        /// Human-readable error description.
        error: String,
    },

    /// Polling was stopped before a terminal state (reset or teardown).
    Cancelled { job_id: JobId },

    /// The job record was cleared.
    Reset,
}
