//! Job status vocabulary.
//!
//! [`JobStatus`] is the client-side lifecycle of one submission cycle;
//! [`RemoteStatus`] is the subset the conversion service reports from
//! its progress endpoint.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of the current job.
///
/// Transitions only move forward within a submission cycle:
/// `idle -> queued -> processing -> {done | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// A source may be selected but nothing has been submitted.
    #[default]
    Idle,
    /// Accepted by the service, waiting for a worker.
    Queued,
    /// Being converted.
    Processing,
    /// Finished and the artifact has been fetched.
    Done,
    /// Failed; see the job's failure kind.
    Error,
}

impl JobStatus {
    /// `done` or `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// `queued` or `processing`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Idle, Queued)
                | (Queued, Queued | Processing | Done | Error)
                | (Processing, Processing | Done | Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status values the progress endpoint can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl From<RemoteStatus> for JobStatus {
    fn from(value: RemoteStatus) -> Self {
        match value {
            RemoteStatus::Queued => JobStatus::Queued,
            RemoteStatus::Processing => JobStatus::Processing,
            RemoteStatus::Done => JobStatus::Done,
            RemoteStatus::Error => JobStatus::Error,
        }
    }
}

/// Why a job (or a submission attempt) ended without an artifact.
///
/// None of these are retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The submission endpoint was unreachable or rejected the source.
    SubmissionFailed,
    /// A status check failed at the transport level.
    PollingFailed,
    /// The service itself reported `status=error`.
    JobFailed,
    /// The service reported `done` but the artifact could not be retrieved.
    ResultFetchFailed,
    /// The job exceeded the poll attempt or wall-clock ceiling.
    Timeout,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubmissionFailed => "submission_failed",
            Self::PollingFailed => "polling_failed",
            Self::JobFailed => "job_failed",
            Self::ResultFetchFailed => "result_fetch_failed",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
