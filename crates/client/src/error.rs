use sonictwin_core::error::CoreError;
use sonictwin_core::status::FailureKind;

/// Errors surfaced by job orchestration.
///
/// The first five variants end a job (or a submission attempt) and map
/// onto a [`FailureKind`]. The remaining ones are rejections at the
/// store boundary that never touch the job record.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Polling failed: {0}")]
    PollingFailed(String),

    #[error("Job failed on the conversion service")]
    JobFailed,

    #[error("Failed to fetch result: {0}")]
    ResultFetchFailed(String),

    #[error("Job did not finish after {attempts} status checks ({elapsed_ms} ms)")]
    Timeout { attempts: u32, elapsed_ms: u64 },

    #[error("No source document selected")]
    NoSource,

    #[error("A submission is already in flight")]
    AlreadyInFlight,

    #[error("Source was replaced while the submission was in flight")]
    Superseded,

    #[error("No result available")]
    NoArtifact,

    #[error("Client has been shut down")]
    ShutDown,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl JobError {
    /// The job-level failure this error represents, if any.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::SubmissionFailed(_) => Some(FailureKind::SubmissionFailed),
            Self::PollingFailed(_) => Some(FailureKind::PollingFailed),
            Self::JobFailed => Some(FailureKind::JobFailed),
            Self::ResultFetchFailed(_) => Some(FailureKind::ResultFetchFailed),
            Self::Timeout { .. } => Some(FailureKind::Timeout),
            Self::NoSource
            | Self::AlreadyInFlight
            | Self::Superseded
            | Self::NoArtifact
            | Self::ShutDown
            | Self::Core(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_variants_map_to_kinds() {
        assert_eq!(
            JobError::SubmissionFailed("503".into()).kind(),
            Some(FailureKind::SubmissionFailed)
        );
        assert_eq!(JobError::JobFailed.kind(), Some(FailureKind::JobFailed));
        assert_eq!(
            JobError::Timeout {
                attempts: 3,
                elapsed_ms: 3000
            }
            .kind(),
            Some(FailureKind::Timeout)
        );
    }

    #[test]
    fn boundary_rejections_have_no_kind() {
        assert_eq!(JobError::NoSource.kind(), None);
        assert_eq!(JobError::AlreadyInFlight.kind(), None);
        assert_eq!(JobError::Superseded.kind(), None);
    }
}
