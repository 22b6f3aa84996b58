//! The single job record and its transition methods.
//!
//! [`Job`] fields are private. Every change goes through a method that
//! checks [`JobStatus::can_transition_to`], which keeps a submission
//! cycle moving forward and makes `artifact` present exactly when the
//! status is `done`. Starting over means replacing the record with
//! [`Job::new`]; dropping the old one releases its artifact file.

use chrono::Utc;
use serde::Serialize;

use crate::artifact::ArtifactHandle;
use crate::error::CoreError;
use crate::status::{FailureKind, JobStatus};
use crate::types::{JobId, Timestamp, PERCENT_MAX};

/// Terminal failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// State of the one job a client instance tracks.
#[derive(Debug, Default)]
pub struct Job {
    id: Option<JobId>,
    status: JobStatus,
    percent: u8,
    artifact: Option<ArtifactHandle>,
    failure: Option<JobFailure>,
    submitted_at: Option<Timestamp>,
    finished_at: Option<Timestamp>,
}

impl Job {
    /// An idle job with nothing assigned.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&JobId> {
        self.id.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Raw completion percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Percentage suitable for display: hidden once the job has failed.
    pub fn visible_percent(&self) -> Option<u8> {
        match self.status {
            JobStatus::Error => None,
            _ => Some(self.percent),
        }
    }

    pub fn artifact(&self) -> Option<&ArtifactHandle> {
        self.artifact.as_ref()
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    pub fn submitted_at(&self) -> Option<Timestamp> {
        self.submitted_at
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// Record the id the service assigned and move to `queued`.
    pub fn mark_submitted(&mut self, id: JobId) -> Result<(), CoreError> {
        if let Some(existing) = &self.id {
            return Err(CoreError::Conflict(format!(
                "Job already has id {existing}"
            )));
        }
        self.transition(JobStatus::Queued)?;
        self.id = Some(id);
        self.percent = 0;
        self.submitted_at = Some(Utc::now());
        Ok(())
    }

    /// Apply a non-terminal progress report (`queued` / `processing`).
    pub fn apply_progress(&mut self, status: JobStatus, percent: u8) -> Result<(), CoreError> {
        if !status.is_active() {
            return Err(CoreError::Validation(format!(
                "Progress updates only carry queued/processing, got {status}"
            )));
        }
        self.transition(status)?;
        self.percent = percent.min(PERCENT_MAX);
        Ok(())
    }

    /// Note that the service reported `done`; the status itself only
    /// becomes `done` once [`complete`](Self::complete) attaches the result.
    pub fn observe_done(&mut self, percent: u8) -> Result<(), CoreError> {
        if !self.status.is_active() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: JobStatus::Done,
            });
        }
        self.percent = percent.min(PERCENT_MAX);
        Ok(())
    }

    /// Attach the fetched result and move to `done`.
    pub fn complete(&mut self, artifact: ArtifactHandle) -> Result<(), CoreError> {
        if self.id.as_ref() != Some(artifact.job_id()) {
            return Err(CoreError::Conflict(format!(
                "Result for job {} does not belong to this job",
                artifact.job_id()
            )));
        }
        self.transition(JobStatus::Done)?;
        self.percent = PERCENT_MAX;
        self.artifact = Some(artifact);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Move to `error`, recording why.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<(), CoreError> {
        self.transition(JobStatus::Error)?;
        self.failure = Some(JobFailure {
            kind,
            message: message.into(),
        });
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn id(raw: &str) -> JobId {
        JobId::new(raw).unwrap()
    }

    fn submitted(raw: &str) -> Job {
        let mut job = Job::new();
        job.mark_submitted(id(raw)).unwrap();
        job
    }

    #[test]
    fn new_job_is_idle_and_empty() {
        let job = Job::new();
        assert_eq!(job.status(), JobStatus::Idle);
        assert_eq!(job.percent(), 0);
        assert!(job.id().is_none());
        assert!(job.artifact().is_none());
        assert!(job.failure().is_none());
    }

    #[test]
    fn submission_sets_id_and_queues() {
        let job = submitted("abc");
        assert_eq!(job.status(), JobStatus::Queued);
        assert_eq!(job.id().map(JobId::as_str), Some("abc"));
        assert!(job.submitted_at().is_some());
    }

    #[test]
    fn id_is_assigned_once() {
        let mut job = submitted("abc");
        assert_matches!(job.mark_submitted(id("def")), Err(CoreError::Conflict(_)));
        assert_eq!(job.id().map(JobId::as_str), Some("abc"));
    }

    #[test]
    fn progress_updates_status_and_percent() {
        let mut job = submitted("abc");
        job.apply_progress(JobStatus::Processing, 40).unwrap();
        job.apply_progress(JobStatus::Processing, 80).unwrap();
        assert_eq!(job.status(), JobStatus::Processing);
        assert_eq!(job.percent(), 80);
    }

    #[test]
    fn progress_cannot_regress_to_queued() {
        let mut job = submitted("abc");
        job.apply_progress(JobStatus::Processing, 40).unwrap();
        assert_matches!(
            job.apply_progress(JobStatus::Queued, 10),
            Err(CoreError::InvalidTransition {
                from: JobStatus::Processing,
                to: JobStatus::Queued
            })
        );
        assert_eq!(job.percent(), 40);
    }

    #[test]
    fn progress_rejects_terminal_status() {
        let mut job = submitted("abc");
        assert_matches!(
            job.apply_progress(JobStatus::Done, 100),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn progress_on_idle_job_is_rejected() {
        let mut job = Job::new();
        assert_matches!(
            job.apply_progress(JobStatus::Processing, 10),
            Err(CoreError::InvalidTransition { .. })
        );
    }

    #[test]
    fn complete_attaches_artifact_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = submitted("abc");
        job.observe_done(100).unwrap();
        assert_eq!(job.status(), JobStatus::Queued);

        let handle = ArtifactHandle::spool(id("abc"), b"RIFF", dir.path()).unwrap();
        job.complete(handle).unwrap();
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.percent(), 100);
        assert!(job.artifact().is_some());
        assert!(job.finished_at().is_some());

        let again = ArtifactHandle::spool(id("abc"), b"RIFF", dir.path()).unwrap();
        let again_path = again.path().to_path_buf();
        assert_matches!(job.complete(again), Err(CoreError::InvalidTransition { .. }));
        // The rejected handle was dropped and its file released.
        assert!(!again_path.exists());
    }

    #[test]
    fn complete_rejects_foreign_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = submitted("abc");
        let handle = ArtifactHandle::spool(id("zzz"), b"RIFF", dir.path()).unwrap();
        assert_matches!(job.complete(handle), Err(CoreError::Conflict(_)));
        assert_eq!(job.status(), JobStatus::Queued);
    }

    #[test]
    fn failure_hides_percent() {
        let mut job = submitted("x1");
        job.apply_progress(JobStatus::Processing, 55).unwrap();
        job.fail(FailureKind::JobFailed, "service reported error").unwrap();

        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.visible_percent(), None);
        assert_eq!(job.failure().map(|f| f.kind), Some(FailureKind::JobFailed));
        assert!(job.artifact().is_none());
    }

    #[test]
    fn nothing_leaves_error() {
        let mut job = submitted("x1");
        job.fail(FailureKind::PollingFailed, "connection refused").unwrap();
        assert!(job.apply_progress(JobStatus::Processing, 10).is_err());
        assert!(job.observe_done(100).is_err());
        assert!(job.fail(FailureKind::Timeout, "again").is_err());
        assert_eq!(job.failure().map(|f| f.kind), Some(FailureKind::PollingFailed));
    }

    #[test]
    fn replacing_job_releases_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = submitted("abc");
        job.complete(ArtifactHandle::spool(id("abc"), b"RIFF", dir.path()).unwrap())
            .unwrap();
        let path = job.artifact().unwrap().path().to_path_buf();
        assert!(path.exists());

        job = Job::new();
        assert!(!path.exists());
        assert_eq!(job.status(), JobStatus::Idle);
    }
}
