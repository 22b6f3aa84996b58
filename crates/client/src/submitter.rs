//! Source submission.

use std::sync::Arc;

use sonictwin_core::artifact::SourceArtifact;
use sonictwin_core::types::JobId;

use crate::api::ConversionService;
use crate::error::JobError;

/// Sends a source document to the conversion service.
///
/// Holds no state of its own: the caller records the returned id and
/// decides whether polling starts.
pub struct JobSubmitter {
    service: Arc<dyn ConversionService>,
}

impl JobSubmitter {
    pub fn new(service: Arc<dyn ConversionService>) -> Self {
        Self { service }
    }

    /// Submit `source` and return the id the service assigned.
    ///
    /// Any transport error, non-2xx response, or blank id is reported
    /// as [`JobError::SubmissionFailed`].
    pub async fn submit(&self, source: &SourceArtifact) -> Result<JobId, JobError> {
        tracing::info!(
            file_name = %source.file_name(),
            bytes = source.len(),
            media_type = %source.media_type(),
            "Submitting source for conversion",
        );

        let response = self
            .service
            .submit(source)
            .await
            .map_err(|e| JobError::SubmissionFailed(e.to_string()))?;

        let job_id = JobId::new(response.job_id)
            .map_err(|e| JobError::SubmissionFailed(format!("Service returned no job id: {e}")))?;

        tracing::info!(job_id = %job_id, "Source accepted by conversion service");
        Ok(job_id)
    }
}
