//! Result retrieval for finished jobs.

use std::path::PathBuf;
use std::sync::Arc;

use sonictwin_core::artifact::ArtifactHandle;
use sonictwin_core::types::JobId;

use crate::api::ConversionService;
use crate::error::JobError;

/// Downloads the rendered audio for a job the service reported `done`
/// and spools it into a local [`ArtifactHandle`].
///
/// No retry: a failed download ends the job with
/// [`JobError::ResultFetchFailed`].
pub struct ResultFetcher {
    service: Arc<dyn ConversionService>,
    artifact_dir: PathBuf,
}

impl ResultFetcher {
    pub fn new(service: Arc<dyn ConversionService>, artifact_dir: PathBuf) -> Self {
        Self {
            service,
            artifact_dir,
        }
    }

    pub async fn fetch(&self, job_id: &JobId) -> Result<ArtifactHandle, JobError> {
        let bytes = self
            .service
            .get_result(job_id)
            .await
            .map_err(|e| JobError::ResultFetchFailed(e.to_string()))?;

        tracing::debug!(job_id = %job_id, bytes = bytes.len(), "Result downloaded");

        let id = job_id.clone();
        let dir = self.artifact_dir.clone();
        let handle = tokio::task::spawn_blocking(move || ArtifactHandle::spool(id, &bytes, &dir))
            .await
            .map_err(|e| JobError::ResultFetchFailed(format!("Spool task failed: {e}")))?
            .map_err(|e| JobError::ResultFetchFailed(e.to_string()))?;

        tracing::info!(
            job_id = %job_id,
            bytes = handle.len(),
            path = %handle.path().display(),
            "Result spooled",
        );
        Ok(handle)
    }
}
