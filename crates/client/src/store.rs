//! Authoritative state of the current job.
//!
//! [`JobStateStore`] owns the one [`Job`] record, the selected source,
//! and the active [`PollHandle`]. The presentation side only reads
//! (snapshots, the watch channel, the event stream). Writes come from
//! two places: the store's own methods (`select_source`, `reset`,
//! `submit`) and the poll task through a [`StateWriter`].
//!
//! Every reset advances a submission *cycle*. A writer is bound to the
//! cycle it was created in and refuses to touch the record once the
//! store has moved on, so a late tick from a cancelled poller can never
//! overwrite a newer job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sonictwin_core::artifact::{ArtifactHandle, SourceArtifact};
use sonictwin_core::error::CoreError;
use sonictwin_core::job::{Job, JobFailure};
use sonictwin_core::status::{FailureKind, JobStatus};
use sonictwin_core::types::{JobId, Timestamp};
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{ConversionApi, ConversionApiError, ConversionService};
use crate::config::ClientConfig;
use crate::error::JobError;
use crate::events::JobEvent;
use crate::fetcher::ResultFetcher;
use crate::poller::{PollConfig, PollHandle, ProgressPoller};
use crate::submitter::JobSubmitter;

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `shutdown` waits for the poll task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// JobSnapshot
// ---------------------------------------------------------------------------

/// Read-only view of the store for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    /// Completion percentage; `None` once the job has failed.
    pub percent: Option<u8>,
    /// A submission or poll is in flight.
    pub loading: bool,
    pub source_name: Option<String>,
    pub artifact_path: Option<PathBuf>,
    pub artifact_bytes: Option<u64>,
    pub failure: Option<JobFailure>,
    pub submitted_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl JobSnapshot {
    /// Terminal status reached and nothing left in flight.
    pub fn is_settled(&self) -> bool {
        self.status.is_terminal() && !self.loading
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct StoreState {
    job: Job,
    source: Option<Arc<SourceArtifact>>,
    cycle: u64,
    loading: bool,
    poller: Option<PollHandle>,
}

impl StoreState {
    fn snapshot(&self) -> JobSnapshot {
        let artifact = self.job.artifact();
        JobSnapshot {
            job_id: self.job.id().cloned(),
            status: self.job.status(),
            percent: self.job.visible_percent(),
            loading: self.loading,
            source_name: self.source.as_ref().map(|s| s.file_name().to_string()),
            artifact_path: artifact.map(|a| a.path().to_path_buf()),
            artifact_bytes: artifact.map(ArtifactHandle::len),
            failure: self.job.failure().cloned(),
            submitted_at: self.job.submitted_at(),
            finished_at: self.job.finished_at(),
        }
    }
}

/// State reachable from both the store and its poll task.
struct Shared {
    state: RwLock<StoreState>,
    event_tx: broadcast::Sender<JobEvent>,
    snapshot_tx: watch::Sender<JobSnapshot>,
}

impl Shared {
    fn publish(&self, state: &StoreState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn emit(&self, event: JobEvent) {
        // Only fails when nobody is subscribed.
        let _ = self.event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// StateWriter
// ---------------------------------------------------------------------------

/// Result of a write attempted through a [`StateWriter`].
#[derive(Debug)]
pub enum WriteOutcome {
    Applied,
    /// The store has moved to a newer cycle; nothing was written.
    Stale,
    /// The job record refused the transition.
    Rejected(CoreError),
}

/// The poll task's write access to the store, bound to one submission cycle.
pub struct StateWriter {
    shared: Arc<Shared>,
    cycle: u64,
    job_id: JobId,
}

impl StateWriter {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Apply a `queued` / `processing` report.
    pub async fn progress(&self, status: JobStatus, percent: u8) -> WriteOutcome {
        let mut state = self.shared.state.write().await;
        if state.cycle != self.cycle {
            return WriteOutcome::Stale;
        }
        if let Err(e) = state.job.apply_progress(status, percent) {
            return WriteOutcome::Rejected(e);
        }
        self.shared.publish(&state);
        self.shared.emit(JobEvent::Progress {
            job_id: self.job_id.clone(),
            status,
            percent: state.job.percent(),
        });
        WriteOutcome::Applied
    }

    /// Record that the service reported `done`, before the result is fetched.
    pub async fn observe_done(&self, percent: u8) -> WriteOutcome {
        let mut state = self.shared.state.write().await;
        if state.cycle != self.cycle {
            return WriteOutcome::Stale;
        }
        if let Err(e) = state.job.observe_done(percent) {
            return WriteOutcome::Rejected(e);
        }
        self.shared.publish(&state);
        WriteOutcome::Applied
    }

    /// Attach the fetched result. A stale or rejected handle is dropped,
    /// which releases its file.
    pub async fn complete(&self, artifact: ArtifactHandle) -> WriteOutcome {
        let mut state = self.shared.state.write().await;
        if state.cycle != self.cycle {
            return WriteOutcome::Stale;
        }
        let path = artifact.path().to_path_buf();
        let bytes = artifact.len();
        if let Err(e) = state.job.complete(artifact) {
            return WriteOutcome::Rejected(e);
        }
        state.loading = false;
        state.poller = None;
        self.shared.publish(&state);
        self.shared.emit(JobEvent::Completed {
            job_id: self.job_id.clone(),
            artifact_path: path,
            bytes,
        });
        WriteOutcome::Applied
    }

    /// End the job in `error`.
    pub async fn fail(&self, error: &JobError) -> WriteOutcome {
        let kind = error.kind().unwrap_or(FailureKind::PollingFailed);
        let message = error.to_string();

        let mut state = self.shared.state.write().await;
        if state.cycle != self.cycle {
            return WriteOutcome::Stale;
        }
        if let Err(e) = state.job.fail(kind, message.clone()) {
            return WriteOutcome::Rejected(e);
        }
        state.loading = false;
        state.poller = None;
        self.shared.publish(&state);
        self.shared.emit(JobEvent::Failed {
            job_id: Some(self.job_id.clone()),
            kind,
            error: message,
        });
        WriteOutcome::Applied
    }
}

// ---------------------------------------------------------------------------
// JobStateStore
// ---------------------------------------------------------------------------

/// Single-job state store for one client instance.
///
/// Created via [`JobStateStore::new`]; the returned `Arc` can be cloned
/// into whatever drives the presentation.
pub struct JobStateStore {
    shared: Arc<Shared>,
    submitter: JobSubmitter,
    poller: ProgressPoller,
    /// Master cancellation token -- cancelled on shutdown or drop.
    cancel: CancellationToken,
}

impl JobStateStore {
    /// Build a store around an existing service implementation.
    pub fn new(service: Arc<dyn ConversionService>, config: &ClientConfig) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let initial = StoreState {
            job: Job::new(),
            source: None,
            cycle: 0,
            loading: false,
            poller: None,
        };
        let (snapshot_tx, _) = watch::channel(initial.snapshot());

        let fetcher = ResultFetcher::new(Arc::clone(&service), config.artifact_dir.clone());
        let poller = ProgressPoller::new(Arc::clone(&service), fetcher, PollConfig::from(config));

        Arc::new(Self {
            shared: Arc::new(Shared {
                state: RwLock::new(initial),
                event_tx,
                snapshot_tx,
            }),
            submitter: JobSubmitter::new(service),
            poller,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a store talking HTTP to the service named in `config`.
    pub fn connect(config: &ClientConfig) -> Result<Arc<Self>, ConversionApiError> {
        let api = ConversionApi::new(&config.api_url, config.request_timeout)?;
        tracing::info!(api_url = %api.api_url(), "Conversion client configured");
        Ok(Self::new(Arc::new(api), config))
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Watch snapshots; a new value is published after every write.
    pub fn watch(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Replace the source document. Any current job is discarded,
    /// polling for it stops, and its result file is released.
    pub async fn select_source(&self, source: SourceArtifact) {
        let mut state = self.shared.state.write().await;
        self.reset_locked(&mut state);

        self.shared.emit(JobEvent::SourceSelected {
            file_name: source.file_name().to_string(),
            bytes: source.len(),
        });
        state.source = Some(Arc::new(source));
        self.shared.publish(&state);
    }

    /// Discard the current job, keeping the selected source.
    pub async fn reset(&self) {
        let mut state = self.shared.state.write().await;
        self.reset_locked(&mut state);
        self.shared.publish(&state);
    }

    /// Submit the selected source and start polling for it.
    ///
    /// Rejected up front when nothing is selected, when a job is already
    /// in flight, or after shutdown. A finished previous job is cleared
    /// first. On [`JobError::SubmissionFailed`] the job stays `idle`.
    pub async fn submit(&self) -> Result<JobId, JobError> {
        let (source, cycle) = {
            let mut state = self.shared.state.write().await;
            if self.cancel.is_cancelled() {
                return Err(JobError::ShutDown);
            }
            if state.loading || state.job.status().is_active() {
                return Err(JobError::AlreadyInFlight);
            }
            let source = state.source.clone().ok_or(JobError::NoSource)?;
            if state.job.status() != JobStatus::Idle {
                self.reset_locked(&mut state);
            }
            state.loading = true;
            self.shared.publish(&state);
            (source, state.cycle)
        };

        let result = self.submitter.submit(&source).await;

        let mut state = self.shared.state.write().await;
        if state.cycle != cycle {
            if let Ok(job_id) = &result {
                tracing::warn!(job_id = %job_id, "Source replaced during submission, dropping job");
            }
            return Err(JobError::Superseded);
        }
        if self.cancel.is_cancelled() {
            if let Ok(job_id) = &result {
                tracing::warn!(job_id = %job_id, "Store shut down during submission, dropping job");
            }
            state.loading = false;
            self.shared.publish(&state);
            return Err(JobError::ShutDown);
        }

        let job_id = match result {
            Ok(job_id) => job_id,
            Err(e) => {
                tracing::error!(error = %e, "Submission failed");
                state.loading = false;
                self.shared.publish(&state);
                self.shared.emit(JobEvent::Failed {
                    job_id: None,
                    kind: FailureKind::SubmissionFailed,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        if let Err(e) = state.job.mark_submitted(job_id.clone()) {
            state.loading = false;
            self.shared.publish(&state);
            return Err(e.into());
        }

        let writer = StateWriter {
            shared: Arc::clone(&self.shared),
            cycle,
            job_id: job_id.clone(),
        };
        let handle = self
            .poller
            .start(job_id.clone(), writer, self.cancel.child_token());
        state.poller = Some(handle);

        self.shared.publish(&state);
        self.shared.emit(JobEvent::Submitted {
            job_id: job_id.clone(),
        });
        Ok(job_id)
    }

    /// Read the fetched result into memory, if the job is done.
    pub async fn read_artifact(&self) -> Result<Option<Vec<u8>>, JobError> {
        // The read guard keeps the handle, and so its file, alive.
        let state = self.shared.state.read().await;
        let Some(artifact) = state.job.artifact() else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(artifact.path())
            .await
            .map_err(CoreError::from)?;
        Ok(Some(bytes))
    }

    /// Copy the fetched result to `dest`.
    pub async fn save_artifact(&self, dest: &Path) -> Result<u64, JobError> {
        let state = self.shared.state.read().await;
        let artifact = state.job.artifact().ok_or(JobError::NoArtifact)?;
        let written = tokio::fs::copy(artifact.path(), dest)
            .await
            .map_err(CoreError::from)?;
        tracing::info!(dest = %dest.display(), bytes = written, "Result saved");
        Ok(written)
    }

    /// Stop polling and refuse further submissions.
    ///
    /// Cancels the master token, then waits up to 5 seconds for the
    /// poll task to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job state store");
        self.cancel.cancel();

        let poller = {
            let mut state = self.shared.state.write().await;
            let poller = state.poller.take();
            if let Some(handle) = &poller {
                self.shared.emit(JobEvent::Cancelled {
                    job_id: handle.job_id().clone(),
                });
            }
            state.loading = false;
            self.shared.publish(&state);
            poller
        };

        if let Some(handle) = poller {
            let job_id = handle.job_id().clone();
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle.join()).await {
                Ok(outcome) => tracing::info!(job_id = %job_id, ?outcome, "Poll task stopped"),
                Err(_) => tracing::warn!(job_id = %job_id, "Poll task did not stop in time"),
            }
        }

        tracing::info!("Job state store shut down complete");
    }

    // ---- private helpers ----

    /// Cancel any poller, start a new cycle, and replace the job record.
    fn reset_locked(&self, state: &mut StoreState) {
        if let Some(handle) = state.poller.take() {
            handle.cancel();
            tracing::info!(job_id = %handle.job_id(), "Polling cancelled by reset");
            self.shared.emit(JobEvent::Cancelled {
                job_id: handle.job_id().clone(),
            });
        }
        state.cycle += 1;
        // Dropping the previous record releases its artifact file.
        state.job = Job::new();
        state.loading = false;
        self.shared.emit(JobEvent::Reset);
    }
}

impl Drop for JobStateStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
