//! Fixed-cadence progress polling (one task per job).
//!
//! [`ProgressPoller::start`] spawns a Tokio task that checks the job's
//! status every `interval` until a terminal state, a failure, the
//! attempt/deadline ceiling, or cancellation. Ticks never overlap: the
//! next status call is issued only after the previous tick has been
//! applied. No retry and no backoff.

use std::sync::Arc;
use std::time::Duration;

use sonictwin_core::status::{FailureKind, RemoteStatus};
use sonictwin_core::types::JobId;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::ConversionService;
use crate::config::ClientConfig;
use crate::error::JobError;
use crate::fetcher::ResultFetcher;
use crate::store::{StateWriter, WriteOutcome};

/// Polling cadence and ceilings.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Maximum status checks; `0` disables the ceiling.
    pub max_attempts: u32,
    pub deadline: Option<Duration>,
}

impl From<&ClientConfig> for PollConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_attempts: config.max_poll_attempts,
            deadline: config.job_deadline,
        }
    }
}

/// How a poll task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Result fetched and attached.
    Completed,
    Failed(FailureKind),
    /// Stopped through the cancellation token.
    Cancelled,
    /// The store moved to a newer job; nothing more was written.
    Superseded,
}

/// Handle to a running poll task.
#[derive(Debug)]
pub struct PollHandle {
    job_id: JobId,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop polling. Safe to call more than once.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to exit.
    pub async fn join(self) -> PollOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => PollOutcome::Cancelled,
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "Poll task panicked");
                PollOutcome::Failed(FailureKind::PollingFailed)
            }
        }
    }
}

/// Spawns poll tasks.
pub struct ProgressPoller {
    service: Arc<dyn ConversionService>,
    fetcher: Arc<ResultFetcher>,
    config: PollConfig,
}

impl ProgressPoller {
    pub fn new(service: Arc<dyn ConversionService>, fetcher: ResultFetcher, config: PollConfig) -> Self {
        Self {
            service,
            fetcher: Arc::new(fetcher),
            config,
        }
    }

    /// Start polling `job_id`, writing through `writer`.
    ///
    /// The first status check happens one interval after start.
    pub fn start(&self, job_id: JobId, writer: StateWriter, cancel: CancellationToken) -> PollHandle {
        let task = tokio::spawn(run_poll_loop(
            Arc::clone(&self.service),
            Arc::clone(&self.fetcher),
            self.config.clone(),
            writer,
            cancel.clone(),
        ));

        PollHandle {
            job_id,
            cancel,
            task,
        }
    }
}

/// Core poll loop: tick -> status check -> apply -> stop on terminal.
async fn run_poll_loop(
    service: Arc<dyn ConversionService>,
    fetcher: Arc<ResultFetcher>,
    config: PollConfig,
    writer: StateWriter,
    cancel: CancellationToken,
) -> PollOutcome {
    let job_id = writer.job_id().clone();
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(started + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    tracing::info!(
        job_id = %job_id,
        poll_interval_ms = config.interval.as_millis() as u64,
        max_attempts = config.max_attempts,
        "Polling started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, attempts, "Polling cancelled");
                return PollOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        if let Some(err) = ceiling_reached(&config, attempts, started) {
            return finish_failed(&writer, err).await;
        }
        attempts += 1;

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, attempts, "Polling cancelled mid-request");
                return PollOutcome::Cancelled;
            }
            response = service.get_status(&job_id) => response,
        };

        let progress = match response {
            Ok(progress) => progress,
            Err(e) => {
                tracing::warn!(job_id = %job_id, attempt = attempts, error = %e, "Status check failed");
                return finish_failed(&writer, JobError::PollingFailed(e.to_string())).await;
            }
        };

        let percent = progress.percent();
        tracing::debug!(
            job_id = %job_id,
            attempt = attempts,
            status = ?progress.status,
            percent,
            "Status check",
        );

        match progress.status {
            RemoteStatus::Queued | RemoteStatus::Processing => {
                match writer.progress(progress.status.into(), percent).await {
                    WriteOutcome::Applied => {}
                    WriteOutcome::Stale => return superseded(&job_id),
                    WriteOutcome::Rejected(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Ignoring out-of-order status");
                    }
                }
                if let Some(err) = ceiling_reached(&config, attempts, started) {
                    return finish_failed(&writer, err).await;
                }
            }
            RemoteStatus::Done => {
                return finish_done(&fetcher, &writer, &cancel, percent).await;
            }
            RemoteStatus::Error => {
                tracing::warn!(job_id = %job_id, "Conversion service reported job error");
                return finish_failed(&writer, JobError::JobFailed).await;
            }
        }
    }
}

/// Fetch the result once and attach it.
async fn finish_done(
    fetcher: &ResultFetcher,
    writer: &StateWriter,
    cancel: &CancellationToken,
    percent: u8,
) -> PollOutcome {
    let job_id = writer.job_id();
    if let WriteOutcome::Stale = writer.observe_done(percent).await {
        return superseded(job_id);
    }

    tracing::info!(job_id = %job_id, "Job done, fetching result");
    let fetched = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!(job_id = %job_id, "Result fetch cancelled");
            return PollOutcome::Cancelled;
        }
        fetched = fetcher.fetch(job_id) => fetched,
    };

    match fetched {
        Ok(artifact) => match writer.complete(artifact).await {
            WriteOutcome::Applied => {
                tracing::info!(job_id = %job_id, "Job completed");
                PollOutcome::Completed
            }
            WriteOutcome::Stale => superseded(job_id),
            WriteOutcome::Rejected(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not attach result");
                PollOutcome::Failed(FailureKind::ResultFetchFailed)
            }
        },
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Result fetch failed");
            finish_failed(writer, e).await
        }
    }
}

/// Record a terminal failure on the job.
async fn finish_failed(writer: &StateWriter, error: JobError) -> PollOutcome {
    let kind = error.kind().unwrap_or(FailureKind::PollingFailed);
    match writer.fail(&error).await {
        WriteOutcome::Applied => {
            tracing::error!(job_id = %writer.job_id(), kind = %kind, error = %error, "Job failed");
            PollOutcome::Failed(kind)
        }
        WriteOutcome::Stale => superseded(writer.job_id()),
        WriteOutcome::Rejected(e) => {
            tracing::error!(job_id = %writer.job_id(), error = %e, "Could not record failure");
            PollOutcome::Failed(kind)
        }
    }
}

fn superseded(job_id: &JobId) -> PollOutcome {
    tracing::info!(job_id = %job_id, "Store moved to a newer job, polling stopped");
    PollOutcome::Superseded
}

/// `Some(Timeout)` once the attempt count or the deadline is exhausted.
fn ceiling_reached(config: &PollConfig, attempts: u32, started: Instant) -> Option<JobError> {
    let elapsed = started.elapsed();
    let attempts_exhausted = config.max_attempts > 0 && attempts >= config.max_attempts;
    let deadline_passed = config.deadline.is_some_and(|deadline| elapsed >= deadline);

    if attempts_exhausted || deadline_passed {
        Some(JobError::Timeout {
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32, deadline: Option<Duration>) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(1),
            max_attempts,
            deadline,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_by_attempts() {
        let started = Instant::now();
        assert!(ceiling_reached(&config(3, None), 2, started).is_none());
        assert!(matches!(
            ceiling_reached(&config(3, None), 3, started),
            Some(JobError::Timeout { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_means_unbounded() {
        let started = Instant::now();
        assert!(ceiling_reached(&config(0, None), 10_000, started).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_by_deadline() {
        let started = Instant::now();
        let cfg = config(0, Some(Duration::from_secs(5)));
        assert!(ceiling_reached(&cfg, 1, started).is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(
            ceiling_reached(&cfg, 5, started),
            Some(JobError::Timeout { elapsed_ms: 5000, .. })
        ));
    }
}
