//! Shared helpers for client integration tests.
//!
//! [`ScriptedService`] is an in-memory [`ConversionService`] whose
//! responses are queued up front, and which counts every call so tests
//! can assert that polling really stopped.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sonictwin_client::api::{ConversionApiError, ConversionService, ProgressResponse, SubmitResponse};
use sonictwin_client::events::JobEvent;
use sonictwin_client::{ClientConfig, JobSnapshot, JobStateStore};
use sonictwin_core::artifact::SourceArtifact;
use sonictwin_core::status::RemoteStatus;
use sonictwin_core::types::JobId;
use tokio::sync::broadcast;

/// First bytes of a WAV file.
pub const RIFF: [u8; 8] = [0x52, 0x49, 0x46, 0x46, 0x24, 0x08, 0x00, 0x00];

#[derive(Debug, Clone)]
enum StatusStep {
    Report(RemoteStatus, i64),
    Fail(u16),
}

#[derive(Default)]
struct Script {
    submissions: VecDeque<Result<String, u16>>,
    statuses: HashMap<String, VecDeque<StatusStep>>,
    results: HashMap<String, Result<Vec<u8>, u16>>,
    submit_calls: u32,
    status_calls: HashMap<String, u32>,
    result_calls: HashMap<String, u32>,
    submit_delay: Option<Duration>,
    status_delay: Option<Duration>,
}

/// Scripted conversion service.
///
/// Status scripts are consumed front to back; the last step repeats
/// forever once the script runs out.
#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<Script>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful submission returning `job_id`.
    pub fn accept(self, job_id: &str) -> Self {
        self.script.lock().unwrap().submissions.push_back(Ok(job_id.to_string()));
        self
    }

    /// Queue a submission answered with HTTP `status`.
    pub fn reject_submit(self, status: u16) -> Self {
        self.script.lock().unwrap().submissions.push_back(Err(status));
        self
    }

    pub fn statuses(self, job_id: &str, steps: &[(RemoteStatus, i64)]) -> Self {
        let steps = steps
            .iter()
            .map(|(status, percent)| StatusStep::Report(*status, *percent))
            .collect();
        self.script.lock().unwrap().statuses.insert(job_id.to_string(), steps);
        self
    }

    /// Every status check for `job_id` fails with HTTP `status`.
    pub fn status_failure(self, job_id: &str, status: u16) -> Self {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(job_id.to_string(), VecDeque::from([StatusStep::Fail(status)]));
        self
    }

    pub fn result(self, job_id: &str, bytes: &[u8]) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(job_id.to_string(), Ok(bytes.to_vec()));
        self
    }

    pub fn result_failure(self, job_id: &str, status: u16) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(job_id.to_string(), Err(status));
        self
    }

    pub fn submit_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().submit_delay = Some(delay);
        self
    }

    pub fn status_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().status_delay = Some(delay);
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.script.lock().unwrap().submit_calls
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_status_calls(&self) -> u32 {
        self.script.lock().unwrap().status_calls.values().sum()
    }

    pub fn result_calls(&self, job_id: &str) -> u32 {
        self.script
            .lock()
            .unwrap()
            .result_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }
}

fn api_error(status: u16) -> ConversionApiError {
    ConversionApiError::ApiError {
        status,
        body: format!("scripted {status}"),
    }
}

#[async_trait]
impl ConversionService for ScriptedService {
    async fn submit(&self, _source: &SourceArtifact) -> Result<SubmitResponse, ConversionApiError> {
        let (next, delay) = {
            let mut script = self.script.lock().unwrap();
            script.submit_calls += 1;
            (script.submissions.pop_front(), script.submit_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match next {
            Some(Ok(job_id)) => Ok(SubmitResponse { job_id }),
            Some(Err(status)) => Err(api_error(status)),
            None => Err(api_error(503)),
        }
    }

    async fn get_status(&self, job_id: &JobId) -> Result<ProgressResponse, ConversionApiError> {
        let (step, delay) = {
            let mut script = self.script.lock().unwrap();
            *script.status_calls.entry(job_id.to_string()).or_default() += 1;
            let step = script.statuses.get_mut(job_id.as_str()).and_then(|steps| {
                if steps.len() > 1 {
                    steps.pop_front()
                } else {
                    steps.front().cloned()
                }
            });
            (step, script.status_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match step {
            Some(StatusStep::Report(status, percent)) => Ok(ProgressResponse::new(status, percent)),
            Some(StatusStep::Fail(status)) => Err(api_error(status)),
            None => Err(api_error(404)),
        }
    }

    async fn get_result(&self, job_id: &JobId) -> Result<Vec<u8>, ConversionApiError> {
        let mut script = self.script.lock().unwrap();
        *script.result_calls.entry(job_id.to_string()).or_default() += 1;
        match script.results.get(job_id.as_str()) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(status)) => Err(api_error(*status)),
            None => Err(api_error(404)),
        }
    }
}

// ---------------------------------------------------------------------------
// Store helpers
// ---------------------------------------------------------------------------

pub fn config(artifact_dir: &Path) -> ClientConfig {
    ClientConfig {
        artifact_dir: artifact_dir.to_path_buf(),
        ..ClientConfig::default()
    }
}

pub fn store_with(service: &Arc<ScriptedService>, config: &ClientConfig) -> Arc<JobStateStore> {
    let service: Arc<dyn ConversionService> = service.clone();
    JobStateStore::new(service, config)
}

pub fn source(name: &str) -> SourceArtifact {
    SourceArtifact::from_file_name(name, b"It was a bright cold day in April.".to_vec())
        .expect("non-empty source")
}

/// Wait until the job reaches a terminal state with nothing in flight.
pub async fn wait_settled(store: &JobStateStore) -> JobSnapshot {
    let mut rx = store.watch();
    let snapshot = rx
        .wait_for(JobSnapshot::is_settled)
        .await
        .expect("store dropped while waiting")
        .clone();
    snapshot
}

/// Wait until a snapshot satisfies `predicate`.
pub async fn wait_until<F>(store: &JobStateStore, predicate: F) -> JobSnapshot
where
    F: FnMut(&JobSnapshot) -> bool,
{
    let mut rx = store.watch();
    let snapshot = rx
        .wait_for(predicate)
        .await
        .expect("store dropped while waiting")
        .clone();
    snapshot
}

/// Collect every event already sitting in the channel.
pub fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
