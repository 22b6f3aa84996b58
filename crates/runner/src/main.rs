//! `sonictwin-runner` -- converts one text file into speech.
//!
//! Submits the file to the SonicTwin conversion service, logs progress
//! while the job runs, and saves the rendered audio. Ctrl-C stops
//! polling and exits.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default                  | Description                      |
//! |------------------------|----------|--------------------------|----------------------------------|
//! | `SONICTWIN_SOURCE`     | yes      | --                       | Path of the text file to convert |
//! | `SONICTWIN_OUTPUT`     | no       | `speech.wav`             | Where the audio is written       |
//! | `SONICTWIN_API_URL`    | no       | `http://127.0.0.1:8000`  | Conversion service base URL      |
//! | `POLL_INTERVAL_MS`     | no       | `1000`                   | Status check cadence             |
//! | `MAX_POLL_ATTEMPTS`    | no       | `600`                    | Status checks before timing out  |
//! | `JOB_DEADLINE_SECS`    | no       | --                       | Wall-clock ceiling per job       |
//! | `REQUEST_TIMEOUT_SECS` | no       | `30`                     | Per-request HTTP timeout         |
//! | `ARTIFACT_DIR`         | no       | system temp dir          | Where results are spooled        |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sonictwin_client::events::JobEvent;
use sonictwin_client::{ClientConfig, JobSnapshot, JobStateStore};
use sonictwin_core::artifact::{SourceArtifact, DEFAULT_DOWNLOAD_NAME};
use sonictwin_core::status::JobStatus;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sonictwin_runner=info,sonictwin_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let source_path = std::env::var("SONICTWIN_SOURCE").unwrap_or_else(|_| {
        tracing::error!("SONICTWIN_SOURCE environment variable is required");
        std::process::exit(1);
    });
    let output = std::env::var("SONICTWIN_OUTPUT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DOWNLOAD_NAME));

    let config = ClientConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let source = read_source(Path::new(&source_path)).await.unwrap_or_else(|e| {
        tracing::error!(path = %source_path, error = %e, "Cannot use source file");
        std::process::exit(1);
    });

    let store = JobStateStore::connect(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build conversion client");
        std::process::exit(1);
    });

    tokio::spawn(log_events(store.subscribe()));

    let code = run(&store, source, &output).await;

    // The store owns the spooled result; drop it so the file is removed
    // before the process exits.
    store.shutdown().await;
    drop(store);
    if code != 0 {
        std::process::exit(code);
    }
}

/// Convert `source` and save the audio to `output`, returning the exit code.
async fn run(store: &Arc<JobStateStore>, source: SourceArtifact, output: &Path) -> i32 {
    store.select_source(source).await;
    if let Err(e) = store.submit().await {
        tracing::error!(error = %e, "Could not start conversion");
        return 1;
    }

    let snapshot = tokio::select! {
        snapshot = wait_settled(store) => snapshot,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping");
            return 130;
        }
    };

    match snapshot.status {
        JobStatus::Done => match store.save_artifact(output).await {
            Ok(bytes) => {
                tracing::info!(path = %output.display(), bytes, "Audio ready");
                0
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to save audio");
                1
            }
        },
        _ => {
            let reason = snapshot
                .failure
                .map(|f| format!("{}: {}", f.kind, f.message))
                .unwrap_or_else(|| "unknown failure".to_string());
            tracing::error!(reason = %reason, "Processing failed");
            1
        }
    }
}

/// Read the source file into a [`SourceArtifact`].
async fn read_source(path: &Path) -> Result<SourceArtifact, String> {
    let content = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("source.txt")
        .to_string();
    SourceArtifact::from_file_name(file_name, content).map_err(|e| e.to_string())
}

async fn wait_settled(store: &Arc<JobStateStore>) -> JobSnapshot {
    let mut rx = store.watch();
    let settled = match rx.wait_for(JobSnapshot::is_settled).await {
        Ok(snapshot) => snapshot.clone(),
        // The sender lives in the store, which outlives this call.
        Err(_) => store.snapshot(),
    };
    settled
}

/// Log lifecycle events until the channel closes.
async fn log_events(mut rx: broadcast::Receiver<JobEvent>) {
    loop {
        match rx.recv().await {
            Ok(JobEvent::Submitted { job_id }) => tracing::info!(job_id = %job_id, "Job queued"),
            Ok(JobEvent::Progress {
                job_id,
                status,
                percent,
            }) => tracing::info!(job_id = %job_id, %status, percent, "Generating speech... {percent}%"),
            Ok(JobEvent::Failed { kind, error, .. }) => {
                tracing::error!(%kind, error = %error, "Processing failed")
            }
            Ok(event) => tracing::debug!(?event, "Job event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
