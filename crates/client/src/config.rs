use std::path::PathBuf;
use std::time::Duration;

/// Default service base address.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
/// Default interval between poll ticks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
/// Default ceiling on status checks per job (10 minutes at the default cadence).
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 600;
/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a conversion service running
/// on the local machine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion service, without a trailing slash.
    pub api_url: String,
    /// Fixed cadence of status checks.
    pub poll_interval: Duration,
    /// Maximum status checks before a job is declared timed out; `0`
    /// disables the ceiling.
    pub max_poll_attempts: u32,
    /// Optional wall-clock ceiling for a single job.
    pub job_deadline: Option<Duration>,
    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,
    /// Directory fetched results are spooled into.
    pub artifact_dir: PathBuf,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            job_deadline: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            artifact_dir: std::env::temp_dir(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                  |
    /// |------------------------|--------------------------|
    /// | `SONICTWIN_API_URL`    | `http://127.0.0.1:8000`  |
    /// | `POLL_INTERVAL_MS`     | `1000`                   |
    /// | `MAX_POLL_ATTEMPTS`    | `600`                    |
    /// | `JOB_DEADLINE_SECS`    | unset                    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                     |
    /// | `ARTIFACT_DIR`         | system temp directory    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_url = lookup("SONICTWIN_API_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_url);

        let poll_interval_ms: u64 = parse_var(&lookup, "POLL_INTERVAL_MS", "a positive integer")?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "POLL_INTERVAL_MS",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }

        let max_poll_attempts: u32 =
            parse_var(&lookup, "MAX_POLL_ATTEMPTS", "a valid u32")?.unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS);

        let job_deadline = parse_var::<u64, _>(&lookup, "JOB_DEADLINE_SECS", "a valid u64")?
            .map(Duration::from_secs);

        let request_timeout_secs: u64 =
            parse_var(&lookup, "REQUEST_TIMEOUT_SECS", "a positive integer")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "REQUEST_TIMEOUT_SECS",
                expected: "a positive integer",
                value: "0".to_string(),
            });
        }

        let artifact_dir = lookup("ARTIFACT_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.artifact_dir);

        Ok(Self {
            api_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_poll_attempts,
            job_deadline,
            request_timeout: Duration::from_secs(request_timeout_secs),
            artifact_dir,
        })
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var,
                expected,
                value,
            }),
    }
}
