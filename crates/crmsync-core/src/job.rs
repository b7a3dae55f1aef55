//! Job-status polling.
//!
//! Each tick classifies the latest job record:
//!
//! ```text
//!             ┌──────────── Pending ◄──┐
//!             ▼                        │
//!   POLLING ──┼── Done      (status == OK)          → Ok(record)
//!             ├── Failed    (status ∉ valid set)    → Err(JobFailed)
//!             └── Unknown   (no job_id / fetch err) → counter += 1
//!                           counter > threshold     → Err(UnknownJobStatus)
//! ```
//!
//! There is no backoff and no timeout beyond the unknown-status counter.

use crate::config::PollingConfig;
use crate::error::{CrmSyncError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const STATUS_OK: &str = "OK";

// ---------------------------------------------------------------------------
// JobDetails
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitStatus {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    #[serde(default)]
    pub step_id: Option<String>,
    #[serde(default)]
    pub exit_status: Option<ExitStatus>,
}

/// A job execution record as returned by the jobs API. Fields this code does
/// not inspect are kept in `extra` so they survive JSON output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<ExitStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_executions: Vec<StepExecution>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobDetails {
    /// The failure message reported by the first step, then by the job itself.
    pub fn failure_message(&self) -> String {
        self.step_executions
            .first()
            .and_then(|s| s.exit_status.as_ref())
            .and_then(|e| e.message.clone())
            .or_else(|| self.exit_status.as_ref().and_then(|e| e.message.clone()))
            .unwrap_or_else(|| {
                format!(
                    "job {} ended with status {}",
                    self.job_id.as_deref().unwrap_or("<unknown>"),
                    self.status.as_deref().unwrap_or("<none>")
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTick {
    Done,
    Failed(String),
    Pending,
    Unknown,
}

pub fn classify(details: &JobDetails, valid_statuses: &[String]) -> JobTick {
    if details.job_id.is_none() {
        return JobTick::Unknown;
    }
    match details.status.as_deref() {
        Some(STATUS_OK) => JobTick::Done,
        Some(s) if valid_statuses.iter().any(|v| v == s) => JobTick::Pending,
        _ => JobTick::Failed(details.failure_message()),
    }
}

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub unknown_threshold: u32,
    pub valid_statuses: Vec<String>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            interval: cfg.interval(),
            unknown_threshold: cfg.unknown_status_threshold,
            valid_statuses: cfg.valid_statuses.clone(),
        }
    }
}

/// Poll `fetch` every `policy.interval` until the job reaches a terminal state.
///
/// A failed fetch counts as an unknown status; the loop gives up once more
/// than `policy.unknown_threshold` unknown ticks have been seen.
pub async fn poll_job<F, Fut>(policy: &PollPolicy, mut fetch: F) -> Result<JobDetails>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobDetails>>,
{
    let mut unknown: u32 = 0;
    loop {
        tokio::time::sleep(policy.interval).await;

        let details = match fetch().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "job status request failed");
                JobDetails::default()
            }
        };

        match classify(&details, &policy.valid_statuses) {
            JobTick::Done => {
                info!(job_id = ?details.job_id, id = ?details.id, "job finished");
                return Ok(details);
            }
            JobTick::Failed(message) => {
                warn!(job_id = ?details.job_id, status = ?details.status, %message, "job failed");
                return Err(CrmSyncError::JobFailed(message));
            }
            JobTick::Pending => {
                debug!(
                    job_id = ?details.job_id,
                    status = ?details.status,
                    execution_status = ?details.execution_status,
                    "job still running"
                );
            }
            JobTick::Unknown => {
                unknown += 1;
                debug!(unknown, threshold = policy.unknown_threshold, "job status unknown");
                if unknown > policy.unknown_threshold {
                    return Err(CrmSyncError::UnknownJobStatus(unknown));
                }
            }
        }
    }
}
