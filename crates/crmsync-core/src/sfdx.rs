//! Subprocess wrapper around the Salesforce CLI.
//!
//! Every call runs with `--json`; the CLI answers with
//! `{"status": 0, "result": {...}}` on success and a non-zero `status` plus
//! `message` on failure, regardless of the process exit code.

use crate::auth::SfSession;
use crate::error::{CrmSyncError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// The CLI generations that understand the commands used here, newest first.
const CANDIDATES: &[&str] = &["sf", "sfdx"];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Parse the CLI's JSON envelope into its `result`.
pub fn parse_envelope(stdout: &str) -> Result<Value> {
    let envelope: Envelope = serde_json::from_str(stdout.trim()).map_err(|e| {
        CrmSyncError::SubprocessFailed(format!(
            "unreadable output ({e}): {}",
            stdout.chars().take(200).collect::<String>()
        ))
    })?;
    if envelope.status != 0 {
        let message = envelope
            .message
            .or(envelope.name)
            .unwrap_or_else(|| format!("exit status {}", envelope.status));
        return Err(CrmSyncError::SubprocessFailed(message));
    }
    Ok(envelope.result)
}

#[derive(Debug, Clone)]
pub struct SfCli {
    program: PathBuf,
}

impl SfCli {
    /// Locate `sf`, falling back to `sfdx`.
    pub fn detect() -> Result<Self> {
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|program| Self { program })
            .ok_or(CrmSyncError::NoSfCli)
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn run(&self, args: &[&str]) -> Result<Value> {
        debug!(program = %self.program.display(), ?args, "running sf cli");
        let output = Command::new(&self.program)
            .args(args)
            .arg("--json")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CrmSyncError::SubprocessSpawn(format!("{}: {e}", self.program.display())))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CrmSyncError::SubprocessFailed(
                stderr.chars().take(500).collect(),
            ));
        }
        parse_envelope(&stdout)
    }

    /// Session details for an already-authorised org.
    pub async fn org_display(&self, target_org: &str) -> Result<SfSession> {
        let result = self
            .run(&["org", "display", "--target-org", target_org])
            .await?;
        session_from_result(&result)
    }

    pub async fn deploy_source(&self, source_dir: &Path, target_org: &str) -> Result<Value> {
        let dir = source_dir.to_string_lossy();
        self.run(&[
            "project",
            "deploy",
            "start",
            "--source-dir",
            &dir,
            "--target-org",
            target_org,
            "--wait",
            "30",
        ])
        .await
    }
}

fn session_from_result(result: &Value) -> Result<SfSession> {
    let field = |key: &str| result.get(key).and_then(Value::as_str).map(str::to_string);
    match (field("accessToken"), field("instanceUrl")) {
        (Some(access_token), Some(instance_url)) => Ok(SfSession {
            access_token,
            instance_url,
            username: field("username"),
            org_id: field("id"),
        }),
        _ => Err(CrmSyncError::SubprocessFailed(
            "org display returned no access token; authorise the org first".to_string(),
        )),
    }
}
