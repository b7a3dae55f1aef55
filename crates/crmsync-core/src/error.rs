use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrmSyncError {
    #[error("missing required setting '{field}' (set {hint})")]
    MissingSetting { field: &'static str, hint: &'static str },

    #[error("authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("unexpected response from {url} ({status}): {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job status could not be determined after {0} attempts")]
    UnknownJobStatus(u32),

    #[error("archive not found: {0}")]
    ArchiveMissing(String),

    #[error("b2c {scope} deployment failed during {step}: {message}")]
    Deploy {
        scope: String,
        step: &'static str,
        message: String,
    },

    #[error("template placeholder '{0}' has no value")]
    TemplateMissingValue(String),

    #[error("neither 'sf' nor 'sfdx' was found on PATH")]
    NoSfCli,

    #[error("failed to spawn {0}")]
    SubprocessSpawn(String),

    #[error("sf command failed: {0}")]
    SubprocessFailed(String),

    #[error("salesforce request failed: {0}")]
    Salesforce(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, CrmSyncError>;

/// Trim a response body so error messages stay on one screen.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(500).collect()
}
