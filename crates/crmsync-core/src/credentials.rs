//! Connected-app credentials shared between the generated Salesforce
//! metadata and the B2C service definitions.
//!
//! Persisted once as `connectedAppCredentials.json`; later builds reuse the
//! file so both platforms keep agreeing on the same key pair.

use crate::error::Result;
use crate::io;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONSUMER_KEY_PREFIX: &str = "3MVG";
const CONSUMER_KEY_LEN: usize = 85;
const CONSUMER_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAppCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub created_at: DateTime<Utc>,
}

impl ConnectedAppCredentials {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(CONSUMER_KEY_LEN - CONSUMER_KEY_PREFIX.len())
            .map(char::from)
            .collect();
        let mut secret = [0u8; CONSUMER_SECRET_BYTES];
        rng.fill(&mut secret[..]);
        Self {
            consumer_key: format!("{CONSUMER_KEY_PREFIX}{suffix}"),
            consumer_secret: secret.iter().map(|b| format!("{b:02X}")).collect(),
            created_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Returns the persisted credentials, creating the file only when missing.
    /// The flag is `true` when a new pair was generated.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }
        let creds = Self::generate();
        let data = serde_json::to_string_pretty(&creds)?;
        io::atomic_write(path, data.as_bytes())?;
        tracing::info!(path = %path.display(), "generated connected app credentials");
        Ok((creds, true))
    }
}
