//! Environment definitions assembled from CLI flags, environment variables
//! and config defaults. The only invariant is required-field presence.

use crate::config::{B2cConfig, SfConfig};
use crate::error::{CrmSyncError, Result};
use serde::Serialize;
use std::time::Duration;

// ---------------------------------------------------------------------------
// B2cEnvironment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct B2cEnvironment {
    pub hostname: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub account_manager_url: String,
    pub site_ids: Vec<String>,
    pub code_version: Option<String>,
    pub instance_name: Option<String>,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl B2cEnvironment {
    pub fn new(
        config: &B2cConfig,
        hostname: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            account_manager_url: config.account_manager_url.clone(),
            site_ids: Vec::new(),
            code_version: None,
            instance_name: None,
            api_version: config.api_version.clone(),
            request_timeout_secs: config.request_timeout_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.hostname, "hostname", "--b2c-hostname or B2C_HOSTNAME")?;
        require(&self.client_id, "client_id", "--b2c-client-id or B2C_CLIENTID")?;
        require(
            &self.client_secret,
            "client_secret",
            "--b2c-client-secret or B2C_CLIENTSECRET",
        )?;
        Ok(())
    }

    pub fn require_sites(&self) -> Result<&[String]> {
        if self.site_ids.is_empty() {
            return Err(CrmSyncError::MissingSetting {
                field: "site_ids",
                hint: "--b2c-site-ids or B2C_SITEIDS",
            });
        }
        Ok(&self.site_ids)
    }

    pub fn require_code_version(&self) -> Result<&str> {
        match self.code_version.as_deref() {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(CrmSyncError::MissingSetting {
                field: "code_version",
                hint: "--b2c-code-version or B2C_CODEVERSION",
            }),
        }
    }

    pub fn require_instance_name(&self) -> Result<&str> {
        match self.instance_name.as_deref() {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(CrmSyncError::MissingSetting {
                field: "instance_name",
                hint: "--b2c-instance-name or B2C_INSTANCENAME",
            }),
        }
    }

    /// `https://<hostname>`, unless the hostname already carries a scheme.
    pub fn base_url(&self) -> String {
        with_scheme(&self.hostname)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// SfEnvironment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SfEnvironment {
    pub hostname: Option<String>,
    pub login_url: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing)]
    pub security_token: Option<String>,
    /// sfdx alias or username used for subprocess calls.
    pub target_org: Option<String>,
    pub api_version: String,
    pub request_timeout_secs: u64,
}

impl SfEnvironment {
    pub fn new(config: &SfConfig, username: impl Into<String>) -> Self {
        Self {
            hostname: None,
            login_url: config.login_url.clone(),
            username: username.into(),
            password: None,
            security_token: None,
            target_org: None,
            api_version: config.api_version.clone(),
            request_timeout_secs: config.request_timeout_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require(&self.username, "username", "--sf-username or SF_USERNAME")
    }

    /// The org handed to `sf` subprocesses: the alias when set, else the username.
    pub fn org(&self) -> &str {
        self.target_org.as_deref().unwrap_or(&self.username)
    }

    /// Password with the security token appended, as the password grant expects.
    pub fn password_with_token(&self) -> Result<String> {
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(CrmSyncError::MissingSetting {
                field: "password",
                hint: "--sf-password or SF_PASSWORD",
            })?;
        Ok(format!(
            "{password}{}",
            self.security_token.as_deref().unwrap_or("")
        ))
    }

    pub fn login_base(&self) -> String {
        with_scheme(&self.login_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn require(value: &str, field: &'static str, hint: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CrmSyncError::MissingSetting { field, hint });
    }
    Ok(())
}

pub(crate) fn with_scheme(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}
