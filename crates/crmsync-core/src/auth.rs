//! OAuth2 token exchange for both platforms.
//!
//! - B2C: client-credentials grant against Account Manager.
//! - Salesforce: password grant using the generated connected-app credentials.

use crate::credentials::ConnectedAppCredentials;
use crate::environment::{B2cEnvironment, SfEnvironment};
use crate::error::{excerpt, CrmSyncError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const ACCESS_TOKEN_PATH: &str = "/dwsso/oauth2/access_token";
const SF_TOKEN_PATH: &str = "/services/oauth2/token";

/// Build the shared HTTP client with the per-request timeout applied.
pub fn http_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("crm-sync/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

// ---------------------------------------------------------------------------
// B2C
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Exchange the environment's client credentials for a bearer token.
pub async fn authenticate(http: &Client, env: &B2cEnvironment) -> Result<AccessToken> {
    env.validate()?;
    let url = format!(
        "{}{}",
        env.account_manager_url.trim_end_matches('/'),
        ACCESS_TOKEN_PATH
    );
    debug!(%url, client_id = %env.client_id, "requesting b2c access token");

    let response = http
        .post(&url)
        .basic_auth(&env.client_id, Some(&env.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrmSyncError::Auth {
            status: status.as_u16(),
            body: excerpt(&body),
        });
    }

    let token: AccessToken = response.json().await?;
    info!(client_id = %env.client_id, "authenticated against account manager");
    Ok(token)
}

// ---------------------------------------------------------------------------
// Salesforce
// ---------------------------------------------------------------------------

/// An authenticated Salesforce session, from either the password grant or
/// `sf org display`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfSession {
    pub access_token: String,
    pub instance_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PasswordGrantResponse {
    access_token: String,
    instance_url: String,
    #[serde(default)]
    id: Option<String>,
}

pub async fn sf_password_login(
    http: &Client,
    env: &SfEnvironment,
    credentials: &ConnectedAppCredentials,
) -> Result<SfSession> {
    env.validate()?;
    let password = env.password_with_token()?;
    let url = format!("{}{}", env.login_base(), SF_TOKEN_PATH);
    debug!(%url, username = %env.username, "requesting salesforce session");

    let response = http
        .post(&url)
        .form(&[
            ("grant_type", "password"),
            ("client_id", credentials.consumer_key.as_str()),
            ("client_secret", credentials.consumer_secret.as_str()),
            ("username", env.username.as_str()),
            ("password", password.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CrmSyncError::Auth {
            status: status.as_u16(),
            body: excerpt(&body),
        });
    }

    let grant: PasswordGrantResponse = response.json().await?;
    // The identity URL ends in /<org id>/<user id>.
    let org_id = grant
        .id
        .as_deref()
        .and_then(|id| id.rsplit('/').nth(1))
        .map(str::to_string);
    info!(username = %env.username, "authenticated against salesforce");
    Ok(SfSession {
        access_token: grant.access_token,
        instance_url: grant.instance_url,
        username: Some(env.username.clone()),
        org_id,
    })
}
