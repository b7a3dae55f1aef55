pub mod b2c;
pub mod sf;

use anyhow::Context;
use clap::Args;
use crmsync_core::config::Config;
use crmsync_core::environment::{B2cEnvironment, SfEnvironment};
use crmsync_core::sites::parse_site_ids;
use std::future::Future;
use std::path::Path;

// ---------------------------------------------------------------------------
// Shared option groups
// ---------------------------------------------------------------------------

/// Commerce instance connection options.
#[derive(Args, Debug, Clone)]
pub struct B2cArgs {
    /// Instance hostname (e.g. dev01-realm-org.demandware.net)
    #[arg(long = "b2c-hostname", env = "B2C_HOSTNAME")]
    pub hostname: String,

    /// Account Manager API client id
    #[arg(long = "b2c-client-id", env = "B2C_CLIENTID")]
    pub client_id: String,

    /// Account Manager API client secret
    #[arg(long = "b2c-client-secret", env = "B2C_CLIENTSECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Comma separated site ids
    #[arg(long = "b2c-site-ids", env = "B2C_SITEIDS")]
    pub site_ids: Option<String>,

    /// Code version to deploy or activate
    #[arg(long = "b2c-code-version", env = "B2C_CODEVERSION")]
    pub code_version: Option<String>,

    /// Instance name used for Salesforce records
    #[arg(long = "b2c-instance-name", env = "B2C_INSTANCENAME")]
    pub instance_name: Option<String>,

    /// Override the Account Manager URL from crmsync.yaml
    #[arg(long = "b2c-account-manager-url", env = "B2C_ACCOUNTMANAGER_URL")]
    pub account_manager_url: Option<String>,
}

impl B2cArgs {
    pub fn environment(&self, config: &Config) -> B2cEnvironment {
        let mut env = B2cEnvironment::new(
            &config.b2c,
            &self.hostname,
            &self.client_id,
            &self.client_secret,
        );
        env.site_ids = self
            .site_ids
            .as_deref()
            .map(parse_site_ids)
            .unwrap_or_default();
        env.code_version = self.code_version.clone();
        env.instance_name = self.instance_name.clone();
        if let Some(url) = &self.account_manager_url {
            env.account_manager_url = url.clone();
        }
        env
    }
}

/// Commerce instance identity, for commands that only describe the instance
/// to Salesforce and never call it.
#[derive(Args, Debug, Clone)]
pub struct B2cInstanceArgs {
    /// Instance hostname
    #[arg(long = "b2c-hostname", env = "B2C_HOSTNAME")]
    pub hostname: String,

    /// Account Manager API client id
    #[arg(long = "b2c-client-id", env = "B2C_CLIENTID")]
    pub client_id: String,

    /// Instance name used for Salesforce records
    #[arg(long = "b2c-instance-name", env = "B2C_INSTANCENAME")]
    pub instance_name: String,
}

impl B2cInstanceArgs {
    pub fn environment(&self, config: &Config) -> B2cEnvironment {
        let mut env = B2cEnvironment::new(&config.b2c, &self.hostname, &self.client_id, "");
        env.instance_name = Some(self.instance_name.clone());
        env
    }
}

/// Salesforce org options.
#[derive(Args, Debug, Clone)]
pub struct SfArgs {
    /// Org username
    #[arg(long = "sf-username", env = "SF_USERNAME")]
    pub username: String,

    /// Password; when set, log in with the password grant instead of the sf CLI
    #[arg(long = "sf-password", env = "SF_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Security token appended to the password
    #[arg(long = "sf-security-token", env = "SF_SECURITYTOKEN", hide_env_values = true)]
    pub security_token: Option<String>,

    /// My Domain hostname of the org
    #[arg(long = "sf-hostname", env = "SF_HOSTNAME")]
    pub sf_hostname: Option<String>,

    /// Override the login URL from crmsync.yaml
    #[arg(long = "sf-login-url", env = "SF_LOGINURL")]
    pub sf_login_url: Option<String>,

    /// sf CLI alias for the org (defaults to the username)
    #[arg(long = "sf-target-org", env = "SF_TARGETORG")]
    pub target_org: Option<String>,
}

impl SfArgs {
    pub fn environment(&self, config: &Config) -> SfEnvironment {
        let mut env = SfEnvironment::new(&config.sf, &self.username);
        env.password = self.password.clone();
        env.security_token = self.security_token.clone();
        env.hostname = self.sf_hostname.clone();
        env.target_org = self.target_org.clone();
        if let Some(url) = &self.sf_login_url {
            env.login_url = url.clone();
        }
        env
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).with_context(|| format!("failed to load config from {}", root.display()))
}

/// Run one command's async body on a fresh runtime.
pub fn block_on<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(future)
}
