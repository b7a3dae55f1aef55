use super::{block_on, load_config, B2cInstanceArgs, SfArgs};
use crate::output::{or_dash, print_json, print_table, OperationMode};
use anyhow::Context;
use clap::Subcommand;
use crmsync_core::auth::{self, SfSession};
use crmsync_core::config::Config;
use crmsync_core::credentials::ConnectedAppCredentials;
use crmsync_core::environment::SfEnvironment;
use crmsync_core::salesforce::{self, SfClient};
use crmsync_core::sfdx::SfCli;
use crmsync_core::templates;
use serde_json::json;
use std::path::Path;
use tracing::info;

#[derive(Subcommand)]
pub enum SfSubcommand {
    /// Open a session with the org and show who it belongs to
    Auth {
        #[command(flatten)]
        sf: SfArgs,
    },
    /// Render the Salesforce metadata for a commerce instance
    Build {
        #[command(flatten)]
        b2c: B2cInstanceArgs,
    },
    /// Deploy the rendered metadata with the sf CLI
    Deploy {
        #[command(flatten)]
        sf: SfArgs,
    },
    /// Create or update the instance and client id records in the org
    InstanceSetup {
        #[command(flatten)]
        sf: SfArgs,
        #[command(flatten)]
        b2c: B2cInstanceArgs,
    },
}

pub fn is_long_running(subcommand: &SfSubcommand) -> bool {
    matches!(subcommand, SfSubcommand::Deploy { .. })
}

pub fn run(root: &Path, subcommand: SfSubcommand, mode: OperationMode) -> anyhow::Result<()> {
    let config = load_config(root)?;
    match subcommand {
        SfSubcommand::Auth { sf } => block_on(async {
            let env = sf.environment(&config);
            let session = open_session(root, &config, &env).await?;
            if mode.is_json() {
                return print_json(&json!({
                    "username": session.username,
                    "org_id": session.org_id,
                    "instance_url": session.instance_url,
                }));
            }
            print_table(
                &["USERNAME", "ORG ID", "INSTANCE URL"],
                vec![vec![
                    or_dash(session.username.as_deref()),
                    or_dash(session.org_id.as_deref()),
                    session.instance_url.clone(),
                ]],
            );
            Ok(())
        }),

        SfSubcommand::Build { b2c } => {
            let env = b2c.environment(&config);
            let creds_path = root.join(&config.sf.credentials_file);
            let (credentials, created) = ConnectedAppCredentials::load_or_create(&creds_path)
                .context("failed to prepare connected app credentials")?;
            let values = templates::sf_values(&env, &config.sf.contact_email, &credentials)?;
            let source_dir = root.join(&config.sf.source_dir);
            let written = templates::generate_sf_metadata(&source_dir, &values)?;

            if mode.is_json() {
                return print_json(&json!({
                    "source_dir": source_dir,
                    "files": written,
                    "credentials_created": created,
                }));
            }
            let rows = written
                .iter()
                .map(|p| {
                    let shown = p.strip_prefix(root).unwrap_or(p);
                    vec![shown.display().to_string()]
                })
                .collect();
            print_table(&["WRITTEN"], rows);
            Ok(())
        }

        SfSubcommand::Deploy { sf } => block_on(async {
            let env = sf.environment(&config);
            env.validate()?;
            let source_dir = root.join(&config.sf.source_dir);
            if !source_dir.is_dir() {
                anyhow::bail!(
                    "{} does not exist; run `crm-sync sf build` first",
                    source_dir.display()
                );
            }
            let cli = SfCli::detect()?;
            info!(org = env.org(), dir = %source_dir.display(), "deploying salesforce metadata");
            let result = cli.deploy_source(&source_dir, env.org()).await?;
            if mode.is_json() {
                return print_json(&result);
            }
            let status = result
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("Succeeded");
            let files = result
                .get("files")
                .and_then(|f| f.as_array())
                .map(|f| f.len())
                .unwrap_or(0);
            print_table(
                &["ORG", "STATUS", "COMPONENTS"],
                vec![vec![env.org().to_string(), status.to_string(), files.to_string()]],
            );
            Ok(())
        }),

        SfSubcommand::InstanceSetup { sf, b2c } => block_on(async {
            let env = sf.environment(&config);
            let b2c_env = b2c.environment(&config);
            let session = open_session(root, &config, &env).await?;
            let client = SfClient::new(&env, session)?;
            let outcomes = salesforce::setup_instance(&client, &b2c_env).await?;
            if mode.is_json() {
                return print_json(&outcomes);
            }
            let rows = outcomes
                .iter()
                .map(|o| {
                    vec![
                        o.sobject.clone(),
                        o.name.clone(),
                        o.id.clone(),
                        if o.created { "created".into() } else { "updated".into() },
                    ]
                })
                .collect();
            print_table(&["OBJECT", "NAME", "ID", "RESULT"], rows);
            Ok(())
        }),
    }
}

/// Password grant when a password is configured, otherwise reuse the sf
/// CLI's stored authorisation for the org.
async fn open_session(root: &Path, config: &Config, env: &SfEnvironment) -> anyhow::Result<SfSession> {
    env.validate()?;
    if env.password.as_deref().is_some_and(|p| !p.is_empty()) {
        let creds_path = root.join(&config.sf.credentials_file);
        let credentials = ConnectedAppCredentials::load(&creds_path).with_context(|| {
            format!(
                "no connected app credentials at {}; run `crm-sync sf build` and deploy first",
                creds_path.display()
            )
        })?;
        let http = auth::http_client(env.request_timeout())?;
        return Ok(auth::sf_password_login(&http, env, &credentials).await?);
    }
    let cli = SfCli::detect()?;
    Ok(cli.org_display(env.org()).await?)
}
