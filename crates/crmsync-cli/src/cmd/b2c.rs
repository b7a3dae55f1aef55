use super::{block_on, load_config, B2cArgs};
use crate::output::{or_dash, print_json, print_section, print_table, OperationMode};
use anyhow::Context;
use clap::{Args, Subcommand};
use crmsync_core::auth;
use crmsync_core::credentials::ConnectedAppCredentials;
use crmsync_core::deploy::{self, DeployOptions, DeployScope};
use crmsync_core::job::{self, PollPolicy};
use crmsync_core::ocapi::B2cClient;
use crmsync_core::oobo;
use crmsync_core::sites::{self, CartridgeResult, SiteVerification};
use crmsync_core::templates;
use serde_json::json;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand tree
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum B2cSubcommand {
    /// Authenticate against Account Manager and show the token details
    Auth {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// Fetch every configured site and report which ones are usable
    SitesVerify {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// Add the crm-sync cartridges to each eligible site's cartridge path
    CartridgesAdd {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// Remove the crm-sync cartridges from each site's cartridge path
    CartridgesRemove {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// List code versions on the instance
    CodeVersions {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// Activate the configured code version
    CodeActivate {
        #[command(flatten)]
        b2c: B2cArgs,
    },
    /// Zip the cartridges directory and deploy it as the configured code version
    CodeDeploy {
        #[command(flatten)]
        b2c: B2cArgs,
        /// Activate the code version once deployed
        #[arg(long)]
        activate: bool,
    },
    /// Upload and import an existing site archive
    DataDeploy {
        #[command(flatten)]
        b2c: B2cArgs,
        /// Path to the site archive zip
        #[arg(long)]
        archive: PathBuf,
    },
    /// Generate the site archive from templates, zip it, and import it
    Build {
        #[command(flatten)]
        b2c: B2cArgs,
        #[command(flatten)]
        sf: SfEndpointArgs,
        /// Stop after writing the archive
        #[arg(long)]
        no_deploy: bool,
    },
    /// Fetch and classify one job execution
    JobStatus {
        #[command(flatten)]
        b2c: B2cArgs,
        #[arg(long)]
        job_id: String,
        #[arg(long)]
        execution_id: String,
    },
    /// Create the anonymous order-on-behalf-of customer in every site
    OoboCustomersCreate {
        #[command(flatten)]
        b2c: B2cArgs,
    },
}

/// Salesforce endpoints baked into the generated service definitions.
#[derive(Args, Debug, Clone)]
pub struct SfEndpointArgs {
    /// My Domain hostname of the org
    #[arg(long = "sf-hostname", env = "SF_HOSTNAME")]
    pub sf_hostname: String,

    /// Override the login URL from crmsync.yaml
    #[arg(long = "sf-login-url", env = "SF_LOGINURL")]
    pub sf_login_url: Option<String>,
}

/// Commands that run long enough to want progress logging by default.
pub fn is_long_running(subcommand: &B2cSubcommand) -> bool {
    matches!(
        subcommand,
        B2cSubcommand::CodeDeploy { .. } | B2cSubcommand::DataDeploy { .. } | B2cSubcommand::Build { .. }
    )
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcommand: B2cSubcommand, mode: OperationMode) -> anyhow::Result<()> {
    let config = load_config(root)?;
    match subcommand {
        B2cSubcommand::Auth { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let http = auth::http_client(env.request_timeout())?;
            let token = auth::authenticate(&http, &env).await?;
            if mode.is_json() {
                return print_json(&json!({
                    "client_id": env.client_id,
                    "token_type": token.token_type,
                    "expires_in": token.expires_in,
                }));
            }
            print_table(
                &["CLIENT ID", "TOKEN TYPE", "EXPIRES IN"],
                vec![vec![
                    env.client_id.clone(),
                    token.token_type,
                    token
                        .expires_in
                        .map(|s| format!("{s}s"))
                        .unwrap_or_else(|| "-".into()),
                ]],
            );
            Ok(())
        }),

        B2cSubcommand::SitesVerify { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let site_ids = env.require_sites()?.to_vec();
            let client = B2cClient::connect(&env).await?;
            let verification = sites::verify_sites(&client, &site_ids).await;
            show_verification(&verification, mode)?;
            if !verification.is_complete() {
                anyhow::bail!("{} site(s) failed verification", verification.error.len());
            }
            Ok(())
        }),

        B2cSubcommand::CartridgesAdd { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let site_ids = env.require_sites()?.to_vec();
            let client = B2cClient::connect(&env).await?;
            let verification = sites::verify_sites(&client, &site_ids).await;
            let results = sites::add_cartridges(
                &client,
                &verification,
                &config.b2c.cartridges,
                config.b2c.required_cartridge.as_deref(),
            )
            .await;
            show_cartridges(&verification, &results, mode)
        }),

        B2cSubcommand::CartridgesRemove { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let site_ids = env.require_sites()?.to_vec();
            let client = B2cClient::connect(&env).await?;
            let verification = sites::verify_sites(&client, &site_ids).await;
            let results =
                sites::remove_cartridges(&client, &verification, &config.b2c.cartridges).await;
            show_cartridges(&verification, &results, mode)
        }),

        B2cSubcommand::CodeVersions { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let client = B2cClient::connect(&env).await?;
            let versions = client.code_versions().await?;
            if mode.is_json() {
                return print_json(&versions);
            }
            let rows = versions
                .iter()
                .map(|v| {
                    vec![
                        v.id.clone(),
                        if v.active { "yes".into() } else { "".into() },
                        or_dash(v.last_modification_time.as_deref()),
                        v.cartridges.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["CODE VERSION", "ACTIVE", "MODIFIED", "CARTRIDGES"], rows);
            Ok(())
        }),

        B2cSubcommand::CodeActivate { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let version = env.require_code_version()?.to_string();
            let client = B2cClient::connect(&env).await?;
            let activated = client.activate_code_version(&version).await?;
            if mode.is_json() {
                return print_json(&activated);
            }
            println!("Activated code version {} on {}", activated.id, env.hostname);
            Ok(())
        }),

        B2cSubcommand::CodeDeploy { b2c, activate } => block_on(async {
            let env = b2c.environment(&config);
            let archive = deploy::build_code_archive(root, &config, &env)
                .context("failed to build code archive")?;
            let outcome = deploy::deploy(
                &env,
                &PollPolicy::from(&config.polling),
                DeployScope::Code,
                &archive,
                &DeployOptions { activate },
            )
            .await?;
            show_outcome(&outcome, mode)
        }),

        B2cSubcommand::DataDeploy { b2c, archive } => block_on(async {
            let env = b2c.environment(&config);
            let outcome = deploy::deploy(
                &env,
                &PollPolicy::from(&config.polling),
                DeployScope::Data,
                &archive,
                &DeployOptions::default(),
            )
            .await?;
            show_outcome(&outcome, mode)
        }),

        B2cSubcommand::Build { b2c, sf, no_deploy } => block_on(async {
            let env = b2c.environment(&config);
            let creds_path = root.join(&config.sf.credentials_file);
            let (credentials, _) = ConnectedAppCredentials::load_or_create(&creds_path)
                .context("failed to prepare connected app credentials")?;
            let login_url = sf.sf_login_url.as_deref().unwrap_or(&config.sf.login_url);
            let values = templates::b2c_values(
                login_url,
                &sf.sf_hostname,
                &config.sf.api_version,
                &credentials,
            );

            if no_deploy {
                let archive = deploy::build_data_archive(root, &config, &env, &values)?;
                if mode.is_json() {
                    return print_json(&json!({ "archive": archive }));
                }
                println!("Site archive written to {}", archive.display());
                return Ok(());
            }

            let outcome = deploy::build_and_deploy(root, &config, &env, &values).await?;
            show_outcome(&outcome, mode)
        }),

        B2cSubcommand::JobStatus {
            b2c,
            job_id,
            execution_id,
        } => block_on(async {
            let env = b2c.environment(&config);
            let client = B2cClient::connect(&env).await?;
            let details = client.job_status(&job_id, &execution_id).await?;
            let tick = job::classify(&details, &config.polling.valid_statuses);
            let state = match &tick {
                job::JobTick::Done => "done".to_string(),
                job::JobTick::Pending => "pending".to_string(),
                job::JobTick::Unknown => "unknown".to_string(),
                job::JobTick::Failed(message) => format!("failed: {message}"),
            };
            if mode.is_json() {
                return print_json(&json!({ "state": state, "job": details }));
            }
            print_table(
                &["JOB", "EXECUTION", "STATUS", "STATE"],
                vec![vec![
                    or_dash(details.job_id.as_deref()),
                    or_dash(details.id.as_deref()),
                    or_dash(details.status.as_deref()),
                    state,
                ]],
            );
            Ok(())
        }),

        B2cSubcommand::OoboCustomersCreate { b2c } => block_on(async {
            let env = b2c.environment(&config);
            let site_ids = env.require_sites()?.to_vec();
            let client = B2cClient::connect(&env).await?;
            let verification = sites::verify_sites(&client, &site_ids).await;
            let results = oobo::create_customers(&client, &verification, &config.b2c.oobo).await;
            if mode.is_json() {
                print_json(&json!({ "sites": verification, "customers": results }))?;
            } else {
                show_verification(&verification, mode)?;
                let rows = results
                    .success
                    .iter()
                    .chain(results.error.iter())
                    .map(|r| {
                        vec![
                            r.site_id.clone(),
                            r.customer_list.clone(),
                            r.customer_no.clone(),
                            r.error.clone().unwrap_or_else(|| "created".into()),
                        ]
                    })
                    .collect();
                print_section(
                    "OOBO customers",
                    &["SITE", "CUSTOMER LIST", "CUSTOMER NO", "RESULT"],
                    rows,
                );
            }
            if !results.error.is_empty() || !verification.is_complete() {
                anyhow::bail!("OOBO customer creation did not complete for every site");
            }
            Ok(())
        }),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn show_verification(verification: &SiteVerification, mode: OperationMode) -> anyhow::Result<()> {
    if mode.is_json() {
        return print_json(verification);
    }
    let ok_rows = verification
        .success
        .iter()
        .map(|r| {
            let details = r.site_details.as_ref();
            vec![
                r.site_id.clone(),
                or_dash(details.and_then(|d| d.storefront_status.as_deref())),
                or_dash(details.and_then(|d| d.cartridges.as_deref())),
            ]
        })
        .collect();
    print_section("Verified sites", &["SITE", "STATUS", "CARTRIDGE PATH"], ok_rows);

    if !verification.error.is_empty() {
        let err_rows = verification
            .error
            .iter()
            .map(|r| vec![r.site_id.clone(), or_dash(r.error.as_deref())])
            .collect();
        print_section("Sites with errors", &["SITE", "ERROR"], err_rows);
    }
    Ok(())
}

fn show_cartridges(
    verification: &SiteVerification,
    results: &[CartridgeResult],
    mode: OperationMode,
) -> anyhow::Result<()> {
    let failed = results.iter().filter(|r| !r.is_valid && !r.skipped).count();
    if mode.is_json() {
        print_json(&json!({ "sites": verification, "cartridges": results }))?;
    } else {
        show_verification(verification, mode)?;
        let rows = results
            .iter()
            .map(|r| {
                let outcome = if r.is_valid {
                    "updated".to_string()
                } else if r.skipped {
                    format!("skipped: {}", or_dash(r.error.as_deref()))
                } else {
                    format!("failed: {}", or_dash(r.error.as_deref()))
                };
                vec![
                    r.site_id.clone(),
                    r.action.as_str().to_string(),
                    r.cartridge.clone(),
                    outcome,
                ]
            })
            .collect();
        print_section("Cartridge updates", &["SITE", "ACTION", "CARTRIDGE", "RESULT"], rows);
    }
    if failed > 0 || !verification.is_complete() {
        anyhow::bail!(
            "{failed} cartridge update(s) failed, {} site(s) unavailable",
            verification.error.len()
        );
    }
    Ok(())
}

fn show_outcome(outcome: &deploy::DeployOutcome, mode: OperationMode) -> anyhow::Result<()> {
    if mode.is_json() {
        return print_json(outcome);
    }
    let job = outcome.job.as_ref();
    print_table(
        &["SCOPE", "HOST", "ARCHIVE", "CODE VERSION", "JOB STATUS", "ACTIVATED"],
        vec![vec![
            outcome.scope.to_string(),
            outcome.hostname.clone(),
            outcome.archive.clone(),
            or_dash(outcome.code_version.as_deref()),
            or_dash(job.and_then(|j| j.status.as_deref())),
            if outcome.activated { "yes".into() } else { "no".into() },
        ]],
    );
    Ok(())
}
