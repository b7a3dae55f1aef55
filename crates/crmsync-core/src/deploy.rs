//! Deployment pipeline: verify → authenticate → upload → import → report.
//!
//! Steps run strictly in sequence. The first failure aborts the rest and is
//! reported as a scope-specific `CrmSyncError::Deploy`; nothing is rolled back.

use crate::archive;
use crate::config::Config;
use crate::environment::B2cEnvironment;
use crate::error::{CrmSyncError, Result};
use crate::job::{self, JobDetails, PollPolicy};
use crate::ocapi::{B2cClient, UploadTarget};
use crate::templates::{self, TemplateValues};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployScope {
    Data,
    Code,
}

impl DeployScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployScope::Data => "data",
            DeployScope::Code => "code",
        }
    }

    fn upload_target(&self) -> UploadTarget {
        match self {
            DeployScope::Data => UploadTarget::Impex,
            DeployScope::Code => UploadTarget::Cartridges,
        }
    }
}

impl std::fmt::Display for DeployScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployOutcome {
    pub scope: DeployScope,
    pub archive: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobDetails>,
    pub activated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Activate the code version after a code deployment.
    pub activate: bool,
}

fn step_error(scope: DeployScope, step: &'static str) -> impl FnOnce(CrmSyncError) -> CrmSyncError {
    move |e| CrmSyncError::Deploy {
        scope: scope.to_string(),
        step,
        message: e.to_string(),
    }
}

/// Run the pipeline for `archive_path`.
pub async fn deploy(
    env: &B2cEnvironment,
    policy: &PollPolicy,
    scope: DeployScope,
    archive_path: &Path,
    options: &DeployOptions,
) -> Result<DeployOutcome> {
    info!(%scope, archive = %archive_path.display(), "deployment started");

    if !archive_path.is_file() {
        return Err(step_error(scope, "verify")(CrmSyncError::ArchiveMissing(
            archive_path.display().to_string(),
        )));
    }
    let code_version = match scope {
        DeployScope::Code => Some(
            env.require_code_version()
                .map_err(step_error(scope, "verify"))?
                .to_string(),
        ),
        DeployScope::Data => None,
    };

    let client = B2cClient::connect(env)
        .await
        .map_err(step_error(scope, "authenticate"))?;

    let file_name = client
        .upload(scope.upload_target(), archive_path)
        .await
        .map_err(step_error(scope, "upload"))?;
    info!(%scope, file_name, "archive uploaded");

    let mut outcome = DeployOutcome {
        scope,
        archive: file_name.clone(),
        hostname: env.hostname.clone(),
        code_version: code_version.clone(),
        job: None,
        activated: false,
    };

    match scope {
        DeployScope::Data => {
            let started = client
                .start_site_import(&file_name)
                .await
                .map_err(step_error(scope, "import"))?;
            let (job_id, execution_id) = match (started.job_id.clone(), started.id.clone()) {
                (Some(j), Some(i)) => (j, i),
                _ => {
                    return Err(step_error(scope, "import")(CrmSyncError::JobFailed(
                        "import job did not return an execution id".to_string(),
                    )))
                }
            };
            let (client_ref, job_id, execution_id) = (&client, job_id.as_str(), execution_id.as_str());
            let finished = job::poll_job(policy, move || client_ref.job_status(job_id, execution_id))
                .await
                .map_err(step_error(scope, "import"))?;
            outcome.job = Some(finished);
        }
        DeployScope::Code => {
            client
                .unzip_code(&file_name)
                .await
                .map_err(step_error(scope, "import"))?;
            client
                .delete_upload(UploadTarget::Cartridges, &file_name)
                .await
                .map_err(step_error(scope, "import"))?;
            if options.activate {
                if let Some(version) = &code_version {
                    client
                        .activate_code_version(version)
                        .await
                        .map_err(step_error(scope, "activate"))?;
                    outcome.activated = true;
                }
            }
        }
    }

    info!(%scope, archive = %outcome.archive, "deployment finished");
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Archive builders
// ---------------------------------------------------------------------------

/// Render the B2C metadata templates and zip them into
/// `<data_dir>/<archive_name>.zip`.
pub fn build_data_archive(
    root: &Path,
    config: &Config,
    env: &B2cEnvironment,
    values: &TemplateValues,
) -> Result<PathBuf> {
    let site_ids = env.require_sites()?;
    let name = &config.b2c.data_archive_name;
    let data_dir = root.join(&config.b2c.data_dir);
    let staging = data_dir.join(name);

    let written = templates::generate_b2c_metadata(&staging, values, site_ids)?;
    let zip_path = data_dir.join(format!("{name}.zip"));
    archive::zip_directory(&staging, &zip_path, name)?;
    info!(files = written.len(), archive = %zip_path.display(), "data archive built");
    Ok(zip_path)
}

/// Zip the cartridges directory under the code version name.
pub fn build_code_archive(root: &Path, config: &Config, env: &B2cEnvironment) -> Result<PathBuf> {
    let version = env.require_code_version()?;
    let src = root.join(&config.b2c.cartridges_dir);
    let zip_path = root
        .join(&config.b2c.build_dir)
        .join(format!("{version}.zip"));
    let files = archive::zip_directory(&src, &zip_path, version)?;
    info!(files, archive = %zip_path.display(), "code archive built");
    Ok(zip_path)
}

/// Build the data archive from templates and deploy it.
pub async fn build_and_deploy(
    root: &Path,
    config: &Config,
    env: &B2cEnvironment,
    values: &TemplateValues,
) -> Result<DeployOutcome> {
    let archive = build_data_archive(root, config, env, values)?;
    deploy(
        env,
        &PollPolicy::from(&config.polling),
        DeployScope::Data,
        &archive,
        &DeployOptions::default(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::B2cConfig;
    use mockito::Matcher;
    use std::time::Duration;
    use tempfile::TempDir;

    fn env_for(server: &mockito::Server) -> B2cEnvironment {
        let mut env = B2cEnvironment::new(&B2cConfig::default(), server.url(), "id", "secret");
        env.account_manager_url = server.url();
        env.code_version = Some("crm_sync_v1".into());
        env
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            unknown_threshold: 2,
            ..PollPolicy::default()
        }
    }

    async fn mock_auth(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/dwsso/oauth2/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"tok","token_type":"Bearer","expires_in":1799}"#)
            .create_async()
            .await
    }

    fn archive_in(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"PK\x05\x06").unwrap();
        path
    }

    #[tokio::test]
    async fn missing_archive_fails_before_authenticating() {
        let mut server = mockito::Server::new_async().await;
        let auth = server
            .mock("POST", "/dwsso/oauth2/access_token")
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let err = deploy(
            &env_for(&server),
            &fast_policy(),
            DeployScope::Data,
            &dir.path().join("absent.zip"),
            &DeployOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("b2c data deployment failed during verify"));
        auth.assert_async().await;
    }

    #[tokio::test]
    async fn data_pipeline_polls_until_ok() {
        let mut server = mockito::Server::new_async().await;
        mock_auth(&mut server).await;
        server
            .mock(
                "PUT",
                "/on/demandware.servlet/webdav/Sites/Impex/src/instance/data.zip",
            )
            .with_status(201)
            .create_async()
            .await;
        server
            .mock(
                "POST",
                "/s/-/dw/data/v21_3/jobs/sfcc-site-archive-import/executions",
            )
            .match_body(Matcher::PartialJson(serde_json::json!({"file_name": "data.zip"})))
            .with_status(202)
            .with_body(r#"{"job_id":"sfcc-site-archive-import","id":"77","execution_status":"running","status":"RUNNING"}"#)
            .create_async()
            .await;
        let status = server
            .mock(
                "GET",
                "/s/-/dw/data/v21_3/jobs/sfcc-site-archive-import/executions/77",
            )
            .with_status(200)
            .with_body(r#"{"job_id":"sfcc-site-archive-import","id":"77","execution_status":"finished","status":"OK"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let outcome = deploy(
            &env_for(&server),
            &fast_policy(),
            DeployScope::Data,
            &archive_in(&dir, "data.zip"),
            &DeployOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.archive, "data.zip");
        assert_eq!(outcome.job.unwrap().status.as_deref(), Some("OK"));
        status.assert_async().await;
    }

    #[tokio::test]
    async fn data_pipeline_reports_job_failure_message() {
        let mut server = mockito::Server::new_async().await;
        mock_auth(&mut server).await;
        server
            .mock(
                "PUT",
                "/on/demandware.servlet/webdav/Sites/Impex/src/instance/data.zip",
            )
            .with_status(201)
            .create_async()
            .await;
        server
            .mock(
                "POST",
                "/s/-/dw/data/v21_3/jobs/sfcc-site-archive-import/executions",
            )
            .with_status(202)
            .with_body(r#"{"job_id":"sfcc-site-archive-import","id":"78","status":"PENDING"}"#)
            .create_async()
            .await;
        server
            .mock(
                "GET",
                "/s/-/dw/data/v21_3/jobs/sfcc-site-archive-import/executions/78",
            )
            .with_status(200)
            .with_body(r#"{"job_id":"sfcc-site-archive-import","id":"78","status":"ERROR",
                "step_executions":[{"exit_status":{"message":"Import of services.xml failed"}}]}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let err = deploy(
            &env_for(&server),
            &fast_policy(),
            DeployScope::Data,
            &archive_in(&dir, "data.zip"),
            &DeployOptions::default(),
        )
        .await
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("during import"), "{msg}");
        assert!(msg.contains("Import of services.xml failed"), "{msg}");
    }

    #[tokio::test]
    async fn upload_failure_skips_import() {
        let mut server = mockito::Server::new_async().await;
        mock_auth(&mut server).await;
        server
            .mock(
                "PUT",
                "/on/demandware.servlet/webdav/Sites/Impex/src/instance/data.zip",
            )
            .with_status(401)
            .create_async()
            .await;
        let import = server
            .mock(
                "POST",
                "/s/-/dw/data/v21_3/jobs/sfcc-site-archive-import/executions",
            )
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let err = deploy(
            &env_for(&server),
            &fast_policy(),
            DeployScope::Data,
            &archive_in(&dir, "data.zip"),
            &DeployOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("during upload"));
        import.assert_async().await;
    }

    #[tokio::test]
    async fn code_pipeline_unzips_deletes_and_activates() {
        let mut server = mockito::Server::new_async().await;
        mock_auth(&mut server).await;
        let path = "/on/demandware.servlet/webdav/Sites/Cartridges/crm_sync_v1.zip";
        server.mock("PUT", path).with_status(201).create_async().await;
        let unzip = server
            .mock("POST", path)
            .match_body(Matcher::UrlEncoded("method".into(), "UNZIP".into()))
            .with_status(201)
            .create_async()
            .await;
        let delete = server.mock("DELETE", path).with_status(204).create_async().await;
        let activate = server
            .mock("PATCH", "/s/-/dw/data/v21_3/code_versions/crm_sync_v1")
            .with_status(200)
            .with_body(r#"{"id":"crm_sync_v1","active":true}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let outcome = deploy(
            &env_for(&server),
            &fast_policy(),
            DeployScope::Code,
            &archive_in(&dir, "crm_sync_v1.zip"),
            &DeployOptions { activate: true },
        )
        .await
        .unwrap();

        assert!(outcome.activated);
        assert_eq!(outcome.code_version.as_deref(), Some("crm_sync_v1"));
        unzip.assert_async().await;
        delete.assert_async().await;
        activate.assert_async().await;
    }

    #[test]
    fn data_archive_is_built_from_templates() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let mut env = B2cEnvironment::new(&config.b2c, "dev01", "id", "secret");
        env.site_ids = vec!["RefArch".into()];
        let creds = crate::credentials::ConnectedAppCredentials::generate();
        let values = templates::b2c_values("login.salesforce.com", "acme.my.salesforce.com", "58.0", &creds);

        let zip_path = build_data_archive(dir.path(), &config, &env, &values).unwrap();
        assert!(zip_path.ends_with("build/b2c/data/b2c-crm-sync-data.zip"));
        let zip = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"b2c-crm-sync-data/sites/RefArch/preferences.xml"));
        assert!(names.contains(&"b2c-crm-sync-data/services.xml"));
    }

    #[test]
    fn code_archive_uses_code_version_as_root() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        std::fs::create_dir_all(dir.path().join("cartridges/int_b2ccrmsync")).unwrap();
        std::fs::write(dir.path().join("cartridges/int_b2ccrmsync/.project"), "x").unwrap();
        let mut env = B2cEnvironment::new(&config.b2c, "dev01", "id", "secret");
        env.code_version = Some("v7".into());

        let zip_path = build_code_archive(dir.path(), &config, &env).unwrap();
        assert!(zip_path.ends_with("build/b2c/v7.zip"));
        let zip = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        assert!(zip.file_names().any(|n| n == "v7/int_b2ccrmsync/.project"));
    }

    #[test]
    fn code_archive_stays_under_root_when_data_dir_is_the_root() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.b2c.data_dir = PathBuf::from(".");
        config.b2c.build_dir = PathBuf::from("");
        std::fs::create_dir_all(dir.path().join("cartridges/int_b2ccrmsync")).unwrap();
        std::fs::write(dir.path().join("cartridges/int_b2ccrmsync/.project"), "x").unwrap();
        let mut env = B2cEnvironment::new(&config.b2c, "dev01", "id", "secret");
        env.code_version = Some("v8".into());

        let zip_path = build_code_archive(dir.path(), &config, &env).unwrap();
        assert_eq!(zip_path, dir.path().join("v8.zip"));
        assert!(zip_path.is_file());
    }
}
