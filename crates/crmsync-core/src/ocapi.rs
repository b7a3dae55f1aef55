//! Authenticated client for the commerce platform's Data API and WebDAV
//! endpoints.

use crate::auth::{self, AccessToken};
use crate::config::CartridgeSpec;
use crate::environment::B2cEnvironment;
use crate::error::{excerpt, CrmSyncError, Result};
use crate::job::JobDetails;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::{debug, info};

pub const SITE_IMPORT_JOB: &str = "sfcc-site-archive-import";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteDetails {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Value>,
    /// Colon separated cartridge path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartridges: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SiteDetails {
    pub fn cartridge_list(&self) -> Vec<&str> {
        self.cartridges
            .as_deref()
            .unwrap_or("")
            .split(':')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn has_cartridge(&self, name: &str) -> bool {
        self.cartridge_list().iter().any(|c| *c == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeVersion {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modification_time: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cartridges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CodeVersionList {
    #[serde(default)]
    data: Vec<CodeVersion>,
}

/// Upload target folders below `/on/demandware.servlet/webdav/Sites/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadTarget {
    Impex,
    Cartridges,
}

impl UploadTarget {
    fn folder(&self) -> &'static str {
        match self {
            UploadTarget::Impex => "Impex/src/instance",
            UploadTarget::Cartridges => "Cartridges",
        }
    }
}

// ---------------------------------------------------------------------------
// B2cClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct B2cClient {
    http: Client,
    base_url: String,
    api_version: String,
    token: AccessToken,
}

impl B2cClient {
    /// Authenticate once and return a client holding the bearer token.
    pub async fn connect(env: &B2cEnvironment) -> Result<Self> {
        let http = auth::http_client(env.request_timeout())?;
        let token = auth::authenticate(&http, env).await?;
        Ok(Self::with_token(http, env, token))
    }

    pub fn with_token(http: Client, env: &B2cEnvironment, token: AccessToken) -> Self {
        Self {
            http,
            base_url: env.base_url(),
            api_version: env.api_version.clone(),
            token,
        }
    }

    fn data_url(&self, path: &str) -> String {
        format!("{}/s/-/dw/data/{}{}", self.base_url, self.api_version, path)
    }

    fn webdav_url(&self, target: UploadTarget, file: &str) -> String {
        format!(
            "{}/on/demandware.servlet/webdav/Sites/{}/{}",
            self.base_url,
            target.folder(),
            file
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, %url, "b2c request");
        self.http
            .request(method, url)
            .bearer_auth(&self.token.access_token)
    }

    async fn expect_success(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CrmSyncError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: excerpt(&body),
        })
    }

    // -----------------------------------------------------------------------
    // Sites
    // -----------------------------------------------------------------------

    /// Fetch a site. Returns the raw status so callers can bucket by it.
    pub async fn get_site(&self, site_id: &str) -> Result<(StatusCode, Value)> {
        let url = self.data_url(&format!("/sites/{site_id}"));
        let response = self.request(Method::GET, &url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }

    /// Insert a cartridge into a site's path. Returns the updated path when
    /// the API reports it.
    pub async fn add_cartridge(
        &self,
        site_id: &str,
        cartridge: &CartridgeSpec,
    ) -> Result<Option<String>> {
        let url = self.data_url(&format!("/sites/{site_id}/cartridges"));
        let mut body = json!({
            "name": cartridge.name,
            "position": cartridge.position.as_str(),
        });
        if let Some(target) = &cartridge.target {
            body["target"] = json!(target);
        }
        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let response = Self::expect_success(&url, response).await?;
        Ok(cartridges_field(response).await)
    }

    pub async fn remove_cartridge(&self, site_id: &str, name: &str) -> Result<Option<String>> {
        let url = self.data_url(&format!("/sites/{site_id}/cartridges/{name}"));
        let response = self.request(Method::DELETE, &url).send().await?;
        let response = Self::expect_success(&url, response).await?;
        Ok(cartridges_field(response).await)
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub async fn start_site_import(&self, file_name: &str) -> Result<JobDetails> {
        let url = self.data_url(&format!("/jobs/{SITE_IMPORT_JOB}/executions"));
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "file_name": file_name }))
            .send()
            .await?;
        let response = Self::expect_success(&url, response).await?;
        let details: JobDetails = response.json().await?;
        info!(file_name, job_id = ?details.job_id, id = ?details.id, "site import started");
        Ok(details)
    }

    pub async fn job_status(&self, job_id: &str, execution_id: &str) -> Result<JobDetails> {
        let url = self.data_url(&format!("/jobs/{job_id}/executions/{execution_id}"));
        let response = self.request(Method::GET, &url).send().await?;
        let response = Self::expect_success(&url, response).await?;
        Ok(response.json().await?)
    }

    // -----------------------------------------------------------------------
    // WebDAV
    // -----------------------------------------------------------------------

    pub async fn upload(&self, target: UploadTarget, archive: &Path) -> Result<String> {
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CrmSyncError::ArchiveMissing(archive.display().to_string()))?
            .to_string();
        let bytes = tokio::fs::read(archive).await?;
        let url = self.webdav_url(target, &file_name);
        info!(%url, size = bytes.len(), "uploading archive");
        let response = self.request(Method::PUT, &url).body(bytes).send().await?;
        Self::expect_success(&url, response).await?;
        Ok(file_name)
    }

    pub async fn unzip_code(&self, file_name: &str) -> Result<()> {
        let url = self.webdav_url(UploadTarget::Cartridges, file_name);
        let response = self
            .request(Method::POST, &url)
            .form(&[("method", "UNZIP")])
            .send()
            .await?;
        Self::expect_success(&url, response).await?;
        Ok(())
    }

    pub async fn delete_upload(&self, target: UploadTarget, file_name: &str) -> Result<()> {
        let url = self.webdav_url(target, file_name);
        let response = self.request(Method::DELETE, &url).send().await?;
        Self::expect_success(&url, response).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Code versions
    // -----------------------------------------------------------------------

    pub async fn code_versions(&self) -> Result<Vec<CodeVersion>> {
        let url = self.data_url("/code_versions");
        let response = self.request(Method::GET, &url).send().await?;
        let response = Self::expect_success(&url, response).await?;
        let list: CodeVersionList = response.json().await?;
        Ok(list.data)
    }

    pub async fn activate_code_version(&self, code_version: &str) -> Result<CodeVersion> {
        let url = self.data_url(&format!("/code_versions/{code_version}"));
        let response = self
            .request(Method::PATCH, &url)
            .json(&json!({ "active": true }))
            .send()
            .await?;
        let response = Self::expect_success(&url, response).await?;
        info!(code_version, "code version activated");
        Ok(response.json().await?)
    }

    // -----------------------------------------------------------------------
    // Customers
    // -----------------------------------------------------------------------

    pub async fn put_customer(
        &self,
        customer_list: &str,
        customer_no: &str,
        body: &Value,
    ) -> Result<Value> {
        let url = self.data_url(&format!(
            "/customer_lists/{customer_list}/customers/{customer_no}"
        ));
        let response = self.request(Method::PUT, &url).json(body).send().await?;
        let response = Self::expect_success(&url, response).await?;
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

async fn cartridges_field(response: Response) -> Option<String> {
    let body: Value = response.json().await.ok()?;
    body.get("cartridges")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{B2cConfig, CartridgePosition};
    use std::time::Duration;

    fn client(server: &mockito::Server) -> B2cClient {
        let env = B2cEnvironment::new(&B2cConfig::default(), server.url(), "id", "secret");
        let token = AccessToken {
            access_token: "tok".into(),
            token_type: "Bearer".into(),
            expires_in: None,
        };
        B2cClient::with_token(auth::http_client(Duration::from_secs(5)).unwrap(), &env, token)
    }

    #[test]
    fn cartridge_list_ignores_blank_segments() {
        let site = SiteDetails {
            id: "RefArch".into(),
            cartridges: Some("app_custom: :app_storefront_base::".into()),
            ..Default::default()
        };
        assert_eq!(site.cartridge_list(), vec!["app_custom", "app_storefront_base"]);
        assert!(site.has_cartridge("app_storefront_base"));
        assert!(!site.has_cartridge("app_storefront"));
    }

    #[tokio::test]
    async fn get_site_returns_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/s/-/dw/data/v21_3/sites/RefArch")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"id":"RefArch","cartridges":"app_storefront_base"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/s/-/dw/data/v21_3/sites/Missing")
            .with_status(404)
            .with_body(r#"{"fault":{"type":"SiteNotFoundException"}}"#)
            .create_async()
            .await;

        let c = client(&server);
        let (status, body) = c.get_site("RefArch").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "RefArch");
        let (status, _) = c.get_site("Missing").await.unwrap();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn add_cartridge_sends_position_and_target() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/s/-/dw/data/v21_3/sites/RefArch/cartridges")
            .match_body(mockito::Matcher::Json(json!({
                "name": "int_b2ccrmsync",
                "position": "after",
                "target": "plugin_b2ccrmsync"
            })))
            .with_status(200)
            .with_body(r#"{"cartridges":"plugin_b2ccrmsync:int_b2ccrmsync:app_storefront_base"}"#)
            .create_async()
            .await;

        let spec = CartridgeSpec {
            name: "int_b2ccrmsync".into(),
            position: CartridgePosition::After,
            target: Some("plugin_b2ccrmsync".into()),
        };
        let path = client(&server).add_cartridge("RefArch", &spec).await.unwrap();
        assert_eq!(
            path.as_deref(),
            Some("plugin_b2ccrmsync:int_b2ccrmsync:app_storefront_base")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_becomes_unexpected_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/s/-/dw/data/v21_3/code_versions")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let err = client(&server).code_versions().await.unwrap_err();
        assert!(matches!(err, CrmSyncError::UnexpectedStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn code_versions_parses_data_array() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/s/-/dw/data/v21_3/code_versions")
            .with_status(200)
            .with_body(r#"{"count":2,"data":[{"id":"v1","active":true},{"id":"v2"}]}"#)
            .create_async()
            .await;

        let versions = client(&server).code_versions().await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions[0].active);
        assert!(!versions[1].active);
    }
}
