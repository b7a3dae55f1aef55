//! Salesforce REST client and the cross-platform records crm-sync maintains:
//! one `B2C_Instance__c` per commerce instance and one `B2C_Client_ID__c`
//! per API client, linked to its instance.

use crate::auth::{self, SfSession};
use crate::environment::{B2cEnvironment, SfEnvironment};
use crate::error::{excerpt, CrmSyncError, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

pub const INSTANCE_OBJECT: &str = "B2C_Instance__c";
pub const CLIENT_ID_OBJECT: &str = "B2C_Client_ID__c";

#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub sobject: String,
    pub name: String,
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Clone)]
pub struct SfClient {
    http: Client,
    session: SfSession,
    api_version: String,
}

impl SfClient {
    pub fn new(env: &SfEnvironment, session: SfSession) -> Result<Self> {
        Ok(Self {
            http: auth::http_client(env.request_timeout())?,
            session,
            api_version: env.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}{}",
            self.session.instance_url.trim_end_matches('/'),
            self.api_version,
            path
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!(%method, %url, "salesforce request");
        self.http
            .request(method, url)
            .bearer_auth(&self.session.access_token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Option<Value>> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(CrmSyncError::Salesforce(format!(
                "{}: {}",
                status.as_u16(),
                sf_error_message(&text)
            )));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn query(&self, soql: &str) -> Result<Vec<Value>> {
        let url = self.url("/query");
        let body = self
            .send(self.request(Method::GET, &url).query(&[("q", soql)]))
            .await?
            .unwrap_or(Value::Null);
        let parsed: QueryResponse = serde_json::from_value(body)?;
        Ok(parsed.records)
    }

    pub async fn create(&self, sobject: &str, fields: &Value) -> Result<String> {
        let url = self.url(&format!("/sobjects/{sobject}"));
        let body = self
            .send(self.request(Method::POST, &url).json(fields))
            .await?
            .ok_or_else(|| CrmSyncError::Salesforce(format!("create {sobject} returned no body")))?;
        let created: CreateResponse = serde_json::from_value(body)?;
        Ok(created.id)
    }

    pub async fn update(&self, sobject: &str, id: &str, fields: &Value) -> Result<()> {
        let url = self.url(&format!("/sobjects/{sobject}/{id}"));
        self.send(self.request(Method::PATCH, &url).json(fields))
            .await?;
        Ok(())
    }

    /// Update the record named `name`, or create it when none exists.
    pub async fn upsert_by_name(
        &self,
        sobject: &str,
        name: &str,
        fields: &Value,
    ) -> Result<UpsertOutcome> {
        let soql = format!(
            "SELECT Id FROM {sobject} WHERE Name = '{}' LIMIT 1",
            soql_escape(name)
        );
        let existing = self
            .query(&soql)
            .await?
            .into_iter()
            .find_map(|r| r.get("Id").and_then(Value::as_str).map(str::to_string));

        let mut record = fields.clone();
        record["Name"] = json!(name);

        let (id, created) = match existing {
            Some(id) => {
                self.update(sobject, &id, &record).await?;
                (id, false)
            }
            None => (self.create(sobject, &record).await?, true),
        };
        info!(sobject, name, id = %id, created, "record upserted");
        Ok(UpsertOutcome {
            sobject: sobject.to_string(),
            name: name.to_string(),
            id,
            created,
        })
    }
}

fn soql_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Salesforce errors come back as `[{"message": ..., "errorCode": ...}]`.
fn sf_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get(0)
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| excerpt(body))
}

/// Register the commerce instance and its API client in Salesforce.
pub async fn setup_instance(client: &SfClient, b2c: &B2cEnvironment) -> Result<Vec<UpsertOutcome>> {
    let instance_name = b2c.require_instance_name()?;
    let instance = client
        .upsert_by_name(
            INSTANCE_OBJECT,
            instance_name,
            &json!({
                "API_Url__c": b2c.base_url(),
                "Is_Active__c": true,
            }),
        )
        .await?;
    let client_id = client
        .upsert_by_name(
            CLIENT_ID_OBJECT,
            &b2c.client_id,
            &json!({
                "B2C_Instance__c": instance.id,
                "B2C_Client_ID_Label__c": format!("{instance_name} client"),
                "Is_Active__c": true,
            }),
        )
        .await?;
    Ok(vec![instance, client_id])
}
