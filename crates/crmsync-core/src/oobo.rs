//! Order-on-behalf-of support: every site's customer list gets one anonymous
//! customer record that agents shop as.

use crate::config::OoboConfig;
use crate::error::Result;
use crate::ocapi::B2cClient;
use crate::sites::SiteVerification;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CustomerResult {
    pub site_id: String,
    pub customer_list: String,
    pub customer_no: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerResults {
    pub success: Vec<CustomerResult>,
    pub error: Vec<CustomerResult>,
}

pub fn customer_body(config: &OoboConfig) -> Value {
    json!({
        "customer_no": config.customer_number,
        "credentials": {
            "login": config.login,
            "enabled": true,
        },
        "last_name": config.last_name,
    })
}

/// Create the OOBO customer in each verified site's customer list. The list
/// id is the site id.
pub async fn create_with<F, Fut>(
    verification: &SiteVerification,
    config: &OoboConfig,
    mut put: F,
) -> CustomerResults
where
    F: FnMut(String, Value) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let body = customer_body(config);
    let mut results = CustomerResults::default();
    for site in &verification.success {
        let list = site.site_id.clone();
        let mut result = CustomerResult {
            site_id: site.site_id.clone(),
            customer_list: list.clone(),
            customer_no: config.customer_number.clone(),
            is_valid: true,
            error: None,
        };
        match put(list, body.clone()).await {
            Ok(_) => {
                info!(site_id = %site.site_id, "oobo customer created");
                results.success.push(result);
            }
            Err(e) => {
                warn!(site_id = %site.site_id, error = %e, "oobo customer failed");
                result.is_valid = false;
                result.error = Some(e.to_string());
                results.error.push(result);
            }
        }
    }
    results
}

pub async fn create_customers(
    client: &B2cClient,
    verification: &SiteVerification,
    config: &OoboConfig,
) -> CustomerResults {
    let customer_no = config.customer_number.as_str();
    create_with(verification, config, |list, body| async move {
        client.put_customer(&list, customer_no, &body).await
    })
    .await
}
