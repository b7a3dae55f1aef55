//! Site verification and cartridge-path reconciliation.
//!
//! Sites are fetched one at a time and split into `success` / `error`
//! buckets. Cartridge mutations then run per eligible site × cartridge; each
//! call is recorded independently, so a partial failure leaves some sites
//! mutated and is visible only in the returned results.

use crate::config::CartridgeSpec;
use crate::error::Result;
use crate::ocapi::{B2cClient, SiteDetails};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SiteResult {
    pub site_id: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_details: Option<SiteDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteVerification {
    pub success: Vec<SiteResult>,
    pub error: Vec<SiteResult>,
}

impl SiteVerification {
    pub fn is_complete(&self) -> bool {
        self.error.is_empty()
    }
}

/// Split a comma separated site list, dropping blanks.
pub fn parse_site_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Turn one site fetch into a result record. Only HTTP 200 with a parseable
/// site body counts as success.
pub fn site_result(site_id: &str, response: Result<(StatusCode, Value)>) -> SiteResult {
    let failed = |error: String| SiteResult {
        site_id: site_id.to_string(),
        is_valid: false,
        site_details: None,
        error: Some(error),
    };
    match response {
        Ok((StatusCode::OK, body)) => match serde_json::from_value::<SiteDetails>(body) {
            Ok(details) => SiteResult {
                site_id: site_id.to_string(),
                is_valid: true,
                site_details: Some(details),
                error: None,
            },
            Err(e) => failed(format!("unreadable site record: {e}")),
        },
        Ok((status, body)) => failed(fault_message(status, &body)),
        Err(e) => failed(e.to_string()),
    }
}

fn fault_message(status: StatusCode, body: &Value) -> String {
    let detail = body
        .pointer("/fault/message")
        .or_else(|| body.pointer("/fault/type"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    format!("{}: {detail}", status.as_u16())
}

/// Fetch every site with `fetch`, sequentially, and bucket the results.
/// Every input id ends up in exactly one bucket, in input order.
pub async fn verify_with<F, Fut>(site_ids: &[String], mut fetch: F) -> SiteVerification
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(StatusCode, Value)>>,
{
    let mut verification = SiteVerification::default();
    for site_id in site_ids {
        let result = site_result(site_id, fetch(site_id.clone()).await);
        if result.is_valid {
            info!(site_id = %site_id, "site verified");
            verification.success.push(result);
        } else {
            warn!(site_id = %site_id, error = ?result.error, "site verification failed");
            verification.error.push(result);
        }
    }
    verification
}

pub async fn verify_sites(client: &B2cClient, site_ids: &[String]) -> SiteVerification {
    verify_with(site_ids, |id| async move { client.get_site(&id).await }).await
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CartridgeAction {
    Add,
    Remove,
}

impl CartridgeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartridgeAction::Add => "add",
            CartridgeAction::Remove => "remove",
        }
    }
}

/// Why a site cannot take a cartridge mutation. `None` means eligible.
pub fn ineligibility(
    site: &SiteDetails,
    action: CartridgeAction,
    cartridge: &str,
    required: Option<&str>,
) -> Option<String> {
    match action {
        CartridgeAction::Add => {
            if let Some(req) = required {
                if !site.has_cartridge(req) {
                    return Some(format!("cartridge path does not contain {req}"));
                }
            }
            if site.has_cartridge(cartridge) {
                return Some(format!("{cartridge} is already in the cartridge path"));
            }
            None
        }
        CartridgeAction::Remove => {
            if site.has_cartridge(cartridge) {
                None
            } else {
                Some(format!("{cartridge} is not in the cartridge path"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CartridgeResult {
    pub site_id: String,
    pub cartridge: String,
    pub action: CartridgeAction,
    pub is_valid: bool,
    /// `true` when the eligibility rules ruled the call out.
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cartridges: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Apply `action` for every verified site × cartridge using `mutate`.
///
/// The in-memory cartridge path is updated after each successful call so
/// later eligibility checks for the same site see it.
pub async fn reconcile_with<F, Fut>(
    verification: &SiteVerification,
    cartridges: &[CartridgeSpec],
    action: CartridgeAction,
    required: Option<&str>,
    mut mutate: F,
) -> Vec<CartridgeResult>
where
    F: FnMut(String, CartridgeSpec) -> Fut,
    Fut: Future<Output = Result<Option<String>>>,
{
    let mut results = Vec::new();
    for verified in &verification.success {
        let Some(details) = verified.site_details.as_ref() else {
            continue;
        };
        let mut site = details.clone();

        for spec in cartridges {
            let record = |is_valid, skipped, cartridges, error| CartridgeResult {
                site_id: site.id.clone(),
                cartridge: spec.name.clone(),
                action,
                is_valid,
                skipped,
                cartridges,
                error,
            };

            if let Some(reason) = ineligibility(&site, action, &spec.name, required) {
                info!(site_id = %site.id, cartridge = %spec.name, %reason, "skipping site");
                results.push(record(false, true, site.cartridges.clone(), Some(reason)));
                continue;
            }

            match mutate(site.id.clone(), spec.clone()).await {
                Ok(updated) => {
                    let path = updated.unwrap_or_else(|| apply_locally(&site, action, spec));
                    info!(
                        site_id = %site.id,
                        cartridge = %spec.name,
                        action = action.as_str(),
                        "cartridge path updated"
                    );
                    let result = record(true, false, Some(path.clone()), None);
                    site.cartridges = Some(path);
                    results.push(result);
                }
                Err(e) => {
                    warn!(site_id = %site.id, cartridge = %spec.name, error = %e, "cartridge update failed");
                    results.push(record(false, false, site.cartridges.clone(), Some(e.to_string())));
                }
            }
        }
    }
    results
}

/// Best-effort local view of the path when the API does not echo it back.
fn apply_locally(site: &SiteDetails, action: CartridgeAction, spec: &CartridgeSpec) -> String {
    use crate::config::CartridgePosition;

    let mut list: Vec<String> = site.cartridge_list().into_iter().map(str::to_string).collect();
    match action {
        CartridgeAction::Remove => list.retain(|c| c != &spec.name),
        CartridgeAction::Add => {
            let anchor = spec
                .target
                .as_ref()
                .and_then(|t| list.iter().position(|c| c == t));
            let index = match (spec.position, anchor) {
                (CartridgePosition::First, _) => 0,
                (CartridgePosition::Before, Some(i)) => i,
                (CartridgePosition::After, Some(i)) => i + 1,
                _ => list.len(),
            };
            list.insert(index, spec.name.clone());
        }
    }
    list.join(":")
}

pub async fn add_cartridges(
    client: &B2cClient,
    verification: &SiteVerification,
    cartridges: &[CartridgeSpec],
    required: Option<&str>,
) -> Vec<CartridgeResult> {
    reconcile_with(
        verification,
        cartridges,
        CartridgeAction::Add,
        required,
        |site_id, spec| async move { client.add_cartridge(&site_id, &spec).await },
    )
    .await
}

pub async fn remove_cartridges(
    client: &B2cClient,
    verification: &SiteVerification,
    cartridges: &[CartridgeSpec],
) -> Vec<CartridgeResult> {
    reconcile_with(
        verification,
        cartridges,
        CartridgeAction::Remove,
        None,
        |site_id, spec| async move { client.remove_cartridge(&site_id, &spec.name).await },
    )
    .await
}
