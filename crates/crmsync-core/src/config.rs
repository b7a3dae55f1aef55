use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "crmsync.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_unknown_threshold")]
    pub unknown_status_threshold: u32,
    #[serde(default = "default_valid_statuses")]
    pub valid_statuses: Vec<String>,
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_unknown_threshold() -> u32 {
    25
}

fn default_valid_statuses() -> Vec<String> {
    vec!["OK".to_string(), "PENDING".to_string(), "RUNNING".to_string()]
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            unknown_status_threshold: default_unknown_threshold(),
            valid_statuses: default_valid_statuses(),
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// CartridgeSpec
// ---------------------------------------------------------------------------

/// Where a cartridge is inserted into a site's cartridge path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartridgePosition {
    First,
    Last,
    Before,
    After,
}

impl CartridgePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartridgePosition::First => "first",
            CartridgePosition::Last => "last",
            CartridgePosition::Before => "before",
            CartridgePosition::After => "after",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartridgeSpec {
    pub name: String,
    #[serde(default = "default_position")]
    pub position: CartridgePosition,
    /// Anchor cartridge for `before` / `after`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

fn default_position() -> CartridgePosition {
    CartridgePosition::First
}

// ---------------------------------------------------------------------------
// B2cConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OoboConfig {
    #[serde(default = "default_oobo_customer_number")]
    pub customer_number: String,
    #[serde(default = "default_oobo_login")]
    pub login: String,
    #[serde(default = "default_oobo_last_name")]
    pub last_name: String,
}

fn default_oobo_customer_number() -> String {
    "9999999".to_string()
}

fn default_oobo_login() -> String {
    "oobo-anonymous".to_string()
}

fn default_oobo_last_name() -> String {
    "Anonymous".to_string()
}

impl Default for OoboConfig {
    fn default() -> Self {
        Self {
            customer_number: default_oobo_customer_number(),
            login: default_oobo_login(),
            last_name: default_oobo_last_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct B2cConfig {
    #[serde(default = "default_ocapi_version")]
    pub api_version: String,
    #[serde(default = "default_account_manager_url")]
    pub account_manager_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_data_archive_name")]
    pub data_archive_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where code version archives are written.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_cartridges_dir")]
    pub cartridges_dir: PathBuf,
    /// Cartridge a site must already carry before crm-sync cartridges may be added.
    #[serde(default = "default_required_cartridge")]
    pub required_cartridge: Option<String>,
    #[serde(default = "default_cartridges")]
    pub cartridges: Vec<CartridgeSpec>,
    #[serde(default)]
    pub oobo: OoboConfig,
}

fn default_ocapi_version() -> String {
    "v21_3".to_string()
}

fn default_account_manager_url() -> String {
    "https://account.demandware.com".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_data_archive_name() -> String {
    "b2c-crm-sync-data".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("build/b2c/data")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build/b2c")
}

fn default_cartridges_dir() -> PathBuf {
    PathBuf::from("cartridges")
}

fn default_required_cartridge() -> Option<String> {
    Some("app_storefront_base".to_string())
}

fn default_cartridges() -> Vec<CartridgeSpec> {
    vec![
        CartridgeSpec {
            name: "plugin_b2ccrmsync".to_string(),
            position: CartridgePosition::First,
            target: None,
        },
        CartridgeSpec {
            name: "int_b2ccrmsync".to_string(),
            position: CartridgePosition::After,
            target: Some("plugin_b2ccrmsync".to_string()),
        },
    ]
}

impl Default for B2cConfig {
    fn default() -> Self {
        Self {
            api_version: default_ocapi_version(),
            account_manager_url: default_account_manager_url(),
            request_timeout_secs: default_request_timeout(),
            data_archive_name: default_data_archive_name(),
            data_dir: default_data_dir(),
            build_dir: default_build_dir(),
            cartridges_dir: default_cartridges_dir(),
            required_cartridge: default_required_cartridge(),
            cartridges: default_cartridges(),
            oobo: OoboConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// SfConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfConfig {
    #[serde(default = "default_sf_api_version")]
    pub api_version: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_contact_email")]
    pub contact_email: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl SfConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_sf_api_version() -> String {
    "58.0".to_string()
}

fn default_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("build/sf/force-app/main/default")
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("build/sf/connectedAppCredentials.json")
}

fn default_contact_email() -> String {
    "admin@example.com".to_string()
}

impl Default for SfConfig {
    fn default() -> Self {
        Self {
            api_version: default_sf_api_version(),
            login_url: default_login_url(),
            source_dir: default_source_dir(),
            credentials_file: default_credentials_file(),
            contact_email: default_contact_email(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub b2c: B2cConfig,
    #[serde(default)]
    pub sf: SfConfig,
}

impl Config {
    /// Load `crmsync.yaml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no project config, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }
}
