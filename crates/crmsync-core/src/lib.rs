pub mod archive;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod io;
pub mod job;
pub mod ocapi;
pub mod oobo;
pub mod salesforce;
pub mod sfdx;
pub mod sites;
pub mod templates;

pub use error::{CrmSyncError, Result};
