//! Azsite Azure Provider
//!
//! Converges the static website component onto Azure: a resource group, a
//! storage account serving the site, one blob per file, and optionally a CDN
//! endpoint and DNS records for a custom domain.

pub mod children;
pub mod provider;
pub mod simulated;
pub mod site;

pub use provider::{DEFAULT_LOCATION, WebsiteProvider};
pub use simulated::SimulatedAzure;
