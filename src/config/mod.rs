//! Service Configuration
//!
//! TOML configuration for the report server and the import tool.
//!
//! ## Loading Order
//!
//! 1. `AR_METRICS_CONFIG` environment variable (path to TOML file)
//! 2. `ar_metrics.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Example
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8080"
//!
//! [store]
//! path = "/var/lib/ar-metrics"
//! collection = "sites"
//!
//! [cache]
//! capacity_bytes = 700000000
//! shards = 16
//!
//! [rollup]
//! policy = "flat_site_weights"
//!
//! [[tenants]]
//! name = "egi"
//! database = "egi_ar"
//! api_keys = ["s3cr3t"]
//! ```

mod app_config;
pub mod validation;

pub use app_config::*;
