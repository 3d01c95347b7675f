//! Configuration module for Catalog-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! One configuration parameterizes everything that differed between ad-hoc crawler
//! scripts: selectors, timeouts, driver endpoint, variants and checkpoint locations.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Variants per code: {}", config.variants.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CatalogConfig, Config, DownloadConfig, DriverConfig, ScanConfig, SelectorConfig,
    StateBackend, StateConfig, VariantEntry,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
