//! Configuration module for Veil-Fetch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The configuration is loaded once per session and is read-only afterwards.
//!
//! # Example
//!
//! ```no_run
//! use veil_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("veil.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, DownloadConfig, FilterConfig, OutputConfig, ProxyConfig,
    RelevanceConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
