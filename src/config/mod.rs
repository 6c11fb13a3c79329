//! Configuration module for veilcrawl
//!
//! Run configuration comes from an optional TOML file plus command-line
//! overrides; once built it is an immutable snapshot for the whole run.
//!
//! # Example
//!
//! ```no_run
//! use veilcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("veilcrawl.toml")).unwrap();
//! println!("Workers: {}", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config};
pub use types::{Config, CrawlerConfig, OutputConfig, ProxyConfig, WebConfig};
pub use validation::{validate, validate_seeds};
