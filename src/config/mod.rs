//! Configuration for the crawl coordinator.
//!
//! Loads a validated struct tree from TOML, then layers on environment
//! variable overrides for the deployment-facing knobs (spec §6.4).
//!
//! # Example
//!
//! ```no_run
//! use crawl_coordinator::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("claim batch size: {}", config.claim.batch_size);
//! ```

mod env;
mod parser;
mod types;
mod validation;

pub use types::{
    CheckpointConfig, ClaimConfig, Config, PriorityConfig, SchedulingConfig, StoresConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
