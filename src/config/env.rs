//! Environment variable overrides layered on top of the parsed TOML config.
//!
//! Follows the same override shape as `gurt-db`'s `DbConfig::from_env`: each
//! recognized variable is parsed independently and, on a malformed value,
//! reported as `ConfigError::InvalidEnv` rather than silently ignored.

use crate::config::types::Config;
use crate::ConfigError;
use std::env;

/// Applies the environment variable overrides enumerated in spec §6.4.
pub fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(v) = parse_env_bool("ENABLE_SMART_SCHEDULING")? {
        config.scheduling.enable_smart_scheduling = v;
    }
    if let Some(v) = parse_env_bool("ENABLE_CLAIM_PROTOCOL")? {
        config.scheduling.enable_claim_protocol = v;
    }
    if let Some(v) = parse_env_bool("ENABLE_PER_DOMAIN_BUDGET")? {
        config.scheduling.enable_per_domain_budget = v;
    }
    if let Some(v) = parse_env_u32("MAX_PAGES_PER_RUN")? {
        config.scheduling.max_pages_per_run = v;
    }
    if let Some(v) = parse_env_u32("DOMAIN_STATS_FLUSH_INTERVAL")? {
        config.scheduling.domain_stats_flush_interval = v;
    }
    if let Some(v) = parse_env_bool("DOMAIN_CANONICALIZATION_STRIP_SUBDOMAINS")? {
        config.scheduling.canonicalization_strip_subdomains = v;
    }
    if let Ok(v) = env::var("DATABASE_URL") {
        if !v.is_empty() {
            config.stores.postgres_url = v;
        }
    }
    if let Ok(v) = env::var("REDIS_URL") {
        if !v.is_empty() {
            config.stores.redis_url = v;
        }
    }
    Ok(())
}

fn parse_env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                name: name.to_string(),
                value: v,
            }),
        },
        Err(_) => Ok(None),
    }
}

fn parse_env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value: v,
            }),
        Err(_) => Ok(None),
    }
}
