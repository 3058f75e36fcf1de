use crate::config::types::{ClaimConfig, Config, SchedulingConfig, StoresConfig};
use crate::ConfigError;

/// Validates the entire configuration, including the cross-field constraint
/// that the claim protocol cannot run without smart scheduling (spec §9's
/// "one-shot builder that rejects inconsistent combinations").
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduling(&config.scheduling)?;
    validate_claim(&config.claim)?;
    validate_stores(&config.stores)?;
    Ok(())
}

fn validate_scheduling(config: &SchedulingConfig) -> Result<(), ConfigError> {
    if config.enable_claim_protocol && !config.enable_smart_scheduling {
        return Err(ConfigError::ClaimWithoutSmartScheduling);
    }
    Ok(())
}

fn validate_claim(config: &ClaimConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "claim.batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.lease_minutes < 1 {
        return Err(ConfigError::Validation(format!(
            "claim.lease-minutes must be >= 1, got {}",
            config.lease_minutes
        )));
    }

    if config.renewal_interval_minutes < 1 {
        return Err(ConfigError::Validation(format!(
            "claim.renewal-interval-minutes must be >= 1, got {}",
            config.renewal_interval_minutes
        )));
    }

    if config.renewal_interval_minutes >= config.lease_minutes {
        return Err(ConfigError::Validation(format!(
            "claim.renewal-interval-minutes ({}) must be less than claim.lease-minutes ({}), \
             or a renewal would never beat the lease expiry",
            config.renewal_interval_minutes, config.lease_minutes
        )));
    }

    Ok(())
}

fn validate_stores(config: &StoresConfig) -> Result<(), ConfigError> {
    if config.postgres_url.is_empty() {
        return Err(ConfigError::Validation(
            "stores.postgres-url cannot be empty".to_string(),
        ));
    }

    if config.redis_url.is_empty() {
        return Err(ConfigError::Validation(
            "stores.redis-url cannot be empty".to_string(),
        ));
    }

    if config.min_connections < 1 {
        return Err(ConfigError::Validation(
            "stores.min-connections must be >= 1".to_string(),
        ));
    }

    if config.max_connections < config.min_connections {
        return Err(ConfigError::Validation(format!(
            "stores.max-connections ({}) must be >= stores.min-connections ({})",
            config.max_connections, config.min_connections
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{CheckpointConfig, PriorityConfig};
    use chrono::NaiveDate;

    fn valid_config() -> Config {
        Config {
            scheduling: SchedulingConfig {
                enable_smart_scheduling: true,
                enable_claim_protocol: true,
                enable_per_domain_budget: true,
                max_pages_per_run: 1_000,
                domain_stats_flush_interval: 100,
                canonicalization_strip_subdomains: false,
            },
            claim: ClaimConfig {
                batch_size: 10,
                lease_minutes: 30,
                renewal_interval_minutes: 10,
            },
            priority: PriorityConfig {
                never_crawled_epoch: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            },
            checkpoint: CheckpointConfig { ttl_days: 30 },
            stores: StoresConfig {
                postgres_url: "postgres://localhost/coordinator".to_string(),
                redis_url: "redis://localhost".to_string(),
                min_connections: 1,
                max_connections: 10,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn claim_protocol_requires_smart_scheduling() {
        let mut config = valid_config();
        config.scheduling.enable_smart_scheduling = false;
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ClaimWithoutSmartScheduling));
    }

    #[test]
    fn renewal_interval_must_be_less_than_lease() {
        let mut config = valid_config();
        config.claim.renewal_interval_minutes = 30;
        config.claim.lease_minutes = 30;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_empty_store_urls() {
        let mut config = valid_config();
        config.stores.postgres_url = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_max_connections_below_min() {
        let mut config = valid_config();
        config.stores.min_connections = 5;
        config.stores.max_connections = 2;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut config = valid_config();
        config.claim.batch_size = 0;
        assert!(validate(&config).is_err());
    }
}
