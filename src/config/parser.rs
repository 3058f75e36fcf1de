use crate::config::env::apply_env_overrides;
use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, applies environment overrides to, and validates a configuration
/// file from the given path.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, override, or validate
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content, recorded
/// alongside run records for observability (was this run's config changed
/// since the last one?).
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[scheduling]
enable-smart-scheduling = true
enable-claim-protocol = true
enable-per-domain-budget = true
max-pages-per-run = 1000
domain-stats-flush-interval = 100

[claim]
batch-size = 10
lease-minutes = 30
renewal-interval-minutes = 10

[priority]

[checkpoint]
ttl-days = 30

[stores]
postgres-url = "postgres://localhost/coordinator"
redis-url = "redis://localhost"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.claim.batch_size, 10);
        assert_eq!(config.scheduling.max_pages_per_run, 1000);
        assert!(config.scheduling.enable_smart_scheduling);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID.replace("enable-smart-scheduling = true", "enable-smart-scheduling = false");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::ClaimWithoutSmartScheduling)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");
        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");
        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_load_config_with_hash() {
        let file = create_temp_config(VALID);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.claim.batch_size, 10);
        assert_eq!(hash.len(), 64);
    }
}
