use crate::addr::normalize_addr;
use crate::config::types::{Config, CrawlerConfig};
use crate::ConfigError;

/// Validates the entire configuration
///
/// Invalid configuration is fatal at startup: the engine fails closed
/// before any worker starts.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.page_budget < 1 {
        return Err(ConfigError::Validation(
            "page-budget must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that every seed normalizes to a hidden-service address.
///
/// A seed that fails normalization is rejected with a descriptive error,
/// never silently dropped.
pub fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        normalize_addr(seed).map_err(|e| ConfigError::InvalidSeed {
            seed: seed.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}
