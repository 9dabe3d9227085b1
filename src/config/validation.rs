use crate::config::types::{Config, DownloadConfig, FetchConfig, SupervisorConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_download_config(&config.download)?;
    validate_supervisor_config(&config.supervisor)?;
    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    validate_limit("global-limit", config.global_limit)?;
    validate_limit("per-host-limit", config.per_host_limit)?;

    if config.retry_count < 1 || config.retry_count > 100 {
        return Err(ConfigError::Validation(format!(
            "retry-count must be between 1 and 100, got {}",
            config.retry_count
        )));
    }

    if config.read_timeout < 1 {
        return Err(ConfigError::Validation(
            "read-timeout must be >= 1 second".to_string(),
        ));
    }

    if config.connect_timeout < 1 {
        return Err(ConfigError::Validation(
            "connect-timeout must be >= 1 second".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates download configuration
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "download directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates supervisor configuration
fn validate_supervisor_config(config: &SupervisorConfig) -> Result<(), ConfigError> {
    if config.max_lifetime == Some(0) {
        return Err(ConfigError::Validation(
            "max-lifetime must be >= 1 second when set".to_string(),
        ));
    }

    if config.max_volume == Some(0) {
        return Err(ConfigError::Validation(
            "max-volume must be >= 1 when set".to_string(),
        ));
    }

    validate_limit("max-width", config.max_width)
}

/// A configured ceiling of zero would block every caller forever
fn validate_limit(name: &str, limit: Option<usize>) -> Result<(), ConfigError> {
    match limit {
        Some(0) => Err(ConfigError::Validation(format!(
            "{} must be >= 1 when set, omit it for no limit",
            name
        ))),
        _ => Ok(()),
    }
}
