use crate::config::types::{
    Config, ExchangeSection, FetchSection, OutputSection, PreverifySection, UrlSection,
};
use crate::processor::MAX_CONTENT_LENGTH;
use crate::resource::MAX_LIFETIME_DAYS;
use crate::ConfigError;
use reqwest::header::HeaderName;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch(&config.fetch)?;
    validate_preverify(&config.preverify)?;
    validate_url(&config.url)?;
    validate_exchange(&config.exchange)?;
    if let Some(output) = &config.output {
        validate_output(output)?;
    }
    // Header names and values are checked by the conversion itself
    config.request_headers()?;
    Ok(())
}

fn validate_fetch(config: &FetchSection) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be between 1 and timeout-secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

fn validate_preverify(config: &PreverifySection) -> Result<(), ConfigError> {
    if config.max_content_length == 0 || config.max_content_length > MAX_CONTENT_LENGTH {
        return Err(ConfigError::Validation(format!(
            "max-content-length must be between 1 and {}, got {}",
            MAX_CONTENT_LENGTH, config.max_content_length
        )));
    }

    for name in &config.forbidden_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "forbidden-headers contains an invalid header name '{}'",
                name
            )));
        }
    }

    if let Some(hostnames) = &config.allowed_hostnames {
        if hostnames.is_empty() {
            return Err(ConfigError::Validation(
                "allowed-hostnames cannot be empty; omit it to allow every host".to_string(),
            ));
        }
        for name in hostnames {
            let bare = name.strip_prefix('.').unwrap_or(name);
            if bare.is_empty() || bare.contains(['/', ':', ' ']) {
                return Err(ConfigError::Validation(format!(
                    "allowed-hostnames entry '{}' is not a hostname",
                    name
                )));
            }
        }
    }

    Ok(())
}

fn validate_url(config: &UrlSection) -> Result<(), ConfigError> {
    if config.index_file.is_empty() || config.index_file.contains('/') {
        return Err(ConfigError::Validation(format!(
            "index-file must be a non-empty file name, got '{}'",
            config.index_file
        )));
    }

    validate_extension("validity-extension", &config.validity_extension)
}

fn validate_exchange(config: &ExchangeSection) -> Result<(), ConfigError> {
    if config.lifetime_days < 1 || config.lifetime_days > MAX_LIFETIME_DAYS {
        return Err(ConfigError::Validation(format!(
            "lifetime-days must be between 1 and {}, got {}",
            MAX_LIFETIME_DAYS, config.lifetime_days
        )));
    }
    Ok(())
}

fn validate_output(config: &OutputSection) -> Result<(), ConfigError> {
    if config.directory.trim().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    validate_extension("sxg-extension", &config.sxg_extension)
}

/// Extensions start with a dot and name no directory
fn validate_extension(key: &str, ext: &str) -> Result<(), ConfigError> {
    if ext.len() < 2 || !ext.starts_with('.') || ext.contains('/') {
        return Err(ConfigError::Validation(format!(
            "{} must look like '.ext', got '{}'",
            key, ext
        )));
    }
    Ok(())
}
