use crate::config::types::{ApiConfig, Config, CrawlerConfig, EgressConfig, OutputConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawler_config(&config.crawler)?;
    validate_api_config(&config.api)?;
    validate_egress_config(&config.egress)?;
    validate_output_config(&config.output)?;

    if config.credentials.refill_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "refill_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Applies a worker count given on the command line
///
/// The override goes through the same bounds as the file value; the config is left
/// untouched when it is rejected.
pub fn override_workers(config: &mut Config, workers: u32) -> ConfigResult<()> {
    let mut crawler = config.crawler.clone();
    crawler.workers = workers;
    validate_crawler_config(&crawler)?;
    config.crawler = crawler;
    Ok(())
}

/// Validates worker pool and state machine settings
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.max_fetch_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_fetch_attempts must be >= 1".to_string(),
        ));
    }

    if config.max_response_errors < 1 {
        return Err(ConfigError::Validation(
            "max_response_errors must be >= 1".to_string(),
        ));
    }

    if config.service_unavailable_limit < 1 {
        return Err(ConfigError::Validation(
            "service_unavailable_limit must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the remote API endpoint and global limiter
fn validate_api_config(config: &ApiConfig) -> ConfigResult<()> {
    validate_http_url("base_url", &config.base_url)?;

    if config.max_calls < 1 {
        return Err(ConfigError::Validation(format!(
            "max_calls must be >= 1, got {}",
            config.max_calls
        )));
    }

    if config.period_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "period_secs must be >= 1, got {}",
            config.period_secs
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy pool settings; only enforced when proxies are enabled
fn validate_egress_config(config: &EgressConfig) -> ConfigResult<()> {
    if !config.enabled {
        return Ok(());
    }

    validate_http_url("source_url", &config.source_url)?;
    validate_http_url("probe_url", &config.probe_url)?;

    if config.validation_concurrency < 1 {
        return Err(ConfigError::Validation(
            "validation_concurrency must be >= 1".to_string(),
        ));
    }

    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure_threshold must be >= 1".to_string(),
        ));
    }

    if config.max_refill_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_refill_attempts must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that `value` parses as an http(s) URL
fn validate_http_url(field: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}
