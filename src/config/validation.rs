use crate::config::types::{
    CatalogConfig, Config, DownloadConfig, DriverConfig, ScanConfig, SelectorConfig, StateBackend,
    StateConfig, VariantEntry,
};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_catalog_config(&config.catalog)?;
    validate_download_config(&config.download)?;
    validate_scan_config(&config.scan)?;
    validate_state_config(&config.state)?;
    validate_driver_config(&config.driver)?;
    validate_variants(&config.variants)?;
    Ok(())
}

/// Validates catalog configuration
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    let pattern = Regex::new(&config.result_count_pattern).map_err(|e| {
        ConfigError::InvalidPattern(format!("Invalid result-count-pattern: {}", e))
    })?;

    // Group 0 is the whole match; the count itself must be captured
    if pattern.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "result-count-pattern must contain a capture group for the count, got '{}'",
            config.result_count_pattern
        )));
    }

    if config.format.trim().is_empty() {
        return Err(ConfigError::Validation("format cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates download configuration
fn validate_download_config(config: &DownloadConfig) -> Result<(), ConfigError> {
    if config.root.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "download root cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if config.poll_interval_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms must be >= 50ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.poll_interval_ms > config.timeout_secs * 1000 {
        return Err(ConfigError::Validation(format!(
            "poll-interval-ms ({}ms) cannot exceed the download timeout ({}s)",
            config.poll_interval_ms, config.timeout_secs
        )));
    }

    Ok(())
}

/// Validates scan configuration
fn validate_scan_config(config: &ScanConfig) -> Result<(), ConfigError> {
    if config.codes_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "codes-path cannot be empty".to_string(),
        ));
    }

    if config.min_segments < 1 {
        return Err(ConfigError::Validation(format!(
            "min-segments must be >= 1, got {}",
            config.min_segments
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry-base-delay-ms ({}) cannot exceed retry-max-delay-ms ({})",
            config.retry_base_delay_ms, config.retry_max_delay_ms
        )));
    }

    Ok(())
}

/// Validates checkpoint store configuration
fn validate_state_config(config: &StateConfig) -> Result<(), ConfigError> {
    match config.backend {
        StateBackend::Sqlite => {
            if config.database_path.as_os_str().is_empty() {
                return Err(ConfigError::Validation(
                    "database-path cannot be empty".to_string(),
                ));
            }
        }
        StateBackend::Json => {
            if config.progress_path.as_os_str().is_empty()
                || config.failures_path.as_os_str().is_empty()
            {
                return Err(ConfigError::Validation(
                    "progress-path and failures-path cannot be empty".to_string(),
                ));
            }

            if config.progress_path == config.failures_path {
                return Err(ConfigError::Validation(format!(
                    "progress-path and failures-path must differ, both are '{}'",
                    config.progress_path.display()
                )));
            }
        }
    }

    if config.report_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates driver configuration
fn validate_driver_config(config: &DriverConfig) -> Result<(), ConfigError> {
    Url::parse(&config.webdriver_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver-url: {}", e)))?;

    if config.init_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "init-retries must be >= 1, got {}",
            config.init_retries
        )));
    }

    if config.element_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "element-timeout-ms must be >= 100ms, got {}ms",
            config.element_timeout_ms
        )));
    }

    validate_selectors(&config.selectors)
}

/// Every selector must be present; the driver cannot guess a missing one
fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    let named = [
        ("language-select", &selectors.language_select),
        ("search-input", &selectors.search_input),
        ("search-button", &selectors.search_button),
        ("result-count", &selectors.result_count),
        ("format-checkboxes", &selectors.format_checkboxes),
        ("select-all", &selectors.select_all),
        ("items", &selectors.items),
        ("download-button", &selectors.download_button),
        ("next-page", &selectors.next_page),
        ("active-page", &selectors.active_page),
    ];

    for (name, value) in named {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector '{}' cannot be empty",
                name
            )));
        }
    }

    Ok(())
}

/// Validates the variant list
fn validate_variants(variants: &[VariantEntry]) -> Result<(), ConfigError> {
    if variants.is_empty() {
        return Err(ConfigError::Validation(
            "at least one variant must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in variants {
        validate_variant_id(&entry.id)?;

        if !seen.insert(entry.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "variant '{}' is listed more than once",
                entry.id
            )));
        }
    }

    Ok(())
}

/// Variant ids become directory names, so keep them path-safe
fn validate_variant_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation(
            "variant id cannot be empty".to_string(),
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "variant id '{}' may only contain ASCII letters, digits, '_' and '-'",
            id
        )));
    }

    Ok(())
}
