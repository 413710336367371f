use crate::config::types::{
    Config, InputConfig, OutputConfig, PacingConfig, RetryConfig, RunConfig, SessionConfig,
    SourceConfig,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_run_config(&config.run)?;
    validate_pacing_config(&config.pacing)?;
    validate_retry_config(&config.retry)?;
    validate_session_config(&config.session)?;
    validate_source_config(&config.source)?;
    validate_input_config(&config.input)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.checkpoint_every < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint-every must be >= 1, got {}",
            config.checkpoint_every
        )));
    }

    if config.progress_every < 1 {
        return Err(ConfigError::Validation(format!(
            "progress-every must be >= 1, got {}",
            config.progress_every
        )));
    }

    if config.max_items == Some(0) {
        return Err(ConfigError::Validation(
            "max-items must be >= 1 when set".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    validate_range(
        "cooldown",
        config.cooldown_min_secs,
        config.cooldown_max_secs,
    )?;

    if let Some(hours) = config.target_hours {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "target-hours must be positive, got {}",
                hours
            )));
        }
    }

    Ok(())
}

fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    validate_range(
        "base-delay",
        config.base_delay_min_secs,
        config.base_delay_max_secs,
    )?;

    for (name, value) in [
        ("low-threshold", config.low_threshold),
        ("high-threshold", config.high_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "{} must be between 0 and 1, got {}",
                name, value
            )));
        }
    }

    if config.low_threshold > config.high_threshold {
        return Err(ConfigError::Validation(format!(
            "low-threshold ({}) must not exceed high-threshold ({})",
            config.low_threshold, config.high_threshold
        )));
    }

    for (name, value) in [
        ("slow-down-min-factor", config.slow_down_min_factor),
        ("slow-down-max-factor", config.slow_down_max_factor),
        ("speed-up-factor", config.speed_up_factor),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
    }

    if !config.floor_secs.is_finite() || config.floor_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "floor-secs must be >= 0, got {}",
            config.floor_secs
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    validate_range("backoff", config.backoff_min_secs, config.backoff_max_secs)?;

    if !config.backoff_step_secs.is_finite() || config.backoff_step_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-step-secs must be >= 0, got {}",
            config.backoff_step_secs
        )));
    }

    if config.transient_markers.iter().any(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "transient-markers cannot contain empty strings".to_string(),
        ));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.acquire_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "acquire-attempts must be >= 1, got {}",
            config.acquire_attempts
        )));
    }

    for (name, value) in [
        ("acquire-backoff-secs", config.acquire_backoff_secs),
        ("recycle-pause-secs", config.recycle_pause_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be >= 0, got {}",
                name, value
            )));
        }
    }

    if config.request_timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request and connect timeouts must be at least one second".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(warmup) = &config.warmup_url {
        Url::parse(warmup)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid warmup-url: {}", e)))?;
    }

    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if !config.url_template.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "url-template must contain an {{id}} placeholder, got '{}'",
            config.url_template
        )));
    }

    Url::parse(&config.url_template.replace("{id}", "sample-id"))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid url-template: {}", e)))?;

    let mut seen = HashSet::new();
    for field in &config.fields {
        if field.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "field name cannot be empty".to_string(),
            ));
        }

        if !seen.insert(field.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate field name '{}'",
                field.name
            )));
        }

        Selector::parse(&field.selector).map_err(|e| ConfigError::InvalidSelector {
            field: field.name.clone(),
            message: format!("{:?}", e),
        })?;
    }

    Ok(())
}

fn validate_input_config(config: &InputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "input path cannot be empty".to_string(),
        ));
    }

    if config.id_column.is_empty() || config.label_column.is_empty() {
        return Err(ConfigError::Validation(
            "id-column and label-column cannot be empty".to_string(),
        ));
    }

    if config.id_column == config.label_column {
        return Err(ConfigError::Validation(format!(
            "id-column and label-column must differ, both are '{}'",
            config.id_column
        )));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a `[min, max]` seconds range
fn validate_range(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} range must be finite and non-negative, got [{}, {}]",
            name, min, max
        )));
    }

    if min > max {
        return Err(ConfigError::Validation(format!(
            "{} range minimum ({}) exceeds maximum ({})",
            name, min, max
        )));
    }

    Ok(())
}
