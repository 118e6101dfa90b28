//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, WebhookConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    if config.token.trim().is_empty() {
        return Err(ConfigError::missing_field("token"));
    }
    validate_url(&config.api_url)?;

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "request_timeout_secs must be greater than 0",
        ));
    }
    if config.dispatch.max_concurrent_handlers == 0 {
        return Err(ConfigError::validation(
            "dispatch.max_concurrent_handlers must be greater than 0",
        ));
    }

    validate_webhook(&config.webhook)?;
    Ok(())
}

fn validate_webhook(webhook: &WebhookConfig) -> ConfigResult<()> {
    if !webhook.path.starts_with('/') {
        return Err(ConfigError::validation(format!(
            "webhook.path must start with '/': {}",
            webhook.path
        )));
    }
    if !webhook.enabled {
        return Ok(());
    }
    if webhook.listen.is_empty() {
        return Err(ConfigError::missing_field("webhook.listen"));
    }
    match &webhook.public_url {
        Some(url) => validate_url(url),
        None => Err(ConfigError::missing_field("webhook.public_url")),
    }
}

/// Accepts only `http://` and `https://` URLs with a host.
pub fn validate_url(url: &str) -> ConfigResult<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ConfigError::invalid_url(url, "scheme must be http or https"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(ConfigError::invalid_url(url, "missing host"));
    }
    Ok(())
}
