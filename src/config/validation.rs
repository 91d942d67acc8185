use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_allowed_keys(config)?;
    validate_upstream(config)?;
    validate_features(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.host.trim().is_empty() {
        return Err(validation_err("server.host cannot be empty"));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    Ok(())
}

fn validate_allowed_keys(config: &AppConfig) -> Result<(), ConfigError> {
    if config.client_authentication.allowed_keys.is_empty() {
        return Err(validation_err("allowed_keys cannot be empty"));
    }
    for key in &config.client_authentication.allowed_keys {
        if key.trim().is_empty() {
            return Err(validation_err("allowed_keys contains an empty key"));
        }
    }
    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|err| validation_err(format!("{field} is not a valid URL: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    validate_http_url("upstream.url", &upstream.url)?;
    validate_http_url("upstream.origin", &upstream.origin)?;
    if upstream.model_id.trim().is_empty() {
        return Err(validation_err("upstream.model_id cannot be empty"));
    }
    if upstream.fe_version.trim().is_empty() {
        return Err(validation_err("upstream.fe_version cannot be empty"));
    }
    if upstream.timeout_secs == 0 {
        return Err(validation_err(
            "upstream.timeout_secs must be greater than 0",
        ));
    }
    if upstream.token_timeout_secs == 0 {
        return Err(validation_err(
            "upstream.token_timeout_secs must be greater than 0",
        ));
    }
    if !upstream.anonymous_token && upstream.token.trim().is_empty() {
        return Err(validation_err(
            "upstream.token is required when upstream.anonymous_token is disabled",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

fn validate_features(config: &AppConfig) -> Result<(), ConfigError> {
    let features = &config.features;
    if features.model_name.trim().is_empty() {
        return Err(validation_err("features.model_name cannot be empty"));
    }
    let level = features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(config: &AppConfig, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {msg}");
            }
            other => panic!("expected validation error containing '{needle}', got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_allowed_keys_rejected() {
        let mut config = AppConfig::default();
        config.client_authentication.allowed_keys.clear();
        assert_invalid(&config, "allowed_keys cannot be empty");

        config.client_authentication.allowed_keys = vec!["  ".into()];
        assert_invalid(&config, "empty key");
    }

    #[test]
    fn test_upstream_url_scheme_checked() {
        let mut config = AppConfig::default();
        config.upstream.url = "ftp://chat.z.ai/api".into();
        assert_invalid(&config, "upstream.url must start with");

        let mut config = AppConfig::default();
        config.upstream.origin = "not a url".into();
        assert_invalid(&config, "upstream.origin is not a valid URL");
    }

    #[test]
    fn test_static_token_required_without_anonymous() {
        let mut config = AppConfig::default();
        config.upstream.anonymous_token = false;
        assert_invalid(&config, "upstream.token is required");

        config.upstream.token = "eyJstatic".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = AppConfig::default();
        config.upstream.timeout_secs = 0;
        assert_invalid(&config, "timeout_secs");

        let mut config = AppConfig::default();
        config.upstream.token_timeout_secs = 0;
        assert_invalid(&config, "token_timeout_secs");
    }

    #[test]
    fn test_log_level_checked() {
        let mut config = AppConfig::default();
        config.features.log_level = "warning".into();
        assert!(validate_config(&config).is_ok());

        config.features.log_level = "VERBOSE".into();
        assert_invalid(&config, "features.log_level");
    }
}
