//! Environment variable overrides.
//!
//! The variable names match the ones deployments of the relay already set, so an
//! existing container definition keeps working without a YAML file.

use super::{AppConfig, RenderingMode};

/// Apply environment overrides to `config`, reading variables through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse are logged and ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = get("UPSTREAM_URL") {
        config.upstream.url = url;
    }
    if let Some(origin) = get("UPSTREAM_ORIGIN") {
        config.upstream.origin = origin;
    }
    if let Some(token) = get("UPSTREAM_TOKEN") {
        config.upstream.token = token;
    }
    if let Some(raw) = get("ANON_TOKEN_ENABLED") {
        match parse_bool(&raw) {
            Some(enabled) => config.upstream.anonymous_token = enabled,
            None => warn_unparsed("ANON_TOKEN_ENABLED", &raw),
        }
    }
    if let Some(key) = get("DEFAULT_KEY") {
        config.client_authentication.allowed_keys = vec![key];
    }
    if let Some(model_name) = get("MODEL_NAME") {
        config.features.model_name = model_name;
    }
    if let Some(raw) = get("PORT") {
        match parse_port(&raw) {
            Some(port) => config.server.port = port,
            None => warn_unparsed("PORT", &raw),
        }
    }
    if let Some(raw) = get("THINK_TAGS_MODE") {
        match raw.parse::<RenderingMode>() {
            Ok(mode) => config.features.think_tags_mode = mode,
            Err(_) => warn_unparsed("THINK_TAGS_MODE", &raw),
        }
    }
    if let Some(level) = get("LOG_LEVEL") {
        config.features.log_level = level;
    }
    if let Some(raw) = get("DEBUG_MODE") {
        match parse_bool(&raw) {
            Some(true) => config.features.log_level = "DEBUG".to_string(),
            Some(false) => {}
            None => warn_unparsed("DEBUG_MODE", &raw),
        }
    }
}

// Tracing is not initialized yet while the config loads, so this goes to stderr.
fn warn_unparsed(key: &str, value: &str) {
    eprintln!("Warning: ignoring unparseable environment variable {key}={value}");
}

/// Parse the boolean spellings accepted by the legacy deployment scripts.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parse `3007` or the listen-address form `:3007`.
#[must_use]
pub fn parse_port(value: &str) -> Option<u16> {
    let value = value.trim();
    value.strip_prefix(':').unwrap_or(value).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).cloned());
        config
    }

    #[test]
    fn test_overrides_apply() {
        let config = apply(&[
            ("UPSTREAM_URL", "http://127.0.0.1:9/api/chat/completions"),
            ("UPSTREAM_TOKEN", "static-token"),
            ("ANON_TOKEN_ENABLED", "false"),
            ("DEFAULT_KEY", "sk-custom"),
            ("MODEL_NAME", "GLM-4.5-Air"),
            ("PORT", ":8080"),
            ("THINK_TAGS_MODE", "raw"),
        ]);
        assert_eq!(config.upstream.url, "http://127.0.0.1:9/api/chat/completions");
        assert_eq!(config.upstream.token, "static-token");
        assert!(!config.upstream.anonymous_token);
        assert_eq!(config.client_authentication.allowed_keys, vec!["sk-custom"]);
        assert_eq!(config.features.model_name, "GLM-4.5-Air");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.features.think_tags_mode, RenderingMode::Verbose);
    }

    #[test]
    fn test_debug_mode_forces_debug_level() {
        let config = apply(&[("LOG_LEVEL", "ERROR"), ("DEBUG_MODE", "true")]);
        assert_eq!(config.features.log_level, "DEBUG");

        let config = apply(&[("LOG_LEVEL", "ERROR"), ("DEBUG_MODE", "0")]);
        assert_eq!(config.features.log_level, "ERROR");
    }

    #[test]
    fn test_unparseable_values_are_ignored() {
        let config = apply(&[
            ("ANON_TOKEN_ENABLED", "maybe"),
            ("PORT", "http"),
            ("THINK_TAGS_MODE", "fancy"),
            ("MODEL_NAME", "   "),
        ]);
        assert!(config.upstream.anonymous_token);
        assert_eq!(config.server.port, 3007);
        assert_eq!(config.features.think_tags_mode, RenderingMode::Tagged);
        assert_eq!(config.features.model_name, "GLM-4.5");
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("f"), Some(false));
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_port("3007"), Some(3007));
        assert_eq!(parse_port(":3007"), Some(3007));
        assert_eq!(parse_port("70000"), None);
    }
}
