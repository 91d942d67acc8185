pub mod env;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use self::env::apply_env_overrides;
use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How the upstream's reasoning transcript is rendered into visible content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    /// `<think>…</think>` wrapper.
    #[default]
    #[serde(alias = "think")]
    Tagged,
    /// `<details type="reasoning">…</details>` without the duration summary.
    #[serde(alias = "pure")]
    Annotated,
    /// `<details type="reasoning" open><div>…</div></details>` keeping raw inner markup.
    #[serde(alias = "raw")]
    Verbose,
}

impl fmt::Display for RenderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderingMode::Tagged => write!(f, "tagged"),
            RenderingMode::Annotated => write!(f, "annotated"),
            RenderingMode::Verbose => write!(f, "verbose"),
        }
    }
}

impl FromStr for RenderingMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tagged" | "think" => Ok(RenderingMode::Tagged),
            "annotated" | "pure" => Ok(RenderingMode::Annotated),
            "verbose" | "raw" => Ok(RenderingMode::Verbose),
            other => Err(ConfigError::Validation(format!(
                "unknown rendering mode '{other}'. Must be one of: tagged, annotated, verbose"
            ))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    3007
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            runtime_worker_threads: None,
        }
    }
}

/// Upstream chat service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Site origin used for `Origin`/`Referer` and the anonymous credential endpoint.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Static bearer credential.
    #[serde(default)]
    pub token: String,
    /// Fetch a one-time anonymous credential per request, falling back to `token`.
    #[serde(default = "default_true")]
    pub anonymous_token: bool,
    #[serde(default = "default_upstream_model_id")]
    pub model_id: String,
    #[serde(default = "default_fe_version")]
    pub fe_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_token_timeout_secs")]
    pub token_timeout_secs: u64,
}

fn default_upstream_url() -> String {
    "https://chat.z.ai/api/chat/completions".to_string()
}
fn default_origin() -> String {
    "https://chat.z.ai".to_string()
}
fn default_upstream_model_id() -> String {
    "0727-360B-API".to_string()
}
fn default_fe_version() -> String {
    "prod-fe-1.0.76".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_token_timeout_secs() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            origin: default_origin(),
            token: String::new(),
            anonymous_token: true,
            model_id: default_upstream_model_id(),
            fe_version: default_fe_version(),
            timeout_secs: default_timeout_secs(),
            token_timeout_secs: default_token_timeout_secs(),
        }
    }
}

/// Client authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthConfig {
    #[serde(default = "default_allowed_keys")]
    pub allowed_keys: Vec<String>,
}

pub(crate) const DEFAULT_CLIENT_KEY: &str = "sk-123456";

fn default_allowed_keys() -> Vec<String> {
    vec![DEFAULT_CLIENT_KEY.to_string()]
}

impl Default for ClientAuthConfig {
    fn default() -> Self {
        Self {
            allowed_keys: default_allowed_keys(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Model id advertised to clients and echoed in responses.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub think_tags_mode: RenderingMode,
}

fn default_model_name() -> String {
    "GLM-4.5".to_string()
}
fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            log_level: default_log_level(),
            think_tags_mode: RenderingMode::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub client_authentication: ClientAuthConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file, apply environment overrides, and validate it.
///
/// A missing file is not an error: defaults are used and the environment decides.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(err) => return Err(err.into()),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Parse a YAML document into an [`AppConfig`] without validating it.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when the document is malformed.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}
