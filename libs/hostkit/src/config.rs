//! Host configuration: named connection strings, flat application settings and
//! typed sections.
//!
//! Two loaders are offered for typed sections:
//!
//! 1. **Lenient loading**: falls back to `T::default()` when the section is missing.
//!    - Used by [`section_or_default`]
//! 2. **Strict loading**: requires the section to be present and valid.
//!    - Used by [`section_required`]
//!
//! [`AppConfig`] is the concrete provider, layered with figment:
//! defaults -> YAML file (optional) -> `APP__*` environment variables.

use crate::logging::LoggingConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Configuration error for typed config operations
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("section '{section}' not found")]
    SectionNotFound { section: String },
    #[error("section '{section}' must be an object")]
    InvalidSectionStructure { section: String },
    #[error("invalid config for section '{section}': {source}")]
    InvalidSection {
        section: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config file does not exist: {path}")]
    FileNotFound { path: String },
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

/// Provider of host configuration values.
pub trait ConfigProvider: Send + Sync {
    /// Named connection string, if defined.
    fn connection_string(&self, name: &str) -> Option<&str>;

    /// Flat application setting, if defined.
    fn app_setting(&self, key: &str) -> Option<&str>;

    /// Returns the raw JSON section, if any.
    fn section(&self, name: &str) -> Option<&serde_json::Value>;
}

/// Lenient section loader.
///
/// - missing section → `Ok(T::default())`
/// - section that is not an object → `Ok(T::default())`
/// - present but invalid → `Err(ConfigError::InvalidSection)`
///
/// # Errors
/// Returns `ConfigError::InvalidSection` if the section exists but cannot be deserialized.
pub fn section_or_default<T: DeserializeOwned + Default>(
    provider: &dyn ConfigProvider,
    name: &str,
) -> Result<T, ConfigError> {
    let Some(raw) = provider.section(name) else {
        return Ok(T::default());
    };
    if !raw.is_object() {
        return Ok(T::default());
    }
    parse_section(raw, name)
}

/// Strict section loader.
///
/// # Errors
/// Returns `ConfigError` if the section is missing, is not an object, or is invalid.
pub fn section_required<T: DeserializeOwned>(
    provider: &dyn ConfigProvider,
    name: &str,
) -> Result<T, ConfigError> {
    let raw = provider
        .section(name)
        .ok_or_else(|| ConfigError::SectionNotFound {
            section: name.to_owned(),
        })?;
    if !raw.is_object() {
        return Err(ConfigError::InvalidSectionStructure {
            section: name.to_owned(),
        });
    }
    parse_section(raw, name)
}

fn parse_section<T: DeserializeOwned>(
    raw: &serde_json::Value,
    name: &str,
) -> Result<T, ConfigError> {
    serde_json::from_value(raw.clone()).map_err(|e| ConfigError::InvalidSection {
        section: name.to_owned(),
        source: e,
    })
}

/// Layered application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Named connection strings, e.g. `NServiceBus.Persistence`.
    pub connection_strings: HashMap<String, String>,
    /// Flat key/value application settings. Numbers and booleans are kept as text.
    #[serde(deserialize_with = "scalar_settings")]
    pub app_settings: HashMap<String, String>,
    /// Logging setup for the host process.
    pub logging: LoggingConfig,
    /// Any other top-level section, kept raw for typed loading.
    #[serde(flatten)]
    pub sections: HashMap<String, serde_json::Value>,
}

/// Accepts string, number and boolean setting values, stored as text.
fn scalar_settings<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            serde_json::Value::Number(n) => Ok((key, n.to_string())),
            serde_json::Value::Bool(b) => Ok((key, b.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "app setting '{key}' must be a string, number or boolean, got {other}"
            ))),
        })
        .collect()
}

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "APP__";

impl AppConfig {
    /// Load configuration: defaults, then the YAML file if given, then `APP__*` env vars.
    ///
    /// # Errors
    /// Returns `ConfigError::FileNotFound` if `path` is not a file, and
    /// `ConfigError::Load` if values fail to parse or deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: AppConfig = figment.extract().map_err(Box::new)?;
        tracing::debug!(
            connection_strings = config.connection_strings.len(),
            app_settings = config.app_settings.len(),
            sections = config.sections.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Serialize the effective configuration as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl ConfigProvider for AppConfig {
    fn connection_string(&self, name: &str) -> Option<&str> {
        self.connection_strings.get(name).map(String::as_str)
    }

    fn app_setting(&self, key: &str) -> Option<&str> {
        self.app_settings.get(key).map(String::as_str)
    }

    fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.sections.get(name)
    }
}
