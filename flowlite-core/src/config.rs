//! Configuration system for FlowLite.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! explicit config file -> environment -> CLI overrides. Environment
//! variables are prefixed with `FLOWLITE_` and nest with `__`, so
//! `FLOWLITE_CATALOG_TTL=60` and `FLOWLITE_DIRECTORIES__OUTPUT=/srv/out`
//! both work.

use crate::delivery::{StaticLayout, DEFAULT_MAX_DECODE_BYTES};
use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowliteConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Path prefix the endpoints are mounted under ("" or "/" for none).
    pub route_prefix: String,
    /// Seconds a built catalog is reused.
    pub catalog_ttl: f64,
    /// Default JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// Default for the `delete` query parameter.
    #[serde(deserialize_with = "deserialize_flag")]
    pub delete_after_send: bool,
    /// Upper bound on decoder allocations while transcoding.
    pub max_decode_bytes: u64,
    /// Base directories for `output`, `input` and `temp` files.
    pub directories: StaticLayout,
    pub registry: RegistryConfig,
}

impl Default for FlowliteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8189,
            route_prefix: "/flowlite".to_string(),
            catalog_ttl: 30.0,
            jpeg_quality: 85,
            delete_after_send: true,
            max_decode_bytes: DEFAULT_MAX_DECODE_BYTES,
            directories: StaticLayout::default(),
            registry: RegistryConfig::default(),
        }
    }
}

/// Where registry snapshots come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root URL of the host server; `object_info` is fetched from here.
    pub url: String,
    /// Read a JSON dump instead of querying the host. Takes precedence over `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// HTTP timeout for registry requests.
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8188".to_string(),
            file: None,
            timeout_secs: 30,
        }
    }
}

impl FlowliteConfig {
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.catalog_ttl.max(0.0))
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject values that would make the server misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.catalog_ttl.is_finite() || self.catalog_ttl < 0.0 {
            return Err(ConfigError::Invalid {
                message: format!("catalog_ttl must be a non-negative number, got {}", self.catalog_ttl),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                message: format!("jpeg_quality must be within 1-100, got {}", self.jpeg_quality),
            });
        }
        if self.registry.file.is_none() {
            url::Url::parse(&self.registry.url).map_err(|e| ConfigError::Invalid {
                message: format!("registry.url '{}' is not a valid URL: {}", self.registry.url, e),
            })?;
        }
        Ok(())
    }
}

/// Accept `true/false`, `1/0`, `yes/no` and `on/off` for boolean switches,
/// whether they arrive as TOML booleans, numbers or environment strings.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(i) => Ok(i != 0),
        Flag::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean flag '{}'", other))),
        },
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "flowlite", "flowlite")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `FLOWLITE_`)
/// 2. Explicit config file (`--config`)
/// 3. User config (`~/.config/flowlite/config.toml`)
/// 4. Built-in defaults
pub fn load_config(config_file: Option<&Path>) -> Result<FlowliteConfig, ConfigError> {
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file {} does not exist", path.display()),
            });
        }
    }

    let mut figment = Figment::from(Serialized::defaults(FlowliteConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("FLOWLITE_").split("__"));

    let config: FlowliteConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
