use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::persistence::OverridePolicy;

pub const CONFIG_DIR_ENV: &str = "SQLPAD_CONFIG_DIR";
pub const ENDPOINT_ENV: &str = "SQLPAD_ENDPOINT";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATE_DIR_NAME: &str = "state";

const DEFAULT_ENDPOINT: &str = "http://localhost:3000";
const DEFAULT_SHARE_BASE_URL: &str = "https://datafusion.dev/playground";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlaygroundConfig {
    pub endpoint: String,
    pub distributed: bool,
    pub debounce_ms: u64,
    pub override_policy: OverridePolicy,
    pub dot_binary: String,
    pub share_base_url: String,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            distributed: false,
            debounce_ms: 200,
            override_policy: OverridePolicy::default(),
            dot_binary: "dot".to_string(),
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

impl PlaygroundConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        parse_url("endpoint", &self.endpoint)
    }

    pub fn share_base(&self) -> Result<Url, ConfigError> {
        parse_url("share_base_url", &self.share_base_url)
    }

    /// Applies `SQLPAD_ENDPOINT` when it is set and non-blank.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(endpoint) = env::var_os(ENDPOINT_ENV) {
            let endpoint = endpoint.to_string_lossy().trim().to_string();
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }
        self
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid {field} `{value}`: {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Loads `config.toml` from `dir`. A missing or blank file yields defaults.
pub fn load_config(dir: &Path) -> Result<PlaygroundConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(PlaygroundConfig::default());
    }

    let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(PlaygroundConfig::default());
    }

    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os(CONFIG_DIR_ENV) {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("sqlpad"))
}

#[must_use]
pub fn state_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(STATE_DIR_NAME)
}
