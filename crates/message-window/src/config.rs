use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PAGE_SIZE: &str = "MSGWIN_PAGE_SIZE";
const ENV_NEAR_EDGE_PX: &str = "MSGWIN_NEAR_EDGE_PX";
const ENV_JUMP_POLL_INTERVAL_MS: &str = "MSGWIN_JUMP_POLL_INTERVAL_MS";
const ENV_JUMP_POLL_ATTEMPTS: &str = "MSGWIN_JUMP_POLL_ATTEMPTS";
const ENV_FETCH_TIMEOUT_MS: &str = "MSGWIN_FETCH_TIMEOUT_MS";

/// Tuning for a chat window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Records requested per fetch. A shorter page ends that direction.
    pub page_size: u32,
    /// Scroll distance (px) from an edge that counts as "near" it.
    pub near_edge_px: f32,
    pub jump_poll_interval_ms: u64,
    pub jump_poll_attempts: u32,
    /// Per-fetch timeout; 0 disables it.
    pub fetch_timeout_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            near_edge_px: 300.0,
            jump_poll_interval_ms: 100,
            jump_poll_attempts: 30,
            fetch_timeout_ms: 15_000,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl WindowConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: WindowConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overlaid with `MSGWIN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_parse(ENV_PAGE_SIZE, "page_size")? {
            self.page_size = value;
        }
        if let Some(value) = env_parse(ENV_NEAR_EDGE_PX, "near_edge_px")? {
            self.near_edge_px = value;
        }
        if let Some(value) = env_parse(ENV_JUMP_POLL_INTERVAL_MS, "jump_poll_interval_ms")? {
            self.jump_poll_interval_ms = value;
        }
        if let Some(value) = env_parse(ENV_JUMP_POLL_ATTEMPTS, "jump_poll_attempts")? {
            self.jump_poll_attempts = value;
        }
        if let Some(value) = env_parse(ENV_FETCH_TIMEOUT_MS, "fetch_timeout_ms")? {
            self.fetch_timeout_ms = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "page_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.jump_poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "jump_poll_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if !self.near_edge_px.is_finite() || self.near_edge_px < 0.0 {
            return Err(ConfigError::Invalid {
                field: "near_edge_px",
                reason: format!("{} is not a non-negative distance", self.near_edge_px),
            });
        }
        Ok(())
    }

    pub fn jump_poll_interval(&self) -> Duration {
        Duration::from_millis(self.jump_poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_ms > 0).then(|| Duration::from_millis(self.fetch_timeout_ms))
    }
}

fn env_parse<T>(var: &str, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err: T::Err| ConfigError::Invalid {
                field,
                reason: format!("{var}={raw:?}: {err}"),
            }),
        _ => Ok(None),
    }
}
