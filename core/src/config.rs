use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::member::AvatarFormat;

pub const ENV_TOKEN: &str = "ROLLCALL_TOKEN";
pub const ENV_GUILD_ID: &str = "ROLLCALL_GUILD_ID";
pub const ENV_BULK_FETCH_THRESHOLD: &str = "ROLLCALL_BULK_FETCH_THRESHOLD";
pub const ENV_READY_TIMEOUT_MS: &str = "ROLLCALL_READY_TIMEOUT_MS";

pub const DEFAULT_BULK_FETCH_THRESHOLD: u64 = 1_000;
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no upstream credential configured")]
    MissingCredential,
    #[error("no community id configured")]
    MissingCommunityId,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Presence tracking settings. Every field has a default so a partial TOML
/// file is valid; the credential and community id stay unset until provided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub credential: Option<String>,
    pub community_id: Option<String>,
    /// Communities with at least this many members are seeded from cached
    /// members only, without a full member fetch.
    pub bulk_fetch_threshold: u64,
    pub ready_timeout_ms: u64,
    pub avatar: AvatarFormat,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            credential: None,
            community_id: None,
            bulk_fetch_threshold: DEFAULT_BULK_FETCH_THRESHOLD,
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            avatar: AvatarFormat::default(),
        }
    }
}

/// A config that passed [`PresenceConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    pub credential: String,
    pub community_id: String,
    pub bulk_fetch_threshold: u64,
    pub ready_timeout: Duration,
    pub avatar: AvatarFormat,
}

impl PresenceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Applies environment overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_TOKEN) {
            self.credential = Some(token);
        }
        if let Some(guild) = lookup(ENV_GUILD_ID) {
            self.community_id = Some(guild);
        }
        if let Some(raw) = lookup(ENV_BULK_FETCH_THRESHOLD) {
            self.bulk_fetch_threshold = parse_u64(ENV_BULK_FETCH_THRESHOLD, &raw)?;
        }
        if let Some(raw) = lookup(ENV_READY_TIMEOUT_MS) {
            self.ready_timeout_ms = parse_u64(ENV_READY_TIMEOUT_MS, &raw)?;
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Checks that everything needed to connect is present. Blank strings
    /// count as missing.
    pub fn validate(&self) -> Result<ConnectSettings, ConfigError> {
        let credential = non_blank(self.credential.as_deref()).ok_or(ConfigError::MissingCredential)?;
        let community_id =
            non_blank(self.community_id.as_deref()).ok_or(ConfigError::MissingCommunityId)?;
        Ok(ConnectSettings {
            credential: credential.to_string(),
            community_id: community_id.to_string(),
            bulk_fetch_threshold: self.bulk_fetch_threshold,
            ready_timeout: self.ready_timeout(),
            avatar: self.avatar.clone(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
