//! Configuration file loading.
//!
//! The config file is TOML. It names one or more game servers and the
//! optional notification channels:
//!
//! ```toml
//! client_url = "https://screeps.com/a/"
//!
//! [servers.main]
//! url = "https://screeps.com"
//! token = "..."
//!
//! [slack]
//! webhook = "https://hooks.slack.com/services/..."
//! channel = "#nukes"
//!
//! [discord]
//! token = "..."
//! channel = "865250606058700000"
//! title_emoji = "<:nuke:865250606058700802>"
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base URL of the official server's web client, used for profile, room
/// and history links.
pub const DEFAULT_CLIENT_URL: &str = "https://screeps.com/a/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("server '{0}' is not defined in the config file")]
    UnknownServer(String),
}

/// Connection details for one game server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Decorates both ends of embed titles, e.g. a custom server emoji
    #[serde(default)]
    pub title_emoji: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
    #[serde(default = "default_client_url")]
    pub client_url: String,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
    #[serde(default)]
    pub discord: Option<DiscordConfig>,
}

fn default_client_url() -> String {
    DEFAULT_CLIENT_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            servers: HashMap::new(),
            client_url: default_client_url(),
            slack: None,
            discord: None,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn server(&self, name: &str) -> Result<&ServerConfig, ConfigError> {
        self.servers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }
}
