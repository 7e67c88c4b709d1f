//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub vtodo: VtodoConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub github: GithubConfig,
}

/// Protocol versions offered by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_versions")]
    pub versions: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            versions: default_versions(),
        }
    }
}

fn default_versions() -> Vec<String> {
    vec![crate::protocol::v1::VERSION.to_string()]
}

/// Behaviour of the iCalendar directory adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VtodoConfig {
    /// Completed tasks older than this many days are hidden.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Category that places a task in the "Next" column.
    #[serde(default = "default_next_tag")]
    pub next_tag: String,
}

impl Default for VtodoConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            next_tag: default_next_tag(),
        }
    }
}

fn default_retention_days() -> i64 {
    14
}

fn default_next_tag() -> String {
    "next".to_string()
}

/// External synchronisation tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_command")]
    pub command: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command: default_sync_command(),
        }
    }
}

fn default_sync_command() -> Vec<String> {
    vec!["vdirsyncer".to_string(), "sync".to_string()]
}

/// Remote issue tracker access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
        }
    }
}

impl GithubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the config file: explicit path, then `TASKBOARD_CONFIG`, then
    /// the user config directory. Missing default files fall back to defaults;
    /// an explicitly named file must exist. Environment overrides apply last.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match std::env::var_os("TASKBOARD_CONFIG") {
                Some(path) => Self::load(PathBuf::from(path))?,
                None => match Self::default_path().filter(|p| p.exists()) {
                    Some(path) => Self::load(path)?,
                    None => Self::default(),
                },
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `<config_dir>/taskboard/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskboard").join("config.yaml"))
    }

    /// Apply `TASKBOARD_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(days) = lookup("TASKBOARD_RETENTION_DAYS") {
            if let Ok(days) = days.trim().parse() {
                self.vtodo.retention_days = days;
            }
        }

        if let Some(tag) = lookup("TASKBOARD_NEXT_TAG") {
            let tag = tag.trim();
            if !tag.is_empty() {
                self.vtodo.next_tag = tag.to_string();
            }
        }

        if let Some(command) = lookup("TASKBOARD_SYNC_COMMAND") {
            let command: Vec<String> = command.split_whitespace().map(String::from).collect();
            if !command.is_empty() {
                self.sync.command = command;
            }
        }
    }
}
