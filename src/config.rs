use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "NODESHIFT_CONFIG";
pub const DEFAULT_KEY_NAME: &str = "nodeshift_auto";
pub const DEFAULT_KEY_COMMENT: &str = "auto-generated@leverageai.network";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SshConfig {
    /// Directory holding the key pairs. Defaults to ~/.ssh
    #[serde(default = "default_ssh_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_key_name")]
    pub key_name: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_key_comment")]
    pub key_comment: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64, // handed to ssh as ConnectTimeout
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64, // wall clock for the whole test probe
}

fn default_ssh_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ssh"))
        .unwrap_or_else(|| PathBuf::from(".ssh"))
}
fn default_key_name() -> String {
    DEFAULT_KEY_NAME.to_string()
}
fn default_user() -> String {
    "root".to_string()
}
fn default_key_bits() -> u32 {
    4096
}
fn default_key_comment() -> String {
    DEFAULT_KEY_COMMENT.to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_test_timeout() -> u64 {
    15
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            dir: default_ssh_dir(),
            key_name: default_key_name(),
            user: default_user(),
            key_bits: default_key_bits(),
            key_comment: default_key_comment(),
            connect_timeout_secs: default_connect_timeout(),
            test_timeout_secs: default_test_timeout(),
        }
    }
}

impl SshConfig {
    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunnerConfig {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_command_delay")]
    pub command_delay_ms: u64, // pause after each task command
}

fn default_command_timeout() -> u64 {
    300
}
fn default_command_delay() -> u64 {
    1000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            command_delay_ms: default_command_delay(),
        }
    }
}

impl RunnerConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NodeshiftConfig {
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

impl NodeshiftConfig {
    /// Location of the config file: $NODESHIFT_CONFIG, else ~/.nodeshift/config.toml
    pub fn default_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(home.join(".nodeshift").join("config.toml"))
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// A missing file yields defaults; a file that exists must parse.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
