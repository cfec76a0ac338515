use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A named, described, ordered list of steps loaded from JSON.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub task_name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Task {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid task file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn command_count(&self) -> usize {
        self.steps.iter().map(|s| s.commands().len()).sum()
    }
}

/// Where an `ssh_connect` step says the operator should be connected.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub target: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    /// Documentation only, nothing is executed.
    SshConnect(SshTarget),
    Commands {
        action: String,
        commands: Vec<String>,
        /// Opt-in to `sh -c` for commands that need pipes, redirects or `&&`.
        shell: bool,
    },
    /// A step with an action but nothing to run.
    Marker { action: String },
}

impl Step {
    pub fn action(&self) -> &str {
        match self {
            Step::SshConnect(_) => SSH_CONNECT,
            Step::Commands { action, .. } | Step::Marker { action } => action,
        }
    }

    pub fn commands(&self) -> &[String] {
        match self {
            Step::Commands { commands, .. } => commands,
            _ => &[],
        }
    }
}

const SSH_CONNECT: &str = "ssh_connect";

// Wire shape of a step: `action` picks the variant, the remaining fields are optional.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct RawStep {
    action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(
        default,
        deserialize_with = "port_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    shell: bool,
}

// Task files in the wild write the port both as 22 and as "22".
#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<PortValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PortValue::Number(port)) => Ok(Some(port)),
        Some(PortValue::Text(text)) => text.trim().parse::<u16>().map(Some).map_err(|_| {
            serde::de::Error::custom(format!("invalid port '{}', expected 0-65535", text))
        }),
    }
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        if raw.action == SSH_CONNECT {
            let missing = |field: &str| format!("ssh_connect step is missing '{}'", field);
            return Ok(Step::SshConnect(SshTarget {
                target: raw.target.ok_or_else(|| missing("target"))?,
                ip: raw.ip.ok_or_else(|| missing("ip"))?,
                port: raw.port.ok_or_else(|| missing("port"))?,
            }));
        }

        Ok(match raw.commands {
            Some(commands) => Step::Commands {
                action: raw.action,
                commands,
                shell: raw.shell,
            },
            None => Step::Marker { action: raw.action },
        })
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        match step {
            Step::SshConnect(t) => RawStep {
                action: SSH_CONNECT.to_string(),
                target: Some(t.target),
                ip: Some(t.ip),
                port: Some(t.port),
                ..Default::default()
            },
            Step::Commands {
                action,
                commands,
                shell,
            } => RawStep {
                action,
                commands: Some(commands),
                shell,
                ..Default::default()
            },
            Step::Marker { action } => RawStep {
                action,
                ..Default::default()
            },
        }
    }
}

/// What the runner was asked to do, decided once from the CLI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    TaskFile(PathBuf),
    Commands(Vec<String>),
}

impl RunTarget {
    /// An existing `.json` path is a task file; anything else is a `&&`-joined command string.
    pub fn resolve(arg: &str) -> Self {
        let path = Path::new(arg);
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json && path.is_file() {
            RunTarget::TaskFile(path.to_path_buf())
        } else {
            RunTarget::Commands(split_commands(arg))
        }
    }
}

pub fn split_commands(arg: &str) -> Vec<String> {
    arg.split("&&")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}
