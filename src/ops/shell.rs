use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

/// How a command string is turned into a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Tokenized into an argument vector, no shell involved.
    Argv,
    /// Handed to `sh -c` verbatim.
    Shell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failed { code: Option<i32> },
    TimedOut,
    SpawnFailed { reason: String },
    /// The string could not be turned into an argument vector.
    Rejected { reason: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Success => write!(f, "success"),
            CommandOutcome::Failed { code: Some(code) } => {
                write!(f, "command returned non-zero exit status {}", code)
            }
            CommandOutcome::Failed { code: None } => write!(f, "command terminated by signal"),
            CommandOutcome::TimedOut => write!(f, "timed out"),
            CommandOutcome::SpawnFailed { reason } => write!(f, "failed to start: {}", reason),
            CommandOutcome::Rejected { reason } => write!(f, "{}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub outcome: CommandOutcome,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

pub struct Shell;

impl Shell {
    /// Run one command string to completion or until `timeout` expires.
    /// Never returns an error: every failure mode is captured in the outcome.
    pub async fn exec(command: &str, mode: ExecMode, timeout: Duration) -> CommandResult {
        let started = Instant::now();
        let finish = |outcome: CommandOutcome, stdout: String, stderr: String| CommandResult {
            command: command.to_string(),
            outcome,
            stdout,
            stderr,
            elapsed: started.elapsed(),
        };

        let argv = match mode {
            ExecMode::Argv => match split_args(command) {
                Ok(argv) => argv,
                Err(reason) => {
                    return finish(CommandOutcome::Rejected { reason }, String::new(), String::new())
                }
            },
            ExecMode::Shell => vec!["sh".to_string(), "-c".to_string(), command.to_string()],
        };

        tracing::debug!(?argv, ?timeout, "spawning");
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return finish(
                    CommandOutcome::SpawnFailed {
                        reason: e.to_string(),
                    },
                    String::new(),
                    String::new(),
                )
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        let result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let outcome = if output.status.success() {
                    CommandOutcome::Success
                } else {
                    CommandOutcome::Failed {
                        code: output.status.code(),
                    }
                };
                finish(
                    outcome,
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                )
            }
            Ok(Err(e)) => finish(
                CommandOutcome::SpawnFailed {
                    reason: e.to_string(),
                },
                String::new(),
                String::new(),
            ),
            Err(_) => finish(CommandOutcome::TimedOut, String::new(), String::new()),
        };

        tracing::debug!(
            command = %result.command,
            outcome = %result.outcome,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "finished"
        );
        result
    }
}

/// Split a command line into arguments. Quotes and backslashes group words;
/// unquoted shell operators are refused so nothing is silently misread.
pub fn split_args(line: &str) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("trailing backslash".to_string()),
                }
            }
            '|' | ';' | '&' | '<' | '>' | '`' => {
                return Err(shell_operator_error(c));
            }
            '$' if chars.peek() == Some(&'(') => {
                return Err(shell_operator_error(c));
            }
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        args.push(current);
    }
    if args.is_empty() {
        return Err("empty command".to_string());
    }
    Ok(args)
}

fn shell_operator_error(op: char) -> String {
    format!(
        "shell operator '{}' is not allowed here; set \"shell\": true on the step to run it through sh",
        op
    )
}
