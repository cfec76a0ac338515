use crate::config::RunnerConfig;
use crate::ops::shell::{CommandOutcome, CommandResult, ExecMode, Shell};
use crate::task::{RunTarget, Step, Task};
use anyhow::Result;
use chrono::{DateTime, Local};
use std::io::Write;
use std::time::Duration;

/// Everything that ran during one invocation, in execution order.
#[derive(Debug)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub results: Vec<CommandResult>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            started_at: Local::now(),
            results: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Replays task files and ad-hoc command lists, writing a transcript to `out`.
/// A failing command is reported and the run moves on; only transcript write
/// failures surface as errors.
pub struct TaskRunner<W: Write> {
    config: RunnerConfig,
    out: W,
}

impl<W: Write> TaskRunner<W> {
    pub fn new(config: RunnerConfig, out: W) -> Self {
        Self { config, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub async fn run(&mut self, target: &RunTarget) -> Result<RunReport> {
        match target {
            RunTarget::TaskFile(path) => {
                let task = Task::load(path)?;
                self.run_task(&task).await
            }
            RunTarget::Commands(commands) => self.run_commands(commands).await,
        }
    }

    pub async fn run_task(&mut self, task: &Task) -> Result<RunReport> {
        let mut report = RunReport::new();
        let total = task.steps.len();

        writeln!(self.out, "🚀 Running task: {}", task.task_name)?;
        writeln!(self.out, "📋 Description: {}", task.description)?;
        writeln!(self.out)?;

        for (i, step) in task.steps.iter().enumerate() {
            let n = i + 1;
            writeln!(self.out, "📋 Step {}/{}: {}", n, total, step.action())?;

            let (commands, mode) = match step {
                Step::SshConnect(t) => {
                    // The connection itself is made with nodeshift-ssh.
                    writeln!(
                        self.out,
                        "   Connecting to {} ({}:{})",
                        t.target, t.ip, t.port
                    )?;
                    continue;
                }
                Step::Commands {
                    commands, shell, ..
                } => (
                    commands.as_slice(),
                    if *shell { ExecMode::Shell } else { ExecMode::Argv },
                ),
                Step::Marker { .. } => (&[][..], ExecMode::Argv),
            };

            let count = commands.len();
            for (j, cmd) in commands.iter().enumerate() {
                writeln!(self.out, "   [{}/{}] Running: {}", j + 1, count, cmd)?;
                let result = Shell::exec(cmd, mode, self.config.command_timeout()).await;
                self.report(&result, "       ")?;
                report.results.push(result);

                // Give the target a moment between commands.
                let delay = self.config.command_delay();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            writeln!(self.out, "   ✅ Step {} completed", n)?;
            writeln!(self.out)?;
        }

        self.tally(&report)?;
        writeln!(self.out, "🎉 Task completed successfully!")?;
        Ok(report)
    }

    pub async fn run_commands(&mut self, commands: &[String]) -> Result<RunReport> {
        let mut report = RunReport::new();
        let total = commands.len();

        writeln!(self.out, "🚀 Running custom commands...")?;

        for (i, cmd) in commands.iter().enumerate() {
            writeln!(self.out, "📋 Command {}/{}: {}", i + 1, total, cmd)?;
            let result = Shell::exec(cmd, ExecMode::Argv, self.config.command_timeout()).await;
            self.report(&result, "   ")?;
            if result.outcome.is_success() {
                writeln!(self.out, "   ✅ Command {} completed", i + 1)?;
            }
            report.results.push(result);
            writeln!(self.out)?;
        }

        self.tally(&report)?;
        writeln!(self.out, "🎉 All commands completed!")?;
        Ok(report)
    }

    fn report(&mut self, result: &CommandResult, indent: &str) -> Result<()> {
        match &result.outcome {
            CommandOutcome::Success => {
                let stdout = result.stdout.trim();
                if !stdout.is_empty() {
                    writeln!(self.out, "{}Output: {}", indent, stdout)?;
                }
            }
            CommandOutcome::TimedOut => {
                writeln!(
                    self.out,
                    "{}⏰ Command timed out after {}",
                    indent,
                    describe(self.config.command_timeout())
                )?;
            }
            CommandOutcome::Failed { .. } => {
                // The process ran, so its stderr is always shown, even when empty.
                writeln!(self.out, "{}❌ Error: {}", indent, result.outcome)?;
                writeln!(self.out, "{}❌ Stderr: {}", indent, result.stderr.trim())?;
            }
            outcome => {
                writeln!(self.out, "{}❌ Error: {}", indent, outcome)?;
            }
        }
        Ok(())
    }

    fn tally(&mut self, report: &RunReport) -> Result<()> {
        let elapsed = Local::now().signed_duration_since(report.started_at);
        writeln!(
            self.out,
            "📊 {} succeeded, {} failed ({}s)",
            report.succeeded(),
            report.failed(),
            elapsed.num_seconds()
        )?;
        Ok(())
    }
}

fn describe(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    match secs {
        60 => "1 minute".to_string(),
        s if s > 0 && s % 60 == 0 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s if s > 0 => format!("{} seconds", s),
        _ => format!("{} ms", timeout.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_timeout() {
        assert_eq!(describe(Duration::from_secs(300)), "5 minutes");
        assert_eq!(describe(Duration::from_secs(60)), "1 minute");
        assert_eq!(describe(Duration::from_secs(15)), "15 seconds");
        assert_eq!(describe(Duration::from_millis(250)), "250 ms");
    }
}
