use crate::shell::{Shell, ShellLauncher};
use crate::storage::ExecutionRecord;
use crate::validator::{self, CommandPolicy, Rejection};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::io::{self, BufRead, BufReader, Read};
use std::process::Stdio;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{info, warn};

/// Raised when a command fails the policy. Nothing was spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "command is not safe to execute: {command} ({reason}). Allowed commands: {allowed}",
    allowed = validator::allowed_commands().join(", ")
)]
pub struct UnsafeCommand {
    pub command: String,
    pub reason: Rejection,
}

pub struct CommandExecutor<S = Shell> {
    shell: S,
    policy: &'static CommandPolicy,
}

impl CommandExecutor<Shell> {
    pub fn new() -> Self {
        Self::with_shell(Shell::detect())
    }
}

impl Default for CommandExecutor<Shell> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ShellLauncher> CommandExecutor<S> {
    pub fn with_shell(shell: S) -> Self {
        Self {
            shell,
            policy: CommandPolicy::global(),
        }
    }

    /// Validate, run to completion, and record the attempt.
    ///
    /// Only a policy rejection is an error. Spawn and read failures end up in
    /// the record's output so every approved run leaves a timestamped entry.
    /// There is no timeout: a command that never exits blocks this call.
    pub fn execute(&self, command: &str) -> Result<ExecutionRecord, UnsafeCommand> {
        // Checked here even if the caller already did; stored commands can change.
        if let Err(reason) = self.policy.check(command) {
            warn!(command = %command, reason = %reason, "refusing to execute command");
            return Err(UnsafeCommand {
                command: command.to_string(),
                reason,
            });
        }

        let start_time = Utc::now();
        let mut output = String::new();

        if let Err(err) = self.run_to_completion(command, &mut output) {
            let cause = format!("{err:#}");
            warn!(command = %command, shell = self.shell.program(), error = %cause, "command execution failed");
            output.push_str(&format!("Error executing command: {cause}"));
        }

        let end_time = Utc::now();
        let record = ExecutionRecord::new(start_time, end_time, &output);
        info!(
            command = %command,
            duration_ms = record.duration().num_milliseconds(),
            "command finished"
        );
        Ok(record)
    }

    fn run_to_completion(&self, command: &str, output: &mut String) -> Result<()> {
        let mut child = self
            .shell
            .command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.shell.program()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("stderr was not captured"))?;

        // Both pipes feed one channel so lines keep their arrival order.
        let (tx, rx) = mpsc::channel();
        let readers = [forward_lines(stdout, tx.clone()), forward_lines(stderr, tx)];

        let mut read_error = None;
        for line in rx {
            match line {
                Ok(line) => {
                    output.push_str(&line);
                    output.push('\n');
                }
                Err(err) if read_error.is_none() => read_error = Some(err),
                Err(_) => {}
            }
        }

        child.wait().context("failed to wait for command")?;

        for reader in readers {
            reader
                .join()
                .map_err(|_| anyhow!("output reader thread panicked"))?;
        }

        match read_error {
            Some(err) => Err(err).context("failed to read command output"),
            None => Ok(()),
        }
    }
}

fn forward_lines<R>(pipe: R, tx: Sender<io::Result<String>>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer);
                    let line = line.trim_end_matches(&['\n', '\r'][..]).to_string();
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                    break;
                }
            }
        }
    })
}
