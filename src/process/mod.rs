//! External command execution
//!
//! Every shell-out (systemctl, smbcontrol, smbpasswd, mount) goes through a
//! [`CommandRunner`], so synchronization logic can run against
//! [`mock::MockRunner`] in tests.

pub mod mock;

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Result type for command execution
pub type ProcessResult<T> = Result<T, ProcessError>;

/// A command to execute: program, arguments, extra environment and
/// optional stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Set on top of the inherited environment; never part of the command line
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the process on stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program and first argument, safe to log
    ///
    /// Later arguments may carry credentials and are left out.
    pub fn summary(&self) -> String {
        match self.args.first() {
            Some(first) => format!("{} {}", self.program, first),
            None => self.program.clone(),
        }
    }

    /// Full command line, space separated
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Executes external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion
    ///
    /// Only failing to start or talk to the process is an error; a non-zero
    /// exit is reported through [`CommandOutput::success`].
    async fn output(&self, command: &CommandSpec) -> ProcessResult<CommandOutput>;

    /// Run `command`, treating a non-zero exit as an error
    async fn run(&self, command: &CommandSpec) -> ProcessResult<CommandOutput> {
        let output = self.output(command).await?;
        if output.success {
            Ok(output)
        } else {
            Err(ProcessError::Failed {
                command: command.summary(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// [`CommandRunner`] that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, command: &CommandSpec) -> ProcessResult<CommandOutput> {
        let io_error = |source| ProcessError::Io {
            program: command.program.clone(),
            source,
        };

        debug!(command = %command.summary(), "Running command");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.env.iter().map(|(key, value)| (key, value)))
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(io_error)?;

        if let Some(input) = &command.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await.map_err(io_error)?;
                // Dropping the handle closes the pipe
            }
        }

        let output = child.wait_with_output().await.map_err(io_error)?;

        debug!(
            command = %command.summary(),
            code = ?output.status.code(),
            "Command finished"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
