//! Command interface: how consumers run commands on a leased resource.
//!
//! Blueprints hand out a [`CommandInterface`] for an active lease through
//! [`crate::BlueprintImplementation::interface`]. The engine only relies on
//! the trait; transports (local processes, remote shells) live with the
//! strategies that need them.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};

/// Interface kind for command execution.
pub const COMMAND_INTERFACE: &str = "command";

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Timeouts and working directory stack shared by every transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSettings {
    pub connect_timeout: Option<Duration>,
    pub exec_timeout: Option<Duration>,
    working_directories: Vec<String>,
}

impl CommandSettings {
    /// Prefix `command` with a `cd` into the current working directory.
    pub fn apply_working_directory(&self, command: &str) -> String {
        match self.working_directories.last() {
            Some(dir) => format!("cd {} && {command}", shell_quote(dir)),
            None => command.to_string(),
        }
    }
}

/// Single-quote `arg` for a POSIX shell.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[async_trait]
pub trait CommandInterface: Send + Sync {
    fn settings(&self) -> &CommandSettings;

    fn settings_mut(&mut self) -> &mut CommandSettings;

    /// Run a fully prepared command line on the transport.
    async fn run(&self, command: &str) -> EngineResult<CommandOutput>;

    /// Run `command` in the current working directory.
    async fn exec(&self, command: &str) -> EngineResult<CommandOutput> {
        let command = self.settings().apply_working_directory(command);
        self.run(&command).await
    }

    /// Like [`CommandInterface::exec`], but a non-zero exit is an error.
    async fn execx(&self, command: &str) -> EngineResult<CommandOutput> {
        let output = self.exec(command).await?;
        if !output.success() {
            return Err(EngineError::Strategy(anyhow::anyhow!(
                "command `{command}` exited with status {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }

    fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.settings_mut().connect_timeout = timeout;
    }

    fn set_exec_timeout(&mut self, timeout: Option<Duration>) {
        self.settings_mut().exec_timeout = timeout;
    }

    fn push_working_directory(&mut self, dir: &str) {
        self.settings_mut().working_directories.push(dir.to_string());
    }

    fn pop_working_directory(&mut self) -> Option<String> {
        self.settings_mut().working_directories.pop()
    }

    fn peek_working_directory(&self) -> Option<&str> {
        self.settings().working_directories.last().map(String::as_str)
    }
}
