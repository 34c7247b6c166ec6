//! Command interface backed by local `sh -c` processes.

use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use berth_engine::{CommandInterface, CommandOutput, CommandSettings, EngineError, EngineResult};

#[derive(Debug, Default)]
pub struct LocalCommandInterface {
    settings: CommandSettings,
}

impl LocalCommandInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// An interface whose commands run inside `dir`.
    pub fn in_directory(dir: &str) -> Self {
        let mut interface = Self::new();
        interface.push_working_directory(dir);
        interface
    }
}

#[async_trait]
impl CommandInterface for LocalCommandInterface {
    fn settings(&self) -> &CommandSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut CommandSettings {
        &mut self.settings
    }

    async fn run(&self, command: &str) -> EngineResult<CommandOutput> {
        debug!(command, "running local command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.settings.exec_timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    EngineError::Timeout(format!("command `{command}` after {limit:?}"))
                })?,
            None => cmd.output().await,
        }
        .with_context(|| format!("failed to spawn `{command}`"))?;

        let output = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command, status = output.status, "local command finished");
        Ok(output)
    }
}
