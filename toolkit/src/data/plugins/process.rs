//! Adapter child processes
//!
//! Each adapter runs as its own long-lived child. The host owns all three
//! pipes: stdin/stdout carry the line protocol, stderr lines are forwarded
//! to the log. Children are killed when their handle drops.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use sqltracebench_plugin::{MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use super::{PluginClient, PluginError};

/// Handle to a running adapter child
#[derive(Debug)]
pub struct PluginProcess {
    label: String,
    command: String,
    child: Child,
}

impl PluginProcess {
    /// Spawn `command` (argv form) and complete the handshake.
    ///
    /// The child is killed if the handshake fails.
    pub async fn launch(
        label: &str,
        command: &[String],
        env: &BTreeMap<String, String>,
        handshake_timeout: Duration,
    ) -> Result<(Self, PluginClient), PluginError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| PluginError::Handshake(format!("plugin '{}' has no command", label)))?;
        let command_line = command.join(" ");

        let mut child = Command::new(program)
            .args(args)
            .envs(env)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            let label = label.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(plugin = %label, "{}", line);
                }
            });
        }

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill().await;
            return Err(PluginError::Transport("child pipes unavailable".to_string()));
        };

        tracing::debug!(plugin = %label, command = %command_line, pid = ?child.id(), "Plugin started");

        let client = match PluginClient::connect(label, stdout, stdin, handshake_timeout).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(plugin = %label, error = %e, "Plugin handshake failed, killing child");
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let process = Self {
            label: label.to_string(),
            command: command_line,
            child,
        };
        Ok((process, client))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub async fn kill(&mut self) {
        if !self.is_running() {
            return;
        }
        match self.child.kill().await {
            Ok(()) => tracing::debug!(plugin = %self.label, "Plugin stopped"),
            Err(e) => tracing::warn!(plugin = %self.label, error = %e, "Failed to kill plugin"),
        }
    }
}
