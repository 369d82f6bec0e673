//! CLI transport: a one-shot subprocess per task.

use std::time::Duration;

use relay_core::ProviderDefinition;
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::TransportError;
use crate::process::{build_command, forward_lines, is_running, terminate, wait_for_exit};
use crate::transport::{ExitOutcome, StartOptions, TransportEvent};

/// A running one-shot provider process.
pub struct CliProcess {
    child: Child,
    stop_grace: Duration,
}

impl CliProcess {
    /// Spawn `command args... [config_flag config_path] prompt`.
    pub(crate) fn start(
        provider: &ProviderDefinition,
        options: &StartOptions,
        tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let program = provider
            .launch
            .command
            .as_deref()
            .ok_or_else(|| TransportError::MissingCommand(provider.id.clone()))?;

        let args = cli_args(provider, options);
        let mut cmd = build_command(program, &args, &provider.launch.env, false);
        cmd.env("RELAY_MODEL", &options.model);
        if let Some(path) = &options.config_path {
            cmd.env("RELAY_CONFIG_PATH", path);
        }

        debug!("Full command: {:?}", cmd);
        let mut child = cmd.spawn()?;
        info!(provider = %provider.id, pid = ?child.id(), "CLI process spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::ProtocolError("Failed to get stderr".to_string()))?;

        forward_lines(stdout, tx.clone(), "stdout", TransportEvent::Stdout);
        forward_lines(stderr, tx, "stderr", TransportEvent::Stderr);

        Ok(Self {
            child,
            stop_grace: options.stop_grace,
        })
    }

    pub(crate) fn is_alive(&mut self) -> bool {
        is_running(&mut self.child)
    }

    pub(crate) async fn finish(&mut self) -> ExitOutcome {
        wait_for_exit(&mut self.child, self.stop_grace).await
    }

    pub(crate) async fn stop(&mut self) {
        terminate(&mut self.child, self.stop_grace).await;
    }
}

fn cli_args(provider: &ProviderDefinition, options: &StartOptions) -> Vec<String> {
    let mut args = provider.launch.args.clone();
    if let (Some(flag), Some(path)) = (&provider.launch.config_flag, &options.config_path) {
        args.push(flag.clone());
        args.push(path.clone());
    }
    args.push(options.prompt.clone());
    args
}
