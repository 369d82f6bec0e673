//! ACP transport: a long-lived agent session over stdio.
//!
//! Requests are newline-delimited JSON-RPC written to the child's stdin.
//! Every stdout line becomes output; `session/update` notifications are
//! reduced to their text.

use std::time::Duration;

use relay_core::ProviderDefinition;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::error::TransportError;
use crate::process::{build_command, forward_lines, is_running, terminate, wait_for_exit};
use crate::transport::{ExitOutcome, StartOptions, TransportEvent};
use crate::types::{AcpNotification, JsonRpcRequest};

/// A running ACP session.
pub struct AcpSession {
    child: Child,
    stdin: Option<ChildStdin>,
    next_id: u64,
    model: String,
    stop_grace: Duration,
}

impl AcpSession {
    /// Spawn the agent, send `initialize` and the initial prompt.
    pub(crate) async fn start(
        provider: &ProviderDefinition,
        options: &StartOptions,
        tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let program = provider
            .launch
            .command
            .as_deref()
            .ok_or_else(|| TransportError::MissingCommand(provider.id.clone()))?;

        let mut args = provider.launch.args.clone();
        if let (Some(flag), Some(path)) = (&provider.launch.config_flag, &options.config_path) {
            args.push(flag.clone());
            args.push(path.clone());
        }

        let mut cmd = build_command(program, &args, &provider.launch.env, true);
        cmd.env("RELAY_MODEL", &options.model);
        if let Some(path) = &options.config_path {
            cmd.env("RELAY_CONFIG_PATH", path);
        }

        debug!("Full command: {:?}", cmd);
        let mut child = cmd.spawn()?;
        info!(provider = %provider.id, pid = ?child.id(), "ACP session process spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::ProtocolError("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::ProtocolError("Failed to get stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransportError::ProtocolError("Failed to get stderr".to_string()))?;

        forward_lines(stdout, tx.clone(), "stdout", session_line);
        forward_lines(stderr, tx, "stderr", TransportEvent::Stderr);

        let mut session = Self {
            child,
            stdin: Some(stdin),
            next_id: 1,
            model: options.model.clone(),
            stop_grace: options.stop_grace,
        };

        session
            .request(
                "initialize",
                json!({
                    "protocolVersion": 1,
                    "clientInfo": { "name": "relay", "version": env!("CARGO_PKG_VERSION") },
                }),
            )
            .await?;
        session.prompt(&options.prompt, &[], &[]).await?;

        Ok(session)
    }

    /// Write a `session/prompt` request.
    pub async fn prompt(
        &mut self,
        prompt: &str,
        context_files: &[String],
        tools: &[String],
    ) -> Result<(), TransportError> {
        let params = json!({
            "model": self.model,
            "prompt": prompt,
            "contextFiles": context_files,
            "tools": tools,
        });
        self.request("session/prompt", params).await
    }

    async fn request(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), TransportError> {
        let request = JsonRpcRequest::new(self.next_id, method, params);
        self.next_id += 1;

        let json = serde_json::to_string(&request)?;
        trace!("Sending to stdin: {}", json);

        let stdin = self.stdin.as_mut().ok_or(TransportError::SessionClosed)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        debug!(method, id = request.id, json_len = json.len(), "ACP request sent");
        Ok(())
    }

    pub(crate) fn is_alive(&mut self) -> bool {
        is_running(&mut self.child)
    }

    pub(crate) async fn finish(&mut self) -> ExitOutcome {
        self.stdin = None;
        wait_for_exit(&mut self.child, self.stop_grace).await
    }

    pub(crate) async fn stop(&mut self) {
        // Closing stdin lets well-behaved agents exit on their own.
        self.stdin = None;
        terminate(&mut self.child, self.stop_grace).await;
    }
}

fn session_line(line: String) -> TransportEvent {
    match serde_json::from_str::<AcpNotification>(&line) {
        Ok(notification) => match notification.text() {
            Some(text) => TransportEvent::Stdout(text.to_string()),
            None => TransportEvent::Stdout(line),
        },
        Err(_) => TransportEvent::Stdout(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::CommunicationMethod;

    fn echo_provider() -> ProviderDefinition {
        ProviderDefinition::new("echo-acp", CommunicationMethod::Acp, "claude", "sonnet")
            .with_command("cat", Vec::<String>::new())
    }

    #[test]
    fn test_session_line_extracts_update_text() {
        let line = r#"{"method":"session/update","params":{"update":{"content":{"text":"hello"}}}}"#;
        assert_eq!(
            session_line(line.to_string()),
            TransportEvent::Stdout("hello".to_string())
        );
        assert_eq!(
            session_line("plain".to_string()),
            TransportEvent::Stdout("plain".to_string())
        );
    }

    #[tokio::test]
    async fn test_start_writes_initialize_and_prompt() {
        let (tx, mut rx) = mpsc::channel(16);
        let options = StartOptions::new("sonnet", "Refactor the router");
        let mut session = AcpSession::start(&echo_provider(), &options, tx).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (TransportEvent::Stdout(init), TransportEvent::Stdout(prompt)) => {
                assert!(init.contains("\"initialize\""));
                assert!(prompt.contains("session/prompt"));
                assert!(prompt.contains("Refactor the router"));
            }
            other => panic!("unexpected events: {:?}", other),
        }

        session.prompt("And add tests", &["a.rs".to_string()], &[]).await.unwrap();
        match rx.recv().await.unwrap() {
            TransportEvent::Stdout(line) => {
                assert!(line.contains("And add tests"));
                assert!(line.contains("a.rs"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert!(session.is_alive());
        session.stop().await;
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn test_missing_command() {
        let provider =
            ProviderDefinition::new("bare", CommunicationMethod::Acp, "claude", "sonnet");
        let (tx, _rx) = mpsc::channel(1);
        let result = AcpSession::start(&provider, &StartOptions::new("sonnet", "hi"), tx).await;
        assert!(matches!(result, Err(TransportError::MissingCommand(_))));
    }
}
