//! Subprocess plumbing shared by the ACP and CLI transports.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::transport::{ExitOutcome, TransportEvent};

/// Build a command whose child is killed when the handle is dropped.
pub(crate) fn build_command(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
    piped_stdin: bool,
) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if piped_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd
}

/// Forward every line of `reader` to `tx`, blank lines included. Bytes that
/// are not valid UTF-8 are replaced rather than ending the stream. The task
/// ends on EOF, on an I/O error, or when the receiver is gone.
pub(crate) fn forward_lines<R>(
    reader: R,
    tx: mpsc::Sender<TransportEvent>,
    stream: &'static str,
    to_event: fn(String) -> TransportEvent,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut line_count = 0u64;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!(stream, total_lines = line_count, "Provider stream closed (EOF)");
                    break;
                }
                Ok(_) => {
                    let line = decode_line(&buf);
                    line_count += 1;
                    if stream == "stderr" {
                        warn!(stderr = %line, "Provider stderr");
                    }
                    if tx.send(to_event(line)).await.is_err() {
                        debug!(stream, "Event receiver dropped");
                        break;
                    }
                }
                Err(e) => {
                    error!(stream, error = %e, "Error reading provider output");
                    let note = format!("{} read error: {}", stream, e);
                    let _ = tx.send(TransportEvent::Stderr(note)).await;
                    break;
                }
            }
        }
    });
}

/// Strip the line terminator and decode, replacing invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Wait for a child whose output streams have closed.
pub(crate) async fn wait_for_exit(child: &mut Child, grace: Duration) -> ExitOutcome {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            let code = status.code();
            info!(exit_code = ?code, success = status.success(), "Provider process exited");
            if status.success() {
                ExitOutcome::success()
            } else {
                ExitOutcome::failure(
                    code,
                    match code {
                        Some(c) => format!("process exited with code {}", c),
                        None => "process terminated by signal".to_string(),
                    },
                )
            }
        }
        Ok(Err(e)) => ExitOutcome::failure(None, format!("failed to wait for process: {}", e)),
        Err(_) => {
            warn!("Provider closed its output but did not exit, killing it");
            terminate(child, grace).await;
            ExitOutcome::failure(None, "process closed its output but did not exit".to_string())
        }
    }
}

/// Kill the child and reap it.
pub(crate) async fn terminate(child: &mut Child, grace: Duration) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Failed to signal provider process");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(exit_code = ?status.code(), "Provider process reaped"),
        Ok(Err(e)) => warn!(error = %e, "Failed to reap provider process"),
        Err(_) => warn!("Provider process did not exit within the grace period"),
    }
}

/// Whether the child is still running.
pub(crate) fn is_running(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8]) -> Vec<TransportEvent> {
        let (tx, mut rx) = mpsc::channel(16);
        forward_lines(input, tx, "stdout", TransportEvent::Stdout);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn stdout(line: &str) -> TransportEvent {
        TransportEvent::Stdout(line.to_string())
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{FFFD} byte");
    }

    #[tokio::test]
    async fn test_blank_lines_are_forwarded() {
        let events = collect(b"a\n\nb\n").await;
        assert_eq!(events, vec![stdout("a"), stdout(""), stdout("b")]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_the_stream() {
        let events = collect(b"a\n\xff\nb\nlast").await;
        assert_eq!(
            events,
            vec![stdout("a"), stdout("\u{FFFD}"), stdout("b"), stdout("last")]
        );
    }
}
