//! API transport: one HTTP request per task, retried on transient failures.

use std::time::Duration;

use relay_core::ProviderDefinition;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{ExitOutcome, StartOptions, TransportEvent};

/// An in-flight API request.
pub struct ApiCall {
    handle: Option<JoinHandle<Result<(), TransportError>>>,
}

enum AttemptError {
    Transient(String),
    Fatal(TransportError),
}

struct Request {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    body: Value,
    max_retries: u32,
    backoff: Duration,
}

impl ApiCall {
    pub(crate) fn start(
        provider: &ProviderDefinition,
        options: &StartOptions,
        tx: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let endpoint = provider
            .launch
            .endpoint
            .clone()
            .ok_or_else(|| TransportError::MissingEndpoint(provider.id.clone()))?;

        let api_key = provider
            .launch
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok());
        if provider.launch.api_key_env.is_some() && api_key.is_none() {
            warn!(provider = %provider.id, "API key environment variable is not set");
        }

        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let request = Request {
            client,
            endpoint,
            api_key,
            body: json!({
                "model": options.model,
                "messages": [{ "role": "user", "content": options.prompt }],
                "stream": false,
            }),
            max_retries: options.max_retries,
            backoff: options.retry_backoff,
        };

        info!(provider = %provider.id, endpoint = %request.endpoint, "Dispatching API request");
        let handle = tokio::spawn(request.run(tx));
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub(crate) async fn finish(&mut self) -> ExitOutcome {
        let Some(handle) = self.handle.take() else {
            return ExitOutcome::failure(None, "request was stopped");
        };
        match handle.await {
            Ok(Ok(())) => ExitOutcome::success(),
            Ok(Err(e)) => ExitOutcome::failure(None, e.to_string()),
            Err(e) => ExitOutcome::failure(None, format!("request task failed: {}", e)),
        }
    }

    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("API request aborted");
        }
    }
}

impl Request {
    async fn run(self, tx: mpsc::Sender<TransportEvent>) -> Result<(), TransportError> {
        let attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.send_once().await {
                Ok(text) => {
                    info!(attempt, text_len = text.len(), "API request completed");
                    if tx.send(TransportEvent::Stdout(text)).await.is_err() {
                        warn!("Failed to deliver API response - receiver dropped");
                    }
                    return Ok(());
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(message)) => {
                    warn!(attempt, attempts, error = %message, "Transient API failure");
                    let _ = tx.send(TransportEvent::Transient(message.clone())).await;
                    last_error = message;
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(TransportError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    async fn send_once(&self) -> Result<String, AttemptError> {
        let mut request = self.client.post(&self.endpoint).json(&self.body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AttemptError::Transient(e.to_string())
            } else {
                AttemptError::Fatal(TransportError::Http(e.to_string()))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        if status.as_u16() == 429 || status.is_server_error() {
            return Err(AttemptError::Transient(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(AttemptError::Fatal(TransportError::Http(format!(
                "HTTP {}: {}",
                status, preview
            ))));
        }

        Ok(match serde_json::from_str::<Value>(&body) {
            Ok(value) => extract_text(&value).unwrap_or(body),
            Err(_) => body,
        })
    }
}

/// Pull the generated text out of the common response shapes
/// (chat completions, messages, plain `output`/`text`/`response` fields).
pub fn extract_text(value: &Value) -> Option<String> {
    if let Some(text) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    if let Some(items) = value.get("content").and_then(Value::as_array) {
        let parts: Vec<&str> = items
            .iter()
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if !parts.is_empty() {
            return Some(parts.join("\n"));
        }
    }

    ["output", "text", "response"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::CommunicationMethod;

    #[test]
    fn test_extract_chat_completion() {
        let value = json!({ "choices": [{ "message": { "content": "done" } }] });
        assert_eq!(extract_text(&value), Some("done".to_string()));
    }

    #[test]
    fn test_extract_content_blocks() {
        let value = json!({ "content": [{ "type": "text", "text": "a" }, { "type": "text", "text": "b" }] });
        assert_eq!(extract_text(&value), Some("a\nb".to_string()));
    }

    #[test]
    fn test_extract_plain_fields() {
        assert_eq!(extract_text(&json!({ "response": "r" })), Some("r".to_string()));
        assert_eq!(extract_text(&json!({ "unrelated": 1 })), None);
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let provider = ProviderDefinition::new("remote", CommunicationMethod::Api, "gemini", "pro");
        let (tx, _rx) = mpsc::channel(1);
        let result = ApiCall::start(&provider, &StartOptions::new("pro", "hi"), tx);
        assert!(matches!(result, Err(TransportError::MissingEndpoint(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_exhausted() {
        let provider = ProviderDefinition::new("remote", CommunicationMethod::Api, "gemini", "pro")
            .with_endpoint("http://127.0.0.1:9/v1/chat");
        let options = StartOptions::new("pro", "hi")
            .with_max_retries(1)
            .with_retry_backoff(Duration::from_millis(1));
        let (tx, mut rx) = mpsc::channel(8);
        let mut call = ApiCall::start(&provider, &options, tx).unwrap();

        let mut transient = 0;
        while let Some(event) = rx.recv().await {
            if matches!(event, TransportEvent::Transient(_)) {
                transient += 1;
            }
        }
        assert_eq!(transient, 2);

        let outcome = call.finish().await;
        assert!(!outcome.success);
        assert!(outcome.detail.unwrap().contains("Gave up after 2 attempts"));
    }
}
