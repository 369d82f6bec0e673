//! Wire types for ACP sessions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request written to an ACP session's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Notification read from an ACP session's stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct AcpNotification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl AcpNotification {
    /// Text carried by a `session/update` notification, if any.
    pub fn text(&self) -> Option<&str> {
        if self.method != "session/update" {
            return None;
        }
        self.params
            .pointer("/update/content/text")
            .or_else(|| self.params.pointer("/content/text"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(7, "session/prompt", json!({ "prompt": "hi" }));
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("session/prompt"));
    }

    #[test]
    fn test_update_text_extraction() {
        let line = r#"{"jsonrpc":"2.0","method":"session/update","params":{"update":{"content":{"type":"text","text":"Done."}}}}"#;
        let notification: AcpNotification = serde_json::from_str(line).unwrap();
        assert_eq!(notification.text(), Some("Done."));
    }

    #[test]
    fn test_other_methods_have_no_text() {
        let line = r#"{"method":"session/prompt","params":{"content":{"text":"echo"}}}"#;
        let notification: AcpNotification = serde_json::from_str(line).unwrap();
        assert_eq!(notification.text(), None);
    }
}
