//! Claude CLI stream-json wire format.
//!
//! The reviewer session runs the CLI with `--input-format stream-json
//! --output-format stream-json --permission-prompt-tool stdio`, so both
//! directions are newline-delimited JSON:
//!
//! - stdout yields [`StreamEvent`]s: assistant messages, tool results, the
//!   final `result` envelope and `control_request`s asking whether a tool
//!   may run.
//! - stdin takes user messages ([`user_message`]) and answers to control
//!   requests ([`permission_response`], [`control_error`]).

use serde::Deserialize;
use serde_json::{Value, json};

/// Events from Claude CLI's stream-json output format
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "user")]
    User {
        #[serde(default)]
        tool_use_result: Option<Value>,
    },

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "system")]
    System {
        subtype: String,
        #[serde(default)]
        session_id: String,
    },

    #[serde(rename = "control_request")]
    ControlRequest {
        request_id: String,
        request: ControlRequest,
    },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "subtype")]
pub enum ControlRequest {
    #[serde(rename = "can_use_tool")]
    CanUseTool {
        tool_name: String,
        #[serde(default)]
        input: Value,
    },

    #[serde(other)]
    Unsupported,
}

/// A user turn written to the CLI's stdin.
pub fn user_message(text: &str) -> Value {
    json!({
        "type": "user",
        "message": {"role": "user", "content": text},
    })
}

/// Answer to a `can_use_tool` control request. `deny_reason` of `None` allows
/// the call with its original input.
pub fn permission_response(request_id: &str, input: &Value, deny_reason: Option<&str>) -> Value {
    let body = match deny_reason {
        None => json!({"behavior": "allow", "updatedInput": input}),
        Some(message) => json!({"behavior": "deny", "message": message}),
    };
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": body,
        },
    })
}

/// Error answer for control requests this client does not handle.
pub fn control_error(request_id: &str, error: &str) -> Value {
    json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": error,
        },
    })
}

/// Extract a human-readable description from a tool use event
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let path = || {
        input
            .get("file_path")
            .and_then(|v| v.as_str())
            .map(shorten_path)
            .unwrap_or_else(|| "file".to_string())
    };
    match name {
        "Read" => format!("Reading: {}", path()),
        "Write" => format!("Writing: {}", path()),
        "Bash" => {
            let cmd = input
                .get("command")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".to_string());
            format!("Running: {}", cmd)
        }
        "Glob" => {
            let pattern = input.get("pattern").and_then(|v| v.as_str()).unwrap_or("*");
            format!("Searching: {}", pattern)
        }
        "Grep" => {
            let pattern = input
                .get("pattern")
                .and_then(|v| v.as_str())
                .map(|s| truncate_str(s, 30))
                .unwrap_or_else(|| "pattern".to_string());
            format!("Grep: {}", pattern)
        }
        _ => name.to_string(),
    }
}

/// Short description of a `tool_use_result` payload for diagnostics.
pub fn summarize_tool_result(result: &Value) -> String {
    if let Some(path) = result
        .get("file")
        .and_then(|f| f.get("filePath"))
        .and_then(|v| v.as_str())
    {
        return format!("file: {}", shorten_path(path));
    }
    if let Some(stdout) = result.get("stdout").and_then(|v| v.as_str()) {
        return format!("stdout: {} lines", stdout.lines().count());
    }
    match result {
        Value::String(s) => truncate_str(s.lines().next().unwrap_or(""), 60),
        _ => "tool result".to_string(),
    }
}

/// Shorten a file path to just the last 2 components
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Truncate a string with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate assistant text to a one-line snippet
pub fn truncate_thinking(text: &str, max_len: usize) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    truncate_str(first_line.trim(), max_len)
}
