//! Agent-process sessions.
//!
//! [`SessionLauncher`] starts a session and [`AgentSession`] talks to it. The
//! production implementation runs the Claude CLI as a child process speaking
//! stream-json over stdin/stdout. The program is spawned directly from an
//! argv, never through a shell.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::errors::ReviewerError;
use crate::permissions::PermissionDecision;
use crate::stream::{
    self, ContentBlock, ControlRequest, StreamEvent, describe_tool_use, summarize_tool_result,
};

/// Everything needed to start one agent session.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub model: String,
    pub system_prompt: String,
    /// Working directory of the agent: the repository under review.
    pub repo_path: PathBuf,
    /// Scratch configuration directory, so host hooks and settings are not
    /// inherited.
    pub config_dir: PathBuf,
}

impl LaunchSpec {
    pub fn args(&self) -> Vec<String> {
        vec![
            "--print".to_string(),
            "--verbose".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--input-format".to_string(),
            "stream-json".to_string(),
            "--permission-prompt-tool".to_string(),
            "stdio".to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--system-prompt".to_string(),
            self.system_prompt.clone(),
        ]
    }
}

/// A protocol message the worker cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    AssistantText {
        text: String,
    },
    /// Human-readable description of a tool call the agent made.
    ToolUse {
        description: String,
    },
    /// Tool result content, for diagnostics only.
    ToolOutput {
        summary: String,
    },
    PermissionRequest {
        request_id: String,
        tool_name: String,
        input: Value,
    },
    /// Final envelope of a turn.
    TurnResult {
        is_error: bool,
        result: Option<String>,
        cost_usd: Option<f64>,
        duration_ms: Option<u64>,
        session_id: String,
    },
}

#[async_trait]
pub trait AgentSession: Send {
    /// Send a user turn.
    async fn send_prompt(&mut self, prompt: &str) -> Result<(), ReviewerError>;

    /// Next message from the agent, or `None` once the stream has closed.
    async fn next_message(&mut self) -> Result<Option<SessionMessage>, ReviewerError>;

    /// Answer a permission request.
    async fn respond_permission(
        &mut self,
        request_id: &str,
        input: &Value,
        decision: &PermissionDecision,
    ) -> Result<(), ReviewerError>;

    /// Half-close the input, wait up to `grace` for the process to exit, then
    /// kill it. Safe to call more than once.
    async fn close(&mut self, grace: Duration);
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AgentSession>, ReviewerError>;
}

/// Launches the Claude CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeLauncher;

#[async_trait]
impl SessionLauncher for ClaudeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AgentSession>, ReviewerError> {
        let mut child = Command::new(&spec.program)
            .args(spec.args())
            .env("CLAUDE_CONFIG_DIR", &spec.config_dir)
            .current_dir(&spec.repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ReviewerError::Connect(format!("Failed to spawn {}: {}", spec.program, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReviewerError::Connect("Failed to capture stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "gatekeeper::agent_stderr", "{}", line);
                }
            });
        }

        info!(
            program = %spec.program,
            model = %spec.model,
            repo = %spec.repo_path.display(),
            pid = ?child.id(),
            "Started agent process"
        );

        Ok(Box::new(ClaudeSession {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            pending: VecDeque::new(),
            exited: false,
        }))
    }
}

pub struct ClaudeSession {
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    pending: VecDeque<SessionMessage>,
    exited: bool,
}

impl ClaudeSession {
    async fn write_json(&mut self, value: &Value) -> Result<(), ReviewerError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReviewerError::Connect("Agent input is already closed".to_string()))?;
        let mut line = serde_json::to_string(value)
            .map_err(|e| ReviewerError::Connect(format!("Failed to encode message: {}", e)))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ReviewerError::Connect(format!("Failed to write to agent: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| ReviewerError::Connect(format!("Failed to flush agent input: {}", e)))
    }

    /// Turn one stream event into zero or more session messages. Control
    /// requests this client cannot answer are rejected on the spot.
    async fn handle_event(&mut self, event: StreamEvent) -> Result<(), ReviewerError> {
        match event {
            StreamEvent::Assistant { message, .. } => {
                let mut texts = Vec::new();
                let mut tool_uses = Vec::new();
                for block in message.content {
                    match block {
                        ContentBlock::Text { text } => texts.push(text),
                        ContentBlock::ToolUse { name, input, .. } => {
                            tool_uses.push(SessionMessage::ToolUse {
                                description: describe_tool_use(&name, &input),
                            });
                        }
                        ContentBlock::Other => {}
                    }
                }
                if !texts.is_empty() {
                    self.pending.push_back(SessionMessage::AssistantText {
                        text: texts.join("\n"),
                    });
                }
                self.pending.extend(tool_uses);
            }
            StreamEvent::User { tool_use_result } => {
                if let Some(result) = tool_use_result {
                    self.pending.push_back(SessionMessage::ToolOutput {
                        summary: summarize_tool_result(&result),
                    });
                }
            }
            StreamEvent::Result {
                subtype,
                result,
                is_error,
                total_cost_usd,
                duration_ms,
                session_id,
            } => {
                debug!(subtype = %subtype, is_error, "Turn finished");
                self.pending.push_back(SessionMessage::TurnResult {
                    is_error,
                    result,
                    cost_usd: total_cost_usd,
                    duration_ms,
                    session_id,
                });
            }
            StreamEvent::System { subtype, session_id } => {
                debug!(subtype = %subtype, session_id = %session_id, "System event");
            }
            StreamEvent::ControlRequest {
                request_id,
                request,
            } => match request {
                ControlRequest::CanUseTool { tool_name, input } => {
                    self.pending.push_back(SessionMessage::PermissionRequest {
                        request_id,
                        tool_name,
                        input,
                    });
                }
                ControlRequest::Unsupported => {
                    debug!(request_id = %request_id, "Rejecting unsupported control request");
                    self.write_json(&stream::control_error(
                        &request_id,
                        "unsupported control request",
                    ))
                    .await?;
                }
            },
            StreamEvent::Unknown => {}
        }
        Ok(())
    }
}

#[async_trait]
impl AgentSession for ClaudeSession {
    async fn send_prompt(&mut self, prompt: &str) -> Result<(), ReviewerError> {
        self.write_json(&stream::user_message(prompt)).await
    }

    async fn next_message(&mut self) -> Result<Option<SessionMessage>, ReviewerError> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| ReviewerError::Connect(format!("Failed to read agent output: {}", e)))?;
            let Some(line) = line else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamEvent>(&line) {
                Ok(event) => self.handle_event(event).await?,
                Err(e) => debug!(error = %e, "Skipping unparseable agent output line"),
            }
        }
    }

    async fn respond_permission(
        &mut self,
        request_id: &str,
        input: &Value,
        decision: &PermissionDecision,
    ) -> Result<(), ReviewerError> {
        let deny_reason = match decision {
            PermissionDecision::Allow => None,
            PermissionDecision::Deny(reason) => Some(reason.as_str()),
        };
        self.write_json(&stream::permission_response(request_id, input, deny_reason))
            .await
    }

    async fn close(&mut self, grace: Duration) {
        if self.exited {
            return;
        }
        // Dropping stdin sends EOF, which ends the CLI's input loop.
        self.stdin = None;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Agent process exited"),
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for agent process"),
            Err(_) => {
                warn!(grace_secs = grace.as_secs(), "Agent process did not exit in time; killing");
                if let Err(e) = self.child.kill().await {
                    warn!(error = %e, "Failed to kill agent process");
                }
            }
        }
        self.exited = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            program: "claude".into(),
            model: "claude-sonnet-4-5".into(),
            system_prompt: "You review code.".into(),
            repo_path: PathBuf::from("/repo"),
            config_dir: PathBuf::from("/tmp/gatekeeper-config/x"),
        }
    }

    #[test]
    fn test_args_use_stream_json_both_ways() {
        let args = spec().args();
        let joined = args.join(" ");
        assert!(joined.contains("--output-format stream-json"));
        assert!(joined.contains("--input-format stream-json"));
        assert!(joined.contains("--permission-prompt-tool stdio"));
        assert!(joined.contains("--model claude-sonnet-4-5"));
        // The system prompt is one argv element, never shell-split.
        assert_eq!(args.last().map(String::as_str), Some("You review code."));
    }

    #[tokio::test]
    async fn test_launch_missing_program_is_connect_error() {
        let mut bad = spec();
        bad.program = "/nonexistent/gatekeeper-claude".into();
        bad.repo_path = std::env::temp_dir();
        match ClaudeLauncher.launch(&bad).await {
            Err(ReviewerError::Connect(msg)) => assert!(msg.contains("gatekeeper-claude")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("launch should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_reads_stream_json_from_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-claude");
        let output = [
            r#"{"type":"system","subtype":"init","session_id":"s1"}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Checking."},{"type":"tool_use","name":"Bash","input":{"command":"git diff main...feature"},"id":"t1"}]},"session_id":"s1"}"#,
            r#"{"type":"control_request","request_id":"r1","request":{"subtype":"can_use_tool","tool_name":"Bash","input":{"command":"git diff main...feature"}}}"#,
            "not json",
            r#"{"type":"result","subtype":"success","result":"done","is_error":false,"total_cost_usd":0.5,"duration_ms":1200,"session_id":"s1"}"#,
        ]
        .join("\n");
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat <<'EOF'\n{}\nEOF\ncat >/dev/null\n", output),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut launch = spec();
        launch.program = script.to_string_lossy().into_owned();
        launch.repo_path = dir.path().to_path_buf();
        launch.config_dir = dir.path().join("config");

        let mut session = ClaudeLauncher.launch(&launch).await.unwrap();
        session.send_prompt("review please").await.unwrap();

        assert_eq!(
            session.next_message().await.unwrap(),
            Some(SessionMessage::AssistantText {
                text: "Checking.".into()
            })
        );
        match session.next_message().await.unwrap() {
            Some(SessionMessage::ToolUse { description }) => {
                assert!(description.contains("git diff"))
            }
            other => panic!("unexpected message: {:?}", other),
        }
        match session.next_message().await.unwrap() {
            Some(SessionMessage::PermissionRequest {
                request_id,
                tool_name,
                ..
            }) => {
                assert_eq!(request_id, "r1");
                assert_eq!(tool_name, "Bash");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        match session.next_message().await.unwrap() {
            Some(SessionMessage::TurnResult {
                is_error,
                result,
                cost_usd,
                ..
            }) => {
                assert!(!is_error);
                assert_eq!(result.as_deref(), Some("done"));
                assert_eq!(cost_usd, Some(0.5));
            }
            other => panic!("unexpected message: {:?}", other),
        }

        session.close(Duration::from_secs(5)).await;
        session.close(Duration::from_secs(5)).await;
    }
}
