//! Scripted sessions and fixtures for reviewer and service tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_common::ReviewerConfig;
use serde_json::Value;
use tokio::sync::mpsc;

use super::session::{AgentSession, LaunchSpec, SessionLauncher, SessionMessage};
use super::{ReviewContext, ReviewerSupervisor, WorkerReport, WorkerSettings};
use crate::errors::ReviewerError;
use crate::permissions::PermissionDecision;
use crate::store::{DbHandle, NewReview, ReviewDb};

pub(crate) enum Step {
    Message(SessionMessage),
    /// Block forever, like an agent that is still thinking.
    Hang,
}

pub(crate) fn text(s: &str) -> Step {
    Step::Message(SessionMessage::AssistantText {
        text: s.to_string(),
    })
}

pub(crate) fn turn_end(result: Option<&str>) -> Step {
    Step::Message(SessionMessage::TurnResult {
        is_error: false,
        result: result.map(String::from),
        cost_usd: Some(0.01),
        duration_ms: Some(1000),
        session_id: "session-1".to_string(),
    })
}

pub(crate) fn permission(request_id: &str, tool: &str, input: Value) -> Step {
    Step::Message(SessionMessage::PermissionRequest {
        request_id: request_id.to_string(),
        tool_name: tool.to_string(),
        input,
    })
}

pub(crate) fn result_block(decision: &str, issues_json: &str) -> String {
    format!(
        "Review complete.\n\n```review-result\n{{\"decision\": \"{}\", \"summary\": \"scripted\", \"issues\": {}}}\n```\n",
        decision, issues_json
    )
}

/// Everything the scripted sessions were asked to do.
#[derive(Default)]
pub(crate) struct SessionLog {
    prompts: Mutex<Vec<String>>,
    permissions: Mutex<Vec<(String, PermissionDecision)>>,
    launches: Mutex<Vec<LaunchSpec>>,
    closes: AtomicUsize,
}

impl SessionLog {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn permissions(&self) -> Vec<(String, PermissionDecision)> {
        self.permissions.lock().unwrap().clone()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Hands out one queued script per launch.
#[derive(Default)]
pub(crate) struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Result<Vec<Step>, String>>>,
    log: Arc<SessionLog>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, steps: Vec<Step>) {
        self.scripts.lock().unwrap().push_back(Ok(steps));
    }

    pub fn push_failure(&self, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn log(&self) -> Arc<SessionLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn AgentSession>, ReviewerError> {
        self.log.launches.lock().unwrap().push(spec.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Ok(steps)) => Ok(Box::new(ScriptedSession {
                steps: steps.into(),
                log: Arc::clone(&self.log),
            })),
            Some(Err(message)) => Err(ReviewerError::Connect(message)),
            None => Err(ReviewerError::Connect("no script queued".to_string())),
        }
    }
}

struct ScriptedSession {
    steps: VecDeque<Step>,
    log: Arc<SessionLog>,
}

#[async_trait]
impl AgentSession for ScriptedSession {
    async fn send_prompt(&mut self, prompt: &str) -> Result<(), ReviewerError> {
        self.log.prompts.lock().unwrap().push(prompt.to_string());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<SessionMessage>, ReviewerError> {
        match self.steps.pop_front() {
            Some(Step::Message(message)) => Ok(Some(message)),
            Some(Step::Hang) => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn respond_permission(
        &mut self,
        request_id: &str,
        _input: &Value,
        decision: &PermissionDecision,
    ) -> Result<(), ReviewerError> {
        self.log
            .permissions
            .lock()
            .unwrap()
            .push((request_id.to_string(), decision.clone()));
        Ok(())
    }

    async fn close(&mut self, _grace: Duration) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn test_db() -> DbHandle {
    DbHandle::new(ReviewDb::new_in_memory().unwrap())
}

pub(crate) fn test_settings(dir: &Path) -> WorkerSettings {
    WorkerSettings {
        claude_cmd: "claude".to_string(),
        exit_poll_interval: Duration::from_millis(10),
        exit_poll_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(100),
        store_timeout: Duration::from_secs(2),
        mail_batch_limit: 10,
        scratch_root: dir.join("scratch"),
        config_root: dir.join("config"),
    }
}

pub(crate) fn seed_review_with(db: &DbHandle, new: NewReview) -> String {
    db.lock_sync().unwrap().create_review(&new).unwrap().id
}

/// A branch review of `feature` against `main` in `repo`.
pub(crate) fn seed_review(db: &DbHandle, repo: &Path) -> String {
    seed_review_with(
        db,
        NewReview {
            requester_id: "alice".to_string(),
            branch: Some("feature".to_string()),
            base_branch: Some("main".to_string()),
            repo_path: repo.to_string_lossy().into_owned(),
            review_type: "full".to_string(),
            ..NewReview::default()
        },
    )
}

pub(crate) fn test_context(db: &DbHandle, review_id: &str) -> ReviewContext {
    let review = db.lock_sync().unwrap().get_review(review_id).unwrap().unwrap();
    ReviewContext::from_review(&review, &ReviewerConfig::default())
}

pub(crate) async fn next_report(rx: &mut mpsc::UnboundedReceiver<WorkerReport>) -> WorkerReport {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a worker report")
        .expect("report channel closed")
}

/// True if no report shows up for a short while.
pub(crate) async fn no_report(rx: &mut mpsc::UnboundedReceiver<WorkerReport>) -> bool {
    tokio::time::timeout(Duration::from_millis(200), rx.recv())
        .await
        .is_err()
}

pub(crate) async fn wait_until_released(supervisor: &ReviewerSupervisor, review_id: &str) {
    for _ in 0..500 {
        if !supervisor.is_alive(review_id).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker for {} never released its entry", review_id);
}
