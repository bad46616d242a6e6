//! One reviewer worker: a single agent session serving one review.
//!
//! The worker sends the review prompt, answers permission requests, captures
//! the result eagerly and reports it. After a non-terminal decision it keeps
//! the session open and polls for re-review mail; mail starts another round
//! on the same session. A terminal decision, a failure, cancellation or the
//! poll timeout ends the worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gatekeeper_common::ReviewerResult;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::capture::{Observation, ResultCapture, TurnOutcome};
use super::prompts::{self, DiffCommand};
use super::session::{AgentSession, LaunchSpec, SessionLauncher, SessionMessage};
use super::supervisor::WorkerLink;
use super::{ReviewContext, WorkerSettings};
use crate::errors::ReviewerError;
use crate::permissions::{PermissionDecision, PermissionPolicy};
use crate::store::{DbHandle, NewIteration, ReviewDb};
use crate::stream::truncate_thinking;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-worker directories.
struct Scratch {
    /// Where the agent may stage a write-up.
    notes_dir: PathBuf,
    /// `CLAUDE_CONFIG_DIR` for the agent process.
    config_dir: PathBuf,
}

impl Scratch {
    fn create(settings: &WorkerSettings, agent_name: &str) -> Result<Self, ReviewerError> {
        let scratch = Self {
            notes_dir: settings.scratch_root.join(agent_name),
            config_dir: settings.config_root.join(agent_name),
        };
        for dir in [&scratch.notes_dir, &scratch.config_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                ReviewerError::Setup(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(scratch)
    }

    /// The config dir always goes; the notes dir only if the agent left
    /// nothing in it.
    fn remove(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.config_dir) {
            debug!(dir = %self.config_dir.display(), error = %e, "Failed to remove config dir");
        }
        let _ = std::fs::remove_dir(&self.notes_dir);
    }
}

pub struct ReviewerWorker {
    ctx: ReviewContext,
    agent_name: String,
    agent_id: Option<i64>,
    launcher: Arc<dyn SessionLauncher>,
    db: DbHandle,
    policy: PermissionPolicy,
    settings: WorkerSettings,
    link: WorkerLink,
    cancel: CancellationToken,
    session_id: Option<String>,
    cost_usd: f64,
    round_started_at: DateTime<Utc>,
    round_clock: Instant,
}

impl ReviewerWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctx: ReviewContext,
        agent_name: String,
        launcher: Arc<dyn SessionLauncher>,
        db: DbHandle,
        policy: PermissionPolicy,
        settings: WorkerSettings,
        link: WorkerLink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            agent_name,
            agent_id: None,
            launcher,
            db,
            policy,
            settings,
            link,
            cancel,
            session_id: None,
            cost_usd: 0.0,
            round_started_at: Utc::now(),
            round_clock: Instant::now(),
        }
    }

    /// Run to completion. Failures are reported through the link, never
    /// returned.
    pub async fn run(mut self) {
        info!(
            review_id = %self.ctx.review_id,
            agent = %self.agent_name,
            persona = %self.ctx.reviewer.name,
            "Reviewer worker starting"
        );
        match self.execute().await {
            Ok(()) => {
                info!(review_id = %self.ctx.review_id, "Reviewer worker finished");
                self.link.release().await;
            }
            Err(ReviewerError::Cancelled) => {
                info!(review_id = %self.ctx.review_id, "Reviewer worker cancelled");
                self.link.release().await;
            }
            Err(e) => {
                warn!(review_id = %self.ctx.review_id, error = %e, "Reviewer round failed");
                self.link.complete(Err(e), true).await;
            }
        }
    }

    async fn execute(&mut self) -> Result<(), ReviewerError> {
        if !self.ctx.repo_path.is_dir() {
            return Err(ReviewerError::Setup(format!(
                "Repository {} does not exist",
                self.ctx.repo_path.display()
            )));
        }
        let scratch = Scratch::create(&self.settings, &self.agent_name)?;
        let outcome = self.execute_in(&scratch).await;
        scratch.remove();
        outcome
    }

    async fn execute_in(&mut self, scratch: &Scratch) -> Result<(), ReviewerError> {
        let rules = prompts::load_project_rules(&self.ctx.repo_path);
        if rules.is_some() {
            debug!(review_id = %self.ctx.review_id, "Appending project rules to system prompt");
        }
        let spec = LaunchSpec {
            program: self.settings.claude_cmd.clone(),
            model: self.ctx.reviewer.model.clone(),
            system_prompt: prompts::system_prompt(&self.ctx.reviewer, rules.as_deref()),
            repo_path: self.ctx.repo_path.clone(),
            config_dir: scratch.config_dir.clone(),
        };

        let cancel = self.cancel.clone();
        let launcher = Arc::clone(&self.launcher);
        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReviewerError::Cancelled),
            launched = launcher.launch(&spec) => launched?,
        };

        // Register now so mail can be addressed to this worker even if the
        // session never reports that it started.
        self.register_agent().await;

        let outcome = self.drive(session.as_mut(), scratch).await;
        session.close(self.settings.shutdown_grace).await;
        outcome
    }

    async fn drive(
        &mut self,
        session: &mut dyn AgentSession,
        scratch: &Scratch,
    ) -> Result<(), ReviewerError> {
        let cancel = self.cancel.clone();
        let policy = self.policy.clone().with_scratch_prefix(&scratch.notes_dir);
        let mut diff = DiffCommand::for_context(&self.ctx);
        let mut capture = ResultCapture::new();

        debug!(review_id = %self.ctx.review_id, diff = %diff.display(), "Sending review prompt");
        session
            .send_prompt(&prompts::review_prompt(&self.ctx, &diff, &scratch.notes_dir))
            .await?;
        self.start_round();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReviewerError::Cancelled),
                next = session.next_message() => next?,
            };
            let Some(message) = next else {
                return match capture.end_of_stream() {
                    Some(err) => Err(err),
                    None => Ok(()),
                };
            };

            match message {
                SessionMessage::AssistantText { text } => match capture.observe_text(&text) {
                    Observation::Nothing => {
                        debug!(review_id = %self.ctx.review_id, "{}", truncate_thinking(&text, 100));
                    }
                    Observation::AuthFailure(message) => {
                        return Err(ReviewerError::Authentication(message));
                    }
                    Observation::Captured(result) => {
                        if self.deliver(result).await {
                            return Ok(());
                        }
                    }
                },
                SessionMessage::ToolUse { description } => {
                    debug!(review_id = %self.ctx.review_id, "{}", description);
                }
                SessionMessage::ToolOutput { summary } => {
                    debug!(review_id = %self.ctx.review_id, "  -> {}", summary);
                }
                SessionMessage::PermissionRequest {
                    request_id,
                    tool_name,
                    input,
                } => {
                    let decision = policy.evaluate(&tool_name, &input);
                    match &decision {
                        PermissionDecision::Allow => {
                            debug!(review_id = %self.ctx.review_id, tool = %tool_name, "Tool allowed");
                        }
                        PermissionDecision::Deny(reason) => {
                            info!(review_id = %self.ctx.review_id, tool = %tool_name, reason = %reason, "Tool denied");
                        }
                    }
                    session
                        .respond_permission(&request_id, &input, &decision)
                        .await?;
                }
                SessionMessage::TurnResult {
                    is_error,
                    result,
                    cost_usd,
                    duration_ms,
                    session_id,
                } => {
                    if !session_id.is_empty() {
                        self.session_id = Some(session_id);
                    }
                    if let Some(cost) = cost_usd {
                        self.cost_usd = cost;
                    }
                    debug!(review_id = %self.ctx.review_id, ?duration_ms, ?cost_usd, "Turn finished");

                    match capture.finish_turn(result.as_deref(), is_error) {
                        TurnOutcome::AlreadyCaptured => {}
                        TurnOutcome::Captured(result) => {
                            if self.deliver(result).await {
                                return Ok(());
                            }
                        }
                        TurnOutcome::Failed(err) => return Err(err),
                    }

                    let Some(prompt) = self.await_followup(&mut diff).await? else {
                        return Ok(());
                    };
                    capture.begin_round();
                    session.send_prompt(&prompt).await?;
                    self.start_round();
                }
            }
        }
    }

    fn start_round(&mut self) {
        self.round_started_at = Utc::now();
        self.round_clock = Instant::now();
        self.link.round_started();
    }

    /// Persist and report a captured result. Returns true when the decision
    /// ends the review.
    async fn deliver(&mut self, result: ReviewerResult) -> bool {
        let terminal = result.decision.is_terminal();
        info!(
            review_id = %self.ctx.review_id,
            decision = result.decision.as_str(),
            issues = result.issues.len(),
            "Captured review result"
        );
        self.persist(&result).await;
        self.link.complete(Ok(result), terminal).await;
        terminal
    }

    /// Write the iteration and its issues. Failures are logged only; the
    /// decision is delivered regardless.
    async fn persist(&self, result: &ReviewerResult) {
        let iteration = NewIteration {
            reviewer_id: self.agent_name.clone(),
            session_id: self.session_id.clone(),
            decision: result.decision,
            summary: result.summary.clone(),
            files_reviewed: result.files_reviewed,
            lines_analyzed: result.lines_analyzed,
            duration_ms: u64::try_from(self.round_clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            cost_usd: self.cost_usd,
            started_at: self.round_started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let review_id = self.ctx.review_id.clone();
        let issues = result.issues.clone();
        match self
            .db
            .call(move |db| db.record_iteration(&review_id, &iteration, &issues))
            .await
        {
            Ok(saved) => info!(
                review_id = %self.ctx.review_id,
                iteration = saved.iteration_num,
                "Persisted review iteration"
            ),
            Err(e) => warn!(
                review_id = %self.ctx.review_id,
                error = %e,
                "Failed to persist review iteration"
            ),
        }
    }

    /// Poll for re-review mail until it arrives, the timeout passes or the
    /// worker is cancelled. Returns the follow-up prompt if mail arrived.
    async fn await_followup(
        &mut self,
        diff: &mut DiffCommand,
    ) -> Result<Option<String>, ReviewerError> {
        let cancel = self.cancel.clone();
        let deadline = tokio::time::sleep(self.settings.exit_poll_timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.settings.exit_poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            review_id = %self.ctx.review_id,
            timeout_secs = self.settings.exit_poll_timeout.as_secs(),
            "Waiting for re-review mail"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ReviewerError::Cancelled),
                _ = &mut deadline => {
                    info!(review_id = %self.ctx.review_id, "No re-review mail before timeout; letting the agent exit");
                    return Ok(None);
                }
                _ = ticker.tick() => {}
            }

            let Some(agent_id) = self.register_agent().await else {
                continue;
            };
            self.store_call("heartbeat", move |db| db.touch_agent(agent_id))
                .await;

            let limit = i64::from(self.settings.mail_batch_limit);
            let Some(messages) = self
                .store_call("mail check", move |db| db.get_unread_messages(agent_id, limit))
                .await
            else {
                continue;
            };
            if messages.is_empty() {
                continue;
            }

            for message in &messages {
                let message_id = message.id;
                self.store_call("mark read", move |db| {
                    db.mark_message_read(message_id, agent_id)
                })
                .await;
            }
            self.refresh_target(diff).await;

            info!(
                review_id = %self.ctx.review_id,
                count = messages.len(),
                "Re-review mail received; starting another round"
            );
            return Ok(Some(prompts::followup_prompt(&messages, diff)));
        }
    }

    /// Pick up a new commit or branch recorded by a resubmit.
    async fn refresh_target(&mut self, diff: &mut DiffCommand) {
        let review_id = self.ctx.review_id.clone();
        let Some(Some(review)) = self
            .store_call("review lookup", move |db| db.get_review(&review_id))
            .await
        else {
            return;
        };
        self.ctx.branch = review.branch;
        self.ctx.base_branch = review.base_branch;
        self.ctx.commit_sha = review.commit_sha;
        *diff = DiffCommand::for_context(&self.ctx);
    }

    async fn register_agent(&mut self) -> Option<i64> {
        if let Some(id) = self.agent_id {
            return Some(id);
        }
        let name = self.agent_name.clone();
        let agent = self
            .store_call("agent registration", move |db| db.ensure_agent(&name))
            .await?;
        debug!(review_id = %self.ctx.review_id, agent = %agent.name, agent_id = agent.id, "Registered agent identity");
        self.agent_id = Some(agent.id);
        Some(agent.id)
    }

    /// Store access bounded by the store timeout rather than the worker's
    /// cancellation, so calls in flight during shutdown finish or time out
    /// on their own.
    async fn store_call<F, R>(&self, what: &'static str, f: F) -> Option<R>
    where
        F: FnOnce(&ReviewDb) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match tokio::time::timeout(self.settings.store_timeout, self.db.call(f)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(review_id = %self.ctx.review_id, error = %e, "Store {} failed", what);
                None
            }
            Err(_) => {
                warn!(review_id = %self.ctx.review_id, "Store {} timed out", what);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviewer::testing::*;
    use crate::reviewer::{ReviewerSupervisor, WorkerReport};
    use crate::store::NewReview;
    use gatekeeper_common::Decision;
    use tokio::sync::mpsc;

    struct Harness {
        dir: tempfile::TempDir,
        db: DbHandle,
        launcher: Arc<ScriptedLauncher>,
        supervisor: ReviewerSupervisor,
        reports: mpsc::UnboundedReceiver<WorkerReport>,
        ctx: ReviewContext,
    }

    fn harness(poll_timeout: Duration) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = test_db();
        let review_id = seed_review(&db, dir.path());
        let launcher = Arc::new(ScriptedLauncher::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut settings = test_settings(dir.path());
        settings.exit_poll_timeout = poll_timeout;
        let supervisor = ReviewerSupervisor::new(
            launcher.clone(),
            db.clone(),
            PermissionPolicy::default(),
            settings,
            tx,
        );
        let ctx = test_context(&db, &review_id);
        Harness {
            dir,
            db,
            launcher,
            supervisor,
            reports: rx,
            ctx,
        }
    }

    #[tokio::test]
    async fn test_eager_approve_is_reported_and_persisted() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_script(vec![
            text("Let me run the diff."),
            text(&result_block("approve", "[]")),
            // Never reached: the session is closed after a terminal decision.
            Step::Hang,
        ]);
        assert!(h.supervisor.spawn_reviewer(h.ctx.clone()).await);

        assert!(matches!(next_report(&mut h.reports).await, WorkerReport::RoundStarted { .. }));
        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                assert_eq!(outcome.unwrap().decision, Decision::Approve)
            }
            other => panic!("unexpected report: {:?}", other),
        }
        // Entry is gone before the final report is observable.
        assert!(!h.supervisor.is_alive(&h.ctx.review_id).await);

        h.supervisor.stop_all(Duration::from_secs(2)).await;
        let iterations = h.db.lock_sync().unwrap().list_iterations(&h.ctx.review_id).unwrap();
        assert_eq!(iterations.len(), 1);
        assert_eq!(iterations[0].decision, Decision::Approve);

        let log = h.launcher.log();
        assert_eq!(log.prompts().len(), 1);
        assert!(log.prompts()[0].contains("git diff main...feature"));
        assert!(log.close_count() >= 1);
        let spec = &log.launches()[0];
        assert!(spec.config_dir.starts_with(&test_settings(h.dir.path()).config_root));
    }

    #[tokio::test]
    async fn test_request_changes_then_mail_starts_second_round() {
        let mut h = harness(Duration::from_secs(5));
        let issues = r#"[{"title": "Unchecked index", "type": "bug", "severity": "high", "file": "src/lib.rs", "line_start": 3}]"#;
        h.launcher.push_script(vec![
            text(&result_block("request_changes", issues)),
            turn_end(None),
            text(&result_block("approve", "[]")),
            turn_end(None),
        ]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;

        assert!(matches!(next_report(&mut h.reports).await, WorkerReport::RoundStarted { .. }));
        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                let result = outcome.unwrap();
                assert_eq!(result.decision, Decision::RequestChanges);
                assert_eq!(result.issues.len(), 1);
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(h.supervisor.is_alive(&h.ctx.review_id).await);

        let agent = h.supervisor.agent_name(&h.ctx.review_id).await.unwrap();
        h.db.call(move |db| {
            db.deliver_mail("alice", &agent, None, "Re-review requested", "Fixed it.")
        })
        .await
        .unwrap();

        assert!(matches!(next_report(&mut h.reports).await, WorkerReport::RoundStarted { .. }));
        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                assert_eq!(outcome.unwrap().decision, Decision::Approve)
            }
            other => panic!("unexpected report: {:?}", other),
        }

        let prompts = h.launcher.log().prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Fixed it."));
        assert!(prompts[1].contains("git diff main...feature"));

        h.supervisor.stop_all(Duration::from_secs(2)).await;
        let db = h.db.lock_sync().unwrap();
        let iterations = db.list_iterations(&h.ctx.review_id).unwrap();
        assert_eq!(iterations.len(), 2);
        assert_eq!(iterations[1].iteration_num, 2);
        assert_eq!(db.list_issues(&h.ctx.review_id, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_timeout_lets_worker_exit_quietly() {
        let mut h = harness(Duration::from_millis(100));
        h.launcher.push_script(vec![
            text(&result_block("request_changes", "[]")),
            turn_end(None),
        ]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;
        next_report(&mut h.reports).await;
        next_report(&mut h.reports).await;

        wait_until_released(&h.supervisor, &h.ctx.review_id).await;
        assert!(no_report(&mut h.reports).await);
    }

    #[tokio::test]
    async fn test_stream_end_without_result_is_empty_result() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_script(vec![text("I could not find a diff.")]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;

        next_report(&mut h.reports).await;
        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                assert!(matches!(outcome, Err(ReviewerError::EmptyResult)))
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(!h.supervisor.is_alive(&h.ctx.review_id).await);
    }

    #[tokio::test]
    async fn test_auth_failure_is_fatal_error() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_script(vec![
            text("Invalid API key · Please run /login"),
            Step::Hang,
        ]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;

        next_report(&mut h.reports).await;
        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome: Err(err), .. } => assert!(err.is_fatal()),
            other => panic!("unexpected report: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permission_requests_are_answered_by_policy() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_script(vec![
            permission("r1", "Bash", serde_json::json!({"command": "git diff main...feature"})),
            permission("r2", "Bash", serde_json::json!({"command": "git log; rm -rf /"})),
            permission("r3", "Edit", serde_json::json!({"file_path": "/repo/src/lib.rs"})),
            text(&result_block("approve", "[]")),
        ]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;
        next_report(&mut h.reports).await;
        next_report(&mut h.reports).await;

        let answers = h.launcher.log().permissions();
        assert_eq!(answers.len(), 3);
        assert_eq!(answers[0], ("r1".to_string(), PermissionDecision::Allow));
        assert!(!answers[1].1.is_allowed());
        assert!(!answers[2].1.is_allowed());
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_failure("claude: command not found");
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;

        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                assert!(matches!(outcome, Err(ReviewerError::Connect(_))))
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(!h.supervisor.is_alive(&h.ctx.review_id).await);
    }

    #[tokio::test]
    async fn test_missing_repository_is_setup_error() {
        let mut h = harness(Duration::from_secs(5));
        let mut ctx = h.ctx.clone();
        ctx.repo_path = h.dir.path().join("does-not-exist");
        h.supervisor.spawn_reviewer(ctx).await;

        match next_report(&mut h.reports).await {
            WorkerReport::RoundCompleted { outcome, .. } => {
                assert!(matches!(outcome, Err(ReviewerError::Setup(_))))
            }
            other => panic!("unexpected report: {:?}", other),
        }
        assert!(h.launcher.log().launches().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_a_hung_session_without_report() {
        let mut h = harness(Duration::from_secs(5));
        h.launcher.push_script(vec![Step::Hang]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;
        next_report(&mut h.reports).await;

        assert!(h.supervisor.stop_reviewer(&h.ctx.review_id).await);
        assert!(!h.supervisor.is_alive(&h.ctx.review_id).await);
        h.supervisor.stop_all(Duration::from_secs(2)).await;

        assert!(no_report(&mut h.reports).await);
        assert!(h.launcher.log().close_count() >= 1);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_mail_exits_promptly() {
        let mut h = harness(Duration::from_secs(60));
        h.launcher.push_script(vec![
            text(&result_block("request_changes", "[]")),
            turn_end(None),
        ]);
        h.supervisor.spawn_reviewer(h.ctx.clone()).await;
        next_report(&mut h.reports).await;
        next_report(&mut h.reports).await;
        // Let the worker reach the mail poll loop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.supervisor.is_alive(&h.ctx.review_id).await);

        let started = Instant::now();
        assert!(h.supervisor.stop_reviewer(&h.ctx.review_id).await);
        h.supervisor.stop_all(Duration::from_secs(30)).await;
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "worker took {:?} to stop",
            started.elapsed()
        );

        assert!(no_report(&mut h.reports).await);
        assert!(h.launcher.log().close_count() >= 1);
    }

    #[tokio::test]
    async fn test_resubmitted_commit_changes_followup_diff() {
        let mut h = harness(Duration::from_secs(5));
        let review_id = seed_review_with(
            &h.db,
            NewReview {
                requester_id: "alice".into(),
                commit_sha: Some("aaa111".into()),
                repo_path: h.dir.path().to_string_lossy().into_owned(),
                review_type: "full".into(),
                ..NewReview::default()
            },
        );
        let ctx = test_context(&h.db, &review_id);
        h.launcher.push_script(vec![
            text(&result_block("request_changes", "[]")),
            turn_end(None),
            text(&result_block("approve", "[]")),
        ]);
        h.supervisor.spawn_reviewer(ctx.clone()).await;
        next_report(&mut h.reports).await;
        next_report(&mut h.reports).await;

        let review_id = ctx.review_id.clone();
        let agent = h.supervisor.agent_name(&review_id).await.unwrap();
        h.db.call(move |db| {
            db.update_review_commit(&review_id, "bbb222")?;
            db.deliver_mail("alice", &agent, None, "Re-review requested", "")
        })
        .await
        .unwrap();

        next_report(&mut h.reports).await;
        next_report(&mut h.reports).await;
        let prompts = h.launcher.log().prompts();
        assert!(prompts[0].contains("git show aaa111"));
        assert!(prompts[1].contains("git show bbb222"));
    }
}
