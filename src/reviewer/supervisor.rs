//! Supervisor for reviewer workers.
//!
//! Tracks `review_id -> worker` and is the only guard against running two
//! workers for the same review. Workers run on a [`TaskTracker`] so shutdown
//! can wait for every agent process to be torn down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gatekeeper_common::ReviewerResult;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::SessionLauncher;
use super::worker::ReviewerWorker;
use super::{ReviewContext, WorkerReport, WorkerSettings};
use crate::errors::ReviewerError;
use crate::permissions::PermissionPolicy;
use crate::store::DbHandle;

struct WorkerEntry {
    worker_id: Uuid,
    agent_name: String,
    cancel: CancellationToken,
}

type WorkerMap = Arc<Mutex<HashMap<String, WorkerEntry>>>;

pub struct ReviewerSupervisor {
    workers: WorkerMap,
    launcher: Arc<dyn SessionLauncher>,
    db: DbHandle,
    policy: PermissionPolicy,
    settings: WorkerSettings,
    reports: mpsc::UnboundedSender<WorkerReport>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl ReviewerSupervisor {
    pub fn new(
        launcher: Arc<dyn SessionLauncher>,
        db: DbHandle,
        policy: PermissionPolicy,
        settings: WorkerSettings,
        reports: mpsc::UnboundedSender<WorkerReport>,
    ) -> Self {
        Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
            launcher,
            db,
            policy,
            settings,
            reports,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Start a worker for the review unless one is already registered.
    /// Returns whether a worker was started.
    pub async fn spawn_reviewer(&self, ctx: ReviewContext) -> bool {
        let mut workers = self.workers.lock().await;
        if let Some(existing) = workers.get(&ctx.review_id) {
            info!(
                review_id = %ctx.review_id,
                agent = %existing.agent_name,
                "Reviewer already running; ignoring spawn request"
            );
            return false;
        }
        if self.shutdown.is_cancelled() {
            warn!(review_id = %ctx.review_id, "Supervisor is shutting down; not spawning reviewer");
            return false;
        }

        let worker_id = Uuid::new_v4();
        let agent_name = format!(
            "reviewer-{}-{}",
            ctx.reviewer.persona().as_str(),
            &worker_id.simple().to_string()[..12]
        );
        let cancel = self.shutdown.child_token();
        workers.insert(
            ctx.review_id.clone(),
            WorkerEntry {
                worker_id,
                agent_name: agent_name.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(workers);

        info!(review_id = %ctx.review_id, agent = %agent_name, "Spawning reviewer");

        let link = WorkerLink {
            review_id: ctx.review_id.clone(),
            worker_id,
            agent_name: agent_name.clone(),
            workers: Arc::clone(&self.workers),
            reports: self.reports.clone(),
        };
        let worker = ReviewerWorker::new(
            ctx,
            agent_name,
            Arc::clone(&self.launcher),
            self.db.clone(),
            self.policy.clone(),
            self.settings.clone(),
            link,
            cancel,
        );
        self.tracker.spawn(worker.run());
        true
    }

    /// Whether a worker is registered for the review.
    pub async fn is_alive(&self, review_id: &str) -> bool {
        self.workers.lock().await.contains_key(review_id)
    }

    /// Agent identity of the review's live worker, used to address mail.
    pub async fn agent_name(&self, review_id: &str) -> Option<String> {
        self.workers
            .lock()
            .await
            .get(review_id)
            .map(|entry| entry.agent_name.clone())
    }

    pub async fn active_reviews(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancel the review's worker, if any. Returns whether one was running.
    /// Safe to call repeatedly.
    pub async fn stop_reviewer(&self, review_id: &str) -> bool {
        match self.workers.lock().await.remove(review_id) {
            Some(entry) => {
                info!(review_id = %review_id, agent = %entry.agent_name, "Stopping reviewer");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every worker and wait up to `grace` for them to finish.
    /// Safe to call repeatedly.
    pub async fn stop_all(&self, grace: Duration) {
        self.shutdown.cancel();
        self.tracker.close();
        let stopped = {
            let mut workers = self.workers.lock().await;
            let count = workers.len();
            workers.clear();
            count
        };
        if stopped > 0 {
            info!(count = stopped, "Stopping all reviewers");
        }
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                "Reviewers did not stop within the grace period"
            );
        }
    }
}

/// A worker's handle back to its supervisor.
pub(crate) struct WorkerLink {
    review_id: String,
    worker_id: Uuid,
    agent_name: String,
    workers: WorkerMap,
    reports: mpsc::UnboundedSender<WorkerReport>,
}

impl WorkerLink {
    pub fn round_started(&self) {
        self.send(WorkerReport::RoundStarted {
            review_id: self.review_id.clone(),
            reviewer_id: self.agent_name.clone(),
        });
    }

    /// Report a round's outcome. A final outcome deregisters the worker
    /// first, so the review never looks active once the report is out.
    pub async fn complete(&self, outcome: Result<ReviewerResult, ReviewerError>, is_final: bool) {
        if is_final {
            self.release().await;
        }
        self.send(WorkerReport::RoundCompleted {
            review_id: self.review_id.clone(),
            reviewer_id: self.agent_name.clone(),
            outcome,
        });
    }

    /// Remove this worker's entry, unless it was already replaced or
    /// stopped.
    pub async fn release(&self) {
        let mut workers = self.workers.lock().await;
        if workers
            .get(&self.review_id)
            .is_some_and(|entry| entry.worker_id == self.worker_id)
        {
            workers.remove(&self.review_id);
        }
    }

    fn send(&self, report: WorkerReport) {
        if self.reports.send(report).is_err() {
            debug!(review_id = %self.review_id, "Report channel closed; dropping worker report");
        }
    }
}
