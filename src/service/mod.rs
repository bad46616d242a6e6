//! The review service: outbox dispatcher plus administrative operations.
//!
//! Holds the in-memory registry `review_id -> ReviewFsm`. Every state change
//! goes through [`ReviewService::process_event`], which feeds the FSM and then
//! interprets the returned outbox in order ([`dispatch`]). Worker reports
//! re-enter the same path from a background loop ([`reports`]).

mod admin;
mod dispatch;
mod reports;

pub use admin::CreateReview;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gatekeeper_common::ReviewerConfig;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::GatekeeperToml;
use crate::errors::ServiceError;
use crate::fsm::{ReviewEnv, ReviewEvent, ReviewFsm, ReviewState};
use crate::notify::StateNotifier;
use crate::permissions::PermissionPolicy;
use crate::reviewer::{ReviewerSupervisor, SessionLauncher, WorkerSettings};
use crate::store::{DbHandle, ReviewDb};

/// Tunables for a [`ReviewService`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub reviewer: ReviewerConfig,
    pub policy: PermissionPolicy,
    pub worker: WorkerSettings,
    pub sweep_interval: Duration,
    pub terminal_max_age: Duration,
}

impl ServiceOptions {
    pub fn from_config(toml: &GatekeeperToml) -> Self {
        Self {
            reviewer: toml.reviewer.clone(),
            policy: toml.permissions.policy(),
            worker: WorkerSettings::from_config(toml),
            sweep_interval: toml.service.sweep_interval(),
            terminal_max_age: toml.service.terminal_max_age(),
        }
    }
}

type FsmRegistry = RwLock<HashMap<String, Arc<Mutex<ReviewFsm>>>>;

struct ServiceInner {
    db: DbHandle,
    notifier: StateNotifier,
    supervisor: ReviewerSupervisor,
    options: ServiceOptions,
    registry: FsmRegistry,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

#[derive(Clone)]
pub struct ReviewService {
    inner: Arc<ServiceInner>,
}

impl ReviewService {
    /// Build the service and start its report loop and sweeper. Must be
    /// called inside a tokio runtime.
    pub fn start(
        db: DbHandle,
        notifier: StateNotifier,
        launcher: Arc<dyn SessionLauncher>,
        options: ServiceOptions,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let supervisor = ReviewerSupervisor::new(
            launcher,
            db.clone(),
            options.policy.clone(),
            options.worker.clone(),
            report_tx,
        );
        let service = Self {
            inner: Arc::new(ServiceInner {
                db,
                notifier,
                supervisor,
                options,
                registry: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        };
        service.spawn_report_loop(report_rx);
        service.spawn_sweeper();
        service
    }

    pub fn supervisor(&self) -> &ReviewerSupervisor {
        &self.inner.supervisor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.notifier.subscribe()
    }

    /// Feed `event` to the review's FSM and dispatch the resulting outbox.
    /// Calls for one review are serialized on that review's FSM lock.
    pub async fn process_event(
        &self,
        review_id: &str,
        event: ReviewEvent,
    ) -> Result<ReviewState, ServiceError> {
        let handle = self.resolve(review_id).await?;
        let mut fsm = handle.lock().await;

        let old_state = fsm.state();
        let outbox = fsm.process(&event)?;
        let new_state = fsm.state();
        let env = fsm.env().clone();
        info!(
            review_id = %review_id,
            event = event.name(),
            from = %old_state,
            to = %new_state,
            "Review transition"
        );

        if let Err(e) = self.dispatch(&env, outbox).await {
            // The in-memory state may now be ahead of the store; reload it
            // next time.
            warn!(review_id = %review_id, error = %e, "Outbox dispatch failed; evicting FSM");
            drop(fsm);
            self.evict(review_id).await;
            return Err(e);
        }

        if new_state.is_terminal() {
            drop(fsm);
            self.evict(review_id).await;
            self.inner.supervisor.stop_reviewer(review_id).await;
        }
        Ok(new_state)
    }

    /// Current state, from memory if the review is active or from the store
    /// otherwise.
    pub async fn current_state(&self, review_id: &str) -> Result<ReviewState, ServiceError> {
        let handle = self.resolve(review_id).await?;
        let state = handle.lock().await.state();
        Ok(state)
    }

    /// Look up the review's FSM, rebuilding it from the store if it is not
    /// in memory.
    async fn resolve(&self, review_id: &str) -> Result<Arc<Mutex<ReviewFsm>>, ServiceError> {
        if let Some(handle) = self.inner.registry.read().await.get(review_id) {
            return Ok(Arc::clone(handle));
        }

        let id = review_id.to_string();
        let review = self
            .db(move |db| db.get_review(&id))
            .await?
            .ok_or_else(|| ServiceError::ReviewNotFound {
                id: review_id.to_string(),
            })?;
        debug!(review_id = %review_id, state = %review.state, "Restoring FSM from store");
        let fsm = ReviewFsm::restore(
            ReviewEnv {
                review_id: review.id.clone(),
                thread_id: review.thread_id,
                repo_path: review.repo_path,
                requester_id: review.requester_id,
            },
            review.state,
        );

        let mut registry = self.inner.registry.write().await;
        let handle = registry
            .entry(review.id)
            .or_insert_with(|| Arc::new(Mutex::new(fsm)));
        Ok(Arc::clone(handle))
    }

    async fn evict(&self, review_id: &str) {
        if self.inner.registry.write().await.remove(review_id).is_some() {
            debug!(review_id = %review_id, "Evicted FSM from registry");
        }
    }

    /// Number of FSMs held in memory.
    pub async fn active_count(&self) -> usize {
        self.inner.registry.read().await.len()
    }

    /// Drop terminal FSMs idle for longer than `max_age`. FSMs in use are
    /// skipped. Returns how many were evicted.
    pub async fn sweep_terminal(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let mut registry = self.inner.registry.write().await;
        let before = registry.len();
        registry.retain(|_, handle| match handle.try_lock() {
            Ok(fsm) => !(fsm.state().is_terminal() && fsm.updated_at() <= cutoff),
            Err(_) => true,
        });
        let evicted = before - registry.len();
        if evicted > 0 {
            info!(count = evicted, "Swept terminal reviews from registry");
        }
        evicted
    }

    fn spawn_sweeper(&self) {
        let service = self.clone();
        let interval = self.inner.options.sweep_interval.max(Duration::from_secs(1));
        let max_age = self.inner.options.terminal_max_age;
        let shutdown = self.inner.shutdown.clone();
        self.inner.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        service.sweep_terminal(max_age).await;
                    }
                }
            }
        });
    }

    /// Stop all reviewers, then the background loops. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        info!("Shutting down review service");
        let grace = self.inner.options.worker.shutdown_grace + Duration::from_secs(1);
        self.inner.supervisor.stop_all(grace).await;
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        if tokio::time::timeout(grace, self.inner.tasks.wait()).await.is_err() {
            warn!("Service tasks did not stop within the grace period");
        }
    }

    /// Store access with errors mapped to [`ServiceError::Database`].
    async fn db<F, R>(&self, f: F) -> Result<R, ServiceError>
    where
        F: FnOnce(&ReviewDb) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.inner.db.call(f).await.map_err(ServiceError::Database)
    }
}
