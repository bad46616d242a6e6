//! Worker reports re-entering the dispatcher.

use gatekeeper_common::Decision;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::ReviewService;
use crate::errors::{ReviewerError, ServiceError};
use crate::fsm::{ActivityKind, ReviewEvent, ReviewState};
use crate::reviewer::WorkerReport;

impl ReviewService {
    pub(super) fn spawn_report_loop(&self, mut reports: mpsc::UnboundedReceiver<WorkerReport>) {
        let service = self.clone();
        let shutdown = self.inner.shutdown.clone();
        self.inner.tasks.spawn(async move {
            loop {
                let report = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    report = reports.recv() => match report {
                        Some(report) => report,
                        None => break,
                    },
                };
                let review_id = report.review_id().to_string();
                if let Err(e) = service.handle_report(report).await {
                    warn!(review_id = %review_id, error = %e, "Failed to apply worker report");
                }
            }
            debug!("Report loop stopped");
        });
    }

    /// Turn a worker report into FSM events.
    pub(crate) async fn handle_report(&self, report: WorkerReport) -> Result<(), ServiceError> {
        match report {
            WorkerReport::RoundStarted {
                review_id,
                reviewer_id,
            } => {
                let state = self.current_state(&review_id).await?;
                if matches!(state, ReviewState::PendingReview | ReviewState::ReReview) {
                    self.process_event(&review_id, ReviewEvent::StartReview { reviewer_id })
                        .await?;
                } else {
                    debug!(review_id = %review_id, state = %state, "Round started; no transition needed");
                }
                Ok(())
            }
            WorkerReport::RoundCompleted {
                review_id,
                reviewer_id,
                outcome: Ok(result),
            } => {
                let event = match result.decision {
                    Decision::Approve => ReviewEvent::Approve { reviewer_id },
                    Decision::RequestChanges => ReviewEvent::RequestChanges {
                        reviewer_id,
                        issues: result.issues,
                    },
                    Decision::Reject => ReviewEvent::Reject {
                        reviewer_id,
                        reason: result.summary,
                    },
                };
                self.process_event(&review_id, event).await?;
                Ok(())
            }
            WorkerReport::RoundCompleted {
                review_id,
                outcome: Err(err),
                ..
            } => self.handle_reviewer_failure(&review_id, err).await,
        }
    }

    /// Fatal failures cancel the review. Anything else is recorded and the
    /// review stays where it is so it can be retried.
    ///
    /// "Where it is" depends on how far the worker got: a round that started
    /// leaves the review `UnderReview`, while a setup, launch or connect
    /// failure happens before `RoundStarted` and leaves it `PendingReview`
    /// (or `ReReview`). `retry` accepts all three.
    async fn handle_reviewer_failure(
        &self,
        review_id: &str,
        err: ReviewerError,
    ) -> Result<(), ServiceError> {
        let message = err.to_string();
        self.inner.notifier.reviewer_failed(review_id, &message);

        if err.is_fatal() {
            warn!(review_id = %review_id, error = %message, "Fatal reviewer failure; cancelling review");
            self.process_event(
                review_id,
                ReviewEvent::Cancel {
                    reason: message,
                },
            )
            .await?;
            return Ok(());
        }

        info!(review_id = %review_id, error = %message, "Reviewer failed; review left for retry");
        let id = review_id.to_string();
        self.db(move |db| db.create_activity(&id, ActivityKind::ReviewerFailed, &message))
            .await?;
        Ok(())
    }
}
