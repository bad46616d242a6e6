//! Review lifecycle commands: request, resubmit, cancel, retry, delete, diff.

use anyhow::Result;
use console::style;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

use gatekeeper::fsm::ReviewState;
use gatekeeper::notify::NotifyMessage;
use gatekeeper::service::CreateReview;
use gatekeeper::store::Priority;

use super::App;
use super::query::{print_review_summary, styled_state};

/// How long to keep listening after a reviewer failure, in case it turns
/// into a cancellation.
const FAILURE_SETTLE: Duration = Duration::from_secs(2);

pub struct ReviewRequest<'a> {
    pub repo: PathBuf,
    pub branch: Option<String>,
    pub base: Option<String>,
    pub commit: Option<String>,
    pub review_type: Option<String>,
    pub priority: &'a str,
    pub requester: &'a str,
    pub thread: Option<String>,
}

pub async fn cmd_review(app: &App, request: ReviewRequest<'_>, wait: bool) -> Result<()> {
    let priority: Priority = request.priority.parse().map_err(anyhow::Error::msg)?;
    let events = app.service.subscribe();

    let review = app
        .service
        .create_review(CreateReview {
            requester_id: request.requester.to_string(),
            repo_path: request.repo,
            branch: request.branch,
            base_branch: request.base,
            commit_sha: request.commit,
            review_type: request.review_type,
            priority,
            thread_id: request.thread,
        })
        .await?;

    println!(
        "Review {} created ({})",
        style(&review.id).bold(),
        styled_state(review.state)
    );

    if wait {
        wait_for_review(app, &review.id, events).await
    } else {
        detached_hint(&review.id);
        Ok(())
    }
}

pub async fn cmd_resubmit(
    app: &App,
    review_id: &str,
    commit: Option<String>,
    wait: bool,
) -> Result<()> {
    let events = app.service.subscribe();
    let state = app.service.resubmit(review_id, commit).await?;
    println!("Review {} resubmitted ({})", review_id, styled_state(state));

    if wait {
        wait_for_review(app, review_id, events).await
    } else {
        detached_hint(review_id);
        Ok(())
    }
}

pub async fn cmd_cancel(app: &App, review_id: &str, reason: &str) -> Result<()> {
    let state = app.service.cancel(review_id, reason).await?;
    println!("Review {} {}", review_id, styled_state(state));
    Ok(())
}

pub async fn cmd_retry(app: &App, review_id: &str, wait: bool) -> Result<()> {
    let events = app.service.subscribe();
    let state = app.service.retry(review_id).await?;
    println!(
        "Started a new reviewer for {} ({})",
        review_id,
        styled_state(state)
    );

    if wait {
        wait_for_review(app, review_id, events).await
    } else {
        detached_hint(review_id);
        Ok(())
    }
}

pub async fn cmd_delete(app: &App, review_id: &str) -> Result<()> {
    app.service.delete_review(review_id).await?;
    println!("Deleted review {}", review_id);
    Ok(())
}

pub async fn cmd_diff(app: &App, review_id: &str) -> Result<()> {
    let diff = app.service.review_diff(review_id).await?;
    print!("{}", diff);
    Ok(())
}

fn detached_hint(review_id: &str) {
    println!(
        "{}",
        style(format!(
            "The reviewer stops when this command exits. Run `gatekeeper retry {} --wait` to stay attached.",
            review_id
        ))
        .dim()
    );
}

/// Print the review's transitions until it settles: a terminal state,
/// changes requested, or a reviewer failure that is not followed by
/// anything else.
async fn wait_for_review(
    app: &App,
    review_id: &str,
    mut events: broadcast::Receiver<String>,
) -> Result<()> {
    println!(
        "{}",
        style(format!("Waiting for review {} (Ctrl-C to detach)", review_id)).dim()
    );

    let mut failed = false;
    loop {
        let settle = async {
            if failed {
                tokio::time::sleep(FAILURE_SETTLE).await
            } else {
                std::future::pending::<()>().await
            }
        };
        let received = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Detached from review {}", review_id);
                return Ok(());
            }
            _ = settle => break,
            received = events.recv() => received,
        };

        let raw = match received {
            Ok(raw) => raw,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed state notifications");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Ok(message) = serde_json::from_str::<NotifyMessage>(&raw) else {
            continue;
        };
        if message.review_id() != review_id {
            continue;
        }

        match message {
            NotifyMessage::StateChanged {
                old_state,
                new_state,
                ..
            } => {
                println!(
                    "  {} {} {}",
                    styled_state(old_state),
                    style("→").dim(),
                    styled_state(new_state)
                );
                if new_state.is_terminal() || new_state == ReviewState::ChangesRequested {
                    break;
                }
            }
            NotifyMessage::ReviewerFailed { error, .. } => {
                println!("  {} {}", style("Reviewer failed:").red().bold(), error);
                failed = true;
            }
        }
    }

    println!();
    print_review_summary(app, review_id).await
}
