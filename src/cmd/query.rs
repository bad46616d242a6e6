//! Read-side commands: list, show, issues, resolve-issue.

use anyhow::Result;
use console::{StyledObject, style};

use gatekeeper::fsm::ReviewState;
use gatekeeper::store::{Review, ReviewFilter, ReviewIssue};
use gatekeeper_common::{IssueStatus, Severity};

use super::App;

pub fn styled_state(state: ReviewState) -> StyledObject<&'static str> {
    let s = style(state.as_str());
    match state {
        ReviewState::Approved => s.green().bold(),
        ReviewState::ChangesRequested => s.yellow().bold(),
        ReviewState::Rejected | ReviewState::Cancelled => s.red().bold(),
        _ => s.cyan(),
    }
}

fn styled_severity(severity: Severity) -> StyledObject<&'static str> {
    let s = style(severity.as_str());
    match severity {
        Severity::Critical | Severity::High => s.red(),
        Severity::Medium => s.yellow(),
        _ => s.dim(),
    }
}

fn target(review: &Review) -> String {
    match (&review.branch, &review.base_branch, &review.commit_sha) {
        (Some(branch), Some(base), _) => format!("{} → {}", branch, base),
        (Some(branch), None, _) => branch.clone(),
        (None, _, Some(sha)) => sha.chars().take(12).collect(),
        _ => "HEAD".to_string(),
    }
}

pub async fn cmd_list(
    app: &App,
    state: Option<&str>,
    requester: Option<String>,
    limit: i64,
) -> Result<()> {
    let state = state
        .map(|s| s.parse::<ReviewState>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let reviews = app
        .service
        .list_reviews(ReviewFilter {
            state,
            requester_id: requester,
            limit: Some(limit),
            offset: None,
        })
        .await?;

    if reviews.is_empty() {
        println!("No reviews found.");
        return Ok(());
    }

    println!(
        "{:<38} {:<18} {:<9} {:<12} Target",
        "Review", "State", "Priority", "Requester"
    );
    println!(
        "{:<38} {:<18} {:<9} {:<12} ------",
        "-".repeat(36),
        "-----",
        "--------",
        "---------"
    );
    for review in &reviews {
        println!(
            "{:<38} {:<18} {:<9} {:<12} {}",
            review.id,
            styled_state(review.state),
            review.priority.as_str(),
            review.requester_id,
            target(review)
        );
    }
    Ok(())
}

pub async fn cmd_show(app: &App, review_id: &str) -> Result<()> {
    let review = app.service.get_review(review_id).await?;

    println!();
    println!("{}", style(format!("Review {}", review.id)).bold().cyan());
    println!("  State:      {}", styled_state(review.state));
    println!("  Requester:  {}", review.requester_id);
    println!("  Repository: {}", review.repo_path);
    println!("  Target:     {}", target(&review));
    if let Some(sha) = &review.commit_sha {
        println!("  Commit:     {}", sha);
    }
    println!("  Type:       {}", review.review_type);
    println!("  Priority:   {}", review.priority.as_str());
    println!("  Thread:     {}", review.thread_id);
    println!("  Created:    {}", review.created_at);
    if let Some(completed) = &review.completed_at {
        println!("  Completed:  {}", completed);
    }

    let iterations = app.service.list_iterations(review_id).await?;
    if !iterations.is_empty() {
        println!();
        println!("{}", style("Iterations").bold());
        for it in &iterations {
            println!(
                "  #{} {} by {} ({} files, {:.1}s, ${:.4})",
                it.iteration_num,
                it.decision,
                it.reviewer_id,
                it.files_reviewed,
                it.duration_ms as f64 / 1000.0,
                it.cost_usd
            );
            if !it.summary.is_empty() {
                println!("     {}", style(&it.summary).dim());
            }
        }
    }

    let issues = app.service.list_issues(review_id, None).await?;
    if !issues.is_empty() {
        println!();
        println!("{}", style("Issues").bold());
        print_issues(&issues);
    }

    let activities = app.service.list_activities(review_id).await?;
    if !activities.is_empty() {
        println!();
        println!("{}", style("Activity").bold());
        for activity in &activities {
            println!(
                "  {} {:<18} {}",
                style(&activity.created_at).dim(),
                activity.kind,
                activity.description
            );
        }
    }
    println!();
    Ok(())
}

pub async fn cmd_issues(app: &App, review_id: &str, status: Option<&str>) -> Result<()> {
    let status = status
        .map(|s| s.parse::<IssueStatus>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let issues = app.service.list_issues(review_id, status).await?;
    if issues.is_empty() {
        println!("No issues.");
    } else {
        print_issues(&issues);
    }
    Ok(())
}

pub async fn cmd_resolve_issue(app: &App, issue_id: i64, reopen: bool) -> Result<()> {
    let status = if reopen {
        IssueStatus::Open
    } else {
        IssueStatus::Resolved
    };
    let issue = app.service.update_issue_status(issue_id, status).await?;
    println!("Issue {} is now {}: {}", issue.id, issue.status, issue.title);
    Ok(())
}

fn print_issues(issues: &[ReviewIssue]) {
    for issue in issues {
        let location = match issue.line_end {
            Some(end) if end != issue.line_start => {
                format!("{}:{}-{}", issue.file_path, issue.line_start, end)
            }
            _ => format!("{}:{}", issue.file_path, issue.line_start),
        };
        let status = match issue.status {
            IssueStatus::Open => style(issue.status.as_str()),
            IssueStatus::Resolved => style(issue.status.as_str()).green(),
        };
        println!(
            "  [{}] {:<8} {:<14} {} ({}, {})",
            issue.id,
            styled_severity(issue.severity),
            issue.issue_type,
            issue.title,
            location,
            status
        );
        if !issue.suggestion.is_empty() {
            println!("       {} {}", style("→").dim(), issue.suggestion);
        }
    }
}

/// Final state and open issues, printed after waiting on a review.
pub async fn print_review_summary(app: &App, review_id: &str) -> Result<()> {
    let review = app.service.get_review(review_id).await?;
    println!("Review {} is {}", review.id, styled_state(review.state));

    let open = app
        .service
        .list_issues(review_id, Some(IssueStatus::Open))
        .await?;
    if !open.is_empty() {
        println!();
        println!("{} open issue(s):", open.len());
        print_issues(&open);
    }
    if let Some(last) = app.service.list_iterations(review_id).await?.last()
        && !last.summary.is_empty()
    {
        println!();
        println!("{}", last.summary);
    }
    Ok(())
}
