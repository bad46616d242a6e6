use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use gatekeeper_common::{IssueStatus, ResultIssue};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::models::*;
use crate::fsm::{ActivityKind, ReviewState};

/// Async-safe handle to the review database.
///
/// Wraps `ReviewDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ReviewDb>>,
}

impl DbHandle {
    pub fn new(db: ReviewDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ReviewDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests;
    /// never call this from an async hot path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, ReviewDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct ReviewDb {
    conn: Connection,
}

const REVIEW_COLUMNS: &str = "id, thread_id, requester_id, branch, base_branch, commit_sha, repo_path, review_type, priority, state, created_at, updated_at, completed_at";

const ITERATION_COLUMNS: &str = "id, review_id, iteration_num, reviewer_id, session_id, decision, summary, files_reviewed, lines_analyzed, duration_ms, cost_usd, started_at, completed_at";

const ISSUE_COLUMNS: &str = "id, review_id, iteration_num, issue_type, severity, file_path, line_start, line_end, title, description, code_snippet, suggestion, rule_citation, status, created_at";

impl ReviewDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Run raw SQL against the connection (for testing).
    #[cfg(test)]
    pub(crate) fn execute_sql(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).context("Failed to execute SQL")
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure connection")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS reviews (
                    id TEXT PRIMARY KEY,
                    thread_id TEXT NOT NULL,
                    requester_id TEXT NOT NULL,
                    branch TEXT,
                    base_branch TEXT,
                    commit_sha TEXT,
                    repo_path TEXT NOT NULL,
                    review_type TEXT NOT NULL DEFAULT 'full',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    state TEXT NOT NULL DEFAULT 'new',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS review_iterations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    review_id TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                    iteration_num INTEGER NOT NULL,
                    reviewer_id TEXT NOT NULL,
                    session_id TEXT,
                    decision TEXT NOT NULL,
                    summary TEXT NOT NULL DEFAULT '',
                    files_reviewed INTEGER NOT NULL DEFAULT 0,
                    lines_analyzed INTEGER NOT NULL DEFAULT 0,
                    duration_ms INTEGER NOT NULL DEFAULT 0,
                    cost_usd REAL NOT NULL DEFAULT 0,
                    started_at TEXT NOT NULL,
                    completed_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(review_id, iteration_num)
                );

                CREATE TABLE IF NOT EXISTS review_issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    review_id TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                    iteration_num INTEGER NOT NULL,
                    issue_type TEXT NOT NULL DEFAULT 'other',
                    severity TEXT NOT NULL DEFAULT 'medium',
                    file_path TEXT NOT NULL DEFAULT '',
                    line_start INTEGER NOT NULL DEFAULT 0,
                    line_end INTEGER,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    code_snippet TEXT NOT NULL DEFAULT '',
                    suggestion TEXT NOT NULL DEFAULT '',
                    rule_citation TEXT,
                    status TEXT NOT NULL DEFAULT 'open',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    FOREIGN KEY (review_id, iteration_num)
                        REFERENCES review_iterations(review_id, iteration_num) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS activities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    review_id TEXT NOT NULL REFERENCES reviews(id) ON DELETE CASCADE,
                    kind TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS agents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    last_seen_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    sender TEXT NOT NULL,
                    thread_id TEXT,
                    subject TEXT NOT NULL DEFAULT '',
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS message_recipients (
                    message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                    agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                    read_at TEXT,
                    PRIMARY KEY (message_id, agent_id)
                );

                CREATE INDEX IF NOT EXISTS idx_reviews_state ON reviews(state);
                CREATE INDEX IF NOT EXISTS idx_reviews_requester ON reviews(requester_id);
                CREATE INDEX IF NOT EXISTS idx_iterations_review ON review_iterations(review_id);
                CREATE INDEX IF NOT EXISTS idx_issues_review ON review_issues(review_id);
                CREATE INDEX IF NOT EXISTS idx_activities_review ON activities(review_id);
                CREATE INDEX IF NOT EXISTS idx_recipients_unread ON message_recipients(agent_id, read_at);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Reviews ───────────────────────────────────────────────────────

    pub fn create_review(&self, new: &NewReview) -> Result<Review> {
        let id = uuid::Uuid::new_v4().to_string();
        let thread_id = new.thread_id.clone().unwrap_or_else(|| id.clone());
        self.conn
            .execute(
                "INSERT INTO reviews (id, thread_id, requester_id, branch, base_branch, commit_sha, repo_path, review_type, priority, state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    thread_id,
                    new.requester_id,
                    new.branch,
                    new.base_branch,
                    new.commit_sha,
                    new.repo_path,
                    new.review_type,
                    new.priority.as_str(),
                    ReviewState::New.as_str(),
                ],
            )
            .context("Failed to insert review")?;
        self.get_review(&id)?.context("Review not found after insert")
    }

    pub fn get_review(&self, id: &str) -> Result<Option<Review>> {
        let sql = format!("SELECT {} FROM reviews WHERE id = ?1", REVIEW_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], review_row)
            .optional()
            .context("Failed to query review")?;
        row.map(ReviewRow::into_review).transpose()
    }

    pub fn list_reviews(&self, filter: &ReviewFilter) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews
             WHERE (?1 IS NULL OR state = ?1) AND (?2 IS NULL OR requester_id = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4",
            REVIEW_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_reviews")?;
        let rows = stmt
            .query_map(
                params![
                    filter.state.map(|s| s.as_str()),
                    filter.requester_id,
                    filter.limit.unwrap_or(-1),
                    filter.offset.unwrap_or(0),
                ],
                review_row,
            )
            .context("Failed to query reviews")?;
        let mut reviews = Vec::new();
        for row in rows {
            let r = row.context("Failed to read review row")?;
            reviews.push(r.into_review()?);
        }
        Ok(reviews)
    }

    /// Plain state update for non-terminal transitions.
    pub fn update_review_state(&self, id: &str, state: ReviewState) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE reviews SET state = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![state.as_str(), id],
            )
            .context("Failed to update review state")?;
        Ok(changed > 0)
    }

    /// Terminal state write: also stamps `completed_at`.
    pub fn complete_review(&self, id: &str, state: ReviewState) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE reviews SET state = ?1, updated_at = datetime('now'), completed_at = datetime('now') WHERE id = ?2",
                params![state.as_str(), id],
            )
            .context("Failed to complete review")?;
        Ok(changed > 0)
    }

    pub fn update_review_commit(&self, id: &str, commit_sha: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE reviews SET commit_sha = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![commit_sha, id],
            )
            .context("Failed to update review commit")?;
        Ok(changed > 0)
    }

    /// Purge a review. Iterations, issues and activities cascade.
    pub fn delete_review(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM reviews WHERE id = ?1", params![id])
            .context("Failed to delete review")?;
        Ok(changed > 0)
    }

    // ── Iterations and issues ─────────────────────────────────────────

    /// Write one completed round and its issues atomically. The iteration
    /// number is computed here as existing count + 1.
    pub fn record_iteration(
        &self,
        review_id: &str,
        iteration: &NewIteration,
        issues: &[ResultIssue],
    ) -> Result<ReviewIteration> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM review_iterations WHERE review_id = ?1",
                params![review_id],
                |row| row.get(0),
            )
            .context("Failed to count iterations")?;
        let iteration_num = count + 1;

        tx.execute(
            "INSERT INTO review_iterations (review_id, iteration_num, reviewer_id, session_id, decision, summary, files_reviewed, lines_analyzed, duration_ms, cost_usd, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                review_id,
                iteration_num,
                iteration.reviewer_id,
                iteration.session_id,
                iteration.decision.as_str(),
                iteration.summary,
                iteration.files_reviewed,
                iteration.lines_analyzed,
                iteration.duration_ms as i64,
                iteration.cost_usd,
                iteration.started_at,
            ],
        )
        .context("Failed to insert iteration")?;
        let id = tx.last_insert_rowid();

        for issue in issues {
            tx.execute(
                "INSERT INTO review_issues (review_id, iteration_num, issue_type, severity, file_path, line_start, line_end, title, description, code_snippet, suggestion, rule_citation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    review_id,
                    iteration_num,
                    issue.issue_type.as_str(),
                    issue.severity.as_str(),
                    issue.file,
                    issue.line_start,
                    issue.line_end,
                    issue.title,
                    issue.description,
                    issue.snippet,
                    issue.suggestion,
                    issue.rule_citation,
                ],
            )
            .context("Failed to insert issue")?;
        }

        tx.commit().context("Failed to commit iteration")?;

        let sql = format!(
            "SELECT {} FROM review_iterations WHERE id = ?1",
            ITERATION_COLUMNS
        );
        self.conn
            .query_row(&sql, params![id], iteration_row)
            .context("Iteration not found after insert")?
            .into_iteration()
    }

    pub fn list_iterations(&self, review_id: &str) -> Result<Vec<ReviewIteration>> {
        let sql = format!(
            "SELECT {} FROM review_iterations WHERE review_id = ?1 ORDER BY iteration_num",
            ITERATION_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_iterations")?;
        let rows = stmt
            .query_map(params![review_id], iteration_row)
            .context("Failed to query iterations")?;
        let mut iterations = Vec::new();
        for row in rows {
            let r = row.context("Failed to read iteration row")?;
            iterations.push(r.into_iteration()?);
        }
        Ok(iterations)
    }

    pub fn list_issues(
        &self,
        review_id: &str,
        status: Option<IssueStatus>,
    ) -> Result<Vec<ReviewIssue>> {
        let sql = format!(
            "SELECT {} FROM review_issues
             WHERE review_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY iteration_num, id",
            ISSUE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_issues")?;
        let rows = stmt
            .query_map(params![review_id, status.map(|s| s.as_str())], issue_row)
            .context("Failed to query issues")?;
        let mut issues = Vec::new();
        for row in rows {
            let r = row.context("Failed to read issue row")?;
            issues.push(r.into_issue()?);
        }
        Ok(issues)
    }

    pub fn get_issue(&self, id: i64) -> Result<Option<ReviewIssue>> {
        let sql = format!("SELECT {} FROM review_issues WHERE id = ?1", ISSUE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], issue_row)
            .optional()
            .context("Failed to query issue")?;
        row.map(IssueRow::into_issue).transpose()
    }

    pub fn update_issue_status(&self, id: i64, status: IssueStatus) -> Result<Option<ReviewIssue>> {
        let changed = self
            .conn
            .execute(
                "UPDATE review_issues SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update issue status")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_issue(id)
    }

    // ── Activity log ──────────────────────────────────────────────────

    pub fn create_activity(
        &self,
        review_id: &str,
        kind: ActivityKind,
        description: &str,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO activities (review_id, kind, description) VALUES (?1, ?2, ?3)",
                params![review_id, kind.as_str(), description],
            )
            .context("Failed to insert activity")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_activities(&self, review_id: &str) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, review_id, kind, description, created_at
                 FROM activities WHERE review_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_activities")?;
        let rows = stmt
            .query_map(params![review_id], |row| {
                Ok(ActivityRow {
                    id: row.get(0)?,
                    review_id: row.get(1)?,
                    kind: row.get(2)?,
                    description: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query activities")?;
        let mut activities = Vec::new();
        for row in rows {
            let r = row.context("Failed to read activity row")?;
            activities.push(r.into_activity()?);
        }
        Ok(activities)
    }

    // ── Agents and mail ───────────────────────────────────────────────

    pub fn get_agent_by_name(&self, name: &str) -> Result<Option<Agent>> {
        self.conn
            .query_row(
                "SELECT id, name, last_seen_at, created_at FROM agents WHERE name = ?1",
                params![name],
                agent_from_row,
            )
            .optional()
            .context("Failed to query agent")
    }

    pub fn create_agent(&self, name: &str) -> Result<Agent> {
        self.conn
            .execute(
                "INSERT INTO agents (name, last_seen_at) VALUES (?1, datetime('now'))",
                params![name],
            )
            .context("Failed to insert agent")?;
        self.get_agent_by_name(name)?
            .context("Agent not found after insert")
    }

    /// Resolve an agent identity, creating it on first use.
    pub fn ensure_agent(&self, name: &str) -> Result<Agent> {
        match self.get_agent_by_name(name)? {
            Some(agent) => Ok(agent),
            None => self.create_agent(name),
        }
    }

    pub fn touch_agent(&self, agent_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE agents SET last_seen_at = datetime('now') WHERE id = ?1",
                params![agent_id],
            )
            .context("Failed to update agent heartbeat")?;
        Ok(())
    }

    /// Create a message and its recipient row in one transaction, resolving
    /// (or creating) the recipient agent by name. A message is never visible
    /// without its recipient.
    pub fn deliver_mail(
        &self,
        sender: &str,
        recipient: &str,
        thread_id: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<i64> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let agent_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM agents WHERE name = ?1",
                params![recipient],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to resolve recipient")?;
        let agent_id = match agent_id {
            Some(id) => id,
            None => {
                tx.execute("INSERT INTO agents (name) VALUES (?1)", params![recipient])
                    .context("Failed to create recipient agent")?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            "INSERT INTO messages (sender, thread_id, subject, body) VALUES (?1, ?2, ?3, ?4)",
            params![sender, thread_id, subject, body],
        )
        .context("Failed to insert message")?;
        let message_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO message_recipients (message_id, agent_id) VALUES (?1, ?2)",
            params![message_id, agent_id],
        )
        .context("Failed to insert message recipient")?;

        tx.commit().context("Failed to commit mail delivery")?;
        Ok(message_id)
    }

    pub fn get_unread_messages(&self, agent_id: i64, limit: i64) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.id, m.sender, m.thread_id, m.subject, m.body, m.created_at
                 FROM messages m JOIN message_recipients r ON r.message_id = m.id
                 WHERE r.agent_id = ?1 AND r.read_at IS NULL
                 ORDER BY m.id LIMIT ?2",
            )
            .context("Failed to prepare get_unread_messages")?;
        let rows = stmt
            .query_map(params![agent_id, limit], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    thread_id: row.get(2)?,
                    subject: row.get(3)?,
                    body: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .context("Failed to query unread messages")?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.context("Failed to read message row")?);
        }
        Ok(messages)
    }

    pub fn mark_message_read(&self, message_id: i64, agent_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE message_recipients SET read_at = datetime('now')
                 WHERE message_id = ?1 AND agent_id = ?2 AND read_at IS NULL",
                params![message_id, agent_id],
            )
            .context("Failed to mark message read")?;
        Ok(())
    }
}

fn review_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        requester_id: row.get(2)?,
        branch: row.get(3)?,
        base_branch: row.get(4)?,
        commit_sha: row.get(5)?,
        repo_path: row.get(6)?,
        review_type: row.get(7)?,
        priority: row.get(8)?,
        state: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

fn iteration_row(row: &Row<'_>) -> rusqlite::Result<IterationRow> {
    Ok(IterationRow {
        id: row.get(0)?,
        review_id: row.get(1)?,
        iteration_num: row.get(2)?,
        reviewer_id: row.get(3)?,
        session_id: row.get(4)?,
        decision: row.get(5)?,
        summary: row.get(6)?,
        files_reviewed: row.get(7)?,
        lines_analyzed: row.get(8)?,
        duration_ms: row.get(9)?,
        cost_usd: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
    })
}

fn issue_row(row: &Row<'_>) -> rusqlite::Result<IssueRow> {
    Ok(IssueRow {
        id: row.get(0)?,
        review_id: row.get(1)?,
        iteration_num: row.get(2)?,
        issue_type: row.get(3)?,
        severity: row.get(4)?,
        file_path: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        title: row.get(8)?,
        description: row.get(9)?,
        code_snippet: row.get(10)?,
        suggestion: row.get(11)?,
        rule_citation: row.get(12)?,
        status: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        last_seen_at: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_common::{Decision, IssueType, Severity};

    fn new_review(requester: &str) -> NewReview {
        NewReview {
            requester_id: requester.into(),
            branch: Some("feature".into()),
            base_branch: Some("main".into()),
            repo_path: "/tmp/repo".into(),
            review_type: "full".into(),
            ..NewReview::default()
        }
    }

    fn iteration(decision: Decision) -> NewIteration {
        NewIteration {
            reviewer_id: "general".into(),
            session_id: Some("sess-1".into()),
            decision,
            summary: "summary".into(),
            files_reviewed: 2,
            lines_analyzed: 40,
            duration_ms: 1500,
            cost_usd: 0.12,
            started_at: "2026-01-01 00:00:00".into(),
        }
    }

    fn issue(title: &str) -> ResultIssue {
        ResultIssue {
            title: title.into(),
            issue_type: IssueType::Bug,
            severity: Severity::High,
            file: "src/lib.rs".into(),
            line_start: 7,
            line_end: Some(9),
            description: "desc".into(),
            snippet: "x".into(),
            suggestion: "y".into(),
            rule_citation: None,
        }
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('reviews', 'review_iterations', 'review_issues', 'activities', 'agents', 'messages', 'message_recipients')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 7);
        Ok(())
    }

    #[test]
    fn test_open_on_disk_creates_parent_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("gatekeeper.db");
        ReviewDb::new(&path)?;
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_create_and_get_review() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        assert_eq!(review.state, ReviewState::New);
        assert_eq!(review.thread_id, review.id);
        assert_eq!(review.priority, Priority::Medium);
        assert!(review.completed_at.is_none());

        let fetched = db.get_review(&review.id)?.expect("review should exist");
        assert_eq!(fetched.branch.as_deref(), Some("feature"));
        assert!(db.get_review("missing")?.is_none());
        Ok(())
    }

    #[test]
    fn test_list_reviews_filters_and_paginates() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let a = db.create_review(&new_review("alice"))?;
        db.create_review(&new_review("bob"))?;
        db.create_review(&new_review("alice"))?;
        db.update_review_state(&a.id, ReviewState::PendingReview)?;

        assert_eq!(db.list_reviews(&ReviewFilter::default())?.len(), 3);

        let by_alice = db.list_reviews(&ReviewFilter {
            requester_id: Some("alice".into()),
            ..ReviewFilter::default()
        })?;
        assert_eq!(by_alice.len(), 2);

        let pending = db.list_reviews(&ReviewFilter {
            state: Some(ReviewState::PendingReview),
            ..ReviewFilter::default()
        })?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let page = db.list_reviews(&ReviewFilter {
            limit: Some(2),
            offset: Some(2),
            ..ReviewFilter::default()
        })?;
        assert_eq!(page.len(), 1);
        Ok(())
    }

    #[test]
    fn test_complete_review_stamps_completion() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        assert!(db.complete_review(&review.id, ReviewState::Approved)?);
        let fetched = db.get_review(&review.id)?.unwrap();
        assert_eq!(fetched.state, ReviewState::Approved);
        assert!(fetched.completed_at.is_some());
        assert!(!db.complete_review("missing", ReviewState::Approved)?);
        Ok(())
    }

    #[test]
    fn test_unknown_persisted_state_loads_as_new() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        db.conn.execute(
            "UPDATE reviews SET state = 'archived' WHERE id = ?1",
            params![review.id],
        )?;
        assert_eq!(db.get_review(&review.id)?.unwrap().state, ReviewState::New);
        Ok(())
    }

    #[test]
    fn test_record_iteration_numbers_monotonically() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;

        let first = db.record_iteration(
            &review.id,
            &iteration(Decision::RequestChanges),
            &[issue("a"), issue("b")],
        )?;
        let second = db.record_iteration(&review.id, &iteration(Decision::Approve), &[])?;
        assert_eq!(first.iteration_num, 1);
        assert_eq!(second.iteration_num, 2);
        assert_eq!(second.decision, Decision::Approve);

        let iterations = db.list_iterations(&review.id)?;
        assert_eq!(iterations.len(), 2);
        assert_eq!(iterations[0].files_reviewed, 2);

        let issues = db.list_issues(&review.id, None)?;
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.iteration_num == 1));
        assert_eq!(issues[0].line_end, Some(9));
        assert_eq!(issues[0].status, IssueStatus::Open);
        Ok(())
    }

    #[test]
    fn test_update_issue_status() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        db.record_iteration(
            &review.id,
            &iteration(Decision::RequestChanges),
            &[issue("a"), issue("b")],
        )?;
        let issues = db.list_issues(&review.id, None)?;

        let updated = db
            .update_issue_status(issues[0].id, IssueStatus::Resolved)?
            .expect("issue should exist");
        assert_eq!(updated.status, IssueStatus::Resolved);

        assert_eq!(db.list_issues(&review.id, Some(IssueStatus::Open))?.len(), 1);
        assert_eq!(
            db.list_issues(&review.id, Some(IssueStatus::Resolved))?.len(),
            1
        );
        assert!(db.update_issue_status(9999, IssueStatus::Resolved)?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_review_cascades() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        db.record_iteration(
            &review.id,
            &iteration(Decision::RequestChanges),
            &[issue("a")],
        )?;
        db.create_activity(&review.id, ActivityKind::Submitted, "submitted")?;

        assert!(db.delete_review(&review.id)?);
        assert!(db.get_review(&review.id)?.is_none());
        assert!(db.list_iterations(&review.id)?.is_empty());
        assert!(db.list_issues(&review.id, None)?.is_empty());
        assert!(db.list_activities(&review.id)?.is_empty());
        assert!(!db.delete_review(&review.id)?);
        Ok(())
    }

    #[test]
    fn test_activity_log() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let review = db.create_review(&new_review("alice"))?;
        db.create_activity(&review.id, ActivityKind::Submitted, "Review requested by alice")?;
        db.create_activity(&review.id, ActivityKind::Approved, "Approved by general")?;
        let activities = db.list_activities(&review.id)?;
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[1].kind, ActivityKind::Approved);
        Ok(())
    }

    #[test]
    fn test_ensure_agent_is_idempotent() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let a = db.ensure_agent("reviewer-1")?;
        let b = db.ensure_agent("reviewer-1")?;
        assert_eq!(a.id, b.id);
        db.touch_agent(a.id)?;
        assert!(db.get_agent_by_name("reviewer-1")?.unwrap().last_seen_at.is_some());
        Ok(())
    }

    #[test]
    fn test_deliver_mail_and_read() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        // Recipient does not exist yet; delivery creates it.
        let message_id = db.deliver_mail(
            "gatekeeper",
            "reviewer-1",
            Some("thread-1"),
            "Re-review requested",
            "Please look again",
        )?;
        let agent = db.get_agent_by_name("reviewer-1")?.expect("agent created");

        let unread = db.get_unread_messages(agent.id, 10)?;
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, message_id);
        assert_eq!(unread[0].thread_id.as_deref(), Some("thread-1"));

        db.mark_message_read(message_id, agent.id)?;
        assert!(db.get_unread_messages(agent.id, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unread_messages_respect_limit() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        let agent = db.ensure_agent("reviewer-1")?;
        for i in 0..5 {
            db.deliver_mail("x", "reviewer-1", None, "s", &format!("body {}", i))?;
        }
        assert_eq!(db.get_unread_messages(agent.id, 3)?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_every_message_has_a_recipient() -> Result<()> {
        let db = ReviewDb::new_in_memory()?;
        db.deliver_mail("x", "a", None, "s", "b")?;
        db.deliver_mail("x", "b", None, "s", "b")?;
        let orphans: i64 = db.conn.query_row(
            "SELECT COUNT(*) FROM messages m WHERE NOT EXISTS (SELECT 1 FROM message_recipients r WHERE r.message_id = m.id)",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(orphans, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call() -> Result<()> {
        let handle = DbHandle::new(ReviewDb::new_in_memory()?);
        let review = handle
            .call(|db| db.create_review(&new_review("alice")))
            .await?;
        let id = review.id.clone();
        let fetched = handle.call(move |db| db.get_review(&id)).await?;
        assert!(fetched.is_some());
        Ok(())
    }
}
