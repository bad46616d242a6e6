//! Prompt construction for reviewer sessions.

use std::path::Path;

use gatekeeper_common::{Persona, ReviewerConfig};

use super::ReviewContext;
use super::result::RESULT_BLOCK_TAG;
use crate::store::Message;

/// Files checked, in order, for project-specific review rules.
pub const PROJECT_RULE_FILES: &[&str] = &[".gatekeeper/review-rules.md", "CLAUDE.md", "AGENTS.md"];

const MAX_RULES_CHARS: usize = 20_000;

/// The git invocation that shows the change under review. Always run as an
/// argv, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffCommand {
    args: Vec<String>,
}

impl DiffCommand {
    /// Three-dot range when both branches are known, base-to-HEAD when only
    /// the base is, a single-commit show for a bare SHA, and the last commit
    /// otherwise.
    pub fn for_target(
        branch: Option<&str>,
        base_branch: Option<&str>,
        commit_sha: Option<&str>,
        ignore_patterns: &[String],
    ) -> Self {
        let mut args = match (branch, base_branch, commit_sha) {
            (Some(branch), Some(base), _) => {
                vec!["diff".to_string(), format!("{}...{}", base, branch)]
            }
            (None, Some(base), sha) => {
                vec!["diff".to_string(), format!("{}..{}", base, sha.unwrap_or("HEAD"))]
            }
            (_, None, Some(sha)) => vec!["show".to_string(), sha.to_string()],
            (Some(branch), None, None) => {
                vec!["diff".to_string(), format!("{0}~1..{0}", branch)]
            }
            (None, None, None) => vec!["diff".to_string(), "HEAD~1..HEAD".to_string()],
        };
        if !ignore_patterns.is_empty() {
            args.push("--".to_string());
            args.push(".".to_string());
            args.extend(ignore_patterns.iter().map(|p| format!(":(exclude){}", p)));
        }
        Self { args }
    }

    pub fn for_context(ctx: &ReviewContext) -> Self {
        Self::for_target(
            ctx.branch.as_deref(),
            ctx.base_branch.as_deref(),
            ctx.commit_sha.as_deref(),
            &ctx.reviewer.ignore_patterns,
        )
    }

    pub fn program(&self) -> &'static str {
        "git"
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Rendering for prompts and logs.
    pub fn display(&self) -> String {
        let mut out = String::from("git");
        for arg in &self.args {
            out.push(' ');
            if arg.chars().all(|c| c.is_ascii_alphanumeric() || "-_./~^@:".contains(c)) {
                out.push_str(arg);
            } else {
                out.push('\'');
                out.push_str(&arg.replace('\'', r"'\''"));
                out.push('\'');
            }
        }
        out
    }
}

/// Whether a branch name or SHA can be passed to git as a revision. Rejects
/// anything git could read as an option or a range.
pub fn is_valid_revision(rev: &str) -> bool {
    !rev.is_empty()
        && !rev.starts_with('-')
        && !rev.contains("..")
        && rev
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./+@".contains(c))
}

/// First non-empty project rules file found in the repository, truncated.
pub fn load_project_rules(repo_path: &Path) -> Option<String> {
    PROJECT_RULE_FILES.iter().find_map(|name| {
        let content = std::fs::read_to_string(repo_path.join(name)).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.chars().take(MAX_RULES_CHARS).collect())
    })
}

fn persona_intro(persona: Persona) -> &'static str {
    match persona {
        Persona::General => {
            "You are a senior engineer reviewing a change before it is merged. \
             Look for defects that would hurt users or maintainers, and say clearly \
             when the change is good."
        }
        Persona::Security => {
            "You are a security reviewer. Hunt for vulnerabilities introduced by \
             this change: injection, broken authentication or authorization, secret \
             leakage, unsafe deserialization and trust-boundary mistakes."
        }
        Persona::Performance => {
            "You are a performance reviewer. Look for algorithmic regressions, \
             unnecessary allocation or I/O on hot paths, blocking calls in async \
             code and unbounded growth."
        }
        Persona::Architecture => {
            "You are an architecture reviewer. Judge whether the change fits the \
             existing module boundaries, keeps coupling low and leaves the code \
             easy to extend."
        }
        Persona::MultiPersona => {
            "You coordinate a panel review. Examine the change in turn as a \
             correctness reviewer, a security reviewer, a performance reviewer and \
             an architecture reviewer, then merge the findings into one verdict."
        }
    }
}

/// System prompt for a reviewer: the configured override, or the persona
/// prompt, with project rules appended.
pub fn system_prompt(config: &ReviewerConfig, project_rules: Option<&str>) -> String {
    let mut prompt = match &config.system_prompt {
        Some(custom) => custom.trim().to_string(),
        None => {
            let persona = config.persona();
            let mut p = format!("{}\n\n## Focus areas\n\n", persona_intro(persona));
            for area in config.effective_focus_areas() {
                p.push_str(&format!("- {}\n", area));
            }
            p.push_str(
                "\n## Ground rules\n\n\
                 - You are read-only. Never modify files in the repository, commit, push or \
                 run builds, installs or network commands; such requests will be denied.\n\
                 - Inspect the change with the git command you are given, then read \
                 surrounding code as needed.\n\
                 - Report only real problems. Every issue needs a file, a line and a concrete \
                 suggestion.\n",
            );
            p
        }
    };
    if let Some(rules) = project_rules {
        prompt.push_str("\n\n## Project rules\n\n");
        prompt.push_str(rules);
        prompt.push('\n');
    }
    prompt
}

fn result_format_instructions() -> String {
    format!(
        "When you are done, end your reply with exactly one fenced block tagged \
         `{tag}` containing JSON:\n\n\
         ```{tag}\n\
         {{\n  \"decision\": \"approve | request_changes | reject\",\n  \
         \"summary\": \"one paragraph\",\n  \
         \"issues\": [\n    {{\n      \"title\": \"short title\",\n      \
         \"type\": \"bug | security | performance | logic_error | error_handling | style | \
         documentation | test_coverage | architecture | maintainability | other\",\n      \
         \"severity\": \"critical | high | medium | low | info\",\n      \
         \"file\": \"path/relative/to/repo\",\n      \"line_start\": 1,\n      \
         \"line_end\": 1,\n      \"description\": \"what is wrong\",\n      \
         \"snippet\": \"offending code\",\n      \"suggestion\": \"how to fix it\",\n      \
         \"rule_citation\": \"project rule this breaks, if any\"\n    }}\n  ],\n  \
         \"files_reviewed\": 0,\n  \"lines_analyzed\": 0\n}}\n\
         ```\n\n\
         Use `approve` when nothing blocks merging, `request_changes` when the issues \
         can be fixed in this change, and `reject` when the approach itself is wrong.",
        tag = RESULT_BLOCK_TAG
    )
}

/// First prompt of a review session.
pub fn review_prompt(ctx: &ReviewContext, diff: &DiffCommand, notes_dir: &Path) -> String {
    let mut target = String::new();
    if let Some(branch) = &ctx.branch {
        target.push_str(&format!("- Branch: {}\n", branch));
    }
    if let Some(base) = &ctx.base_branch {
        target.push_str(&format!("- Base: {}\n", base));
    }
    if let Some(sha) = &ctx.commit_sha {
        target.push_str(&format!("- Commit: {}\n", sha));
    }
    if target.is_empty() {
        target.push_str("- The most recent commit\n");
    }

    let mut prompt = format!(
        "Review {id} is ready.\n\n## Change under review\n\n{target}\n\
         Run this command to see the change:\n\n    {diff}\n\n",
        id = ctx.review_id,
        target = target,
        diff = diff.display(),
    );
    if !ctx.reviewer.ignore_patterns.is_empty() {
        prompt.push_str(&format!(
            "Paths matching these patterns are out of scope: {}\n\n",
            ctx.reviewer.ignore_patterns.join(", ")
        ));
    }
    prompt.push_str(&format!(
        "If you want to draft a longer write-up, you may write files under {} only.\n\n",
        notes_dir.display()
    ));
    prompt.push_str(&result_format_instructions());
    prompt
}

/// Prompt injected into a live session when re-review mail arrives.
pub fn followup_prompt(messages: &[Message], diff: &DiffCommand) -> String {
    let mut prompt = String::from("New messages arrived for this review:\n\n");
    for message in messages {
        prompt.push_str(&format!("### From {}: {}\n\n", message.sender, message.subject));
        if !message.body.trim().is_empty() {
            prompt.push_str(message.body.trim());
            prompt.push_str("\n\n");
        }
    }
    prompt.push_str(&format!(
        "Re-run the diff to see the current state of the change:\n\n    {}\n\n\
         Check whether your earlier issues were addressed and look for new problems.\n\n",
        diff.display()
    ));
    prompt.push_str(&result_format_instructions());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> ReviewContext {
        ReviewContext {
            review_id: "rev-1".into(),
            thread_id: "thread-1".into(),
            repo_path: PathBuf::from("/repo"),
            branch: Some("feature/login".into()),
            base_branch: Some("main".into()),
            commit_sha: None,
            reviewer: ReviewerConfig::default(),
        }
    }

    #[test]
    fn test_diff_command_selection() {
        let three_dot = DiffCommand::for_target(Some("feature"), Some("main"), Some("abc"), &[]);
        assert_eq!(three_dot.display(), "git diff main...feature");

        let base_only = DiffCommand::for_target(None, Some("main"), None, &[]);
        assert_eq!(base_only.display(), "git diff main..HEAD");

        let commit_only = DiffCommand::for_target(None, None, Some("abc123"), &[]);
        assert_eq!(commit_only.display(), "git show abc123");

        let fallback = DiffCommand::for_target(None, None, None, &[]);
        assert_eq!(fallback.display(), "git diff HEAD~1..HEAD");
        assert_eq!(fallback.program(), "git");
        assert_eq!(fallback.args(), ["diff", "HEAD~1..HEAD"]);
    }

    #[test]
    fn test_diff_command_excludes_ignored_paths() {
        let diff = DiffCommand::for_target(
            Some("feature"),
            Some("main"),
            None,
            &["*.lock".to_string(), "vendor/".to_string()],
        );
        assert_eq!(
            diff.args(),
            ["diff", "main...feature", "--", ".", ":(exclude)*.lock", ":(exclude)vendor/"]
        );
        assert!(diff.display().contains("':(exclude)*.lock'"));
    }

    #[test]
    fn test_revision_validation() {
        assert!(is_valid_revision("main"));
        assert!(is_valid_revision("feature/login-v2"));
        assert!(is_valid_revision("0123abcd"));
        assert!(!is_valid_revision("--output=/tmp/x"));
        assert!(!is_valid_revision("main..evil"));
        assert!(!is_valid_revision("main; rm -rf /"));
        assert!(!is_valid_revision(""));
    }

    #[test]
    fn test_system_prompt_uses_persona_and_rules() {
        let config = ReviewerConfig::for_persona(Persona::Security);
        let prompt = system_prompt(&config, Some("Never log tokens."));
        assert!(prompt.contains("security reviewer"));
        assert!(prompt.contains("## Project rules"));
        assert!(prompt.ends_with("Never log tokens.\n"));
    }

    #[test]
    fn test_system_prompt_override_keeps_rules() {
        let config = ReviewerConfig::default().with_system_prompt("Custom reviewer.");
        let prompt = system_prompt(&config, Some("Use tabs."));
        assert!(prompt.starts_with("Custom reviewer."));
        assert!(!prompt.contains("## Focus areas"));
        assert!(prompt.contains("Use tabs."));
    }

    #[test]
    fn test_review_prompt_names_diff_and_result_format() {
        let ctx = ctx();
        let diff = DiffCommand::for_context(&ctx);
        let prompt = review_prompt(&ctx, &diff, Path::new("/tmp/gatekeeper/rev-1"));
        assert!(prompt.contains("git diff main...feature/login"));
        assert!(prompt.contains("```review-result"));
        assert!(prompt.contains("/tmp/gatekeeper/rev-1"));
        assert!(prompt.contains("rev-1"));
    }

    #[test]
    fn test_followup_prompt_includes_mail() {
        let messages = vec![Message {
            id: 1,
            sender: "alice".into(),
            thread_id: Some("thread-1".into()),
            subject: "Re-review requested".into(),
            body: "Fixed the index bug.".into(),
            created_at: "2026-01-01 00:00:00".into(),
        }];
        let diff = DiffCommand::for_target(None, None, Some("def456"), &[]);
        let prompt = followup_prompt(&messages, &diff);
        assert!(prompt.contains("From alice: Re-review requested"));
        assert!(prompt.contains("Fixed the index bug."));
        assert!(prompt.contains("git show def456"));
    }

    #[test]
    fn test_project_rules_first_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "agents rules").unwrap();
        assert_eq!(load_project_rules(dir.path()).as_deref(), Some("agents rules"));

        std::fs::write(dir.path().join("CLAUDE.md"), "claude rules").unwrap();
        assert_eq!(load_project_rules(dir.path()).as_deref(), Some("claude rules"));

        std::fs::create_dir_all(dir.path().join(".gatekeeper")).unwrap();
        std::fs::write(dir.path().join(".gatekeeper/review-rules.md"), "   ").unwrap();
        assert_eq!(load_project_rules(dir.path()).as_deref(), Some("claude rules"));
    }

    #[test]
    fn test_no_rules_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project_rules(dir.path()).is_none());
    }
}
