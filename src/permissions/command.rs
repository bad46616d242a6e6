//! Heuristic classifier for shell commands requested through the `Bash` tool.
//!
//! This is a filter, not a shell parser and not a sandbox. The agent process
//! is always launched from an argv (see `reviewer::session`), never through
//! `sh -c`, independently of what this classifier allows.
//!
//! Rules, applied in order:
//!
//! 1. Any subshell or process-substitution marker (`$(`, backtick, `<(`, `>(`)
//!    denies the whole command.
//! 2. Output redirection (`>`, `>>`, `&>`, `2>file`) outside quotes is denied,
//!    except the stderr merge `2>&1`. Heredocs (`<<`) are denied too.
//! 3. The command is split on `;`, `&&`, `||`, `|`, `&` and newlines. Each
//!    fragment is checked on its own, so `git log; rm -rf /` is denied.
//! 4. A fragment is denied if it is a bare environment dump (`env`, `set`,
//!    ...), starts with a denied program or git subcommand, carries an
//!    argument that makes a read-only program write or execute (`--output`,
//!    `sed -i`, `git -c`), or matches a denied prefix such as `cat ~/.ssh/`.

use regex::Regex;
use std::sync::LazyLock;

use super::PermissionDecision;

const SUBSHELL_MARKERS: &[&str] = &["$(", "`", "<(", ">("];

/// Bare commands that print the whole environment when run with no arguments.
const EXACT_DENY: &[&str] = &["env", "printenv", "set", "export", "declare", "typeset", "alias"];

/// Programs denied regardless of arguments.
const PROGRAM_DENY: &[&str] = &[
    // filesystem mutation
    "rm", "rmdir", "mv", "cp", "dd", "chmod", "chown", "chgrp", "ln", "touch", "truncate",
    "mkdir", "tee", "install", "shred", "unlink", "mkfs", "mount", "umount", "patch",
    // editors
    "vi", "vim", "nvim", "nano", "emacs", "ed", "ex",
    // network
    "curl", "wget", "nc", "ncat", "netcat", "telnet", "ssh", "scp", "sftp", "rsync", "ftp",
    "socat",
    // package managers and build triggers
    "npm", "npx", "yarn", "pnpm", "bun", "pip", "pip3", "pipx", "uv", "poetry", "cargo",
    "rustup", "go", "make", "cmake", "ninja", "gradle", "mvn", "bundle", "gem", "apt",
    "apt-get", "yum", "dnf", "brew", "docker", "podman", "kubectl", "terraform",
    // environment and credential enumeration
    "printenv", "env", "export", "declare", "typeset", "security", "keychain",
    // shells, privilege and process control
    "bash", "sh", "zsh", "dash", "fish", "sudo", "su", "doas", "kill", "pkill", "killall",
    "eval", "exec", "source", ".",
    "nohup", "xargs", "timeout", "nice", "command", "builtin", "crontab", "at",
    // interpreters
    "perl", "ruby", "node", "deno", "php", "lua", "tclsh", "expect", "osascript", "awk",
    "gawk", "mawk", "nawk",
    // remote forges
    "gh", "glab", "hub",
];

/// git subcommands that mutate history, the index, the worktree or remotes,
/// write files outside the repository, or launch external tools.
const GIT_SUBCOMMAND_DENY: &[&str] = &[
    "push", "commit", "reset", "rebase", "merge", "checkout", "switch", "restore", "clean",
    "stash", "cherry-pick", "revert", "tag", "am", "apply", "rm", "mv", "add", "config",
    "remote", "fetch", "pull", "clone", "worktree", "update-ref", "filter-branch", "gc",
    "prune", "submodule", "init", "notes", "replace", "credential", "bisect",
    "format-patch", "bundle", "archive", "difftool", "mergetool", "instaweb", "daemon",
    "send-email", "update-index", "read-tree", "symbolic-ref", "hash-object", "fast-import",
    "repack", "maintenance", "sparse-checkout", "rerere", "pack-refs", "lfs",
];

/// git global options that let the caller pick a program for git to run.
const GIT_GLOBAL_DENY: &[&str] = &["-c", "--config-env", "--exec-path"];

/// Long options that make an otherwise read-only program write a file or run
/// a command. Matched bare or in `--opt=value` form, on any program.
const ARG_DENY: &[&str] = &[
    "--output",
    "--ext-diff",
    "--exec",
    "--upload-pack",
    "--receive-pack",
    "--open-files-in-pager",
    "--in-place",
];

/// Fragment prefixes denied when the fragment starts with them.
const PREFIX_DENY: &[&str] = &[
    "git branch -d",
    "git branch -D",
    "git branch -m",
    "git branch -M",
    "git branch --delete",
    "cat /proc/",
    "cat ~/.ssh",
    "cat ~/.aws",
    "cat ~/.config/gh",
    "cat ~/.netrc",
    "cat ~/.git-credentials",
    "cat .env",
    "cat /etc/shadow",
    "ls ~/.ssh",
    "ls ~/.aws",
    "find / ",
];

/// Arguments that turn an otherwise read-only `find` into a mutation or exec.
const FIND_DENY_ARGS: &[&str] = &["-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint"];

// sed `w`/`W` write a file and `e` runs a command, both standalone and as
// `s///` flags.
static SED_WRITE_OR_EXEC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[/;{}'"\s0-9$])[wWe](?:\s|$|['";}])"#).unwrap()
});

/// Classify a shell command.
pub fn classify_command(command: &str) -> PermissionDecision {
    if let Some(marker) = SUBSHELL_MARKERS.iter().find(|m| command.contains(**m)) {
        return PermissionDecision::deny(format!(
            "Command substitution ('{}') is not allowed",
            marker
        ));
    }

    match unquoted_operator(command) {
        Some(Operator::Redirect) => {
            return PermissionDecision::deny(
                "Output redirection is not allowed (only 2>&1 is permitted)",
            );
        }
        Some(Operator::Heredoc) => {
            return PermissionDecision::deny("Heredocs are not allowed");
        }
        None => {}
    }

    for fragment in split_fragments(command) {
        if let Some(reason) = check_fragment(&fragment) {
            return PermissionDecision::deny(reason);
        }
    }

    PermissionDecision::Allow
}

/// Split on chaining operators without interpreting quotes.
fn split_fragments(command: &str) -> Vec<String> {
    let chars: Vec<char> = command.chars().collect();
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };
        match c {
            ';' | '\n' => {
                fragments.push(std::mem::take(&mut current));
            }
            '|' => {
                fragments.push(std::mem::take(&mut current));
                if next == Some('|') {
                    i += 1;
                }
            }
            '&' if next == Some('&') => {
                fragments.push(std::mem::take(&mut current));
                i += 1;
            }
            // `2>&1` and `&>` keep the ampersand inside the fragment.
            '&' if prev == Some('>') || next == Some('>') => current.push(c),
            '&' => {
                fragments.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
        i += 1;
    }
    fragments.push(current);

    fragments
        .into_iter()
        .map(|f| normalize_fragment(&f))
        .filter(|f| !f.is_empty())
        .collect()
}

/// Collapse whitespace and drop grouping characters and leading
/// `VAR=value` assignments.
fn normalize_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim_start_matches(|c: char| c.is_whitespace() || "({!".contains(c));
    let trimmed = trimmed.trim_end_matches(|c: char| c.is_whitespace() || ")}".contains(c));

    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
    while tokens.first().is_some_and(|t| is_assignment(t)) {
        tokens.remove(0);
    }
    tokens.join(" ")
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

fn check_fragment(fragment: &str) -> Option<String> {
    let tokens: Vec<&str> = fragment.split_whitespace().collect();
    let raw_program = tokens.first().copied()?;

    if raw_program.starts_with("./") || raw_program.starts_with("../") {
        return Some(format!("Running '{}' from the repository is not allowed", raw_program));
    }

    // `/bin/rm` and `\rm` are checked as `rm`.
    let unescaped = raw_program.trim_start_matches('\\');
    let program = unescaped
        .rsplit('/')
        .next()
        .filter(|p| !p.is_empty())
        .unwrap_or(unescaped);
    let args = &tokens[1..];
    let canonical = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    if EXACT_DENY.contains(&canonical.as_str()) {
        return Some(format!("'{}' would dump environment state", canonical));
    }

    if PROGRAM_DENY.contains(&program) || is_python(program) {
        return Some(format!("'{}' is not allowed for reviewers", program));
    }

    if let Some(arg) = args
        .iter()
        .map(|a| unquote(a))
        .find(|a| ARG_DENY.iter().any(|deny| option_matches(a, deny)))
    {
        return Some(format!("'{} {}' writes files or runs commands", program, arg));
    }

    if program == "git"
        && let Some(reason) = check_git(args)
    {
        return Some(reason);
    }

    if program == "sed" {
        if args.iter().any(|a| has_short_flag(unquote(a), 'i')) {
            return Some("'sed -i' edits files in place".to_string());
        }
        if args.iter().any(|a| !a.starts_with('-'))
            && SED_WRITE_OR_EXEC.is_match(&args.join(" "))
        {
            return Some("sed scripts that write files or run commands are not allowed".into());
        }
    }

    if program == "sort" && args.iter().any(|a| has_short_flag(unquote(a), 'o')) {
        return Some("'sort -o' writes files".to_string());
    }

    if program == "find"
        && let Some(arg) = args.iter().find(|t| FIND_DENY_ARGS.contains(*t))
    {
        return Some(format!("'find {}' is not allowed", arg));
    }

    PREFIX_DENY
        .iter()
        .find(|prefix| matches_prefix(&canonical, prefix))
        .map(|prefix| format!("'{}' is not allowed for reviewers", prefix.trim_end()))
}

/// `python`, `python3`, `python3.12` and friends.
fn is_python(program: &str) -> bool {
    program
        .strip_prefix("python")
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit() || c == '.'))
}

fn unquote(token: &str) -> &str {
    token.trim_matches(|c| c == '\'' || c == '"')
}

/// `--output` and `--output=x` match `--output`; `--outputs` does not.
fn option_matches(arg: &str, option: &str) -> bool {
    arg.strip_prefix(option)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
}

/// True for a short-option cluster (`-i`, `-Ei`, `-ni.bak`) whose flags
/// include `flag`. Long options never match.
fn has_short_flag(arg: &str, flag: char) -> bool {
    arg.strip_prefix('-')
        .filter(|rest| !rest.starts_with('-'))
        .is_some_and(|cluster| cluster.contains(flag))
}

fn check_git(args: &[&str]) -> Option<String> {
    let mut iter = args.iter().map(|a| unquote(a));
    let mut subcommand = None;
    while let Some(arg) = iter.next() {
        if let Some(option) = GIT_GLOBAL_DENY.iter().find(|o| option_matches(arg, o)) {
            return Some(format!("'git {}' can make git run arbitrary programs", option));
        }
        match arg {
            "-C" | "--git-dir" | "--work-tree" | "--namespace" => {
                iter.next();
            }
            a if a.starts_with('-') => {}
            a => {
                subcommand = Some(a);
                break;
            }
        }
    }
    let sub = subcommand?;

    if GIT_SUBCOMMAND_DENY.contains(&sub) {
        return Some(format!("'git {}' mutates the repository", sub));
    }
    // `git grep -O<cmd>` opens matches in an arbitrary pager.
    if sub == "grep" && iter.any(|a| a.starts_with("-O")) {
        return Some("'git grep -O' runs an external pager".to_string());
    }
    None
}

/// Prefix match that stops at word boundaries: `cat .env` matches
/// `cat .env.local` but not `cat .envrc-docs`. Prefixes ending in a
/// non-alphanumeric character (`cat /proc/`) match anything continuing them.
fn matches_prefix(fragment: &str, prefix: &str) -> bool {
    let Some(rest) = fragment.strip_prefix(prefix) else {
        return false;
    };
    let open_ended = prefix
        .chars()
        .last()
        .is_some_and(|c| !c.is_ascii_alphanumeric());
    open_ended
        || rest
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_')
}

#[derive(Debug, PartialEq, Eq)]
enum Operator {
    Redirect,
    Heredoc,
}

/// Finds the first unquoted output redirection (other than the `2>&1`
/// stderr merge) or heredoc marker.
fn unquoted_operator(command: &str) -> Option<Operator> {
    let chars: Vec<char> = command.chars().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if !in_single => {
                i += 2;
                continue;
            }
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '<' if !in_single && !in_double && chars.get(i + 1) == Some(&'<') => {
                return Some(Operator::Heredoc);
            }
            '>' if !in_single && !in_double => {
                let is_stderr_merge = i > 0
                    && chars[i - 1] == '2'
                    && chars.get(i + 1) == Some(&'&')
                    && chars.get(i + 2) == Some(&'1')
                    && (i < 2 || !chars[i - 2].is_ascii_alphanumeric())
                    && chars.get(i + 3).is_none_or(|c| !c.is_ascii_alphanumeric());
                if !is_stderr_merge {
                    return Some(Operator::Redirect);
                }
                i += 3;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}
