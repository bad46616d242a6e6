use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(version, about = "Code review orchestrator driving Claude reviewer agents")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory holding `.gatekeeper/` (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create `.gatekeeper/` with a default configuration
    Init,
    /// Request a review and start a reviewer for it
    Review {
        /// Repository to review (defaults to the project directory)
        #[arg(long)]
        repo: Option<PathBuf>,

        /// Branch under review
        #[arg(short, long)]
        branch: Option<String>,

        /// Branch the changes are compared against
        #[arg(long)]
        base: Option<String>,

        /// Commit under review
        #[arg(long)]
        commit: Option<String>,

        /// Review type; a persona name selects that reviewer
        #[arg(long = "type")]
        review_type: Option<String>,

        /// low, medium, high or critical
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Who is asking for the review
        #[arg(long, env = "GATEKEEPER_REQUESTER", default_value = "cli")]
        requester: String,

        /// Conversation thread (defaults to the review id)
        #[arg(long)]
        thread: Option<String>,

        /// Stay attached until the review settles
        #[arg(short, long)]
        wait: bool,
    },
    /// List reviews
    List {
        /// Only reviews in this state
        #[arg(long)]
        state: Option<String>,

        /// Only reviews from this requester
        #[arg(long)]
        requester: Option<String>,

        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show a review with its iterations, issues and activity
    Show { review_id: String },
    /// List a review's issues
    Issues {
        review_id: String,

        /// open or resolved
        #[arg(long)]
        status: Option<String>,
    },
    /// Mark an issue resolved (or open again)
    ResolveIssue {
        issue_id: i64,

        #[arg(long)]
        reopen: bool,
    },
    /// Ask for another round after changes were requested
    Resubmit {
        review_id: String,

        /// New commit to review
        #[arg(long)]
        commit: Option<String>,

        #[arg(short, long)]
        wait: bool,
    },
    /// Cancel a review
    Cancel {
        review_id: String,

        #[arg(long, default_value = "Cancelled from the command line")]
        reason: String,
    },
    /// Start a fresh reviewer after a failed round
    Retry {
        review_id: String,

        #[arg(short, long)]
        wait: bool,
    },
    /// Delete a review and its history
    Delete { review_id: String },
    /// Print the diff the reviewer is asked to review
    Diff { review_id: String },
    /// Evaluate a tool call against the reviewer permission policy
    CheckTool {
        /// Tool name, e.g. Bash, Write, Read
        tool: String,

        /// Shell command for Bash
        #[arg(long)]
        command: Option<String>,

        /// Target path for Write
        #[arg(long)]
        file_path: Option<String>,

        /// Raw tool input as JSON
        #[arg(long, conflicts_with_all = ["command", "file_path"])]
        input: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and print warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
        Commands::CheckTool {
            tool,
            command,
            file_path,
            input,
        } => cmd::cmd_check_tool(
            &project_dir,
            tool,
            command.as_deref(),
            file_path.as_deref(),
            input.as_deref(),
        )?,
        _ => {
            let app = cmd::App::open(&project_dir, cli.verbose)?;
            let result = cmd::run_review_command(&app, &cli.command).await;
            app.close().await;
            result?;
        }
    }

    Ok(())
}
