//! Project initialization: `gatekeeper init`.

use anyhow::{Context, Result};
use std::path::Path;

use gatekeeper::config::{GATEKEEPER_DIR, GatekeeperToml};

const GITIGNORE: &str = "gatekeeper.db*\nlogs/\n";

const RULES_TEMPLATE: &str = "# Review rules\n\n\
Project-specific guidance for reviewers. This file is appended to every\n\
reviewer's system prompt.\n";

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let gatekeeper_dir = project_dir.join(GATEKEEPER_DIR);
    let config_path = gatekeeper_dir.join("gatekeeper.toml");

    if config_path.exists() {
        println!(
            "Gatekeeper already initialized at {}",
            gatekeeper_dir.display()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&gatekeeper_dir)
        .with_context(|| format!("Failed to create {}", gatekeeper_dir.display()))?;
    GatekeeperToml::default().save(&config_path)?;

    let gitignore = gatekeeper_dir.join(".gitignore");
    if !gitignore.exists() {
        std::fs::write(&gitignore, GITIGNORE)
            .with_context(|| format!("Failed to write {}", gitignore.display()))?;
    }
    let rules = gatekeeper_dir.join("review-rules.md");
    if !rules.exists() {
        std::fs::write(&rules, RULES_TEMPLATE)
            .with_context(|| format!("Failed to write {}", rules.display()))?;
    }

    println!("Initialized gatekeeper at {}", gatekeeper_dir.display());
    println!();
    println!("Created:");
    println!("  .gatekeeper/");
    println!("  ├── gatekeeper.toml   # Reviewer, worker and permission settings");
    println!("  ├── review-rules.md   # Project rules shown to every reviewer");
    println!("  └── .gitignore        # Keeps the database and logs out of git");
    println!();
    println!("Next steps:");
    println!("  1. Edit .gatekeeper/review-rules.md");
    println!("  2. Run `gatekeeper review --branch <branch> --base main --wait`");

    Ok(())
}
