use anyhow::{Context, Result};
use colored::Colorize;
use localhist_core::EditOutcome;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let file = super::target_file(file)?;
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match engine.record_edit(&file, &content, &content)? {
        EditOutcome::Committed { commit } => {
            println!("{} (commit {})", "✓ Started history".green().bold(), commit)
        }
        EditOutcome::Patched { commit, patch } => println!(
            "{} (patch {} of commit {})",
            "✓ Recorded".green().bold(),
            patch,
            commit
        ),
        EditOutcome::Unchanged => println!("{}", "No changes to record".yellow()),
        EditOutcome::Debounced => println!("{}", "Skipped: within the patch delay".yellow()),
        EditOutcome::Ignored => println!("{}", "File is ignored".yellow()),
    }

    Ok(())
}
