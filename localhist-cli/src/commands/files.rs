use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(root: PathBuf) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let files = engine.tracked_files()?;

    if files.is_empty() {
        println!("{}", "No files have a history yet".yellow());
        return Ok(());
    }

    println!(
        "{} {}",
        "Tracked files".bold().cyan(),
        format!("({})", files.len()).dimmed()
    );
    for file in files {
        println!("  {}", file);
    }

    Ok(())
}
