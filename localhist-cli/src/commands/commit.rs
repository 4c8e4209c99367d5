use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, name: Option<String>) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let file = super::target_file(file)?;
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let index = engine.create_commit(&file, &content, name)?;
    let chain = engine.load(&file)?;

    println!("{}", "✓ Commit created successfully!".green().bold());
    println!("  {}: {}", "File".bold(), chain.source_file);
    println!("  {}: {}", "Commit".bold(), index);
    println!("  {}: {}", "Name".bold(), chain.commit(index)?.name);

    Ok(())
}
