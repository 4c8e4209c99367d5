use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, commit: usize, name: String) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let file = super::target_file(file)?;

    engine.rename_commit(&file, commit, name.clone())?;
    println!("{} commit {} to {}", "✓ Renamed".green().bold(), commit, name.bold());

    Ok(())
}
