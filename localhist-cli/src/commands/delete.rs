use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, commit: usize, yes: bool) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let file = super::target_file(file)?;
    let chain = engine.load(&file)?;
    let target = chain.commit(commit)?;

    println!("{}", "Delete Preview".bold().cyan());
    println!("  {}: {}", "File".bold(), chain.source_file);
    println!("  {}: {} ({})", "Commit".bold(), commit, target.name);
    println!("  {}: {}", "Date".bold(), super::format_date(target.date));
    println!("  {}: {}", "Patches".bold(), target.patches.len() - 1);
    println!();

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt("Delete this commit and its patches?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    engine.delete_commit(&file, commit)?;
    println!("{}", "✓ Commit deleted".green().bold());

    Ok(())
}
