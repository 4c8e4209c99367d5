use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, json: bool) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let chain = engine.load(&super::target_file(file)?)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chain)?);
        return Ok(());
    }

    println!("{}", format!("History of {}", chain.source_file).bold().cyan());
    println!();

    for (index, commit) in chain.commits.iter().enumerate() {
        let active = index == chain.active_commit_index;
        let marker = if active { "*".green().bold() } else { " ".normal() };

        println!(
            "{} {} {} {}",
            marker,
            "commit".yellow().bold(),
            index.to_string().yellow(),
            commit.name.bold()
        );
        println!("    {}: {}", "Date".bold(), super::format_date(commit.date));
        println!(
            "    {} patch(es), active {}",
            (commit.patches.len() - 1).to_string().cyan(),
            commit.active_patch_index.to_string().cyan()
        );

        if active {
            for (patch_index, patch) in commit.patches.iter().enumerate().skip(1) {
                let marker = if patch_index == commit.active_patch_index {
                    "→".green()
                } else {
                    " ".normal()
                };
                println!(
                    "      {} {} {}",
                    marker,
                    format!("patch {}", patch_index).dimmed(),
                    super::format_date(patch.date).dimmed()
                );
            }
        }

        println!();
    }

    Ok(())
}
