use anyhow::Result;
use colored::Colorize;
use localhist_core::diff::{DiffLineType, UnifiedPatch};
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, commit: Option<usize>, patch: Option<usize>) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let chain = engine.load(&super::target_file(file)?)?;

    let commit_index = commit.unwrap_or(chain.active_commit_index);
    let commit = chain.commit(commit_index)?;
    let patch_index = patch.unwrap_or(commit.active_patch_index);
    let patch = commit
        .patches
        .get(patch_index)
        .ok_or_else(|| anyhow::anyhow!("Commit {} has no patch {}", commit_index, patch_index))?;

    println!(
        "{}",
        format!("Patch {} of commit {} ({})", patch_index, commit_index, commit.name)
            .bold()
            .cyan()
    );
    println!("{}: {}", "Date".bold(), super::format_date(patch.date));
    println!();

    let parsed: UnifiedPatch = patch.content.parse()?;
    if parsed.is_empty() {
        println!("{}", "No changes".green());
        return Ok(());
    }

    for hunk in &parsed.hunks {
        println!("{}", hunk.header().cyan());
        for line in &hunk.lines {
            let (prefix, color): (&str, fn(&str) -> colored::ColoredString) = match line.line_type {
                DiffLineType::Addition => ("+", |s| s.green()),
                DiffLineType::Deletion => ("-", |s| s.red()),
                DiffLineType::Context => (" ", |s| s.normal()),
            };
            println!("{}", color(&format!("{}{}", prefix, line.text())));
            if !line.has_newline() {
                println!("{}", "\\ No newline at end of file".dimmed());
            }
        }
    }

    Ok(())
}
