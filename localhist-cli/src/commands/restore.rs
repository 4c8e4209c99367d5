use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, commit: Option<usize>, patch: Option<usize>) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let file = super::target_file(file)?;

    match (commit, patch) {
        (commit, Some(patch)) => {
            engine.restore_patch(&file, patch, commit)?;
            let chain = engine.load(&file)?;
            println!(
                "{} {} to patch {} of commit {}",
                "✓ Restored".green().bold(),
                chain.source_file,
                patch,
                chain.active_commit_index
            );
        }
        (Some(commit), None) => {
            engine.restore_commit(&file, commit)?;
            let chain = engine.load(&file)?;
            println!(
                "{} {} to commit {} ({})",
                "✓ Restored".green().bold(),
                chain.source_file,
                commit,
                chain.commit(commit)?.name
            );
        }
        (None, None) => anyhow::bail!("Nothing to restore: pass --commit or --patch"),
    }

    Ok(())
}
