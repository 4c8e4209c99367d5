use anyhow::Result;
use std::path::PathBuf;

pub fn run(root: PathBuf, file: PathBuf, commit: Option<usize>, patch: Option<usize>) -> Result<()> {
    let engine = super::open_engine(&root)?;
    let chain = engine.load(&super::target_file(file)?)?;

    let commit = commit.unwrap_or(chain.active_commit_index);
    let patch = match patch {
        Some(patch) => patch,
        None => chain.commit(commit)?.active_patch_index,
    };

    print!("{}", chain.get_patched(commit, patch)?);
    Ok(())
}
