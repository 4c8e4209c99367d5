pub mod commit;
pub mod delete;
pub mod diff;
pub mod files;
pub mod log;
pub mod record;
pub mod rename;
pub mod restore;
pub mod show;
pub mod start;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use localhist_core::Engine;
use std::path::{Path, PathBuf};
use tracing::debug;

pub fn open_engine(root: &Path) -> Result<Engine> {
    let engine = Engine::open(root)
        .with_context(|| format!("Failed to open workspace {}", root.display()))?;
    debug!("Opened workspace {:?}", engine.workspace().root());
    Ok(engine)
}

/// Relative paths on the command line are relative to the current directory,
/// not to the workspace root.
pub fn target_file(file: PathBuf) -> Result<PathBuf> {
    if file.is_absolute() {
        return Ok(file);
    }
    Ok(std::env::current_dir()?.join(file))
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_file_keeps_absolute_paths() {
        let file = std::env::temp_dir().join("notes.txt");
        assert_eq!(target_file(file.clone()).unwrap(), file);
    }

    #[test]
    fn test_target_file_resolves_against_cwd() {
        let resolved = target_file(PathBuf::from("src/main.rs")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("src/main.rs"));
    }
}
