use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Component, Path};
use std::time::Duration;

/// Optional per-workspace configuration file, relative to the root.
pub const CONFIG_FILE: &str = ".localhist.toml";

pub const DEFAULT_HISTORY_DIR: &str = ".lh";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Directory, relative to the workspace root, that holds the records.
    pub history_dir: String,
    /// Upper bound on patches per commit, sentinel included.
    pub max_patches: Option<usize>,
    /// Edits closer than this to the previous recorded patch are dropped.
    pub patch_delay_ms: u64,
    pub clear_patches_on_new_commit: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_dir: DEFAULT_HISTORY_DIR.to_string(),
            max_patches: None,
            patch_delay_ms: 0,
            clear_patches_on_new_commit: false,
        }
    }
}

impl HistoryConfig {
    /// Reads `<root>/.localhist.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dir = Path::new(&self.history_dir);
        let relative = dir
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if self.history_dir.is_empty() || !relative {
            return Err(Error::Config(format!(
                "history_dir must be a relative path inside the workspace, got {:?}",
                self.history_dir
            )));
        }

        if let Some(max) = self.max_patches {
            if max < 2 {
                return Err(Error::Config(format!(
                    "max_patches must be at least 2 (the sentinel plus one patch), got {max}"
                )));
            }
        }

        Ok(())
    }

    pub fn patch_delay(&self) -> Duration {
        Duration::from_millis(self.patch_delay_ms)
    }

    pub fn retention(&self) -> Retention {
        Retention {
            max_patches: self.max_patches,
            clear_on_new_commit: self.clear_patches_on_new_commit,
        }
    }
}

/// Retention knobs threaded into the chain mutations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Retention {
    pub max_patches: Option<usize>,
    pub clear_on_new_commit: bool,
}

impl Retention {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_patches(max_patches: usize) -> Self {
        Self {
            max_patches: Some(max_patches),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = HistoryConfig::load(dir.path()).unwrap();

        assert_eq!(config, HistoryConfig::default());
        assert_eq!(config.history_dir, ".lh");
        assert_eq!(config.patch_delay(), Duration::ZERO);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "max_patches = 10\npatch_delay_ms = 250\n",
        )
        .unwrap();

        let config = HistoryConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_patches, Some(10));
        assert_eq!(config.patch_delay(), Duration::from_millis(250));
        assert_eq!(config.history_dir, ".lh");
        assert!(!config.retention().clear_on_new_commit);
    }

    #[test]
    fn test_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "max_patches = 1\n").unwrap();
        assert!(matches!(
            HistoryConfig::load(dir.path()),
            Err(Error::Config(_))
        ));

        std::fs::write(dir.path().join(CONFIG_FILE), "history_dir = \"../out\"\n").unwrap();
        assert!(matches!(
            HistoryConfig::load(dir.path()),
            Err(Error::Config(_))
        ));

        std::fs::write(dir.path().join(CONFIG_FILE), "unknown_key = true\n").unwrap();
        assert!(matches!(
            HistoryConfig::load(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
