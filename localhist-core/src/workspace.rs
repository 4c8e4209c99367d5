use crate::config::HistoryConfig;
use crate::error::{Error, Result};
use crate::ignore::{IgnoreRules, IGNORE_FILE};
use std::path::{Component, Path, PathBuf};

/// Everything the engine needs to know about one workspace root. Built once
/// when the workspace is opened; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    history_dir: String,
    config: HistoryConfig,
}

impl Workspace {
    pub fn new<P: Into<PathBuf>>(root: P, config: HistoryConfig) -> Result<Self> {
        config.validate()?;
        let history_dir = Path::new(&config.history_dir)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(Self {
            root: root.into(),
            history_dir,
            config,
        })
    }

    /// Opens `root`: reads `.localhist.toml`, creates the history directory
    /// and a default ignore file when missing.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().canonicalize()?;
        let config = HistoryConfig::load(&root)?;
        let workspace = Self::new(root, config)?;

        std::fs::create_dir_all(workspace.history_path())?;
        IgnoreRules::write_default(&workspace.history_path())?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// History directory relative to the root, `/` separated.
    pub fn history_dir(&self) -> &str {
        &self.history_dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.root.join(&self.history_dir)
    }

    /// Relative path of the ignore file, which is itself never tracked.
    pub fn ignore_file(&self) -> String {
        format!("{}/{}", self.history_dir, IGNORE_FILE)
    }

    pub fn load_ignore_rules(&self) -> Result<IgnoreRules> {
        IgnoreRules::load(&self.history_path(), &self.history_dir)
    }

    /// Identity of `file` inside the workspace: its path relative to the
    /// root with `/` separators. Absolute paths must live under the root.
    pub fn relative_path(&self, file: &Path) -> Result<String> {
        let invalid = || Error::InvalidPath(file.display().to_string());

        let relative = if file.is_absolute() {
            match file.strip_prefix(&self.root) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => file
                    .canonicalize()
                    .ok()
                    .and_then(|c| c.strip_prefix(&self.root).ok().map(Path::to_path_buf))
                    .ok_or_else(invalid)?,
            }
        } else {
            file.to_path_buf()
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
                Component::CurDir => {}
                _ => return Err(invalid()),
            }
        }

        if parts.is_empty() {
            return Err(invalid());
        }
        Ok(parts.join("/"))
    }

    pub fn absolute_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}
