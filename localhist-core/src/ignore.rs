use crate::error::Result;
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Name of the ignore file inside the history directory.
pub const IGNORE_FILE: &str = ".lhignore";

const DEFAULT_IGNORE_FILE: &str = r"# Files the local history does not track. Lines starting with '#' are comments.
# Each line is a regular expression matched against the whole path relative to
# the workspace root, for example:
#   .*\.txt      ignores every file with a txt extension
#   test/.*      ignores everything under the top level test directory
#   .*/test/.*   ignores everything under any nested test directory
";

/// Whole-path regular expressions deciding which files are not tracked.
///
/// The history directory is always ignored, whatever the user patterns say.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    pub fn new<I, S>(history_dir: &str, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let own_dir = format!("{}(?:/.*)?", regex::escape(history_dir));
        let mut compiled = vec![anchored(&own_dir)?];
        for pattern in patterns {
            compiled.push(anchored(pattern.as_ref())?);
        }
        Ok(Self { patterns: compiled })
    }

    /// Parses ignore file text: one pattern per line, blank lines and lines
    /// starting with `#` skipped.
    pub fn parse(history_dir: &str, text: &str) -> Result<Self> {
        let patterns = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        Self::new(history_dir, patterns)
    }

    /// Loads `<history_path>/.lhignore`; a missing file means only the
    /// history directory is ignored.
    pub fn load(history_path: &Path, history_dir: &str) -> Result<Self> {
        let path = history_path.join(IGNORE_FILE);
        if !path.exists() {
            return Self::new(history_dir, std::iter::empty::<&str>());
        }
        let text = std::fs::read_to_string(&path)?;
        let rules = Self::parse(history_dir, &text)?;
        debug!("Loaded {} ignore patterns from {:?}", rules.patterns.len() - 1, path);
        Ok(rules)
    }

    /// Writes the commented template unless an ignore file already exists.
    pub fn write_default(history_path: &Path) -> Result<bool> {
        let path = history_path.join(IGNORE_FILE);
        if path.exists() {
            return Ok(false);
        }
        std::fs::create_dir_all(history_path)?;
        std::fs::write(&path, DEFAULT_IGNORE_FILE)?;
        Ok(true)
    }

    pub fn is_ignored(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(relative_path))
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})$"))?)
}
