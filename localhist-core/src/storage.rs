use crate::error::{Error, Result};
use crate::models::{epoch_millis, Commit, Patch, PatchChain};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

const RECORD_EXTENSION: &str = ".json";

/// One JSON record per tracked file under the history directory, at
/// `<history>/<relative path>.json`.
#[derive(Debug, Clone)]
pub struct Store {
    history_path: PathBuf,
}

impl Store {
    pub fn new<P: Into<PathBuf>>(history_path: P) -> Self {
        Self {
            history_path: history_path.into(),
        }
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn record_path(&self, source_file: &str) -> PathBuf {
        self.history_path
            .join(format!("{source_file}{RECORD_EXTENSION}"))
    }

    pub fn exists(&self, source_file: &str) -> bool {
        self.record_path(source_file).is_file()
    }

    pub fn read(&self, source_file: &str) -> Result<PatchChain> {
        let path = self.record_path(source_file);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(source_file.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        decode(&path, source_file, &bytes)
    }

    pub fn write(&self, chain: &PatchChain) -> Result<()> {
        let path = self.record_path(&chain.source_file);
        chain.validate().map_err(|reason| Error::InvalidRecord {
            path: path.clone(),
            reason,
        })?;

        let json = serde_json::to_vec_pretty(chain)?;
        write_atomic(&path, &json)?;
        debug!("Wrote history record {:?}", path);
        Ok(())
    }

    pub fn remove(&self, source_file: &str) -> Result<()> {
        match std::fs::remove_file(self.record_path(source_file)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(source_file.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the record of `from` to `to`. The new record is written before
    /// the old one is removed.
    pub fn rename(&self, from: &str, to: &str) -> Result<PatchChain> {
        if self.exists(to) {
            return Err(Error::InvalidOperation(format!(
                "history for {to} already exists"
            )));
        }
        let mut chain = self.read(from)?;
        chain.source_file = to.to_string();
        self.write(&chain)?;
        self.remove(from)?;
        Ok(chain)
    }

    /// Relative paths of every file that has a record, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.history_path) {
            let entry = entry.map_err(|e| {
                e.into_io_error()
                    .unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop")
                    })
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.history_path) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if let Some(source_file) = relative.strip_suffix(RECORD_EXTENSION) {
                files.push(source_file.to_string());
            }
        }

        files.sort();
        Ok(files)
    }
}

/// Replaces `path` with `bytes` through a temporary file in the same
/// directory, so readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    if let Ok(metadata) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn decode(path: &Path, source_file: &str, bytes: &[u8]) -> Result<PatchChain> {
    let invalid = |reason: String| Error::InvalidRecord {
        path: path.to_path_buf(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;

    let chain = if value.get("patches").is_some() {
        warn!("Migrating legacy history record {:?}", path);
        serde_json::from_value::<LegacyRecord>(value)
            .map_err(|e| invalid(e.to_string()))?
            .migrate()
    } else {
        serde_json::from_value::<PatchChain>(value).map_err(|e| invalid(e.to_string()))?
    };

    chain.validate().map_err(invalid)?;
    if chain.source_file.replace('\\', "/") != source_file {
        return Err(invalid(format!(
            "record belongs to {:?}, expected {:?}",
            chain.source_file, source_file
        )));
    }

    Ok(PatchChain {
        source_file: source_file.to_string(),
        ..chain
    })
}

/// Early layout: patches were shared by the whole file and only applied to
/// the active commit.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecord {
    source_file: String,
    active_commit: usize,
    active_patch: usize,
    commits: Vec<LegacyCommit>,
    patches: Vec<Patch>,
}

#[derive(Deserialize)]
struct LegacyCommit {
    name: String,
    content: String,
    #[serde(with = "epoch_millis")]
    date: DateTime<Utc>,
}

impl LegacyRecord {
    fn migrate(self) -> PatchChain {
        let LegacyRecord {
            source_file,
            active_commit,
            active_patch,
            commits,
            patches,
        } = self;
        let mut shared = Some(patches).filter(|patches| !patches.is_empty());

        let commits = commits
            .into_iter()
            .enumerate()
            .map(|(index, legacy)| {
                let mut commit = Commit {
                    name: legacy.name,
                    content: legacy.content,
                    active_patch_index: 0,
                    date: legacy.date,
                    patches: vec![Patch::null().with_date(legacy.date)],
                };
                if index == active_commit {
                    if let Some(patches) = shared.take() {
                        commit.patches = patches;
                        commit.active_patch_index = active_patch;
                    }
                }
                commit
            })
            .collect();

        PatchChain {
            source_file,
            active_commit_index: active_commit,
            commits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Retention;
    use similar_asserts::assert_eq;
    use tempfile::TempDir;

    fn sample_chain(source_file: &str) -> PatchChain {
        let mut chain = PatchChain::new(source_file);
        chain
            .record_edit("", "hello", Retention::unbounded())
            .unwrap();
        chain
            .record_edit("hello", "hello world", Retention::unbounded())
            .unwrap();
        chain
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join(".lh"));
        let chain = sample_chain("src/a.txt");

        store.write(&chain).unwrap();

        assert!(store.exists("src/a.txt"));
        assert!(dir.path().join(".lh/src/a.txt.json").is_file());
        let loaded = store.read("src/a.txt").unwrap();
        assert_eq!(loaded.commits.len(), 1);
        assert_eq!(loaded.get_patched(0, 1).unwrap(), "hello world");
    }

    #[test]
    fn test_missing_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());

        let err = store.read("nothing.txt").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.remove("nothing.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.write(&sample_chain("a.txt")).unwrap();
        store.write(&sample_chain("a.txt")).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt.json".to_string()]);
    }

    #[test]
    fn test_write_rejects_broken_invariants() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let mut chain = sample_chain("a.txt");
        chain.active_commit_index = 4;

        let err = store.write(&chain).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        assert!(!store.exists("a.txt"));
    }

    #[test]
    fn test_read_rejects_bad_shapes() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());

        std::fs::write(store.record_path("a.txt"), "{ not json").unwrap();
        assert!(matches!(
            store.read("a.txt"),
            Err(Error::InvalidRecord { .. })
        ));

        std::fs::write(
            store.record_path("a.txt"),
            r#"{"sourceFile":"a.txt","activeCommit":0,"commits":[{"name":"c","content":"x","activePatchIndex":2,"date":0,"patches":[]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            store.read("a.txt"),
            Err(Error::InvalidRecord { .. })
        ));

        std::fs::write(
            store.record_path("a.txt"),
            r#"{"sourceFile":"b.txt","activeCommit":0,"commits":[]}"#,
        )
        .unwrap();
        assert!(matches!(
            store.read("a.txt"),
            Err(Error::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_reads_iso_dated_record() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let patch = crate::diff::create_patch("base\n", "base\nmore\n");
        let record = serde_json::json!({
            "sourceFile": "a.txt",
            "activeCommit": 0,
            "commits": [{
                "content": "base\n",
                "name": "Commit-0",
                "activePatchIndex": 1,
                "patches": [
                    { "date": "2021-11-02T22:15:30.000Z", "content": crate::diff::create_patch("", "") },
                    { "date": "2021-11-02T22:16:30.000Z", "content": patch }
                ],
                "date": "2021-11-02T22:15:30.000Z"
            }]
        });
        std::fs::write(store.record_path("a.txt"), record.to_string()).unwrap();

        let chain = store.read("a.txt").unwrap();
        assert_eq!(chain.current_content().unwrap(), "base\nmore\n");
        assert_eq!(chain.commits[0].date.timestamp(), 1_635_891_330);
    }

    #[test]
    fn test_migrates_legacy_layout() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let null_patch = "Index: \n===================================================================\n--- \n+++ \n";
        let record = serde_json::json!({
            "sourceFile": "a.txt",
            "activeCommit": 1,
            "activePatch": 1,
            "commits": [
                { "name": "Commit-0", "date": "11/02/2021, 10:15:30 PM", "content": "old" },
                { "name": "Commit-1", "date": "11/02/2021, 10:20:00 PM", "content": "one\n" }
            ],
            "patches": [
                { "date": "11/02/2021, 10:20:00 PM", "content": null_patch },
                { "date": "11/02/2021, 10:21:00 PM", "content": crate::diff::create_patch("one\n", "one\ntwo\n") }
            ]
        });
        std::fs::write(store.record_path("a.txt"), record.to_string()).unwrap();

        let chain = store.read("a.txt").unwrap();

        assert_eq!(chain.active_commit_index, 1);
        assert_eq!(chain.commits[0].patches.len(), 1);
        assert_eq!(chain.commits[0].current_content().unwrap(), "old");
        assert_eq!(chain.commits[1].patches.len(), 2);
        assert_eq!(chain.current_content().unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_list_rename_remove() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join(".lh"));
        assert!(store.list().unwrap().is_empty());

        store.write(&sample_chain("b.txt")).unwrap();
        store.write(&sample_chain("src/nested/a.rs")).unwrap();
        assert_eq!(
            store.list().unwrap(),
            vec!["b.txt".to_string(), "src/nested/a.rs".to_string()]
        );

        let moved = store.rename("b.txt", "docs/b.md").unwrap();
        assert_eq!(moved.source_file, "docs/b.md");
        assert!(!store.exists("b.txt"));
        assert_eq!(store.read("docs/b.md").unwrap().source_file, "docs/b.md");
        assert!(store.rename("docs/b.md", "src/nested/a.rs").is_err());

        store.remove("docs/b.md").unwrap();
        assert_eq!(store.list().unwrap(), vec!["src/nested/a.rs".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("script.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&path, b"#!/bin/sh\necho hi\n").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "#!/bin/sh\necho hi\n");
    }
}
