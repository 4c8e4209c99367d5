use crate::config::Retention;
use crate::error::{Error, Result};
use crate::ignore::IgnoreRules;
use crate::models::{EditOutcome, PatchChain};
use crate::storage::{write_atomic, Store};
use crate::workspace::Workspace;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Entry point used by every collaborator (watcher, API, CLI).
///
/// Each operation loads the file's chain from the store, mutates it and
/// writes it back while holding that file's lock, so concurrent calls for
/// the same file are serialized and calls for different files never wait on
/// each other.
pub struct Engine {
    workspace: Workspace,
    store: Store,
    ignore: RwLock<IgnoreRules>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn new(workspace: Workspace) -> Result<Self> {
        let ignore = workspace.load_ignore_rules()?;
        Ok(Self {
            store: Store::new(workspace.history_path()),
            workspace,
            ignore: RwLock::new(ignore),
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the workspace at `root` and builds an engine for it.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::new(Workspace::open(root)?)
    }

    pub fn with_ignore_rules(self, rules: IgnoreRules) -> Self {
        *self.ignore.write().unwrap_or_else(PoisonError::into_inner) = rules;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn retention(&self) -> Retention {
        self.workspace.config().retention()
    }

    pub fn reload_ignore_rules(&self) -> Result<()> {
        let rules = self.workspace.load_ignore_rules()?;
        *self.ignore.write().unwrap_or_else(PoisonError::into_inner) = rules;
        info!("Reloaded ignore rules");
        Ok(())
    }

    pub fn is_ignored(&self, file: &Path) -> Result<bool> {
        let source_file = self.workspace.relative_path(file)?;
        Ok(self.is_ignored_relative(&source_file))
    }

    fn is_ignored_relative(&self, source_file: &str) -> bool {
        self.ignore
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_ignored(source_file)
    }

    fn file_lock(&self, source_file: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(source_file.to_string()).or_default())
    }

    /// Drops the map entry of `source_file` once no other caller holds or
    /// waits on its lock. Clones are only handed out under the map lock, so
    /// the count cannot grow while it is checked.
    fn release_lock(&self, source_file: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(source_file)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(source_file);
        }
    }

    fn locked<T>(&self, source_file: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.file_lock(source_file);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            op()
        };
        self.release_lock(source_file, lock);
        result
    }

    fn load_or_new(&self, source_file: &str) -> Result<PatchChain> {
        match self.store.read(source_file) {
            Err(e) if e.is_not_found() => Ok(PatchChain::new(source_file)),
            other => other,
        }
    }

    fn tracked_relative(&self, file: &Path) -> Result<String> {
        let source_file = self.workspace.relative_path(file)?;
        if self.is_ignored_relative(&source_file) {
            return Err(Error::InvalidOperation(format!(
                "{source_file} is excluded from local history"
            )));
        }
        Ok(source_file)
    }

    /// Records a save of `file`. `disk_data` is the content on disk when the
    /// save started, `new_data` the content being written.
    pub fn record_edit(&self, file: &Path, disk_data: &str, new_data: &str) -> Result<EditOutcome> {
        let source_file = self.workspace.relative_path(file)?;
        if source_file == self.workspace.ignore_file() {
            self.reload_ignore_rules()?;
        }
        if self.is_ignored_relative(&source_file) {
            debug!("Ignoring save of {}", source_file);
            return Ok(EditOutcome::Ignored);
        }

        self.locked(&source_file, || {
            let mut chain = self.load_or_new(&source_file)?;

            let delay = self.workspace.config().patch_delay();
            if let (false, Ok(commit)) = (delay.is_zero(), chain.active_commit()) {
                let elapsed = Utc::now().signed_duration_since(commit.last_recorded());
                if elapsed.to_std().is_ok_and(|elapsed| elapsed < delay) {
                    debug!("Skipping save of {} within patch delay", source_file);
                    return Ok(EditOutcome::Debounced);
                }
            }

            let outcome = chain.record_edit(disk_data, new_data, self.retention())?;
            match outcome {
                EditOutcome::Unchanged => {
                    debug!("No change recorded for {}", source_file);
                    return Ok(outcome);
                }
                EditOutcome::Committed { commit } => {
                    info!("Started history for {} (commit {})", source_file, commit)
                }
                EditOutcome::Patched { commit, patch } => {
                    debug!("Recorded patch {} of commit {} for {}", patch, commit, source_file)
                }
                EditOutcome::Ignored | EditOutcome::Debounced => {}
            }

            self.store.write(&chain)?;
            Ok(outcome)
        })
    }

    /// Takes a named snapshot of `content`. Returns the new commit's index.
    pub fn create_commit(&self, file: &Path, content: &str, name: Option<String>) -> Result<usize> {
        let source_file = self.tracked_relative(file)?;

        self.locked(&source_file, || {
            let mut chain = self.load_or_new(&source_file)?;
            let index = chain.new_commit(content.to_string(), name, self.retention());
            self.store.write(&chain)?;

            info!(
                "Created commit {} ({:?}) for {}",
                index, chain.commits[index].name, source_file
            );
            Ok(index)
        })
    }

    /// Writes the snapshot of `commits[index]` to the tracked file and makes
    /// that commit active.
    pub fn restore_commit(&self, file: &Path, index: usize) -> Result<()> {
        let source_file = self.workspace.relative_path(file)?;

        self.locked(&source_file, || {
            let before = self.store.read(&source_file)?;
            let mut chain = before.clone();
            let content = chain.restore_commit(index)?;
            self.commit_restore(&before, &chain, &content)?;

            info!("Restored {} to commit {}", source_file, index);
            Ok(())
        })
    }

    /// Writes the state after patch `index` of a commit (the active one by
    /// default) to the tracked file and makes it active.
    pub fn restore_patch(&self, file: &Path, index: usize, commit_index: Option<usize>) -> Result<()> {
        let source_file = self.workspace.relative_path(file)?;

        self.locked(&source_file, || {
            let before = self.store.read(&source_file)?;
            let mut chain = before.clone();
            let content = chain.restore_patch(index, commit_index)?;
            self.commit_restore(&before, &chain, &content)?;

            info!(
                "Restored {} to patch {} of commit {}",
                source_file, index, chain.active_commit_index
            );
            Ok(())
        })
    }

    pub fn delete_commit(&self, file: &Path, index: usize) -> Result<()> {
        let source_file = self.workspace.relative_path(file)?;

        self.locked(&source_file, || {
            let mut chain = self.store.read(&source_file)?;
            let removed = chain.delete_commit(index)?;
            self.store.write(&chain)?;

            info!("Deleted commit {} ({:?}) of {}", index, removed.name, source_file);
            Ok(())
        })
    }

    pub fn rename_commit(&self, file: &Path, index: usize, name: String) -> Result<()> {
        let source_file = self.workspace.relative_path(file)?;

        self.locked(&source_file, || {
            let mut chain = self.store.read(&source_file)?;
            chain.rename_commit(index, name)?;
            self.store.write(&chain)
        })
    }

    /// The persisted chain of `file`; `NotFound` means the file is untracked.
    pub fn load(&self, file: &Path) -> Result<PatchChain> {
        let source_file = self.workspace.relative_path(file)?;
        self.store.read(&source_file)
    }

    /// Moves the history of `from` to `to` after the file itself was renamed.
    /// Returns `false` when `from` had no history.
    pub fn rename_file(&self, from: &Path, to: &Path) -> Result<bool> {
        let from = self.workspace.relative_path(from)?;
        let to = self.workspace.relative_path(to)?;
        if from == to {
            return Ok(false);
        }

        // Both locks, always taken in the same order.
        let (first, second) = if from < to { (&from, &to) } else { (&to, &from) };
        self.locked(first, || {
            self.locked(second, || {
                if !self.store.exists(&from) {
                    return Ok(false);
                }
                self.store.rename(&from, &to)?;
                info!("Moved history of {} to {}", from, to);
                Ok(true)
            })
        })
    }

    /// Drops the whole history of `file`.
    pub fn forget(&self, file: &Path) -> Result<()> {
        let source_file = self.workspace.relative_path(file)?;
        self.locked(&source_file, || self.store.remove(&source_file))?;
        info!("Removed history of {}", source_file);
        Ok(())
    }

    pub fn tracked_files(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Persists `chain` and writes `content` to the tracked file. When the
    /// file write fails the record is put back to `before`, so the history
    /// keeps pointing at what is on disk.
    fn commit_restore(&self, before: &PatchChain, chain: &PatchChain, content: &str) -> Result<()> {
        self.store.write(chain)?;

        let target = self.workspace.absolute_path(&chain.source_file);
        if let Err(e) = write_atomic(&target, content.as_bytes()) {
            warn!("Failed to write {:?}, reverting its history record: {}", target, e);
            self.store.write(before)?;
            return Err(e);
        }
        Ok(())
    }
}
