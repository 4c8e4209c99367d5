use localhist_core::{EditOutcome, Engine};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Feeds file system saves under the workspace root into the engine.
pub struct FileWatcher {
    _engine: Arc<Engine>,
    _debouncer: Debouncer<notify::RecommendedWatcher, FileIdMap>,
}

impl FileWatcher {
    pub fn new(engine: Arc<Engine>) -> anyhow::Result<Self> {
        let root_path = engine.workspace().root().to_path_buf();
        let engine_clone = Arc::clone(&engine);

        let (tx, mut rx) = mpsc::channel(100);

        let debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| {
                if let Err(e) = tx.blocking_send(result) {
                    error!("Failed to send event: {}", e);
                }
            },
        )?;

        let mut watcher = Self {
            _engine: engine,
            _debouncer: debouncer,
        };

        watcher
            ._debouncer
            .watcher()
            .watch(&root_path, RecursiveMode::Recursive)?;

        info!("File watcher started for {:?}", root_path);

        tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                match result {
                    Ok(events) => {
                        for event in events {
                            if let Err(e) = Self::handle_event(event.event, &engine_clone) {
                                error!("Error handling event: {}", e);
                            }
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            error!("Watch error: {:?}", error);
                        }
                    }
                }
            }
        });

        Ok(watcher)
    }

    fn handle_event(event: Event, engine: &Engine) -> anyhow::Result<()> {
        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
                let (from, to) = (&event.paths[0], &event.paths[1]);
                if Self::should_ignore(to, engine) {
                    return Ok(());
                }
                if engine.rename_file(from, to)? {
                    info!("File renamed: {:?} -> {:?}", from, to);
                }
                // The renamed file may also carry new content, e.g. an editor
                // saving through a temporary file.
                Self::record_save(to, engine)?;
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in &event.paths {
                    if !Self::should_ignore(path, engine) {
                        Self::record_save(path, engine)?;
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    if !Self::should_ignore(path, engine) {
                        info!("File removed: {:?}, keeping its history", path);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Records the current content of `path`. The watcher only sees the file
    /// after the write, so the disk content is also the new content.
    fn record_save(path: &Path, engine: &Engine) -> anyhow::Result<()> {
        if !path.is_file() {
            return Ok(());
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                return Ok(());
            }
        };

        match engine.record_edit(path, &content, &content)? {
            EditOutcome::Committed { commit } => info!("File tracked: {:?} (commit {})", path, commit),
            EditOutcome::Patched { patch, .. } => info!("File modified: {:?} (patch {})", path, patch),
            outcome => debug!("File event for {:?}: {:?}", path, outcome),
        }
        Ok(())
    }

    /// Paths outside the workspace and paths matched by the ignore rules.
    fn should_ignore(path: &Path, engine: &Engine) -> bool {
        engine.is_ignored(path).unwrap_or(true)
    }
}
