use crate::api::{create_router, AppState};
use crate::watcher::FileWatcher;
use localhist_core::Engine;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Watches a workspace and serves its history over HTTP.
pub struct HistoryServer {
    engine: Arc<Engine>,
    _watcher: FileWatcher,
}

impl HistoryServer {
    pub fn new<P: AsRef<Path>>(root_path: P) -> anyhow::Result<Self> {
        let engine = Arc::new(Engine::open(root_path)?);
        let watcher = FileWatcher::new(Arc::clone(&engine))?;

        Ok(Self {
            engine,
            _watcher: watcher,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let state = AppState {
            engine: Arc::clone(&self.engine),
        };

        let app = create_router(state);

        info!("Server listening on {}", addr);
        info!("Watching: {:?}", self.engine.workspace().root());
        info!("History directory: {:?}", self.engine.workspace().history_path());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
