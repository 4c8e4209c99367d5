//! # localhist-server
//!
//! Server component for localhist that records saves from a file watcher and
//! exposes the history of every tracked file over a JSON API.

pub mod api;
pub mod server;
pub mod watcher;

pub use server::HistoryServer;
pub use watcher::FileWatcher;
