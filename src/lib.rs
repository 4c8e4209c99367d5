//! # localhist
//!
//! Per-file local version history. Re-exports the engine and the server so
//! that embedders only need a single dependency.

pub use localhist_core as core;
pub use localhist_server as server;

pub use localhist_core::{Engine, Error, Result, Workspace};
