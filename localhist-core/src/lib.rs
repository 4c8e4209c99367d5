//! # localhist-core
//!
//! Core library for localhist - a per-file local history kept as patch chains.
//!
//! Every tracked file owns one [`PatchChain`]: a list of full-text commits,
//! each followed by the unified diffs recorded on later saves. This crate
//! provides the chain model and replay, the diff codec, the JSON record
//! store and the [`Engine`] that ties them to a workspace directory.

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod ignore;
pub mod models;
pub mod storage;
pub mod workspace;

pub use config::{HistoryConfig, Retention};
pub use engine::Engine;
pub use error::{Error, PatchError, Result};
pub use ignore::IgnoreRules;
pub use models::{Commit, EditOutcome, Patch, PatchChain};
pub use storage::Store;
pub use workspace::Workspace;
