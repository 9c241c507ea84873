//! Database module: write models and SQL repositories.
//!
//! - `model`: field sets passed into repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//! - `store`: the [`SyncStore`] seam the sync engine talks to, with its
//!   SQLite implementation.

pub mod model;
pub mod repo;
pub mod store;

pub use repo::*;

pub use model::{BlogPostFields, NewProject, ProjectStats, RepoFields};
pub use store::{CacheInvalidator, SqliteStore, SyncStore};
