pub mod blog;
pub mod config;
pub mod db;
pub mod error;
pub mod github;
pub mod jobs;
pub mod mapper;
pub mod model;
pub mod propagate;
pub mod reconcile;
pub mod sync;

pub use error::{Result, SyncError};
pub use sync::{sync_blog, sync_github, SyncOptions, SyncReport};
