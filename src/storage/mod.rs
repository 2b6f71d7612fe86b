//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Atomic claiming and release of blogs
//! - Per-blog crawl progress
//! - Post, URL and post/URL link persistence

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteBlogStore;
pub use traits::{BlogStore, InsertOutcome, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a blog store database
pub fn open_storage(path: &Path) -> StorageResult<SqliteBlogStore> {
    SqliteBlogStore::new(path)
}
