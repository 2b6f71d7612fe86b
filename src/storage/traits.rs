//! Storage traits and error types
//!
//! This module defines the trait interface for blog stores and associated error
//! types.

use crate::content::NewPost;
use crate::state::{BlogCrawlState, CrawlStatus, StatusPreference};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-batch result of `insert_posts`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub added: u64,
    pub failed: u64,
    pub duplicates: u64,
}

/// Trait for blog store implementations
///
/// Every method takes `&self`: implementations are shared by all workers and
/// provide their own locking. Multi-statement writes must be atomic with respect
/// to each other.
pub trait BlogStore: Send + Sync {
    /// Claims the next idle blog, preferring statuses per `preference`
    ///
    /// The returned blog is marked active in the same atomic step, so two callers
    /// can never receive the same blog.
    fn claim_next(&self, preference: StatusPreference) -> StorageResult<Option<BlogCrawlState>>;

    /// Writes the crawl fields of `state`, returning the values recorded before
    fn update_blog_info(&self, state: &BlogCrawlState) -> StorageResult<Option<BlogCrawlState>>;

    /// Inserts posts of `blog` in the given order
    fn insert_posts(&self, blog: &str, posts: &[NewPost]) -> StorageResult<InsertOutcome>;

    /// Recounts stored posts of `blog`
    fn scraped_count(&self, blog: &str) -> StorageResult<u64>;

    /// Clears the active flag of one blog
    fn reset_claim(&self, blog: &str) -> StorageResult<()>;

    /// Clears every claim left behind by a previous run; returns how many were reset
    fn reset_all_claims(&self) -> StorageResult<u64>;

    /// Registers a blog as NEW; false if it was already known
    fn add_blog(&self, blog: &str) -> StorageResult<bool>;

    fn get_blog(&self, blog: &str) -> StorageResult<Option<BlogCrawlState>>;

    // ===== Statistics =====

    /// Blog count per crawl status
    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>>;

    fn count_posts(&self) -> StorageResult<u64>;

    fn count_urls(&self) -> StorageResult<u64>;
}
