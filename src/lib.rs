//! Blog-Harvester: a resumable, rate-aware blog post harvester
//!
//! This crate continuously pages through the posts of many independent blogs on a
//! remote blogging API, spreading requests over a pool of API keys and a pool of
//! outbound proxies while keeping per-blog crawl progress durable across restarts.

pub mod config;
pub mod content;
pub mod crawler;
pub mod pool;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Blog-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Pool error: {0}")]
    Pool(#[from] pool::PoolError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Blog-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Orchestrator, Shutdown};
pub use state::{BlogCrawlState, CrawlStatus, CrawlingFlag, Health};
