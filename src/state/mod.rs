//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `BlogCrawlState`: durable per-blog progress (offset, totals, status, claim flag)
//! - `CrawlStatus` / `Health` / `CrawlingFlag`: the enumerations stored with each blog
//! - `UpdatePayload`: the transient result of one page fetch

mod blog_state;
mod payload;

// Re-export main types
pub use blog_state::{BlogCrawlState, CrawlStatus, CrawlingFlag, Health, StatusPreference};
pub use payload::{HttpMeta, UpdatePayload};
