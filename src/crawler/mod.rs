//! Crawler module for harvesting blog posts
//!
//! This module contains the core crawling logic, including:
//! - The posts API client and response classification
//! - The per-blog crawl state machine with its retry policy
//! - The worker pool that claims blogs and drives the state machine
//! - The process-wide stop signal

pub mod api;
mod context;
mod machine;
mod orchestrator;
mod shutdown;

pub use api::{classify, ApiClient, ApiOutcome};
pub use context::WorkerContext;
pub use machine::{BlogCrawler, CrawlError, CycleOutcome, CycleReport};
pub use orchestrator::{Orchestrator, WorkerStats};
pub use shutdown::{install_ctrl_c, Shutdown};
