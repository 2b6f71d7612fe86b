//! Shared resource pools used by every worker
//!
//! - `ResourcePool<T>`: round-robin ring with an explicit cursor
//! - `RateLimiter`: sliding-window limiter for outbound API calls
//! - `CredentialPool`: API keys with hourly/daily token buckets
//! - `EgressPool`: validated outbound proxies, replenished from the network

mod credential;
mod egress;
mod rate_limiter;
mod ring;
mod snapshot;

pub use credential::{Credential, CredentialPool, DAY_CAP, HOUR_CAP};
pub use egress::{EgressEntry, EgressPool, ReplaceMode};
pub use rate_limiter::RateLimiter;
pub use ring::ResourcePool;
pub use snapshot::{read_snapshot, write_snapshot};

use thiserror::Error;

/// Errors raised by the resource pools
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every credential is disabled, blacklisted or out of tokens
    #[error("credential pool depleted; next key available at {next_available_at}")]
    Depleted { next_available_at: i64 },

    /// No proxy could be obtained even after a network refill
    #[error("egress pool exhausted after refill")]
    EgressExhausted,

    #[error("snapshot {path} is invalid: {source}")]
    Snapshot {
        path: String,
        source: serde_json::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Current wall-clock time in epoch seconds
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}
