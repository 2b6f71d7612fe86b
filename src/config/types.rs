use crate::state::StatusPreference;
use serde::Deserialize;

/// Main configuration structure for Blog-Harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub content: ContentConfig,
    pub output: OutputConfig,
}

/// Worker pool and per-blog state machine tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: u32,

    /// Which recorded crawl status to prefer when claiming a blog
    #[serde(default)]
    pub status_preference: StatusPreference,

    /// Consecutive failed page fetches tolerated before dropping a blog for this cycle
    #[serde(default = "default_max_response_errors")]
    pub max_response_errors: u32,

    /// Attempts per logical fetch before giving up on it
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,

    /// Accumulated duplicate posts after which a blog is considered caught up
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: u32,

    /// Keep paging even when duplicates pile up
    #[serde(default)]
    pub ignore_duplicates: bool,

    /// "Service temporarily unavailable" answers tolerated before the blog is parked
    #[serde(default = "default_service_unavailable_limit")]
    pub service_unavailable_limit: u32,

    /// Consecutive empty pages skipped (one offset at a time) before assuming EOF
    #[serde(default = "default_max_empty_skips")]
    pub max_empty_skips: u32,

    /// Sleep between claim attempts when no blog is available (milliseconds)
    #[serde(default = "default_claim_poll_interval_ms")]
    pub claim_poll_interval_ms: u64,

    /// Base delay between retries of a failed request (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Ask the API for reblog attribution fields
    #[serde(default = "default_true")]
    pub reblog_info: bool,

    /// Ask the API for note details
    #[serde(default)]
    pub notes_info: bool,
}

/// Remote API endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL, e.g. "https://api.tumblr.com/v2"
    pub base_url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Global limiter: at most `max_calls` requests per `period_secs`
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

/// API key pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialConfig {
    /// JSON snapshot holding the `api_keys` array
    #[serde(default = "default_credential_snapshot")]
    pub snapshot_path: String,

    /// Token bucket refill tick (seconds)
    #[serde(default = "default_refill_interval_secs")]
    pub refill_interval_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_credential_snapshot(),
            refill_interval_secs: default_refill_interval_secs(),
        }
    }
}

/// Proxy pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EgressConfig {
    /// Route requests through proxies; direct requests when false
    #[serde(default)]
    pub enabled: bool,

    /// JSON snapshot holding the `proxies` array
    #[serde(default = "default_egress_snapshot")]
    pub snapshot_path: String,

    /// Plain-text candidate list, one `host:port` per line
    #[serde(default)]
    pub source_url: String,

    /// Known-good endpoint used to validate candidates
    #[serde(default)]
    pub probe_url: String,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Validated entries wanted after a refill
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: usize,

    #[serde(default = "default_max_refill_attempts")]
    pub max_refill_attempts: u32,

    /// Concurrent validation probes
    #[serde(default = "default_validation_concurrency")]
    pub validation_concurrency: usize,

    /// In-flight failures after which an entry is blacklisted instead of dropped
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            snapshot_path: default_egress_snapshot(),
            source_url: String::new(),
            probe_url: String::new(),
            probe_timeout_secs: default_probe_timeout_secs(),
            min_pool_size: default_min_pool_size(),
            max_refill_attempts: default_max_refill_attempts(),
            validation_concurrency: default_validation_concurrency(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Content extraction configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContentConfig {
    /// Substrings that disqualify an extracted URL
    #[serde(default)]
    pub blacklisted_domains: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}

fn default_true() -> bool {
    true
}

fn default_max_response_errors() -> u32 {
    10
}

fn default_max_fetch_attempts() -> u32 {
    10
}

fn default_duplicate_threshold() -> u32 {
    200
}

fn default_service_unavailable_limit() -> u32 {
    50
}

fn default_max_empty_skips() -> u32 {
    20
}

fn default_claim_poll_interval_ms() -> u64 {
    2000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_calls() -> u32 {
    250
}

fn default_period_secs() -> u64 {
    60
}

fn default_credential_snapshot() -> String {
    "api_keys.json".to_string()
}

fn default_refill_interval_secs() -> u64 {
    5
}

fn default_egress_snapshot() -> String {
    "proxies.json".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_min_pool_size() -> usize {
    10
}

fn default_max_refill_attempts() -> u32 {
    5
}

fn default_validation_concurrency() -> usize {
    10
}

fn default_failure_threshold() -> u32 {
    3
}
