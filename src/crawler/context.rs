//! Shared handles passed to every worker

use crate::config::Config;
use crate::content::ContentExtractor;
use crate::crawler::api::ApiClient;
use crate::crawler::Shutdown;
use crate::pool::{CredentialPool, EgressPool, RateLimiter};
use crate::storage::BlogStore;
use std::sync::Arc;
use std::time::Duration;

/// Everything a worker needs, built once and shared behind an `Arc`
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn BlogStore>,
    pub credentials: Arc<CredentialPool>,
    /// `None` when requests go out directly
    pub egress: Option<Arc<EgressPool>>,
    pub limiter: Arc<RateLimiter>,
    pub api: ApiClient,
    pub extractor: ContentExtractor,
    pub shutdown: Shutdown,
}

impl WorkerContext {
    pub fn new(
        config: Config,
        store: Arc<dyn BlogStore>,
        credentials: Arc<CredentialPool>,
        egress: Option<Arc<EgressPool>>,
        shutdown: Shutdown,
    ) -> Self {
        let limiter = RateLimiter::new(
            config.api.max_calls.max(1) as usize,
            Duration::from_secs(config.api.period_secs.max(1)),
        );

        Self {
            api: ApiClient::new(&config),
            extractor: ContentExtractor::new(config.content.blacklisted_domains.clone()),
            limiter: Arc::new(limiter),
            config: Arc::new(config),
            store,
            credentials,
            egress,
            shutdown,
        }
    }
}
