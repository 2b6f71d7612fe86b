//! Per-blog crawl state machine
//!
//! A `BlogCrawler` is attached to one credential and (optionally) one proxy and
//! drives a claimed blog through a single cycle:
//!
//! 1. **Status check**: fetch the page at the recorded offset and compare the
//!    reported post count with the recorded one. A shrinking count is an anomaly
//!    and ends the cycle; a count of zero after having posts marks the blog wiped.
//! 2. **Offset correction**: new posts push older ones further down, so a
//!    resumed blog moves its offset by the number of new posts, and a finished
//!    blog starts an incremental pass from offset 0 targeting only the new posts.
//! 3. **Paging**: fetch, persist, advance, until the blog is exhausted, caught up
//!    (EOF or duplicate threshold), stopped, or out of error budget.
//! 4. **Finalization**: resolve DONE vs RESUME, release the claim unless the blog
//!    was parked, and always write the blog info back.
//!
//! # Retry policy
//!
//! | Outcome | Action |
//! |---------|--------|
//! | network/proxy failure | refund the use, rotate proxy, retry |
//! | malformed body / other status | back off, retry (bounded) |
//! | 403 / 404 / "Not Found" | blog is DEAD |
//! | 401 | strike and disable key, take another, retry |
//! | 429 | disable key for an hour, take another, retry |
//! | service unavailable | retry same offset (bounded), then park the blog |

use crate::content::NewPost;
use crate::crawler::api::ApiOutcome;
use crate::crawler::WorkerContext;
use crate::pool::{now_epoch, Credential, EgressEntry, PoolError};
use crate::state::{BlogCrawlState, CrawlStatus, CrawlingFlag, Health, UpdatePayload};
use crate::storage::StorageError;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// How long a key is disabled after a 401 or 429
const KEY_PENALTY: Duration = Duration::from_secs(3600);

/// Upper bound for a single retry backoff
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Conditions that end a fetch or a cycle
#[derive(Debug, Error)]
pub enum CrawlError {
    /// No credential is usable until `next_available_at`
    #[error("credential pool depleted; next key available at {next_available_at}")]
    Depleted { next_available_at: i64 },

    #[error("blog {blog} is gone ({status}: {message})")]
    TerminalEntity {
        blog: String,
        status: u16,
        message: String,
    },

    #[error("remote service temporarily unavailable")]
    TransientServer,

    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("no proxy available")]
    EgressExhausted,

    #[error("pool error: {0}")]
    Pool(PoolError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("shutdown requested")]
    Stopped,
}

impl From<PoolError> for CrawlError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::Depleted { next_available_at } => Self::Depleted { next_available_at },
            PoolError::EgressExhausted => Self::EgressExhausted,
            other => Self::Pool(other),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every post ingested; offset rewound
    Done,
    /// Progress saved; the next claim continues from the offset
    Resumable,
    Dead,
    Wiped,
    /// Finished blog without new posts
    UpToDate,
    /// Remote reported fewer posts than recorded
    Anomaly,
    /// Too many "service unavailable" answers; claim flag left at 2
    Parked,
    ErrorBudgetExhausted,
    Stopped,
    /// Ended by an error the caller must handle
    Aborted,
}

/// Summary of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub pages: u32,
    pub added: u64,
    pub duplicates: u64,
    pub failed: u64,
    /// State as written back to the store
    pub state: BlogCrawlState,
}

#[derive(Debug, Default)]
struct CycleStats {
    pages: u32,
    added: u64,
    duplicates: u64,
    failed: u64,
}

/// Drives one claimed blog through a crawl cycle
pub struct BlogCrawler<'a> {
    ctx: &'a WorkerContext,
    credential: Credential,
    egress: Option<EgressEntry>,
    client: Client,
    /// "Service unavailable" answers seen this cycle
    unavailable: u32,
}

impl<'a> BlogCrawler<'a> {
    /// Attaches a credential and, if enabled, a proxy
    pub async fn attach(ctx: &'a WorkerContext) -> Result<Self, CrawlError> {
        let credential = ctx.credentials.acquire_available()?;
        let egress = match &ctx.egress {
            Some(pool) => Some(pool.next().await?),
            None => None,
        };
        let client = ctx.api.client_for(egress.as_ref())?;

        Ok(Self {
            ctx,
            credential,
            egress,
            client,
            unavailable: 0,
        })
    }

    /// API key currently attached
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Runs one cycle and writes the final state back to the store
    ///
    /// Errors are only returned for conditions the worker must react to
    /// (credential depletion, proxy exhaustion, storage failures); the blog has
    /// already been persisted in a resumable state when they are returned.
    pub async fn run(&mut self, mut state: BlogCrawlState) -> Result<CycleReport, CrawlError> {
        let mut stats = CycleStats::default();
        self.unavailable = 0;

        let result = self.drive(&mut state, &mut stats).await;
        let (outcome, error) = match result {
            Ok(outcome) => (outcome, None),
            Err(CrawlError::TerminalEntity {
                blog,
                status,
                message,
            }) => {
                tracing::warn!(blog = %blog, status, "Blog is gone: {}", message);
                state.mark_dead();
                (CycleOutcome::Dead, None)
            }
            Err(CrawlError::TransientServer) => {
                tracing::warn!(
                    blog = %state.name,
                    offset = state.offset,
                    "Service unavailable {} times; parking blog",
                    self.unavailable
                );
                state.crawling = CrawlingFlag::TemporarilyDisabled;
                (CycleOutcome::Parked, None)
            }
            Err(CrawlError::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                tracing::warn!(
                    blog = %state.name,
                    offset = state.offset,
                    attempts,
                    "Dropping blog for this cycle: {}",
                    last_error
                );
                (CycleOutcome::ErrorBudgetExhausted, None)
            }
            Err(CrawlError::Stopped) => (CycleOutcome::Stopped, None),
            Err(e) => (CycleOutcome::Aborted, Some(e)),
        };

        let outcome = self.finalize(&mut state, outcome)?;
        if let Some(error) = error {
            return Err(error);
        }

        tracing::info!(
            blog = %state.name,
            ?outcome,
            pages = stats.pages,
            added = stats.added,
            duplicates = stats.duplicates,
            offset = state.offset,
            total = state.total_posts,
            "Cycle finished"
        );

        Ok(CycleReport {
            outcome,
            pages: stats.pages,
            added: stats.added,
            duplicates: stats.duplicates,
            failed: stats.failed,
            state,
        })
    }

    async fn drive(
        &mut self,
        state: &mut BlogCrawlState,
        stats: &mut CycleStats,
    ) -> Result<CycleOutcome, CrawlError> {
        let ctx = self.ctx;
        let config = &ctx.config.crawler;
        let previous_total = state.total_posts;
        state.eof = false;
        state.db_dupe_count = 0;

        let first = self.fetch_with_backoff(&state.name, state.offset).await?;
        state.last_checked = now_epoch();
        state.last_updated = first.updated;
        let total = first.total_posts;

        if total == 0 {
            if previous_total > 0 {
                tracing::warn!(blog = %state.name, previous_total, "Blog reports zero posts; marking wiped");
                state.health = Health::Wiped;
                return Ok(CycleOutcome::Wiped);
            }
            state.health = Health::Up;
            state.eof = true;
            return Ok(CycleOutcome::Resumable);
        }

        if total < previous_total {
            tracing::warn!(
                blog = %state.name,
                previous_total,
                total,
                "Post count decreased; leaving blog for later reprocessing"
            );
            state.health = Health::Up;
            return Ok(CycleOutcome::Anomaly);
        }

        state.health = Health::Up;
        let delta = if previous_total > 0 { total - previous_total } else { 0 };
        state.total_posts = total;

        // Posts still to ingest in an incremental pass over a finished blog
        let mut incremental_target = None;
        let mut pending = Some(first);

        match state.crawl_status {
            CrawlStatus::Done => {
                if delta == 0 {
                    return Ok(CycleOutcome::UpToDate);
                }
                tracing::info!(blog = %state.name, new_posts = delta, "Incremental pass over finished blog");
                state.new_posts = delta;
                incremental_target = Some(delta);
            }
            CrawlStatus::Resume if delta > 0 => {
                tracing::debug!(blog = %state.name, delta, "Shifting offset past new posts");
                state.offset += delta;
                pending = None;
            }
            CrawlStatus::Dead => return Ok(CycleOutcome::Dead),
            _ => {}
        }

        let mut response_errors = 0u32;
        let mut empty_skips = 0u32;

        loop {
            let target_reached = match incremental_target {
                Some(target) => stats.added >= target,
                None => state.is_exhausted(),
            };
            if target_reached || state.eof {
                break;
            }
            if self.ctx.shutdown.is_requested() {
                return Err(CrawlError::Stopped);
            }

            let payload = match pending.take() {
                Some(payload) => payload,
                None => match self.fetch_with_backoff(&state.name, state.offset).await {
                    Ok(payload) => payload,
                    Err(CrawlError::RetriesExhausted {
                        attempts,
                        last_error,
                    }) => {
                        response_errors += 1;
                        if response_errors >= config.max_response_errors {
                            return Err(CrawlError::RetriesExhausted {
                                attempts,
                                last_error,
                            });
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };
            response_errors = 0;

            if payload.is_empty() {
                if state.offset >= state.total_posts {
                    state.eof = true;
                    break;
                }
                empty_skips += 1;
                if empty_skips > config.max_empty_skips {
                    tracing::debug!(blog = %state.name, offset = state.offset, "Too many empty pages; assuming EOF");
                    state.eof = true;
                    break;
                }
                state.offset += 1;
                continue;
            }
            empty_skips = 0;

            self.persist_page(state, &payload, stats)?;

            if incremental_target.is_some() && stats.added >= state.new_posts {
                // Caught up with everything published since the last pass
                state.eof = true;
            }
            if !config.ignore_duplicates && state.db_dupe_count > config.duplicate_threshold as u64 {
                tracing::debug!(
                    blog = %state.name,
                    duplicates = state.db_dupe_count,
                    "Duplicate threshold reached; assuming already ingested"
                );
                state.eof = true;
            }
        }

        Ok(CycleOutcome::Resumable)
    }

    /// Stores one page and advances the offset past it
    fn persist_page(
        &self,
        state: &mut BlogCrawlState,
        payload: &UpdatePayload,
        stats: &mut CycleStats,
    ) -> Result<(), CrawlError> {
        let posts: Vec<NewPost> = payload
            .posts_response
            .iter()
            .filter_map(|record| NewPost::from_value(&state.name, record, &self.ctx.extractor))
            .collect();
        let unparsable = (payload.posts_response.len() - posts.len()) as u64;

        let outcome = self.ctx.store.insert_posts(&state.name, &posts)?;

        state.offset += payload.posts_response.len() as u64;
        state.posts_scraped += outcome.added;
        state.db_dupe_count += outcome.duplicates;

        stats.pages += 1;
        stats.added += outcome.added;
        stats.duplicates += outcome.duplicates;
        stats.failed += outcome.failed + unparsable;

        tracing::debug!(
            blog = %state.name,
            offset = state.offset,
            added = outcome.added,
            duplicates = outcome.duplicates,
            "Stored page"
        );

        // Progress is durable page by page
        self.ctx.store.update_blog_info(state)?;
        Ok(())
    }

    /// Resolves the final status, releases the claim and writes the blog back
    fn finalize(
        &self,
        state: &mut BlogCrawlState,
        outcome: CycleOutcome,
    ) -> Result<CycleOutcome, CrawlError> {
        let mut outcome = outcome;

        let resolves_status = !matches!(
            outcome,
            CycleOutcome::Dead | CycleOutcome::Wiped | CycleOutcome::UpToDate | CycleOutcome::Anomaly
        );
        if resolves_status && state.crawl_status != CrawlStatus::Dead {
            if state.eof || state.is_exhausted() {
                state.posts_scraped = self.ctx.store.scraped_count(&state.name)?;
                state.mark_done();
                if outcome == CycleOutcome::Resumable {
                    outcome = CycleOutcome::Done;
                }
            } else if state.offset > 0 {
                state.crawl_status = CrawlStatus::Resume;
            }
        }

        state.eof = false;
        if state.crawling != CrawlingFlag::TemporarilyDisabled {
            state.crawling = CrawlingFlag::Idle;
        }
        self.ctx.store.update_blog_info(state)?;

        Ok(outcome)
    }

    /// Fetches a page, retrying the same offset while the service is unavailable
    async fn fetch_with_backoff(&mut self, blog: &str, offset: u64) -> Result<UpdatePayload, CrawlError> {
        let limit = self.ctx.config.crawler.service_unavailable_limit;
        loop {
            match self.fetch_page(blog, offset).await {
                Err(CrawlError::TransientServer) => {
                    self.unavailable += 1;
                    if self.unavailable >= limit {
                        return Err(CrawlError::TransientServer);
                    }
                    tracing::debug!(blog, offset, count = self.unavailable, "Service unavailable; retrying offset");
                    self.backoff(1).await?;
                }
                other => return other,
            }
        }
    }

    /// One logical fetch with credential and proxy rotation
    async fn fetch_page(&mut self, blog: &str, offset: u64) -> Result<UpdatePayload, CrawlError> {
        let max_attempts = self.ctx.config.crawler.max_fetch_attempts;
        let mut attempts = 0u32;
        let mut last_error = String::new();

        while attempts < max_attempts {
            if self.ctx.shutdown.is_requested() {
                return Err(CrawlError::Stopped);
            }

            self.ctx.limiter.acquire_async().await;
            self.ctx.credentials.record_use(&self.credential, 1);

            let result = self
                .ctx
                .api
                .fetch_posts(&self.client, blog, offset, &self.credential.api_key)
                .await;

            match result {
                Ok(ApiOutcome::Page(payload)) => return Ok(payload),
                Ok(ApiOutcome::Gone(meta)) => {
                    return Err(CrawlError::TerminalEntity {
                        blog: blog.to_string(),
                        status: meta.status,
                        message: meta.message,
                    })
                }
                Ok(ApiOutcome::Unauthorized(meta)) => {
                    tracing::warn!(blog, status = meta.status, "API key rejected");
                    self.ctx.credentials.disable(&self.credential, true, KEY_PENALTY);
                    self.rotate_credential()?;
                }
                Ok(ApiOutcome::RateLimited(meta)) => {
                    tracing::warn!(blog, status = meta.status, "API key rate limited");
                    self.ctx.credentials.disable(&self.credential, false, KEY_PENALTY);
                    self.rotate_credential()?;
                }
                Ok(ApiOutcome::ServiceUnavailable) => return Err(CrawlError::TransientServer),
                Ok(ApiOutcome::Malformed { status, reason }) => {
                    attempts += 1;
                    last_error = format!("malformed response ({}): {}", status, reason);
                    tracing::debug!(blog, offset, attempts, "{}", last_error);
                    self.backoff(attempts).await?;
                }
                Ok(ApiOutcome::Other(meta)) => {
                    attempts += 1;
                    last_error = format!("HTTP {}: {}", meta.status, meta.message);
                    tracing::debug!(blog, offset, attempts, "{}", last_error);
                    self.backoff(attempts).await?;
                }
                Err(e) => {
                    // Never reached the API
                    attempts += 1;
                    self.ctx.credentials.refund(&self.credential, 1);
                    last_error = e.to_string();
                    tracing::debug!(blog, offset, attempts, "Request failed: {}", e);
                    if self.ctx.egress.is_some() {
                        self.rotate_egress().await?;
                    } else {
                        self.backoff(attempts).await?;
                    }
                }
            }
        }

        Err(CrawlError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    fn rotate_credential(&mut self) -> Result<(), CrawlError> {
        self.credential = self.ctx.credentials.acquire_available()?;
        Ok(())
    }

    async fn rotate_egress(&mut self) -> Result<(), CrawlError> {
        let Some(pool) = &self.ctx.egress else {
            return Ok(());
        };

        if let Some(current) = self.egress.take() {
            pool.report_failure(&current);
        }
        let next = pool.next().await?;
        self.client = self.ctx.api.client_for(Some(&next))?;
        self.egress = Some(next);
        Ok(())
    }

    /// Interruptible linear backoff
    async fn backoff(&self, attempt: u32) -> Result<(), CrawlError> {
        let base = Duration::from_millis(self.ctx.config.crawler.retry_delay_ms);
        let delay = base.saturating_mul(attempt.max(1)).min(MAX_BACKOFF);
        if self.ctx.shutdown.sleep(delay).await {
            Ok(())
        } else {
            Err(CrawlError::Stopped)
        }
    }
}
