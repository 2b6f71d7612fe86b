//! Worker pool
//!
//! Spawns a fixed number of workers on the multi-threaded runtime. Each worker
//! loops: claim a blog, attach a credential and proxy, run the state machine,
//! release. Every cycle runs in its own task, so a panic inside one blog is caught
//! at the worker and only ends that cycle; the blog's claim is released by a drop
//! guard on every exit path.

use crate::crawler::machine::{BlogCrawler, CrawlError, CycleOutcome, CycleReport};
use crate::crawler::WorkerContext;
use crate::pool::now_epoch;
use crate::state::BlogCrawlState;
use crate::storage::BlogStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often a worker waiting for credentials re-checks the stop signal
const DEPLETED_POLL: Duration = Duration::from_secs(5);

/// Counters kept by each worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub cycles: u64,
    pub done: u64,
    pub dead: u64,
    pub failed: u64,
    pub posts_added: u64,
}

impl WorkerStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.posts_added += report.added;
        match report.outcome {
            CycleOutcome::Done => self.done += 1,
            CycleOutcome::Dead => self.dead += 1,
            _ => {}
        }
    }

    fn merge(&mut self, other: &WorkerStats) {
        self.cycles += other.cycles;
        self.done += other.done;
        self.dead += other.dead;
        self.failed += other.failed;
        self.posts_added += other.posts_added;
    }
}

/// Releases a claim when dropped unless disarmed
struct ClaimGuard {
    store: Arc<dyn BlogStore>,
    blog: String,
    armed: bool,
}

impl ClaimGuard {
    fn new(store: Arc<dyn BlogStore>, blog: &str) -> Self {
        Self {
            store,
            blog: blog.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.store.reset_claim(&self.blog) {
            tracing::error!(blog = %self.blog, "Failed to release claim: {}", e);
        } else {
            tracing::debug!(blog = %self.blog, "Released claim");
        }
    }
}

/// Owns the shared context and the worker tasks
pub struct Orchestrator {
    ctx: Arc<WorkerContext>,
    workers: Vec<JoinHandle<WorkerStats>>,
    refill: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            workers: Vec::new(),
            refill: None,
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Clears stale claims and spawns `n` workers plus the credential refill task
    pub fn start(&mut self, n: usize) -> crate::Result<()> {
        let reset = self.ctx.store.reset_all_claims()?;
        if reset > 0 {
            tracing::warn!("Released {} claims left by a previous run", reset);
        }

        if self.refill.is_none() {
            self.refill = Some(
                self.ctx
                    .credentials
                    .spawn_refill(self.ctx.shutdown.subscribe()),
            );
        }

        for id in 0..n {
            let ctx = Arc::clone(&self.ctx);
            self.workers.push(tokio::spawn(worker_loop(id, ctx)));
        }

        tracing::info!(
            workers = n,
            credentials = self.ctx.credentials.len(),
            proxies = self.ctx.egress.as_ref().map(|p| p.len()).unwrap_or(0),
            "Workers started"
        );
        Ok(())
    }

    /// Requests a stop and waits for every worker to finish its cycle
    pub async fn stop(&mut self) -> crate::Result<WorkerStats> {
        self.ctx.shutdown.request();
        self.join().await
    }

    /// Waits for the workers to exit, then snapshots the pools
    ///
    /// Both pools are written even if the first snapshot fails; the first failure is
    /// returned.
    pub async fn join(&mut self) -> crate::Result<WorkerStats> {
        let mut total = WorkerStats::default();
        for handle in self.workers.drain(..) {
            match handle.await {
                Ok(stats) => total.merge(&stats),
                Err(e) => tracing::error!("Worker task failed: {}", e),
            }
        }

        if let Some(refill) = self.refill.take() {
            if let Err(e) = refill.await {
                tracing::warn!("Refill task failed: {}", e);
            }
        }

        let credentials = self.ctx.credentials.snapshot();
        let egress = match &self.ctx.egress {
            Some(egress) => egress.snapshot(),
            None => Ok(()),
        };

        tracing::info!(
            cycles = total.cycles,
            done = total.done,
            dead = total.dead,
            failed = total.failed,
            posts = total.posts_added,
            "Workers stopped"
        );

        credentials?;
        egress?;
        Ok(total)
    }
}

async fn worker_loop(id: usize, ctx: Arc<WorkerContext>) -> WorkerStats {
    let poll = Duration::from_millis(ctx.config.crawler.claim_poll_interval_ms);
    let preference = ctx.config.crawler.status_preference;
    let mut stats = WorkerStats::default();

    tracing::debug!(worker = id, "Worker started");

    while !ctx.shutdown.is_requested() {
        let blog = match ctx.store.claim_next(preference) {
            Ok(Some(blog)) => blog,
            Ok(None) => {
                tracing::trace!(worker = id, "No claimable blog");
                ctx.shutdown.sleep(poll).await;
                continue;
            }
            Err(e) => {
                tracing::error!(worker = id, "Claim failed: {}", e);
                ctx.shutdown.sleep(poll).await;
                continue;
            }
        };

        let name = blog.name.clone();
        let cycle = tokio::spawn(run_claimed(Arc::clone(&ctx), blog));

        match cycle.await {
            Ok(Ok(report)) => stats.record(&report),
            Ok(Err(CrawlError::Depleted { next_available_at })) => {
                tracing::warn!(
                    worker = id,
                    blog = %name,
                    next_available_at,
                    "All API keys exhausted; waiting"
                );
                wait_until(&ctx, next_available_at).await;
            }
            Ok(Err(CrawlError::EgressExhausted)) => {
                tracing::error!(worker = id, blog = %name, "No usable proxy; backing off");
                stats.failed += 1;
                ctx.shutdown.sleep(poll).await;
            }
            Ok(Err(e)) => {
                tracing::error!(worker = id, blog = %name, "Cycle failed: {}", e);
                stats.failed += 1;
            }
            Err(e) => {
                tracing::error!(worker = id, blog = %name, "Cycle panicked: {}", e);
                stats.failed += 1;
            }
        }
    }

    tracing::debug!(worker = id, cycles = stats.cycles, "Worker stopped");
    stats
}

/// Claims are released by the guard unless the state machine wrote the blog back
async fn run_claimed(ctx: Arc<WorkerContext>, blog: BlogCrawlState) -> Result<CycleReport, CrawlError> {
    let guard = ClaimGuard::new(Arc::clone(&ctx.store), &blog.name);
    let mut crawler = BlogCrawler::attach(&ctx).await?;
    let report = crawler.run(blog).await?;
    guard.disarm();
    Ok(report)
}

/// Sleeps until `at` (epoch seconds) in short steps, returning early on stop
async fn wait_until(ctx: &WorkerContext, at: i64) {
    loop {
        let remaining = at - now_epoch();
        if remaining <= 0 || ctx.shutdown.is_requested() {
            return;
        }
        let step = Duration::from_secs(remaining as u64).min(DEPLETED_POLL);
        if !ctx.shutdown.sleep(step).await {
            return;
        }
    }
}
