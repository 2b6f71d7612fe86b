//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the posts API and drive the
//! per-blog state machine and the worker pool end-to-end against an in-memory
//! store.

use blog_harvester::config::{Config, EgressConfig};
use blog_harvester::content::NewPost;
use blog_harvester::crawler::{BlogCrawler, CrawlError, CycleOutcome, Orchestrator, Shutdown, WorkerContext};
use blog_harvester::pool::{
    Credential, CredentialPool, EgressEntry, EgressPool, PoolError, DAY_CAP, HOUR_CAP,
};
use blog_harvester::state::{BlogCrawlState, CrawlStatus, CrawlingFlag, Health, StatusPreference};
use blog_harvester::storage::{BlogStore, InsertOutcome, SqliteBlogStore, StorageResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock API
fn create_test_config(base_url: &str) -> Config {
    let raw = format!(
        r#"
[crawler]
workers = 4
max-fetch-attempts = 3
max-response-errors = 2
service-unavailable-limit = 3
claim-poll-interval-ms = 20
retry-delay-ms = 5

[api]
base-url = "{}"
timeout-secs = 5
max-calls = 1000
period-secs = 1

[output]
database-path = ":memory:"
"#,
        base_url
    );
    toml::from_str(&raw).expect("test config parses")
}

fn test_context(
    server: &MockServer,
    store: Arc<dyn BlogStore>,
    keys: &[&str],
) -> WorkerContext {
    let credentials = keys
        .iter()
        .map(|key| Credential::new(*key, "secret"))
        .collect();
    WorkerContext::new(
        create_test_config(&server.uri()),
        store,
        Arc::new(CredentialPool::new(credentials, Duration::from_secs(5))),
        None,
        Shutdown::new(),
    )
}

fn test_context_with_egress(
    server: &MockServer,
    store: Arc<dyn BlogStore>,
    egress: EgressPool,
) -> WorkerContext {
    WorkerContext::new(
        create_test_config(&server.uri()),
        store,
        Arc::new(CredentialPool::new(
            vec![Credential::new("key-1", "secret")],
            Duration::from_secs(5),
        )),
        Some(Arc::new(egress)),
        Shutdown::new(),
    )
}

/// Distinct local addresses nothing listens on
fn closed_addresses(n: usize) -> Vec<String> {
    let listeners: Vec<_> = (0..n)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    listeners
        .iter()
        .map(|listener| format!("http://{}", listener.local_addr().unwrap()))
        .collect()
}

/// One page of the posts envelope; post ids follow the offset
fn page_body(total: u64, offset: u64, count: u64) -> serde_json::Value {
    let posts: Vec<_> = (offset..offset + count)
        .map(|id| {
            json!({
                "id": id,
                "type": "text",
                "post_url": format!("https://staff.example.com/post/{}", id),
                "timestamp": 1_700_000_000 + id,
                "body": format!("<p>post {} see https://example.org/{}</p>", id, id),
                "tags": ["news"],
                "note_count": id,
            })
        })
        .collect();

    json!({
        "meta": { "status": 200, "msg": "OK" },
        "response": {
            "blog": { "total_posts": total, "updated": 1_700_000_000 },
            "posts": posts,
        }
    })
}

fn claim(store: &Arc<dyn BlogStore>) -> BlogCrawlState {
    store
        .claim_next(StatusPreference::Any)
        .unwrap()
        .expect("a claimable blog")
}

async fn mount_page(server: &MockServer, blog: &str, offset: u64, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/blog/{}/posts", blog)))
        .and(query_param("offset", offset.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_new_blog_is_paged_to_done() {
    let server = MockServer::start().await;
    for offset in (0..50).step_by(10) {
        mount_page(&server, "staff", offset, page_body(50, offset, 10)).await;
    }

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let blog = claim(&store);
    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(blog).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.pages, 5);
    assert_eq!(report.added, 50);

    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Done);
    assert_eq!(stored.offset, 0);
    assert_eq!(stored.total_posts, 50);
    assert_eq!(stored.posts_scraped, 50);
    assert_eq!(stored.health, Health::Up);
    assert_eq!(stored.crawling, CrawlingFlag::Idle);
    assert_eq!(store.count_posts().unwrap(), 50);
    assert_eq!(store.count_urls().unwrap(), 50);

    // The status check page doubles as the first page
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_requests_carry_key_and_reblog_flag() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .and(query_param("api_key", "key-1"))
        .and(query_param("reblog_info", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(3, 0, 3)))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Done);
}

#[tokio::test]
async fn test_forbidden_blog_is_marked_dead_after_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "meta": { "status": 403, "msg": "Forbidden" },
            "response": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Dead);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Dead);
    assert_eq!(stored.health, Health::Dead);
    assert_eq!(stored.crawling, CrawlingFlag::Idle);

    // Dead blogs are never handed out again
    assert!(store.claim_next(StatusPreference::Any).unwrap().is_none());
}

#[tokio::test]
async fn test_rate_limited_everywhere_depletes_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "meta": { "status": 429, "msg": "Limit Exceeded" },
            "response": []
        })))
        .expect(3)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1", "key-2", "key-3"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let result = crawler.run(claim(&store)).await;

    match result {
        Err(CrawlError::Depleted { next_available_at }) => {
            assert!(next_available_at > blog_harvester::pool::now_epoch());
        }
        other => panic!("expected Depleted, got {:?}", other.map(|r| r.outcome)),
    }
    assert!(matches!(
        ctx.credentials.acquire_available(),
        Err(PoolError::Depleted { .. })
    ));

    // The blog was written back unclaimed with no progress lost
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawling, CrawlingFlag::Idle);
    assert_eq!(stored.crawl_status, CrawlStatus::New);
    assert_eq!(stored.offset, 0);
}

#[tokio::test]
async fn test_unauthorized_key_is_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .and(query_param("api_key", "bad-key"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "meta": { "status": 401, "msg": "Unauthorized" },
            "response": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .and(query_param("api_key", "good-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(5, 0, 5)))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["bad-key", "good-key"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    assert_eq!(crawler.credential().api_key, "bad-key");
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(crawler.credential().api_key, "good-key");

    let rejected = ctx.credentials.get("bad-key").unwrap();
    assert_eq!(rejected.blacklist_hit_count, 1);
    assert!(rejected.disabled_until > 0);
}

#[tokio::test]
async fn test_service_unavailable_parks_blog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .respond_with(
            ResponseTemplate::new(503).set_body_string("Service is temporarily unavailable"),
        )
        .expect(3)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Parked);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawling, CrawlingFlag::TemporarilyDisabled);

    // Parked blogs stay out of rotation until the next startup
    assert!(store.claim_next(StatusPreference::Any).unwrap().is_none());
    assert_eq!(store.reset_all_claims().unwrap(), 1);
    assert!(store.claim_next(StatusPreference::Any).unwrap().is_some());
}

#[tokio::test]
async fn test_resumed_blog_skips_past_new_posts() {
    let server = MockServer::start().await;
    // Status check at the recorded offset; its page is stale and discarded
    mount_page(&server, "staff", 20, page_body(55, 20, 10)).await;
    for offset in [25, 35, 45] {
        mount_page(&server, "staff", offset, page_body(55, offset, 10)).await;
    }

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    let mut recorded = BlogCrawlState::new("staff");
    recorded.crawl_status = CrawlStatus::Resume;
    recorded.offset = 20;
    recorded.total_posts = 50;
    recorded.posts_scraped = 20;
    store.update_blog_info(&recorded).unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Done);
    assert_eq!(report.pages, 3);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Done);
    assert_eq!(stored.total_posts, 55);
    assert_eq!(stored.offset, 0);
}

#[tokio::test]
async fn test_shrinking_total_leaves_blog_untouched() {
    let server = MockServer::start().await;
    mount_page(&server, "staff", 10, page_body(40, 10, 10)).await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    let mut recorded = BlogCrawlState::new("staff");
    recorded.crawl_status = CrawlStatus::Resume;
    recorded.offset = 10;
    recorded.total_posts = 50;
    recorded.posts_scraped = 10;
    store.update_blog_info(&recorded).unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Anomaly);
    assert_eq!(report.added, 0);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Resume);
    assert_eq!(stored.offset, 10);
    assert_eq!(stored.total_posts, 50);
    assert_eq!(store.count_posts().unwrap(), 0);
}

#[tokio::test]
async fn test_finished_blog_without_new_posts_is_up_to_date() {
    let server = MockServer::start().await;
    mount_page(&server, "staff", 0, page_body(50, 0, 10)).await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    let mut recorded = BlogCrawlState::new("staff");
    recorded.crawl_status = CrawlStatus::Done;
    recorded.total_posts = 50;
    recorded.posts_scraped = 50;
    store.update_blog_info(&recorded).unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::UpToDate);
    assert_eq!(report.pages, 0);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Done);
    assert!(stored.last_checked > 0);
}

#[tokio::test]
async fn test_blog_reporting_zero_posts_is_wiped() {
    let server = MockServer::start().await;
    mount_page(&server, "staff", 0, page_body(0, 0, 0)).await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    let mut recorded = BlogCrawlState::new("staff");
    recorded.crawl_status = CrawlStatus::Done;
    recorded.total_posts = 50;
    recorded.posts_scraped = 50;
    store.update_blog_info(&recorded).unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Wiped);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.health, Health::Wiped);
    assert_eq!(stored.total_posts, 50);
}

/// Wraps the SQLite store and counts how many workers hold each blog at once
struct TrackingStore {
    inner: SqliteBlogStore,
    holders: Mutex<HashMap<String, usize>>,
    claims: AtomicUsize,
    overlaps: AtomicUsize,
}

impl TrackingStore {
    fn new() -> Self {
        Self {
            inner: SqliteBlogStore::new_in_memory().unwrap(),
            holders: Mutex::new(HashMap::new()),
            claims: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    fn release(&self, blog: &str) {
        let mut holders = self.holders.lock().unwrap();
        if let Some(count) = holders.get_mut(blog) {
            *count = count.saturating_sub(1);
        }
    }
}

impl BlogStore for TrackingStore {
    fn claim_next(&self, preference: StatusPreference) -> StorageResult<Option<BlogCrawlState>> {
        let claimed = self.inner.claim_next(preference)?;
        if let Some(blog) = &claimed {
            self.claims.fetch_add(1, Ordering::SeqCst);
            let mut holders = self.holders.lock().unwrap();
            let count = holders.entry(blog.name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(claimed)
    }

    fn update_blog_info(&self, state: &BlogCrawlState) -> StorageResult<Option<BlogCrawlState>> {
        // Released before the write so a racing claim can only see it afterwards
        if state.crawling != CrawlingFlag::Active {
            self.release(&state.name);
        }
        self.inner.update_blog_info(state)
    }

    fn insert_posts(&self, blog: &str, posts: &[NewPost]) -> StorageResult<InsertOutcome> {
        self.inner.insert_posts(blog, posts)
    }

    fn scraped_count(&self, blog: &str) -> StorageResult<u64> {
        self.inner.scraped_count(blog)
    }

    fn reset_claim(&self, blog: &str) -> StorageResult<()> {
        self.release(blog);
        self.inner.reset_claim(blog)
    }

    fn reset_all_claims(&self) -> StorageResult<u64> {
        self.inner.reset_all_claims()
    }

    fn add_blog(&self, blog: &str) -> StorageResult<bool> {
        self.inner.add_blog(blog)
    }

    fn get_blog(&self, blog: &str) -> StorageResult<Option<BlogCrawlState>> {
        self.inner.get_blog(blog)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        self.inner.count_by_status()
    }

    fn count_posts(&self) -> StorageResult<u64> {
        self.inner.count_posts()
    }

    fn count_urls(&self) -> StorageResult<u64> {
        self.inner.count_urls()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_never_share_a_blog() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/blog/[^/]+/posts$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(10, 0, 10))
                .set_delay(Duration::from_millis(10)),
        )
        .mount(&server)
        .await;

    let tracking = Arc::new(TrackingStore::new());
    let names: Vec<String> = (0..6).map(|i| format!("blog-{}", i)).collect();
    for name in &names {
        tracking.add_blog(name).unwrap();
    }

    let store: Arc<dyn BlogStore> = tracking.clone();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1", "key-2"]);
    let mut orchestrator = Orchestrator::new(ctx);
    orchestrator.start(4).unwrap();

    let mut finished = false;
    for _ in 0..200 {
        let done = store
            .count_by_status()
            .unwrap()
            .get(&CrawlStatus::Done)
            .copied()
            .unwrap_or(0);
        if done == names.len() as u64 {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let stats = orchestrator.stop().await.unwrap();

    assert!(finished, "every blog should reach DONE");
    assert!(stats.cycles >= names.len() as u64);
    assert!(tracking.claims.load(Ordering::SeqCst) >= names.len());
    assert_eq!(tracking.overlaps.load(Ordering::SeqCst), 0);

    for name in &names {
        let blog = store.get_blog(name).unwrap().unwrap();
        assert_eq!(blog.posts_scraped, 10);
        assert_eq!(blog.crawling, CrawlingFlag::Idle);
    }
}

#[tokio::test]
async fn test_unreachable_proxies_are_retired_and_uses_refunded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(10, 0, 10)))
        .expect(0)
        .mount(&server)
        .await;

    let closed = closed_addresses(3);
    let (first, second) = (closed[0].clone(), closed[1].clone());
    let mut worn = EgressEntry::new(second.clone(), "test-agent");
    worn.failures = 1;

    let egress = EgressPool::new(
        EgressConfig {
            enabled: true,
            source_url: format!("{}/list.txt", closed[2]),
            probe_url: "http://probe.test/health".to_string(),
            probe_timeout_secs: 1,
            min_pool_size: 1,
            max_refill_attempts: 1,
            failure_threshold: 2,
            ..EgressConfig::default()
        },
        vec![EgressEntry::new(first.clone(), "test-agent"), worn],
    )
    .unwrap();

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context_with_egress(&server, Arc::clone(&store), egress);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let result = crawler.run(claim(&store)).await;
    assert!(matches!(result, Err(CrawlError::EgressExhausted)));

    // Neither attempt reached the API, so neither is charged
    let key = ctx.credentials.get("key-1").unwrap();
    assert_eq!(key.hour_bucket, HOUR_CAP);
    assert_eq!(key.day_bucket, DAY_CAP);

    let pool = ctx.egress.as_ref().unwrap();
    assert!(pool.is_empty());
    let removed = pool.recorded(&first).unwrap();
    assert!(removed.disabled);
    assert!(!removed.blacklisted);
    assert_eq!(removed.failures, 1);
    assert!(pool.recorded(&second).unwrap().blacklisted);

    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawling, CrawlingFlag::Idle);
    assert_eq!(stored.crawl_status, CrawlStatus::New);
    assert_eq!(stored.offset, 0);
}

#[tokio::test]
async fn test_server_errors_on_status_check_drop_blog_for_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(3)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::ErrorBudgetExhausted);
    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::New);
    assert_eq!(stored.offset, 0);
    assert_eq!(stored.crawling, CrawlingFlag::Idle);
    assert!(store.claim_next(StatusPreference::Any).unwrap().is_some());
}

#[tokio::test]
async fn test_repeated_page_failures_exhaust_error_budget() {
    let server = MockServer::start().await;
    mount_page(&server, "staff", 0, page_body(50, 0, 10)).await;
    // Two failed fetches of three attempts each
    Mock::given(method("GET"))
        .and(path("/blog/staff/posts"))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(6)
        .mount(&server)
        .await;

    let store: Arc<dyn BlogStore> = Arc::new(SqliteBlogStore::new_in_memory().unwrap());
    store.add_blog("staff").unwrap();
    let ctx = test_context(&server, Arc::clone(&store), &["key-1"]);

    let mut crawler = BlogCrawler::attach(&ctx).await.unwrap();
    let report = crawler.run(claim(&store)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::ErrorBudgetExhausted);
    assert_eq!(report.added, 10);

    let stored = store.get_blog("staff").unwrap().unwrap();
    assert_eq!(stored.crawl_status, CrawlStatus::Resume);
    assert_eq!(stored.offset, 10);
    assert_eq!(stored.posts_scraped, 10);
    assert_eq!(stored.crawling, CrawlingFlag::Idle);

    let reclaimed = claim(&store);
    assert_eq!(reclaimed.offset, 10);
}
