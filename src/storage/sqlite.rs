//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `BlogStore` trait.
//! A single connection sits behind a mutex, which doubles as the global write lock:
//! multi-statement writes (posts, urls and their links) never interleave.

use crate::content::NewPost;
use crate::state::{BlogCrawlState, CrawlStatus, CrawlingFlag, Health, StatusPreference};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{BlogStore, InsertOutcome, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const BLOG_COLUMNS: &str = "name, post_offset, total_posts, posts_scraped, health, crawl_status,
     crawling, last_checked, last_updated, new_posts, eof, db_dupe_count";

/// SQLite blog store
pub struct SqliteBlogStore {
    conn: Mutex<Connection>,
}

impl SqliteBlogStore {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

fn row_to_state(row: &Row<'_>) -> rusqlite::Result<BlogCrawlState> {
    let unsigned = |idx: usize| -> rusqlite::Result<u64> { Ok(row.get::<_, i64>(idx)?.max(0) as u64) };

    Ok(BlogCrawlState {
        name: row.get(0)?,
        offset: unsigned(1)?,
        total_posts: unsigned(2)?,
        posts_scraped: unsigned(3)?,
        health: Health::from_db_string(&row.get::<_, String>(4)?),
        crawl_status: CrawlStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(CrawlStatus::New),
        crawling: CrawlingFlag::from_i64(row.get(6)?).unwrap_or_default(),
        last_checked: row.get(7)?,
        last_updated: row.get(8)?,
        new_posts: unsigned(9)?,
        eof: row.get::<_, i64>(10)? != 0,
        db_dupe_count: unsigned(11)?,
    })
}

fn select_blog(conn: &Connection, name: &str) -> rusqlite::Result<Option<BlogCrawlState>> {
    conn.query_row(
        &format!("SELECT {} FROM blogs WHERE name = ?1", BLOG_COLUMNS),
        params![name],
        row_to_state,
    )
    .optional()
}

fn ensure_blog(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO blogs (name, discovered_at) VALUES (?1, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

/// Inserts one post and its URLs; `Ok(false)` if the post already existed
fn insert_post(conn: &Connection, post: &NewPost) -> StorageResult<bool> {
    let tags = serde_json::to_string(&post.tags)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO posts (remote_id, blog_name, post_url, post_type, timestamp,
         content, tags, note_count, reblogged_from, attribution, inserted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            post.id,
            post.blog_name,
            post.post_url,
            post.post_type,
            post.timestamp,
            post.content,
            tags,
            post.note_count as i64,
            post.reblogged_from,
            post.attribution.to_db_string(),
            Utc::now().to_rfc3339(),
        ],
    )?;

    if inserted == 0 {
        return Ok(false);
    }
    let post_id = conn.last_insert_rowid();

    for url in &post.urls {
        conn.execute("INSERT OR IGNORE INTO urls (url) VALUES (?1)", params![url])?;
        let url_id: i64 = conn.query_row(
            "SELECT id FROM urls WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO post_urls (post_id, url_id) VALUES (?1, ?2)",
            params![post_id, url_id],
        )?;
    }

    Ok(true)
}

impl BlogStore for SqliteBlogStore {
    fn claim_next(&self, preference: StatusPreference) -> StorageResult<Option<BlogCrawlState>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut claimed = None;
        for status in preference.claimable_order() {
            let name: Option<String> = tx
                .query_row(
                    "SELECT name FROM blogs WHERE crawling = 0 AND crawl_status = ?1
                     ORDER BY last_checked ASC, name ASC LIMIT 1",
                    params![status.to_db_string()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(name) = name {
                tx.execute(
                    "UPDATE blogs SET crawling = ?1 WHERE name = ?2 AND crawling = 0",
                    params![CrawlingFlag::Active.as_i64(), name],
                )?;
                claimed = select_blog(&tx, &name)?;
                break;
            }
        }

        tx.commit()?;
        Ok(claimed)
    }

    fn update_blog_info(&self, state: &BlogCrawlState) -> StorageResult<Option<BlogCrawlState>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let previous = select_blog(&tx, &state.name)?;
        ensure_blog(&tx, &state.name)?;
        tx.execute(
            "UPDATE blogs SET post_offset = ?1, total_posts = ?2, posts_scraped = ?3,
             health = ?4, crawl_status = ?5, crawling = ?6, last_checked = ?7,
             last_updated = ?8, new_posts = ?9, eof = ?10, db_dupe_count = ?11
             WHERE name = ?12",
            params![
                state.offset as i64,
                state.total_posts as i64,
                state.posts_scraped as i64,
                state.health.to_db_string(),
                state.crawl_status.to_db_string(),
                state.crawling.as_i64(),
                state.last_checked,
                state.last_updated,
                state.new_posts as i64,
                state.eof as i64,
                state.db_dupe_count as i64,
                state.name,
            ],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    fn insert_posts(&self, blog: &str, posts: &[NewPost]) -> StorageResult<InsertOutcome> {
        let mut conn = self.lock()?;
        let mut tx = conn.transaction()?;
        let mut outcome = InsertOutcome::default();

        ensure_blog(&tx, blog)?;

        for post in posts {
            if let Some(source) = &post.reblogged_from {
                if source != blog && ensure_blog(&tx, source)? {
                    tracing::debug!(blog = %blog, discovered = %source, "Discovered blog via reblog");
                }
            }

            // A post and its URL links land together or not at all
            let savepoint = tx.savepoint()?;
            match insert_post(&savepoint, post) {
                Ok(inserted) => {
                    savepoint.commit()?;
                    if inserted {
                        outcome.added += 1;
                    } else {
                        outcome.duplicates += 1;
                    }
                }
                Err(e) => {
                    savepoint.finish()?;
                    tracing::warn!(blog = %blog, post = %post.id, "Failed to insert post: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn scraped_count(&self, blog: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE blog_name = ?1",
            params![blog],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn reset_claim(&self, blog: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE blogs SET crawling = ?1 WHERE name = ?2 AND crawling = ?3",
            params![
                CrawlingFlag::Idle.as_i64(),
                blog,
                CrawlingFlag::Active.as_i64()
            ],
        )?;
        Ok(())
    }

    fn reset_all_claims(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let reset = conn.execute(
            "UPDATE blogs SET crawling = ?1 WHERE crawling != ?1",
            params![CrawlingFlag::Idle.as_i64()],
        )?;
        Ok(reset as u64)
    }

    fn add_blog(&self, blog: &str) -> StorageResult<bool> {
        let conn = self.lock()?;
        Ok(ensure_blog(&conn, blog)?)
    }

    fn get_blog(&self, blog: &str) -> StorageResult<Option<BlogCrawlState>> {
        let conn = self.lock()?;
        Ok(select_blog(&conn, blog)?)
    }

    fn count_by_status(&self) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT crawl_status, COUNT(*) FROM blogs GROUP BY crawl_status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            if let Some(status) = CrawlStatus::from_db_string(&status) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }

    fn count_posts(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_urls(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
