//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Blog-Harvester database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per blog; carries the durable crawl progress
CREATE TABLE IF NOT EXISTS blogs (
    name TEXT PRIMARY KEY,
    post_offset INTEGER NOT NULL DEFAULT 0,
    total_posts INTEGER NOT NULL DEFAULT 0,
    posts_scraped INTEGER NOT NULL DEFAULT 0,
    health TEXT NOT NULL DEFAULT 'unknown',
    crawl_status TEXT NOT NULL DEFAULT 'new',
    crawling INTEGER NOT NULL DEFAULT 0,
    last_checked INTEGER NOT NULL DEFAULT 0,
    last_updated INTEGER NOT NULL DEFAULT 0,
    new_posts INTEGER NOT NULL DEFAULT 0,
    eof INTEGER NOT NULL DEFAULT 0,
    db_dupe_count INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blogs_claim ON blogs(crawling, crawl_status);

-- Harvested posts
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT NOT NULL,
    blog_name TEXT NOT NULL REFERENCES blogs(name),
    post_url TEXT,
    post_type TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL,
    note_count INTEGER NOT NULL DEFAULT 0,
    reblogged_from TEXT,
    attribution TEXT NOT NULL,
    inserted_at TEXT NOT NULL,
    UNIQUE(blog_name, remote_id)
);

CREATE INDEX IF NOT EXISTS idx_posts_blog ON posts(blog_name);

-- Unique URLs seen in any post
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE
);

-- Which post mentions which URL
CREATE TABLE IF NOT EXISTS post_urls (
    post_id INTEGER NOT NULL REFERENCES posts(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    PRIMARY KEY (post_id, url_id)
);

CREATE INDEX IF NOT EXISTS idx_post_urls_url ON post_urls(url_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
