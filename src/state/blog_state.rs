//! Per-blog crawl progress definitions
//!
//! One `BlogCrawlState` exists per blog and is the unit a worker claims, mutates and
//! writes back on every cycle.

use serde::Deserialize;
use std::fmt;

/// Recorded crawl progress of a blog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Discovered, never paged
    New,

    /// Partially paged; `offset` points at the next page
    Resume,

    /// Every post seen; may be reclaimed when new posts appear
    Done,

    /// Remote reported the blog gone or inaccessible
    Dead,
}

impl CrawlStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Resume => "resume",
            Self::Done => "done",
            Self::Dead => "dead",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "resume" => Some(Self::Resume),
            "done" => Some(Self::Done),
            "dead" => Some(Self::Dead),
            _ => None,
        }
    }

    pub fn all_statuses() -> Vec<Self> {
        vec![Self::New, Self::Resume, Self::Done, Self::Dead]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Last observed availability of a blog on the remote side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Health {
    Up,
    Dead,
    /// Reachable but reports zero posts after having had some
    Wiped,
    #[default]
    Unknown,
}

impl Health {
    /// Dead-like states abort a cycle as soon as they are observed
    pub fn is_dead_like(&self) -> bool {
        matches!(self, Self::Dead | Self::Wiped)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Dead => "dead",
            Self::Wiped => "wiped",
            Self::Unknown => "unknown",
        }
    }

    /// Unrecognized values map to `Unknown`
    pub fn from_db_string(s: &str) -> Self {
        match s {
            "up" => Self::Up,
            "dead" => Self::Dead,
            "wiped" => Self::Wiped,
            _ => Self::Unknown,
        }
    }
}

/// Claim flag stored alongside each blog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CrawlingFlag {
    #[default]
    Idle,
    Active,
    /// Parked after repeated server-side unavailability
    TemporarilyDisabled,
}

impl CrawlingFlag {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::TemporarilyDisabled => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Active),
            2 => Some(Self::TemporarilyDisabled),
            _ => None,
        }
    }
}

/// Which recorded status a worker asks the store for first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPreference {
    New,
    Resume,
    Done,
    #[default]
    Any,
}

impl StatusPreference {
    /// Statuses a claim may return, in preference order
    pub fn claimable_order(&self) -> Vec<CrawlStatus> {
        match self {
            Self::New => vec![CrawlStatus::New, CrawlStatus::Resume, CrawlStatus::Done],
            Self::Resume => vec![CrawlStatus::Resume, CrawlStatus::New, CrawlStatus::Done],
            Self::Done => vec![CrawlStatus::Done],
            Self::Any => vec![CrawlStatus::Resume, CrawlStatus::New, CrawlStatus::Done],
        }
    }
}

/// Durable crawl progress of one blog
#[derive(Debug, Clone, PartialEq)]
pub struct BlogCrawlState {
    /// Unique blog name
    pub name: String,

    /// Next page cursor
    pub offset: u64,

    /// Post count last reported by the remote
    pub total_posts: u64,

    /// Posts ingested so far
    pub posts_scraped: u64,

    pub health: Health,
    pub crawl_status: CrawlStatus,
    pub crawling: CrawlingFlag,

    /// Epoch seconds of the last status check
    pub last_checked: i64,

    /// Epoch seconds of the blog's last remote update
    pub last_updated: i64,

    /// Posts published since the previous cycle, pending offset correction
    pub new_posts: u64,

    pub eof: bool,

    /// Duplicates reported by the store during the current cycle
    pub db_dupe_count: u64,
}

impl BlogCrawlState {
    /// Creates the state of a freshly discovered blog
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset: 0,
            total_posts: 0,
            posts_scraped: 0,
            health: Health::Unknown,
            crawl_status: CrawlStatus::New,
            crawling: CrawlingFlag::Idle,
            last_checked: 0,
            last_updated: 0,
            new_posts: 0,
            eof: false,
            db_dupe_count: 0,
        }
    }

    /// True once paging has covered every reported post
    pub fn is_exhausted(&self) -> bool {
        self.total_posts > 0
            && (self.posts_scraped >= self.total_posts || self.offset >= self.total_posts)
    }

    /// Marks the blog finished and rewinds the cursor for a later incremental pass
    pub fn mark_done(&mut self) {
        self.crawl_status = CrawlStatus::Done;
        self.offset = 0;
        self.new_posts = 0;
    }

    /// Marks the blog gone; no further paging this run
    pub fn mark_dead(&mut self) {
        self.crawl_status = CrawlStatus::Dead;
        self.health = Health::Dead;
    }
}
