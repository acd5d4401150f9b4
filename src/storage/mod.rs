//! Storage module for crawled documents
//!
//! This module holds the content backend consumed by the crawler:
//! - SQLite database initialization and schema management, shared with the
//!   SQLite robots cache and link queue
//! - Freshness lookups ("when was this URL last crawled, and how many
//!   documents does its domain hold")
//! - Document upserts

mod memory;
pub(crate) mod schema;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use crate::document::Document;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during backend operations
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid crawl date {value:?}: {source}")]
    CrawlDate {
        value: String,
        source: chrono::ParseError,
    },
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// What the backend knows about a URL and its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlHistory {
    /// Last crawl of the URL, `None` if never crawled
    pub last_crawled: Option<DateTime<Utc>>,

    /// Number of documents stored for the domain
    pub domain_links: u64,
}

/// Trait for content backends
///
/// Implementations must be safe to share between workers.
pub trait Backend: Send + Sync {
    /// Prepares the store (idempotent)
    fn setup(&self) -> BackendResult<()>;

    /// Looks up the last crawl of `url` and the size of `domain`
    fn crawled_and_count(&self, url: &str, domain: &str) -> BackendResult<CrawlHistory>;

    /// Inserts or replaces a document keyed by its id
    fn upsert(&self, doc: &Document) -> BackendResult<()>;
}
