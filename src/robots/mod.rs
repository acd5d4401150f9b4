//! Robots.txt handling module
//!
//! This module keeps one robots.txt snapshot per scheme+host, decides when a
//! snapshot must be re-fetched, and evaluates the rules it carries.

mod memory;
mod parser;
mod record;
mod sqlite;

pub use memory::MemoryRobotsCache;
pub use parser::ParsedRobots;
pub use record::{RobotsRecord, EXPIRES_FORMAT};
pub use sqlite::SqliteRobotsCache;

use thiserror::Error;

/// Errors raised by robots records and caches
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("Malformed robots.txt expiry {value:?}: {source}")]
    Expires {
        value: String,
        source: chrono::ParseError,
    },

    #[error("Unexpected robots.txt status: {0}")]
    UnexpectedStatus(i32),

    #[error("Robots store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// A store of robots.txt records shared by all workers
///
/// Implementations handle their own locking.
pub trait RobotsCache: Send + Sync {
    /// Prepares the underlying store
    fn setup(&self) -> Result<(), RobotsError>;

    /// Returns the record for a scheme+host
    ///
    /// A missing record is not an error: an empty record with `cached == false`
    /// is returned instead.
    fn get(&self, scheme_host: &str) -> Result<RobotsRecord, RobotsError>;

    /// Stores a record; may be buffered
    fn put(&self, record: RobotsRecord);

    /// Writes out anything buffered by [`put`](Self::put)
    fn flush(&self) {}
}
