//! Database schema definitions
//!
//! All SQLite-backed stores share one database file. Each store runs
//! [`initialize_schema`] from its `setup`, so the statements must stay idempotent.

use rusqlite::Connection;
use std::path::Path;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawled documents (the content backend)
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    domain TEXT NOT NULL,
    host TEXT NOT NULL,
    tld TEXT NOT NULL,
    path_parts TEXT NOT NULL,
    crawled TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    mime TEXT,
    language TEXT,
    title TEXT,
    description TEXT,
    keywords TEXT,
    indexable INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_documents_domain ON documents(domain);

-- Cached robots.txt responses, one per scheme+host
CREATE TABLE IF NOT EXISTS robots (
    scheme_host TEXT PRIMARY KEY,
    status_code INTEGER NOT NULL,
    body TEXT NOT NULL,
    expires TEXT NOT NULL
);

-- Discovery set of the link queue
CREATE TABLE IF NOT EXISTS queue_links (
    url TEXT PRIMARY KEY
);

-- TTL-bound queue keys: queued-link markers and host reservations
CREATE TABLE IF NOT EXISTS queue_keys (
    key TEXT PRIMARY KEY,
    expires_at INTEGER NOT NULL
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Opens a connection tuned for several stores sharing the same file
pub fn open_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    Ok(conn)
}
