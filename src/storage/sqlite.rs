//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Backend trait.

use crate::document::Document;
use crate::storage::schema::{initialize_schema, open_connection};
use crate::storage::{Backend, BackendError, BackendResult, CrawlHistory};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// SQLite content backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) the backend in the database file at `path`
    pub fn open(path: &Path) -> BackendResult<Self> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory() -> BackendResult<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Number of stored documents
    pub fn count_documents(&self) -> BackendResult<u64> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

impl Backend for SqliteBackend {
    fn setup(&self) -> BackendResult<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        initialize_schema(&conn)?;
        Ok(())
    }

    fn crawled_and_count(&self, url: &str, domain: &str) -> BackendResult<CrawlHistory> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let crawled: Option<String> = conn
            .query_row(
                "SELECT crawled FROM documents WHERE id = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        let last_crawled = crawled
            .map(|value| {
                DateTime::parse_from_rfc3339(&value)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|source| BackendError::CrawlDate { value, source })
            })
            .transpose()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;

        Ok(CrawlHistory {
            last_crawled,
            domain_links: u64::try_from(count).unwrap_or_default(),
        })
    }

    fn upsert(&self, doc: &Document) -> BackendResult<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let crawled = doc.crawled.unwrap_or_else(Utc::now).to_rfc3339();

        conn.execute(
            "INSERT INTO documents
                (id, domain, host, tld, path_parts, crawled, status_code, mime, language,
                 title, description, keywords, indexable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                crawled = excluded.crawled,
                status_code = excluded.status_code,
                mime = excluded.mime,
                language = excluded.language,
                title = excluded.title,
                description = excluded.description,
                keywords = excluded.keywords,
                indexable = excluded.indexable",
            params![
                doc.id,
                doc.domain,
                doc.host,
                doc.tld,
                doc.path_parts,
                crawled,
                doc.status_code,
                doc.mime,
                non_empty(&doc.language),
                non_empty(&doc.title),
                non_empty(&doc.description),
                non_empty(&doc.keywords),
                doc.is_indexable(),
            ],
        )?;
        Ok(())
    }
}
