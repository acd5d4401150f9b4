//! SQLite-backed robots cache
//!
//! Writes are buffered and flushed in one transaction once the buffer reaches
//! the configured batch size. Reads consult the buffer first.

use crate::robots::{RobotsCache, RobotsError, RobotsRecord};
use crate::storage::schema::{initialize_schema, open_connection};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

pub struct SqliteRobotsCache {
    conn: Mutex<Connection>,
    pending: Mutex<HashMap<String, RobotsRecord>>,
    batch_size: usize,
}

impl SqliteRobotsCache {
    /// Opens (or creates) the cache in the database at `path`
    pub fn open(path: &Path, batch_size: usize) -> Result<Self, RobotsError> {
        Ok(Self::with_connection(open_connection(path)?, batch_size))
    }

    /// Creates an in-memory cache (for testing)
    pub fn open_in_memory(batch_size: usize) -> Result<Self, RobotsError> {
        Ok(Self::with_connection(Connection::open_in_memory()?, batch_size))
    }

    fn with_connection(conn: Connection, batch_size: usize) -> Self {
        Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(HashMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Number of records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn write_batch(&self, batch: Vec<RobotsRecord>) -> Result<(), RobotsError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO robots (scheme_host, status_code, body, expires)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(scheme_host) DO UPDATE SET
                    status_code = excluded.status_code,
                    body = excluded.body,
                    expires = excluded.expires",
            )?;
            for record in &batch {
                stmt.execute(params![
                    record.scheme_host,
                    record.status_code,
                    record.body,
                    record.expires
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl RobotsCache for SqliteRobotsCache {
    fn setup(&self) -> Result<(), RobotsError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        initialize_schema(&conn)?;
        Ok(())
    }

    fn get(&self, scheme_host: &str) -> Result<RobotsRecord, RobotsError> {
        if let Some(record) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scheme_host)
        {
            return Ok(RobotsRecord {
                cached: true,
                ..record.clone()
            });
        }

        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let record = conn
            .query_row(
                "SELECT status_code, body, expires FROM robots WHERE scheme_host = ?1",
                params![scheme_host],
                |row| {
                    Ok(RobotsRecord {
                        scheme_host: scheme_host.to_string(),
                        status_code: row.get(0)?,
                        body: row.get(1)?,
                        expires: row.get(2)?,
                        cached: true,
                    })
                },
            )
            .optional()?;

        Ok(record.unwrap_or_else(|| RobotsRecord::new(scheme_host)))
    }

    fn put(&self, record: RobotsRecord) {
        let full = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.insert(record.scheme_host.clone(), record);
            pending.len() >= self.batch_size
        };

        if full {
            self.flush();
        }
    }

    fn flush(&self) {
        let batch: Vec<RobotsRecord> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain().map(|(_, record)| record).collect()
        };

        if batch.is_empty() {
            return;
        }

        let count = batch.len();
        match self.write_batch(batch) {
            Ok(()) => tracing::debug!("Flushed {} robots.txt records", count),
            Err(e) => tracing::warn!("Failed to flush {} robots.txt records: {}", count, e),
        }
    }
}

impl Drop for SqliteRobotsCache {
    fn drop(&mut self) {
        self.flush();
    }
}
