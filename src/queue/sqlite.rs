//! SQLite-backed link queue
//!
//! The discovery set lives in `queue_links`. Queued-link markers and host
//! reservations share `queue_keys` with an expiry in epoch milliseconds;
//! an expired row counts as absent.

use crate::queue::{host_key, queued_key, Queue, QueueError};
use crate::storage::schema::{initialize_schema, open_connection};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub struct SqliteQueue {
    conn: Mutex<Connection>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// Sets the key only if it is absent or expired
fn set_nx(conn: &Connection, key: &str, ttl: Duration) -> Result<bool, rusqlite::Error> {
    let now = now_ms();
    let changed = conn.execute(
        "INSERT INTO queue_keys (key, expires_at) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET expires_at = excluded.expires_at
         WHERE queue_keys.expires_at <= ?3",
        params![key, expiry_ms(now, ttl), now],
    )?;
    Ok(changed == 1)
}

/// Sets the key only if it is live
fn set_xx(conn: &Connection, key: &str, ttl: Duration) -> Result<bool, rusqlite::Error> {
    let now = now_ms();
    let changed = conn.execute(
        "UPDATE queue_keys SET expires_at = ?2 WHERE key = ?1 AND expires_at > ?3",
        params![key, expiry_ms(now, ttl), now],
    )?;
    Ok(changed == 1)
}

fn del(conn: &Connection, key: &str) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        "DELETE FROM queue_keys WHERE key = ?1 AND expires_at > ?2",
        params![key, now_ms()],
    )?;
    Ok(changed == 1)
}

impl SqliteQueue {
    /// Opens (or creates) the queue in the database at `path`
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        Ok(Self {
            conn: Mutex::new(open_connection(path)?),
        })
    }

    /// Creates an in-memory queue (for testing)
    pub fn open_in_memory() -> Result<Self, QueueError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }
}

impl Queue for SqliteQueue {
    fn setup(&self) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        initialize_schema(&conn)?;
        Ok(())
    }

    fn count_links(&self) -> Result<i64, QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(conn.query_row("SELECT COUNT(*) FROM queue_links", [], |row| row.get(0))?)
    }

    fn add_link(&self, link: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT OR IGNORE INTO queue_links (url) VALUES (?1)",
            params![link],
        )?;
        Ok(())
    }

    fn queue_link(&self, ttl: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;

        let link: Option<String> = tx
            .query_row(
                "DELETE FROM queue_links
                 WHERE url = (SELECT url FROM queue_links ORDER BY RANDOM() LIMIT 1)
                 RETURNING url",
                [],
                |row| row.get(0),
            )
            .optional()?;

        // Popped but already marked: the link is skipped for this tick
        let queued = match link {
            Some(link) => set_nx(&tx, &queued_key(&link), ttl)?.then_some(link),
            None => None,
        };

        tx.commit()?;
        Ok(queued)
    }

    fn reserve_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if set_nx(&conn, &host_key(host), ttl)? {
            Ok(())
        } else {
            Err(QueueError::AlreadyReserved)
        }
    }

    fn delay_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let key = host_key(host);

        let done = if ttl.is_zero() {
            del(&conn, &key)?
        } else {
            set_xx(&conn, &key, ttl)?
        };

        if done {
            Ok(())
        } else {
            Err(QueueError::NotDelayed)
        }
    }

    fn requeue_link(&self, link: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM queue_keys WHERE key = ?1", params![queued_key(link)])?;
        tx.execute(
            "INSERT OR IGNORE INTO queue_links (url) VALUES (?1)",
            params![link],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, QueueError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(conn.execute(
            "DELETE FROM queue_keys WHERE expires_at <= ?1",
            params![now_ms()],
        )?)
    }
}
