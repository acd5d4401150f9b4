//! Link queue module
//!
//! The queue holds discovered-but-unprocessed links as a set, plus TTL-bound
//! keys: a marker per dequeued link and a reservation per host. All
//! implementations are safe to share between workers without extra locking.

mod memory;
mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use std::time::Duration;
use thiserror::Error;

/// Namespace shared by every queue key
pub const KEY_PREFIX: &str = "crawler:";

/// Errors returned by link queues
#[derive(Debug, Error)]
pub enum QueueError {
    /// Another worker holds the host
    #[error("Host already reserved")]
    AlreadyReserved,

    /// The reservation to re-arm or clear no longer exists
    #[error("Host not delayed: reservation is missing")]
    NotDelayed,

    #[error("Queue store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// The shared crawl frontier
pub trait Queue: Send + Sync {
    /// Prepares the underlying store
    fn setup(&self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Size of the discovery set
    fn count_links(&self) -> Result<i64, QueueError>;

    /// Adds a link to the discovery set; adding a present link is a no-op
    fn add_link(&self, link: &str) -> Result<(), QueueError>;

    /// Removes one arbitrary link and marks it queued for `ttl`
    ///
    /// Returns `None` when the set is empty or the link was already marked.
    fn queue_link(&self, ttl: Duration) -> Result<Option<String>, QueueError>;

    /// Reserves a host for `ttl`, failing with [`QueueError::AlreadyReserved`]
    /// while someone else holds it
    fn reserve_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError>;

    /// Re-arms an existing reservation for `ttl`, or clears it when `ttl` is zero
    ///
    /// Fails with [`QueueError::NotDelayed`] if the reservation is gone.
    fn delay_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError>;

    /// Puts a dequeued link back into the discovery set and clears its marker
    fn requeue_link(&self, link: &str) -> Result<(), QueueError>;

    /// Deletes expired markers and reservations, returning how many went
    fn purge_expired(&self) -> Result<usize, QueueError>;
}

pub(crate) fn queued_key(link: &str) -> String {
    format!("{}q:{}", KEY_PREFIX, link)
}

pub(crate) fn host_key(host: &str) -> String {
    format!("{}h:{}", KEY_PREFIX, host)
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every queue implementation must share

    use super::*;

    pub fn add_link_is_idempotent(queue: &dyn Queue) {
        queue.add_link("https://example.com/").unwrap();
        let once = queue.count_links().unwrap();
        queue.add_link("https://example.com/").unwrap();
        assert_eq!(queue.count_links().unwrap(), once);
        assert_eq!(once, 1);
    }

    pub fn queue_link_pops_and_marks(queue: &dyn Queue) {
        let ttl = Duration::from_secs(600);
        assert_eq!(queue.queue_link(ttl).unwrap(), None);

        queue.add_link("https://example.com/").unwrap();
        assert_eq!(
            queue.queue_link(ttl).unwrap().as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(queue.count_links().unwrap(), 0);

        // Rediscovered before the marker expired: popped but skipped
        queue.add_link("https://example.com/").unwrap();
        assert_eq!(queue.queue_link(ttl).unwrap(), None);
        assert_eq!(queue.count_links().unwrap(), 0);
    }

    pub fn queued_marker_expires(queue: &dyn Queue) {
        let ttl = Duration::from_millis(30);
        queue.add_link("https://example.com/").unwrap();
        assert!(queue.queue_link(ttl).unwrap().is_some());

        std::thread::sleep(Duration::from_millis(60));
        queue.add_link("https://example.com/").unwrap();
        assert!(queue.queue_link(ttl).unwrap().is_some());
    }

    pub fn reserve_host_is_exclusive(queue: &dyn Queue) {
        let ttl = Duration::from_secs(600);
        queue.reserve_host("https://example.com", ttl).unwrap();
        assert!(matches!(
            queue.reserve_host("https://example.com", ttl),
            Err(QueueError::AlreadyReserved)
        ));
        queue.reserve_host("https://example.org", ttl).unwrap();
    }

    pub fn reservation_expires(queue: &dyn Queue) {
        queue
            .reserve_host("https://example.com", Duration::from_millis(30))
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));
        queue
            .reserve_host("https://example.com", Duration::from_secs(600))
            .unwrap();
    }

    pub fn delay_host_requires_reservation(queue: &dyn Queue) {
        let host = "https://example.com";
        assert!(matches!(
            queue.delay_host(host, Duration::from_secs(1)),
            Err(QueueError::NotDelayed)
        ));
        assert!(matches!(
            queue.delay_host(host, Duration::ZERO),
            Err(QueueError::NotDelayed)
        ));

        queue.reserve_host(host, Duration::from_secs(600)).unwrap();
        queue.delay_host(host, Duration::from_secs(5)).unwrap();
        // Still held after re-arming
        assert!(matches!(
            queue.reserve_host(host, Duration::from_secs(600)),
            Err(QueueError::AlreadyReserved)
        ));

        queue.delay_host(host, Duration::ZERO).unwrap();
        queue.reserve_host(host, Duration::from_secs(600)).unwrap();
    }

    pub fn delay_host_after_expiry(queue: &dyn Queue) {
        let host = "https://example.com";
        queue.reserve_host(host, Duration::from_millis(30)).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(
            queue.delay_host(host, Duration::from_secs(1)),
            Err(QueueError::NotDelayed)
        ));
    }

    pub fn requeue_link_restores_link(queue: &dyn Queue) {
        let ttl = Duration::from_secs(600);
        queue.add_link("https://example.com/").unwrap();
        let link = queue.queue_link(ttl).unwrap().unwrap();

        queue.requeue_link(&link).unwrap();
        assert_eq!(queue.count_links().unwrap(), 1);
        assert_eq!(queue.queue_link(ttl).unwrap(), Some(link));
    }

    pub fn purge_expired_keeps_live_keys(queue: &dyn Queue) {
        let short = Duration::from_millis(10);
        queue.reserve_host("https://example.com", short).unwrap();
        queue.add_link("https://example.com/").unwrap();
        assert!(queue.queue_link(short).unwrap().is_some());
        queue
            .reserve_host("https://example.org", Duration::from_secs(600))
            .unwrap();
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(queue.purge_expired().unwrap(), 2);
        assert_eq!(queue.purge_expired().unwrap(), 0);
        assert!(matches!(
            queue.reserve_host("https://example.org", Duration::from_secs(600)),
            Err(QueueError::AlreadyReserved)
        ));
    }
}
