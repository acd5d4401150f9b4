use crate::queue::{host_key, queued_key, Queue, QueueError};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Longest TTL an in-process key can carry
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Default)]
struct State {
    links: HashSet<String>,
    keys: HashMap<String, Instant>,
}

impl State {
    fn is_live(&self, key: &str, now: Instant) -> bool {
        self.keys.get(key).is_some_and(|expires| *expires > now)
    }

    /// Sets the key only if it is absent (or expired)
    fn set_nx(&mut self, key: String, ttl: Duration, now: Instant) -> bool {
        if self.is_live(&key, now) {
            return false;
        }
        self.keys.insert(key, now + ttl.min(MAX_TTL));
        true
    }

    /// Sets the key only if it is present
    fn set_xx(&mut self, key: &str, ttl: Duration, now: Instant) -> bool {
        if !self.is_live(key, now) {
            return false;
        }
        self.keys.insert(key.to_string(), now + ttl.min(MAX_TTL));
        true
    }

    fn del(&mut self, key: &str, now: Instant) -> bool {
        let live = self.is_live(key, now);
        self.keys.remove(key);
        live
    }
}

/// In-process link queue
///
/// A single mutex guards the discovery set and the key space, so every
/// operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a link is waiting in the discovery set
    pub fn contains(&self, link: &str) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .links
            .contains(link)
    }
}

impl Queue for MemoryQueue {
    fn count_links(&self) -> Result<i64, QueueError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(i64::try_from(state.links.len()).unwrap_or(i64::MAX))
    }

    fn add_link(&self, link: &str) -> Result<(), QueueError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .links
            .insert(link.to_string());
        Ok(())
    }

    fn queue_link(&self, ttl: Duration) -> Result<Option<String>, QueueError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(link) = state.links.iter().next().cloned() else {
            return Ok(None);
        };
        state.links.remove(&link);

        if state.set_nx(queued_key(&link), ttl, Instant::now()) {
            Ok(Some(link))
        } else {
            Ok(None)
        }
    }

    fn reserve_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.set_nx(host_key(host), ttl, Instant::now()) {
            Ok(())
        } else {
            Err(QueueError::AlreadyReserved)
        }
    }

    fn delay_host(&self, host: &str, ttl: Duration) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let key = host_key(host);
        let now = Instant::now();

        let done = if ttl.is_zero() {
            state.del(&key, now)
        } else {
            state.set_xx(&key, ttl, now)
        };

        if done {
            Ok(())
        } else {
            Err(QueueError::NotDelayed)
        }
    }

    fn requeue_link(&self, link: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.keys.remove(&queued_key(link));
        state.links.insert(link.to_string());
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize, QueueError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let before = state.keys.len();
        state.keys.retain(|_, expires| *expires > now);

        // Picking the first link walks empty buckets left behind by pops
        if state.links.capacity() > 4 * state.links.len().max(16) {
            state.links.shrink_to_fit();
        }
        Ok(before - state.keys.len())
    }
}
