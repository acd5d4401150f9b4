use crate::robots::{RobotsCache, RobotsError, RobotsRecord};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// In-process robots cache
#[derive(Debug, Default)]
pub struct MemoryRobotsCache {
    records: Mutex<HashMap<String, RobotsRecord>>,
}

impl MemoryRobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached hosts
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RobotsCache for MemoryRobotsCache {
    fn setup(&self) -> Result<(), RobotsError> {
        Ok(())
    }

    fn get(&self, scheme_host: &str) -> Result<RobotsRecord, RobotsError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(match records.get(scheme_host) {
            Some(record) => RobotsRecord {
                cached: true,
                ..record.clone()
            },
            None => RobotsRecord::new(scheme_host),
        })
    }

    fn put(&self, record: RobotsRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.scheme_host.clone(), record);
    }
}
