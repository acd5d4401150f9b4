use crate::document::Document;
use crate::storage::{Backend, BackendResult, CrawlHistory};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// In-process backend used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, Document>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a stored document by id
    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    fn setup(&self) -> BackendResult<()> {
        Ok(())
    }

    fn crawled_and_count(&self, url: &str, domain: &str) -> BackendResult<CrawlHistory> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        let domain_links = documents.values().filter(|d| d.domain == domain).count();

        Ok(CrawlHistory {
            last_crawled: documents.get(url).and_then(|d| d.crawled),
            domain_links: u64::try_from(domain_links).unwrap_or(u64::MAX),
        })
    }

    fn upsert(&self, doc: &Document) -> BackendResult<()> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(doc.id.clone(), doc.clone());
        Ok(())
    }
}
