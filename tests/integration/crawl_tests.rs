//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run whole crawl
//! sessions end-to-end against in-memory and SQLite stores.

use std::sync::Arc;
use std::time::Duration;
use sumi_crawler::config::{
    Config, CrawlerConfig, QueueKind, StorageConfig, TransportConfig, TruncateConfig,
    UserAgentConfig,
};
use sumi_crawler::queue::{MemoryQueue, Queue, SqliteQueue};
use sumi_crawler::robots::{MemoryRobotsCache, RobotsCache, SqliteRobotsCache};
use sumi_crawler::storage::{Backend, MemoryBackend, SqliteBackend};
use sumi_crawler::{Crawler, SessionState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with the given seeds
fn create_test_config(seeds: Vec<String>, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 10,
            seeds,
            since_hours: 24,
            session_secs: 1,
            timeout_secs: 5,
            max_bytes: -1,
            max_queue_links: 1000,
            max_links: -1,
            max_domain_links: 1000,
            queued_ttl_secs: 600,
            reservation_ttl_secs: 600,
            idle_poll_ms: 10,
            truncate: TruncateConfig::default(),
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        storage: StorageConfig {
            database_path: db_path.to_string(),
            queue: QueueKind::Memory,
            robots_batch_size: 1,
        },
        transport: TransportConfig::default(),
    }
}

/// Starts a server answering 404 for robots.txt and `body` for `/`
async fn hello_server(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// True if `link` is still queued or was dequeued during the session
fn was_discovered(queue: &MemoryQueue, link: &str) -> bool {
    if queue.contains(link) {
        return true;
    }
    // A dequeued link keeps its queued marker, so it cannot be dequeued again
    queue.add_link(link).unwrap();
    queue.queue_link(Duration::from_secs(1)).unwrap().is_none()
}

#[tokio::test]
async fn test_session_crawls_two_hosts() {
    let first = hello_server("hello").await;
    let second = hello_server("hello").await;
    let seeds = vec![format!("{}/", first.uri()), format!("{}/", second.uri())];

    let backend = Arc::new(MemoryBackend::new());
    let crawler = Crawler::new(
        create_test_config(seeds.clone(), ":memory:"),
        Arc::new(MemoryQueue::new()),
        Arc::new(MemoryRobotsCache::new()),
        backend.clone(),
    )
    .expect("Failed to build crawler");

    crawler
        .start(Duration::from_secs(1))
        .await
        .expect("Crawl session failed");
    crawler.close();

    assert_eq!(crawler.state(), SessionState::Stopped);
    assert_eq!(crawler.stats().count(200), 2);
    assert_eq!(crawler.stats().total(), 2);

    for seed in &seeds {
        let doc = backend.get(seed).expect("Seed was not stored");
        assert_eq!(doc.status_code, 200);
        assert_eq!(doc.mime.as_deref(), Some("text/plain"));
    }
}

#[tokio::test]
async fn test_canonical_header_stores_stub() {
    let server = MockServer::start().await;
    let canonical = format!("{}/canonical", server.uri());

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", format!("<{}>; rel=\"canonical\"", canonical).as_str())
                .set_body_string("<html><head><title>Copy</title></head><body></body></html>"),
        )
        .mount(&server)
        .await;

    let seed = format!("{}/", server.uri());
    let queue = Arc::new(MemoryQueue::new());
    let backend = Arc::new(MemoryBackend::new());
    let crawler = Crawler::new(
        create_test_config(vec![seed.clone()], ":memory:"),
        queue.clone(),
        Arc::new(MemoryRobotsCache::new()),
        backend.clone(),
    )
    .expect("Failed to build crawler");

    crawler
        .start(Duration::from_millis(500))
        .await
        .expect("Crawl session failed");

    let doc = backend.get(&seed).expect("Seed was not stored");
    assert_eq!(doc.status_code, 200);
    assert!(doc.title.is_empty());
    assert!(!doc.canonical);
    assert!(was_discovered(&queue, &canonical));
}

#[tokio::test]
async fn test_robots_disallow_counts_not_crawled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: TestBot\nDisallow: /\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(0)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryBackend::new());
    let crawler = Crawler::new(
        create_test_config(vec![format!("{}/", server.uri())], ":memory:"),
        Arc::new(MemoryQueue::new()),
        Arc::new(MemoryRobotsCache::new()),
        backend.clone(),
    )
    .expect("Failed to build crawler");

    crawler
        .start(Duration::from_millis(500))
        .await
        .expect("Crawl session failed");

    assert_eq!(crawler.stats().count(-1), 1);
    assert!(backend.is_empty());
}

#[tokio::test]
async fn test_sqlite_session_persists_state() {
    let server = hello_server("<html><head><title>Persisted</title></head></html>").await;
    let seed = format!("{}/", server.uri());

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("crawl.db");
    let mut config = create_test_config(vec![seed.clone()], db_path.to_str().unwrap());
    config.storage.queue = QueueKind::Sqlite;

    {
        let backend = SqliteBackend::open(&db_path).unwrap();
        backend.setup().unwrap();
        let robots = SqliteRobotsCache::open(&db_path, 1).unwrap();
        robots.setup().unwrap();
        let queue = SqliteQueue::open(&db_path).unwrap();
        queue.setup().unwrap();

        let crawler = Crawler::new(
            config.clone(),
            Arc::new(queue),
            Arc::new(robots),
            Arc::new(backend),
        )
        .expect("Failed to build crawler");
        crawler
            .start(Duration::from_millis(500))
            .await
            .expect("Crawl session failed");
        crawler.close();
        assert_eq!(crawler.stats().count(200), 1);
    }

    let backend = SqliteBackend::open(&db_path).unwrap();
    assert_eq!(backend.count_documents().unwrap(), 1);
    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let (status, title): (i32, Option<String>) = conn
        .query_row(
            "SELECT status_code, title FROM documents WHERE id = ?1",
            [&seed],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(title.as_deref(), Some("Persisted"));

    let robots = SqliteRobotsCache::open(&db_path, 1).unwrap();
    let record = robots.get(&server.uri()).unwrap();
    assert!(record.cached);
    assert_eq!(record.status_code, 404);
}

#[tokio::test]
async fn test_fresh_documents_not_refetched_next_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&server)
        .await;

    let seed = format!("{}/", server.uri());
    let backend = Arc::new(MemoryBackend::new());

    for _ in 0..2 {
        let crawler = Crawler::new(
            create_test_config(vec![seed.clone()], ":memory:"),
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryRobotsCache::new()),
            backend.clone(),
        )
        .expect("Failed to build crawler");
        crawler
            .start(Duration::from_millis(300))
            .await
            .expect("Crawl session failed");
    }

    assert_eq!(backend.len(), 1);
}
