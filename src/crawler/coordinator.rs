//! Crawl session coordination
//!
//! The coordinator owns one crawl session:
//! - a link handler moving discovered links into the queue
//! - a dequeuer feeding a rendezvous work channel
//! - a fixed pool of workers running the per-link procedure
//!
//! A session ends when its wall-clock duration elapses or a fatal error is
//! reported, whichever comes first. Either way the dequeuer stops, in-flight
//! links finish and the link handler drains before `start` returns.

use super::fetcher::build_http_client;
use super::worker::Worker;
use crate::config::Config;
use crate::output::CrawlStats;
use crate::queue::{Queue, QueueError};
use crate::robots::RobotsCache;
use crate::storage::Backend;
use crate::CrawlError;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// How often the dequeuer deletes expired queue keys
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configured, not started
    Idle,
    /// Workers are crawling
    Running,
    /// Dequeuing stopped, in-flight work finishing
    Draining,
    /// Session over
    Stopped,
}

/// Runs crawl sessions against a queue, robots cache and content backend
pub struct Crawler {
    config: Arc<Config>,
    client: Client,
    queue: Arc<dyn Queue>,
    robots: Arc<dyn RobotsCache>,
    backend: Arc<dyn Backend>,
    stats: Arc<CrawlStats>,
    state: Mutex<SessionState>,
    closed: AtomicBool,
}

impl Crawler {
    /// Creates a crawler with an HTTP client built from `config`
    pub fn new(
        config: Config,
        queue: Arc<dyn Queue>,
        robots: Arc<dyn RobotsCache>,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, CrawlError> {
        let client = build_http_client(&config)?;
        Ok(Self::with_client(config, client, queue, robots, backend))
    }

    /// Creates a crawler around an existing HTTP client
    pub fn with_client(
        config: Config,
        client: Client,
        queue: Arc<dyn Queue>,
        robots: Arc<dyn RobotsCache>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            queue,
            robots,
            backend,
            stats: Arc::new(CrawlStats::new()),
            state: Mutex::new(SessionState::Idle),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live statistics of the session
    pub fn stats(&self) -> &CrawlStats {
        &self.stats
    }

    fn set_state(&self, state: SessionState) {
        debug!("Crawl session is now {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Runs one session for `duration`
    ///
    /// Seeds are pushed onto the discovery channel before workers start.
    /// Returns the first fatal error, if any, after the session has drained.
    ///
    /// # Arguments
    ///
    /// * `duration` - Wall-clock length of the session
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The session ran until its deadline
    /// * `Err(CrawlError)` - A store failed; the session stopped early
    pub async fn start(&self, duration: Duration) -> Result<(), CrawlError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SessionState::Idle {
                return Err(CrawlError::AlreadyStarted);
            }
            *state = SessionState::Running;
        }

        let workers = self.config.crawler.workers;
        info!(
            "Starting crawl session: {} workers, {} seeds, {:?}",
            workers,
            self.config.crawler.seeds.len(),
            duration
        );

        let (links_tx, links_rx) = mpsc::unbounded_channel::<String>();
        let (work_tx, work_rx) = mpsc::channel::<String>(1);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<CrawlError>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handler = tokio::spawn(handle_links(
            self.queue.clone(),
            links_rx,
            fatal_tx.clone(),
        ));

        for seed in &self.config.crawler.seeds {
            // The handler holds the receiver until every sender is gone
            let _ = links_tx.send(seed.clone());
        }

        let dequeuer = tokio::spawn(dequeue_links(
            self.queue.clone(),
            work_tx,
            shutdown_rx,
            fatal_tx.clone(),
            self.config.crawler.queued_ttl(),
            self.config.crawler.idle_poll(),
        ));

        let worker = Arc::new(Worker {
            config: self.config.clone(),
            client: self.client.clone(),
            queue: self.queue.clone(),
            robots: self.robots.clone(),
            backend: self.backend.clone(),
            stats: self.stats.clone(),
            discovered: links_tx,
            fatal: fatal_tx,
        });
        let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(run_worker(id, worker.clone(), work_rx.clone()));
        }
        // Workers own the last discovery and fatal senders from here on
        drop(worker);

        let result = tokio::select! {
            _ = tokio::time::sleep(duration) => {
                info!("Crawl session deadline reached");
                Ok(())
            }
            Some(err) = fatal_rx.recv() => {
                error!("Stopping crawl session: {}", err);
                Err(err)
            }
        };

        self.set_state(SessionState::Draining);
        let _ = shutdown_tx.send(true);

        if let Err(e) = dequeuer.await {
            error!("Dequeuer task failed: {}", e);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }
        if let Err(e) = handler.await {
            error!("Link handler task failed: {}", e);
        }

        while let Ok(err) = fatal_rx.try_recv() {
            error!("Fatal error while draining: {}", err);
        }

        self.robots.flush();
        self.set_state(SessionState::Stopped);
        info!("Crawl session stopped after {:.2?}", self.stats.elapsed());

        result
    }

    /// Flushes buffered robots.txt records and logs final statistics
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.robots.flush();
        for line in self.stats.report().lines() {
            info!("{}", line);
        }
    }
}

/// Moves discovered links into the queue until every sender is dropped
async fn handle_links(
    queue: Arc<dyn Queue>,
    mut links: UnboundedReceiver<String>,
    fatal: UnboundedSender<CrawlError>,
) {
    while let Some(link) = links.recv().await {
        if let Err(source) = queue.add_link(&link) {
            let _ = fatal.send(CrawlError::Queue {
                context: link,
                source,
            });
            break;
        }
    }
    debug!("Link handler finished");
}

/// Pops links from the queue into the work channel until shutdown
///
/// A link popped while every worker is busy goes back to the queue if the
/// session stops before a worker takes it. Expired queue keys are purged
/// when the loop starts and every [`PURGE_INTERVAL`] after that.
async fn dequeue_links(
    queue: Arc<dyn Queue>,
    work: Sender<String>,
    mut shutdown: watch::Receiver<bool>,
    fatal: UnboundedSender<CrawlError>,
    queued_ttl: Duration,
    idle_poll: Duration,
) {
    let report = |context: &str, source: QueueError| {
        let _ = fatal.send(CrawlError::Queue {
            context: context.to_string(),
            source,
        });
    };
    let mut last_purge: Option<Instant> = None;

    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }

        if last_purge.map_or(true, |at| at.elapsed() >= PURGE_INTERVAL) {
            match queue.purge_expired() {
                Ok(purged) => debug!("Purged {} expired queue keys", purged),
                Err(source) => {
                    report("purge", source);
                    break;
                }
            }
            last_purge = Some(Instant::now());
        }

        let link = match queue.queue_link(queued_ttl) {
            Ok(link) => link,
            Err(source) => {
                report("dequeue", source);
                break;
            }
        };

        match link {
            Some(link) => {
                let permit = tokio::select! {
                    permit = work.reserve() => permit.ok(),
                    _ = shutdown.changed() => None,
                };
                match permit {
                    Some(permit) => permit.send(link),
                    None => {
                        debug!("Returning {} to the queue", link);
                        if let Err(source) = queue.requeue_link(&link) {
                            report(&link, source);
                        }
                        break;
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(idle_poll) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    debug!("Dequeuer finished");
}

async fn run_worker(id: u32, worker: Arc<Worker>, work: Arc<tokio::sync::Mutex<Receiver<String>>>) {
    loop {
        let link = work.lock().await.recv().await;
        match link {
            Some(link) => worker.crawl(&link).await,
            None => break,
        }
    }
    debug!("Worker {} finished", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CrawlerConfig, QueueKind, StorageConfig, TransportConfig, TruncateConfig, UserAgentConfig,
    };
    use crate::document::Document;
    use crate::queue::{MemoryQueue, SqliteQueue};
    use crate::robots::{MemoryRobotsCache, RobotsError, RobotsRecord};
    use crate::storage::{BackendError, BackendResult, CrawlHistory, MemoryBackend};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(seeds: Vec<String>) -> Config {
        Config {
            crawler: CrawlerConfig {
                workers: 4,
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
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            storage: StorageConfig {
                database_path: ":memory:".to_string(),
                queue: QueueKind::Memory,
                robots_batch_size: 1,
            },
            transport: TransportConfig::default(),
        }
    }

    /// Backend whose upserts always fail
    struct BrokenBackend;

    impl Backend for BrokenBackend {
        fn setup(&self) -> BackendResult<()> {
            Ok(())
        }

        fn crawled_and_count(&self, _url: &str, _domain: &str) -> BackendResult<CrawlHistory> {
            Ok(CrawlHistory::default())
        }

        fn upsert(&self, _doc: &Document) -> BackendResult<()> {
            Err(BackendError::Sqlite(rusqlite::Error::InvalidQuery))
        }
    }

    /// Robots cache counting flushes
    #[derive(Default)]
    struct CountingRobots {
        inner: MemoryRobotsCache,
        flushes: std::sync::atomic::AtomicUsize,
    }

    impl RobotsCache for CountingRobots {
        fn setup(&self) -> Result<(), RobotsError> {
            self.inner.setup()
        }

        fn get(&self, scheme_host: &str) -> Result<RobotsRecord, RobotsError> {
            self.inner.get(scheme_host)
        }

        fn put(&self, record: RobotsRecord) {
            self.inner.put(record)
        }

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn page_server(body: &str) -> MockServer {
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

    #[tokio::test]
    async fn test_session_crawls_seeds() {
        let server = page_server("hello").await;
        let seed = format!("{}/", server.uri());
        let backend = Arc::new(MemoryBackend::new());
        let crawler = Crawler::new(
            create_test_config(vec![seed.clone()]),
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryRobotsCache::new()),
            backend.clone(),
        )
        .unwrap();

        assert_eq!(crawler.state(), SessionState::Idle);
        crawler.start(Duration::from_millis(500)).await.unwrap();
        assert_eq!(crawler.state(), SessionState::Stopped);

        assert_eq!(crawler.stats().count(200), 1);
        assert_eq!(backend.get(&seed).unwrap().status_code, 200);
    }

    #[tokio::test]
    async fn test_session_cannot_restart() {
        let crawler = Crawler::new(
            create_test_config(vec!["http://127.0.0.1:9/".to_string()]),
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryRobotsCache::new()),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();

        crawler.start(Duration::from_millis(50)).await.unwrap();
        assert!(matches!(
            crawler.start(Duration::from_millis(50)).await,
            Err(CrawlError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_session() {
        let server = page_server("hello").await;
        let crawler = Crawler::new(
            create_test_config(vec![format!("{}/", server.uri())]),
            Arc::new(MemoryQueue::new()),
            Arc::new(MemoryRobotsCache::new()),
            Arc::new(BrokenBackend),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let result = crawler.start(Duration::from_secs(30)).await;

        assert!(matches!(result, Err(CrawlError::Backend { .. })));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(crawler.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_discovered_links_reach_queue() {
        let server = page_server(r#"<html><body><a href="/next">next</a></body></html>"#).await;
        Mock::given(method("GET"))
            .and(path("/next"))
            .respond_with(ResponseTemplate::new(200).set_body_string("end"))
            .mount(&server)
            .await;

        let queue = Arc::new(MemoryQueue::new());
        let mut config = create_test_config(vec![format!("{}/", server.uri())]);
        // One worker and one host: the host delay keeps /next queued
        config.crawler.workers = 1;
        let crawler = Crawler::new(
            config,
            queue.clone(),
            Arc::new(MemoryRobotsCache::new()),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();

        crawler.start(Duration::from_millis(300)).await.unwrap();

        let next = format!("{}/next", server.uri());
        if !queue.contains(&next) {
            // Dequeued during the session: its queued marker is still live
            queue.add_link(&next).unwrap();
            assert_eq!(queue.queue_link(Duration::from_secs(1)).unwrap(), None);
        }
        assert_eq!(crawler.stats().count(200), 1);
    }

    #[tokio::test]
    async fn test_close_flushes_once() {
        let robots = Arc::new(CountingRobots::default());
        let crawler = Crawler::new(
            create_test_config(vec!["http://127.0.0.1:9/".to_string()]),
            Arc::new(MemoryQueue::new()),
            robots.clone(),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();

        crawler.close();
        crawler.close();
        assert_eq!(robots.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_requeues_pending_link() {
        let queue = Arc::new(MemoryQueue::new());
        queue.add_link("https://example.com/a").unwrap();
        queue.add_link("https://example.com/b").unwrap();
        let (work_tx, mut work_rx) = mpsc::channel(1);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dequeuer = tokio::spawn(dequeue_links(
            queue.clone(),
            work_tx,
            shutdown_rx,
            fatal_tx,
            Duration::from_secs(600),
            Duration::from_millis(10),
        ));
        // Nobody reads the work channel: the first link fills it and the
        // second waits for capacity
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.count_links().unwrap(), 0);

        shutdown_tx.send(true).unwrap();
        dequeuer.await.unwrap();
        assert!(fatal_rx.try_recv().is_err());

        let sent = work_rx.recv().await.unwrap();
        assert!(work_rx.recv().await.is_none());
        let pending = queue.queue_link(Duration::from_secs(600)).unwrap().unwrap();
        assert_ne!(sent, pending);
        assert_eq!(queue.count_links().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_session_purges_expired_keys() {
        let queue = Arc::new(SqliteQueue::open_in_memory().unwrap());
        queue.setup().unwrap();
        let short = Duration::from_millis(1);
        queue.reserve_host("https://example.com", short).unwrap();
        queue.add_link("https://example.com/").unwrap();
        assert!(queue.queue_link(short).unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let crawler = Crawler::new(
            create_test_config(vec!["http://127.0.0.1:9/".to_string()]),
            queue.clone(),
            Arc::new(MemoryRobotsCache::new()),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap();
        crawler.start(Duration::from_millis(100)).await.unwrap();

        assert_eq!(queue.purge_expired().unwrap(), 0);
    }
}
