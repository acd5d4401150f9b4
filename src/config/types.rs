use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: u32,

    /// Links pushed into the queue when a session starts
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Freshness window: a URL crawled within this many hours is skipped
    #[serde(rename = "since-hours")]
    pub since_hours: u64,

    /// Session length in seconds (the command line may override it)
    #[serde(rename = "session-secs")]
    pub session_secs: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Maximum bytes of a document to download (-1 for no limit)
    #[serde(rename = "max-bytes")]
    pub max_bytes: i64,

    /// Discovery set size above which link extraction is suppressed
    #[serde(rename = "max-queue-links")]
    pub max_queue_links: u64,

    /// Maximum links to extract from a single document (-1 for no limit)
    #[serde(rename = "max-links")]
    pub max_links: i64,

    /// Maximum stored links per domain before new links are skipped
    #[serde(rename = "max-domain-links")]
    pub max_domain_links: u64,

    /// Lifetime of the marker installed when a link is dequeued (seconds)
    #[serde(rename = "queued-ttl-secs", default = "default_queued_ttl")]
    pub queued_ttl_secs: u64,

    /// Lifetime of a host reservation (seconds)
    #[serde(rename = "reservation-ttl-secs", default = "default_reservation_ttl")]
    pub reservation_ttl_secs: u64,

    /// How long the dequeue loop sleeps when the discovery set is empty (milliseconds)
    #[serde(rename = "idle-poll-ms", default = "default_idle_poll")]
    pub idle_poll_ms: u64,

    #[serde(default)]
    pub truncate: TruncateConfig,
}

impl CrawlerConfig {
    pub fn since(&self) -> Duration {
        Duration::from_secs(self.since_hours.saturating_mul(60 * 60))
    }

    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn queued_ttl(&self) -> Duration {
        Duration::from_secs(self.queued_ttl_secs)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Byte budget for a response body, `None` when unlimited
    pub fn byte_limit(&self) -> Option<u64> {
        u64::try_from(self.max_bytes).ok()
    }

    /// Link budget for a single document, `None` when unlimited
    pub fn link_limit(&self) -> Option<usize> {
        usize::try_from(self.max_links).ok()
    }
}

fn default_queued_ttl() -> u64 {
    600
}

fn default_reservation_ttl() -> u64 {
    600
}

fn default_idle_poll() -> u64 {
    50
}

/// Truncation limits for extracted content
#[derive(Debug, Clone, Deserialize)]
pub struct TruncateConfig {
    /// Maximum title length (characters)
    pub title: usize,

    /// Maximum number of keywords (words)
    pub keywords: usize,

    /// Maximum description length (characters)
    pub description: usize,
}

impl Default for TruncateConfig {
    fn default() -> Self {
        Self {
            title: 100,
            keywords: 25,
            description: 250,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Full user agent sent with every request
    ///
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn full(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }

    /// Short product token used for robots.txt groups and robots meta tags
    pub fn short(&self) -> &str {
        &self.crawler_name
    }
}

/// Which link queue store to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Memory,
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Link queue store
    #[serde(default = "default_queue_kind")]
    pub queue: QueueKind,

    /// Number of robots.txt records buffered before a batched write
    #[serde(rename = "robots-batch-size", default = "default_robots_batch")]
    pub robots_batch_size: usize,
}

fn default_queue_kind() -> QueueKind {
    QueueKind::Sqlite
}

fn default_robots_batch() -> usize {
    50
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// How long resolved DNS answers are reused (seconds)
    #[serde(rename = "dns-ttl-secs")]
    pub dns_ttl_secs: u64,
}

impl TransportConfig {
    pub fn dns_ttl(&self) -> Duration {
        Duration::from_secs(self.dns_ttl_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { dns_ttl_secs: 600 }
    }
}
