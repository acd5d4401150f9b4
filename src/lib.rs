//! Sumi-Crawler: the crawling core of a search engine
//!
//! This crate discovers, fetches and politely re-visits pages across many
//! independent hosts. It respects robots.txt, crawl-delay and `Retry-After`
//! hints per host, and global budgets on bytes, link fan-out and queue depth.

pub mod config;
pub mod crawler;
pub mod document;
pub mod output;
pub mod queue;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl sessions
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error for {context}: {source}")]
    Queue {
        context: String,
        source: queue::QueueError,
    },

    #[error("Robots cache error for {host}: {source}")]
    Robots {
        host: String,
        source: robots::RobotsError,
    },

    #[error("Backend error for {url}: {source}")]
    Backend {
        url: String,
        source: storage::BackendError,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawl session already started")]
    AlreadyStarted,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{calculate_host_delay, Crawler, SessionState};
pub use document::Document;
pub use output::CrawlStats;
