//! HTTP fetching
//!
//! This module handles all HTTP traffic for the crawler:
//! - Building the shared client with the crawler's user agent
//! - Redirect policy (followed for robots.txt only)
//! - robots.txt retrieval into cache records
//! - Byte-bounded body reads

use super::resolver::CachingResolver;
use crate::config::Config;
use crate::robots::RobotsRecord;
use crate::url::{is_robots_path, ROBOTS_PATH};
use chrono::{DateTime, Utc};
use reqwest::{redirect::Policy, Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Maximum redirect hops followed for robots.txt
const MAX_ROBOTS_REDIRECTS: usize = 10;

/// robots.txt content beyond this many bytes is ignored
const ROBOTS_MAX_BYTES: u64 = 500 * 1024;

/// Upper bound for connection establishment
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the HTTP client shared by all workers
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_crawler::config::load_config;
/// use sumi_crawler::crawler::build_http_client;
///
/// let config = load_config(Path::new("crawler.toml")).unwrap();
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let timeout = config.crawler.timeout();

    Client::builder()
        .user_agent(config.user_agent.full())
        .timeout(timeout)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        // Hosts are rarely revisited within the idle window
        .pool_max_idle_per_host(0)
        .redirect(redirect_policy())
        .gzip(true)
        .brotli(true)
        .dns_resolver(Arc::new(CachingResolver::new(config.transport.dns_ttl())))
        .build()
}

/// Follows redirects only when the chain started at a robots.txt path
///
/// Page redirects are returned as-is so that their status is recorded and
/// the host delay applies to the host that was actually reserved.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        let from_robots = attempt.previous().first().is_some_and(is_robots_path);
        if !from_robots {
            attempt.stop()
        } else if attempt.previous().len() > MAX_ROBOTS_REDIRECTS {
            attempt.error("too many robots.txt redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Returns the robots.txt URL for the host serving `url`
pub fn robots_url(url: &Url) -> Url {
    let mut robots = url.clone();
    robots.set_path(ROBOTS_PATH);
    robots.set_query(None);
    robots.set_fragment(None);
    robots
}

/// Fetches robots.txt for the host of `url` into a fresh cache record
///
/// The body is kept only for 2xx responses; other statuses are decided by
/// their status code alone.
pub async fn fetch_robots(
    client: &Client,
    url: &Url,
    scheme_host: &str,
    fetched_at: DateTime<Utc>,
) -> Result<RobotsRecord, reqwest::Error> {
    let response = client.get(robots_url(url)).send().await?;
    let status = i32::from(response.status().as_u16());
    debug!("robots.txt for {} returned {}", scheme_host, status);

    let mut record = RobotsRecord::new(scheme_host)
        .set_status_code(status)
        .set_expires_at(fetched_at);

    if response.status().is_success() {
        let body = read_body(response, Some(ROBOTS_MAX_BYTES)).await?;
        record = record.set_body(String::from_utf8_lossy(&body));
    }

    Ok(record)
}

/// Reads a response body, stopping after `limit` bytes when one is set
pub async fn read_body(mut response: Response, limit: Option<u64>) -> Result<Vec<u8>, reqwest::Error> {
    let limit = limit.and_then(|limit| usize::try_from(limit).ok());
    let mut body = Vec::new();

    while let Some(chunk) = response.chunk().await? {
        match limit {
            Some(limit) => {
                let remaining = limit.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                if body.len() >= limit {
                    break;
                }
            }
            None => body.extend_from_slice(&chunk),
        }
    }

    Ok(body)
}
