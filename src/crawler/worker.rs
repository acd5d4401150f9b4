//! Per-link crawl procedure
//!
//! A worker takes one dequeued link through reservation, freshness and
//! budget checks, robots.txt, the fetch itself, content extraction and the
//! backend upsert. The host reservation is always released with a computed
//! courtesy delay, whatever happened in between.

use super::delay::{calculate_host_delay, delay_ttl};
use super::fetcher::{fetch_robots, read_body};
use crate::config::Config;
use crate::document::{Document, NOT_CRAWLED};
use crate::output::CrawlStats;
use crate::queue::{Queue, QueueError};
use crate::robots::{RobotsCache, RobotsRecord};
use crate::storage::Backend;
use crate::CrawlError;
use chrono::{TimeDelta, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Inputs to the host delay gathered while crawling one link
#[derive(Debug, Default)]
struct DelayHints {
    /// Baseline from robots.txt `Crawl-delay`
    crawl_delay: TimeDelta,
    /// Raw `Retry-After` header, empty if absent
    retry_after: String,
}

/// Everything a worker needs, shared by all workers of a session
pub(crate) struct Worker {
    pub config: Arc<Config>,
    pub client: Client,
    pub queue: Arc<dyn Queue>,
    pub robots: Arc<dyn RobotsCache>,
    pub backend: Arc<dyn Backend>,
    pub stats: Arc<CrawlStats>,
    /// Discovery channel feeding the link handler
    pub discovered: UnboundedSender<String>,
    /// Fatal errors end the session
    pub fatal: UnboundedSender<CrawlError>,
}

impl Worker {
    /// Crawls one dequeued link
    ///
    /// Recoverable problems are logged and end the procedure early; store
    /// failures are reported on the fatal channel.
    pub async fn crawl(&self, link: &str) {
        let mut doc = match Document::new(link) {
            Ok(doc) => doc,
            Err(e) => {
                debug!("Dropping link {}: {}", link, e);
                return;
            }
        };

        let host = doc.scheme_host();
        match self
            .queue
            .reserve_host(&host, self.config.crawler.reservation_ttl())
        {
            Ok(()) => {}
            Err(QueueError::AlreadyReserved) => {
                debug!("Host {} is busy, dropping {}", host, doc.id);
                return;
            }
            Err(source) => {
                self.report(CrawlError::Queue {
                    context: host,
                    source,
                });
                return;
            }
        }

        let mut hints = DelayHints::default();
        if let Err(e) = self.visit(&mut doc, &mut hints).await {
            self.report(e);
        }

        self.release(&host, &doc, &hints);
    }

    /// Re-arms the host reservation with the computed courtesy delay
    fn release(&self, host: &str, doc: &Document, hints: &DelayHints) {
        let delay = calculate_host_delay(doc.status_code, &hints.retry_after, hints.crawl_delay);
        debug!("Delaying {} for {}s", host, delay.num_seconds());

        match self.queue.delay_host(host, delay_ttl(delay)) {
            Ok(()) => {}
            Err(QueueError::NotDelayed) => {
                warn!("Reservation for {} expired before {} finished", host, doc.id)
            }
            Err(source) => self.report(CrawlError::Queue {
                context: host.to_string(),
                source,
            }),
        }
    }

    async fn visit(&self, doc: &mut Document, hints: &mut DelayHints) -> Result<(), CrawlError> {
        let crawler = &self.config.crawler;
        let bot = self.config.user_agent.short();

        let history = self
            .backend
            .crawled_and_count(&doc.id, &doc.domain)
            .map_err(|source| CrawlError::Backend {
                url: doc.id.clone(),
                source,
            })?;

        let now = Utc::now();
        let fresh_after = TimeDelta::from_std(crawler.since())
            .ok()
            .and_then(|since| now.checked_sub_signed(since));
        if let Some(last) = history.last_crawled {
            if fresh_after.map_or(true, |threshold| last >= threshold) {
                debug!("Skipping {}: crawled at {}", doc.id, last);
                return Ok(());
            }
        } else if history.domain_links > crawler.max_domain_links {
            debug!(
                "Skipping {}: {} already holds {} documents",
                doc.id, doc.domain, history.domain_links
            );
            return Ok(());
        }

        doc.set_status_code(NOT_CRAWLED).set_crawled(now);

        let record = self.robots_record(doc).await?;
        let rules = match record.rules() {
            Ok(rules) => rules,
            Err(e) => {
                debug!("Unusable robots.txt for {}: {}", record.scheme_host, e);
                self.stats.update(NOT_CRAWLED);
                return Ok(());
            }
        };

        if !rules.is_allowed(doc.url.as_str(), bot) {
            debug!("Disallowed by robots.txt: {}", doc.id);
            self.stats.update(NOT_CRAWLED);
            return Ok(());
        }
        if let Some(delay) = rules.crawl_delay(bot) {
            hints.crawl_delay = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
        }

        let response = match self.client.get(doc.url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                info!("Failed to fetch {}: {}", doc.id, e);
                self.stats.update(NOT_CRAWLED);
                return Ok(());
            }
        };

        let status = i32::from(response.status().as_u16());
        self.stats.update(status);
        doc.set_status_code(status);
        hints.retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if status == 200 {
            let headers = response.headers().clone();
            let body = match read_body(response, crawler.byte_limit()).await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Failed to read body of {}: {}", doc.id, e);
                    return Ok(());
                }
            };

            doc.set_headers(headers)
                .set_policy_from_header(bot)
                .set_body(&body);

            if !doc.is_text() {
                debug!(
                    "Not extracting {}: {}",
                    doc.id,
                    doc.mime.as_deref().unwrap_or_default()
                );
                *doc = doc.stub();
            } else {
                let max_links = if self.queue_saturated() {
                    Some(0)
                } else {
                    crawler.link_limit()
                };

                doc.set_content(bot, max_links, &self.discovered, &crawler.truncate)
                    .set_canonical(&self.discovered);

                if !doc.is_indexable() {
                    debug!(
                        "Storing stub for {} (canonical: {}, index: {})",
                        doc.id, doc.canonical, doc.policy.index
                    );
                    *doc = doc.stub();
                }
            }
        }

        self.backend
            .upsert(doc)
            .map_err(|source| CrawlError::Backend {
                url: doc.id.clone(),
                source,
            })
    }

    /// Returns a usable robots.txt record, re-fetching it when stale
    ///
    /// A failed fetch falls back to whatever the cache returned.
    async fn robots_record(&self, doc: &Document) -> Result<RobotsRecord, CrawlError> {
        let host = doc.scheme_host();
        let cached = self
            .robots
            .get(&host)
            .map_err(|source| CrawlError::Robots {
                host: host.clone(),
                source,
            })?;

        let now = Utc::now();
        if cached.cached && !cached.is_expired_at(now) {
            return Ok(cached);
        }

        match fetch_robots(&self.client, &doc.url, &host, now).await {
            Ok(record) => {
                self.robots.put(record.clone());
                Ok(record)
            }
            Err(e) => {
                info!("Failed to fetch robots.txt for {}: {}", host, e);
                Ok(cached)
            }
        }
    }

    /// True when the discovery set is over its cap
    fn queue_saturated(&self) -> bool {
        match self.queue.count_links() {
            Ok(count) => u64::try_from(count)
                .map(|count| count > self.config.crawler.max_queue_links)
                .unwrap_or(false),
            Err(e) => {
                debug!("Failed to count queued links: {}", e);
                true
            }
        }
    }

    fn report(&self, error: CrawlError) {
        // Send only fails once the session is already stopping
        let _ = self.fatal.send(error);
    }
}
