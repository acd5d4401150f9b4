//! Documents: one crawled URL and what was learned from fetching it
//!
//! A [`Document`] starts as a normalized identity built from a link. After the
//! fetch it collects the status, headers and body, derives the indexing policy
//! and canonical URL, and extracts content. Links found along the way are
//! pushed straight onto the crawler's discovery channel.

mod language;
pub mod mime;
mod parser;

pub use language::match_language;
pub use parser::{parse_html, ParsedPage};

use crate::config::TruncateConfig;
use crate::url::{extract_domain, extract_tld, path_parts, scheme_host, validate_url};
use crate::UrlError;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use std::collections::HashSet;
use std::sync::LazyLock;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

/// Sentinel status for "no HTTP status obtained"
pub const NOT_CRAWLED: i32 = -1;

const X_ROBOTS_TAG: &str = "x-robots-tag";

static CANONICAL_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"<(.*?)>;\s*rel="?canonical"?"#).ok());

/// Whether a page may be indexed and its links followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub index: bool,
    pub follow: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            index: true,
            follow: true,
        }
    }
}

impl Policy {
    /// Applies a comma-separated directive list such as `noindex, follow`
    ///
    /// A list scoped to a user agent (`otherbot: noindex`) only applies when
    /// the agent is `bot`. Directives only ever restrict.
    pub fn apply(&mut self, bot: &str, value: &str) {
        let directives = match value.split_once(':') {
            Some((agent, rest)) if is_agent_token(agent) => {
                if !agent.trim().eq_ignore_ascii_case(bot) {
                    return;
                }
                rest
            }
            _ => value,
        };

        for directive in directives.split(',') {
            match directive.trim().to_lowercase().as_str() {
                "none" => {
                    self.index = false;
                    self.follow = false;
                }
                "noindex" => self.index = false,
                "nofollow" => self.follow = false,
                _ => {}
            }
        }
    }
}

fn is_agent_token(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty()
        && !s.eq_ignore_ascii_case("unavailable_after")
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A crawled (or about to be crawled) URL
#[derive(Debug, Clone)]
pub struct Document {
    /// Normalized URL string, the document's identity
    pub id: String,
    pub url: Url,
    pub scheme: String,
    /// Host including any port
    pub host: String,
    /// Registrable domain, e.g. `example.com` for `www.example.com`
    pub domain: String,
    pub tld: String,
    pub path_parts: String,
    pub crawled: Option<DateTime<Utc>>,
    pub status_code: i32,
    pub mime: Option<String>,
    pub language: String,
    pub title: String,
    pub keywords: String,
    pub description: String,
    pub policy: Policy,
    /// True unless a canonical URL other than `id` was declared
    pub canonical: bool,
    canonical_url: Option<String>,
    headers: HeaderMap,
    body: String,
}

impl Document {
    /// Builds the identity of a link
    ///
    /// Fails for unparsable links, non-http(s) schemes and missing hosts.
    pub fn new(link: &str) -> Result<Self, UrlError> {
        let url = validate_url(link)?;
        let domain = extract_domain(&url).ok_or(UrlError::MissingHost)?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        Ok(Self {
            id: url.to_string(),
            scheme: url.scheme().to_string(),
            tld: extract_tld(&domain),
            path_parts: path_parts(url.path()),
            host,
            domain,
            url,
            crawled: None,
            status_code: 0,
            mime: None,
            language: String::new(),
            title: String::new(),
            keywords: String::new(),
            description: String::new(),
            policy: Policy::default(),
            canonical: true,
            canonical_url: None,
            headers: HeaderMap::new(),
            body: String::new(),
        })
    }

    /// Grouping key for host reservations and robots.txt
    pub fn scheme_host(&self) -> String {
        scheme_host(&self.url)
    }

    pub fn set_status_code(&mut self, code: i32) -> &mut Self {
        self.status_code = code;
        self
    }

    pub fn set_crawled(&mut self, at: DateTime<Utc>) -> &mut Self {
        self.crawled = Some(at);
        self
    }

    pub fn set_headers(&mut self, headers: HeaderMap) -> &mut Self {
        self.headers = headers;
        self
    }

    /// Resets the policy and applies every `X-Robots-Tag` value
    pub fn set_policy_from_header(&mut self, bot: &str) -> &mut Self {
        self.policy = Policy::default();
        for value in self.headers.get_all(X_ROBOTS_TAG) {
            if let Ok(value) = value.to_str() {
                self.policy.apply(bot, value);
            }
        }
        self
    }

    /// Stores the body and sniffs its MIME type
    pub fn set_body(&mut self, body: &[u8]) -> &mut Self {
        self.mime = Some(mime::sniff(body).to_string());
        self.body = String::from_utf8_lossy(body).into_owned();
        self
    }

    /// Whether the sniffed body is worth extracting
    pub fn is_text(&self) -> bool {
        self.mime.as_deref().is_some_and(mime::is_text)
    }

    /// Extracts language, title, keywords and description, folds in the
    /// meta robots policy and pushes discovered links
    ///
    /// `max_links` of `None` means no limit; `Some(0)` pushes nothing.
    pub fn set_content(
        &mut self,
        bot: &str,
        max_links: Option<usize>,
        discovered: &UnboundedSender<String>,
        truncate: &TruncateConfig,
    ) -> &mut Self {
        let page = parse_html(&self.body, &self.url, bot);

        self.language = match_language(page.lang.as_deref()).to_string();
        if let Some(title) = page.title {
            self.title = collapse(&title, Some(truncate.title));
        }
        if let Some(keywords) = page.keywords {
            self.keywords = first_words(&keywords.replace(',', " "), truncate.keywords);
        }
        if let Some(description) = page.description {
            self.description = collapse(&description, Some(truncate.description));
        }
        for directive in &page.robots {
            self.policy.apply(bot, directive);
        }

        if let Some(canonical) = page.canonical {
            if canonical != self.id {
                // Send only fails once the session is shutting down
                let _ = discovered.send(canonical.clone());
                self.canonical_url = Some(canonical);
            }
        }

        if self.policy.follow {
            let budget = max_links.unwrap_or(usize::MAX);
            for link in page.links.into_iter().take(budget) {
                let _ = discovered.send(link);
            }
        }

        self
    }

    /// Resolves whether this document is canonical
    ///
    /// A `Link: <...>; rel="canonical"` header overrides the body and its
    /// target is pushed for discovery.
    pub fn set_canonical(&mut self, discovered: &UnboundedSender<String>) -> &mut Self {
        let from_header = self
            .headers
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| {
                CANONICAL_HEADER
                    .as_ref()
                    .and_then(|re| re.captures(value.trim()))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| parser::resolve_link(m.as_str(), &self.url))
            });

        if let Some(link) = from_header {
            let _ = discovered.send(link.clone());
            self.canonical_url = Some(link);
        }

        self.canonical = match &self.canonical_url {
            Some(link) => *link == self.id,
            None => true,
        };
        self
    }

    /// The declared canonical URL, if any
    pub fn canonical_url(&self) -> Option<&str> {
        self.canonical_url.as_deref()
    }

    /// Canonical and allowed to be indexed
    pub fn is_indexable(&self) -> bool {
        self.canonical && self.policy.index
    }

    /// A minimal record keeping identity, crawl date, status and language
    pub fn stub(&self) -> Self {
        Self {
            id: self.id.clone(),
            url: self.url.clone(),
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            domain: self.domain.clone(),
            tld: self.tld.clone(),
            path_parts: self.path_parts.clone(),
            crawled: self.crawled,
            status_code: self.status_code,
            mime: None,
            language: self.language.clone(),
            title: String::new(),
            keywords: String::new(),
            description: String::new(),
            policy: Policy {
                index: false,
                follow: false,
            },
            canonical: false,
            canonical_url: None,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }
}

/// Collapses whitespace and truncates to `max` characters
fn collapse(s: &str, max: Option<usize>) -> String {
    let joined = s.split_whitespace().collect::<Vec<_>>().join(" ");
    match max {
        Some(max) => joined.chars().take(max).collect::<String>().trim().to_string(),
        None => joined,
    }
}

/// First `max` distinct words
fn first_words(s: &str, max: usize) -> String {
    let mut seen = HashSet::new();
    s.split_whitespace()
        .filter(|word| seen.insert(*word))
        .take(max)
        .collect::<Vec<_>>()
        .join(" ")
}
