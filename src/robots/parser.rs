//! Robots.txt parser implementation
//!
//! Evaluation of rules is delegated to the robotstxt crate. Crawl-delay is not
//! part of that matcher, so it is read from the groups directly.

use crate::robots::RobotsError;
use robotstxt::DefaultMatcher;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rules {
    AllowAll,
    DisallowAll,
    Content(String),
}

/// Parsed robots.txt data
///
/// Built from the status and body of a robots.txt fetch. A 4xx carries no
/// rules and allows everything, a 5xx disallows everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRobots {
    rules: Rules,
}

impl ParsedRobots {
    /// Interprets a robots.txt response
    ///
    /// Statuses outside 2xx/4xx/5xx (including 0 for "never fetched") leave the
    /// rules unknown and are reported as [`RobotsError::UnexpectedStatus`].
    pub fn from_status_and_body(status: i32, body: &str) -> Result<Self, RobotsError> {
        match status {
            200..=299 => Ok(Self::from_content(body)),
            400..=499 => Ok(Self::allow_all()),
            500..=599 => Ok(Self::disallow_all()),
            other => Err(RobotsError::UnexpectedStatus(other)),
        }
    }

    /// Creates a ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::allow_all();
        }
        Self {
            rules: Rules::Content(content.to_string()),
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    pub fn allow_all() -> Self {
        Self {
            rules: Rules::AllowAll,
        }
    }

    /// Creates a ParsedRobots that refuses every path
    pub fn disallow_all() -> Self {
        Self {
            rules: Rules::DisallowAll,
        }
    }

    /// Checks if a URL is allowed for the given user agent token
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to check; only its path and query are matched
    /// * `user_agent` - The short product token of the crawler
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        match &self.rules {
            Rules::AllowAll => true,
            Rules::DisallowAll => false,
            Rules::Content(content) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, user_agent, url)
            }
        }
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// A group naming the agent wins over the `*` group. Unparsable or
    /// negative values are ignored.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let Rules::Content(content) = &self.rules else {
            return None;
        };

        let normalized_agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut reading_agents = false;
        let mut for_wildcard: Option<Duration> = None;
        let mut for_agent: Option<Duration> = None;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            if key == "user-agent" {
                // Consecutive User-agent lines share one group
                if !reading_agents {
                    group.clear();
                }
                group.push(value.to_lowercase());
                reading_agents = true;
                continue;
            }
            reading_agents = false;

            if key != "crawl-delay" {
                continue;
            }
            let Some(delay) = value
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            else {
                continue;
            };

            if group.iter().any(|ua| *ua == normalized_agent) {
                for_agent = Some(delay);
            } else if group.iter().any(|ua| ua == "*") {
                for_wildcard = Some(delay);
            }
        }

        for_agent.or(for_wildcard)
    }
}
