//! Crawler module for session coordination and per-link crawling
//!
//! This module contains the core crawling logic, including:
//! - The session coordinator and its worker pool
//! - The per-link procedure (robots.txt, fetch, extraction, upsert)
//! - Host courtesy delays
//! - HTTP client construction and a caching DNS resolver

mod coordinator;
mod delay;
mod fetcher;
mod resolver;
mod worker;

pub use coordinator::{Crawler, SessionState};
pub use delay::{calculate_host_delay, calculate_host_delay_at, delay_ttl};
pub use fetcher::{build_http_client, fetch_robots, read_body, robots_url};
pub use resolver::CachingResolver;
