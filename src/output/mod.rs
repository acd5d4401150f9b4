//! Output module for crawl reporting
//!
//! This module records crawl statistics and renders the report emitted when a
//! session closes.

pub mod stats;

pub use stats::{commas, CrawlStats};
