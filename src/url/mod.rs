//! URL handling module
//!
//! This module provides link validation, the scheme+host grouping key used
//! by host reservations and robots.txt caching, registrable-domain
//! extraction and path tokenization.

mod domain;
mod path;
mod validate;

// Re-export main functions
pub use domain::{extract_domain, extract_tld, scheme_host};
pub use path::path_parts;
pub use validate::validate_url;

/// Path of the robots.txt file relative to a scheme+host
pub const ROBOTS_PATH: &str = "/robots.txt";

/// Returns true if the link points at a host's robots.txt file
pub fn is_robots_path(url: &::url::Url) -> bool {
    url.path().eq_ignore_ascii_case(ROBOTS_PATH)
}
