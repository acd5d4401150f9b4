use url::Url;

/// Returns the scheme+host key for a URL (e.g. "https://example.com:8080")
///
/// The port is part of the key: robots.txt files and host reservations are
/// scoped to the exact origin, not to the registrable domain.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawler::url::scheme_host;
///
/// let url = Url::parse("https://www.example.com:8080/path").unwrap();
/// assert_eq!(scheme_host(&url), "https://www.example.com:8080");
/// ```
pub fn scheme_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// Extracts the registrable domain (eTLD+1) from a URL
///
/// Hosts that have no registrable domain (IP addresses, `localhost`, bare
/// public suffixes) fall back to the host itself so that every document
/// still has a grouping key for the per-domain link budget.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawler::url::extract_domain;
///
/// let url = Url::parse("https://api.example.co.uk/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.co.uk".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();

    if let Some(::url::Host::Domain(_)) = url.host() {
        if let Some(domain) = psl::domain_str(&host) {
            return Some(domain.to_string());
        }
    }

    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}

/// Returns the last label of a domain ("com", "org", "uk", ...)
pub fn extract_tld(domain: &str) -> String {
    domain.rsplit('.').next().unwrap_or_default().to_string()
}
