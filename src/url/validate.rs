use crate::UrlError;
use url::Url;

/// Validates a link and returns it as a normalized absolute URL
///
/// # Validation Steps
///
/// 1. Parse the link; reject if malformed or relative
/// 2. Remove the fragment (everything after #)
/// 3. Reject anything other than http:// and https://
/// 4. Reject URLs without a host
/// 5. Lowercase the host
///
/// The path, query and port are kept as-is so that the result can be
/// compared against the canonical URL a page declares for itself.
///
/// # Examples
///
/// ```
/// use sumi_crawler::url::validate_url;
///
/// let url = validate_url("https://EXAMPLE.com/Page#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Page");
/// ```
pub fn validate_url(link: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(link.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    // Strip the fragment before the scheme check so "#..." never makes a link distinct
    url.set_fragment(None);

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = match url.host_str() {
        Some(h) if !h.is_empty() => h.to_lowercase(),
        _ => return Err(UrlError::MissingHost),
    };

    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    Ok(url)
}
