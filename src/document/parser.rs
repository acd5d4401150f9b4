//! HTML extraction for documents
//!
//! Pulls out everything [`Document::set_content`](super::Document::set_content)
//! needs in a single pass over a parsed tree. Policy and link budgets are
//! applied by the caller.

use scraper::{Html, Selector};
use url::Url;

/// Raw values found in an html page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// `lang` attribute of the `<html>` element
    pub lang: Option<String>,

    /// Text of the first `<title>`
    pub title: Option<String>,

    /// `content` of `<meta name="keywords">`
    pub keywords: Option<String>,

    /// `content` of `<meta name="description">`
    pub description: Option<String>,

    /// Contents of `<meta name="robots">` and `<meta name="<bot>">`
    pub robots: Vec<String>,

    /// `<link rel="canonical">` resolved against the page
    pub canonical: Option<String>,

    /// Followable `<a href>` targets, resolved and in document order
    pub links: Vec<String>,
}

/// Shortest and longest href considered
const MIN_HREF_LEN: usize = 3;
const MAX_HREF_LEN: usize = 2083;

/// Parses HTML content and extracts metadata and links
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` resolving to an http(s) URL other than the page itself
///
/// **Exclude:**
/// - `rel="nofollow"` anchors
/// - hrefs shorter than 3 or longer than 2083 characters
/// - `javascript:`, `mailto:`, `tel:` and data URIs (they never resolve to http(s))
///
/// # Example
///
/// ```
/// use sumi_crawler::document::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url, "SumiCrawler");
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["https://example.com/page".to_string()]);
/// ```
pub fn parse_html(html: &str, base_url: &Url, bot: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        lang: select_attr(&document, "html[lang]", "lang"),
        title: extract_title(&document),
        keywords: extract_meta(&document, "keywords"),
        description: extract_meta(&document, "description"),
        robots: extract_robots(&document, bot),
        canonical: extract_canonical(&document, base_url),
        links: extract_links(&document, base_url),
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = selector(css)?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(str::to_string)
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = selector("title")?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .filter(|s| !s.trim().is_empty())
}

fn extract_meta(document: &Html, name: &str) -> Option<String> {
    let selector = selector("meta[name][content]")?;

    document
        .select(&selector)
        .find(|element| {
            element
                .value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|element| element.value().attr("content"))
        .map(str::to_string)
}

fn extract_robots(document: &Html, bot: &str) -> Vec<String> {
    let Some(selector) = selector("meta[name][content]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter(|element| {
            element
                .value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case("robots") || n.eq_ignore_ascii_case(bot))
        })
        .filter_map(|element| element.value().attr("content"))
        .map(str::to_string)
        .collect()
}

fn extract_canonical(document: &Html, base_url: &Url) -> Option<String> {
    let selector = selector("link[rel][href]")?;

    document
        .select(&selector)
        .find(|element| {
            element
                .value()
                .attr("rel")
                .is_some_and(|rel| rel.trim().eq_ignore_ascii_case("canonical"))
        })
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| resolve_link(href, base_url))
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(selector) = selector("a[href]") else {
        return Vec::new();
    };
    let own = base_url.as_str();

    document
        .select(&selector)
        .filter(|element| {
            !element.value().attr("rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("nofollow"))
            })
        })
        .filter_map(|element| element.value().attr("href"))
        .filter(|href| (MIN_HREF_LEN..=MAX_HREF_LEN).contains(&href.trim().len()))
        .filter_map(|href| resolve_link(href, base_url))
        .filter(|link| link != own)
        .collect()
}

/// Resolves a link href to an absolute http(s) URL without its fragment
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let mut absolute_url = base_url.join(href.trim()).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}
