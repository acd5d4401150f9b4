/// File extensions stripped from the last path segment
const TRIMMED_EXTENSIONS: &[&str] = &[".html", ".htm", ".php"];

/// Splits a URL path into searchable tokens
///
/// `/path/to-some/thing.html` becomes `"path to some thing"`. Slashes and
/// hyphens separate tokens, common page extensions are dropped and repeated
/// tokens are kept only once (first occurrence wins).
pub fn path_parts(path: &str) -> String {
    let mut flattened = path.replace(['/', '-'], " ");
    for ext in TRIMMED_EXTENSIONS {
        if let Some(stripped) = flattened.strip_suffix(ext) {
            flattened = stripped.to_string();
        }
    }

    let mut seen = std::collections::HashSet::new();
    flattened
        .split_whitespace()
        .filter(|token| seen.insert(*token))
        .collect::<Vec<_>>()
        .join(" ")
}
