//! Content sniffing
//!
//! Looks at the first bytes of a body to decide its MIME type, ignoring
//! whatever the server claimed in `Content-Type`.

/// Number of leading bytes considered
pub const SNIFF_LEN: usize = 512;

const HTML_SIGNATURES: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const MAGIC: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
];

/// MIME types whose content is worth extracting
pub fn is_text(mime: &str) -> bool {
    matches!(mime, "text/html" | "text/xml" | "text/plain")
}

/// Detects the MIME type of a body
pub fn sniff(body: &[u8]) -> &'static str {
    let data = &body[..body.len().min(SNIFF_LEN)];

    if data.starts_with(b"\xEF\xBB\xBF")
        || data.starts_with(b"\xFE\xFF")
        || data.starts_with(b"\xFF\xFE")
    {
        return "text/plain";
    }

    let trimmed = trim_leading_whitespace(data);
    if HTML_SIGNATURES.iter().any(|sig| html_signature(trimmed, sig)) {
        return "text/html";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml";
    }

    if let Some(mime) = MAGIC
        .iter()
        .find(|(magic, _)| data.starts_with(magic))
        .map(|(_, mime)| *mime)
    {
        return mime;
    }

    if data.iter().any(|b| is_binary(*b)) {
        "application/octet-stream"
    } else {
        "text/plain"
    }
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive prefix match that must end on a space or `>`
fn html_signature(data: &[u8], sig: &[u8]) -> bool {
    if data.len() <= sig.len() {
        return false;
    }
    if !data[..sig.len()].eq_ignore_ascii_case(sig) {
        return false;
    }
    matches!(data[sig.len()], b' ' | b'>')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
