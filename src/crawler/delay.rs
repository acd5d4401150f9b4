//! Per-host courtesy delay
//!
//! After every crawl attempt the host reservation is re-armed with a delay
//! derived from the response status, any `Retry-After` hint and the delay
//! asked for by robots.txt.

use crate::document::NOT_CRAWLED;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use std::time::Duration;

/// Fixed backoff after a server error
const SERVER_ERROR_DELAY_SECS: i64 = 600;

/// Minimum gap between two fetches of a host that was actually crawled
const MIN_DELAY_SECS: i64 = 1;

/// HTTP date layouts carrying a numeric offset
const OFFSET_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z", // RFC1123Z
    "%d %b %y %H:%M %z",        // RFC822Z
];

/// HTTP date layouts whose zone name has been stripped
const NAMED_ZONE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",  // RFC1123
    "%d %b %y %H:%M",         // RFC822
    "%A, %d-%b-%y %H:%M:%S",  // RFC850
    "%a %b %e %H:%M:%S %Y",   // ANSIC
];

/// Computes the next courtesy delay for a host
///
/// Rules, in order:
/// 1. A parsable `Retry-After` value (seconds or an HTTP date) is folded in
///    with `max`, except on redirects where it is a per-link hint.
/// 2. Server errors back off for at least ten minutes.
/// 3. `-1` (no page status obtained) clears the delay entirely.
/// 4. Anything else waits at least one second.
pub fn calculate_host_delay(status: i32, retry_after: &str, delay: TimeDelta) -> TimeDelta {
    calculate_host_delay_at(status, retry_after, delay, Utc::now())
}

/// [`calculate_host_delay`] with an explicit "now" for date-form `Retry-After`
pub fn calculate_host_delay_at(
    status: i32,
    retry_after: &str,
    delay: TimeDelta,
    now: DateTime<Utc>,
) -> TimeDelta {
    let retry_after = retry_after.trim();
    let mut delay = delay;

    if !retry_after.is_empty() && !(300..400).contains(&status) {
        if let Some(wait) = parse_retry_after(retry_after, now) {
            delay = delay.max(wait);
        }
    }

    match status {
        500..=599 => delay.max(TimeDelta::seconds(SERVER_ERROR_DELAY_SECS)),
        NOT_CRAWLED => TimeDelta::zero(),
        _ if delay < TimeDelta::seconds(MIN_DELAY_SECS) => TimeDelta::seconds(MIN_DELAY_SECS),
        _ => delay,
    }
}

/// Converts a delay into a reservation TTL; negative delays become zero
pub fn delay_ttl(delay: TimeDelta) -> Duration {
    delay.to_std().unwrap_or(Duration::ZERO)
}

/// Parses a `Retry-After` value into a wait relative to `now`
///
/// Dates are truncated to whole seconds.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
    if let Ok(secs) = value.parse::<i64>() {
        return TimeDelta::try_seconds(secs);
    }

    parse_http_date(value).map(|at| TimeDelta::seconds((at - now).num_seconds()))
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(at) = DateTime::parse_from_str(value, format) {
            return Some(at.with_timezone(&Utc));
        }
    }

    // Zone names (GMT, UTC, MST, ...) are read as UTC
    let stamp = strip_zone_name(value);
    NAMED_ZONE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
        .map(|naive| naive.and_utc())
}

fn strip_zone_name(value: &str) -> &str {
    match value.rsplit_once(' ') {
        Some((stamp, zone)) if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_alphabetic()) => {
            stamp.trim_end()
        }
        _ => value,
    }
}
