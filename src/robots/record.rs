//! Robots.txt cache records
//!
//! A record keeps the raw response of the last robots.txt fetch for a scheme+host
//! together with a minute-precision expiry stamp.

use crate::robots::{ParsedRobots, RobotsError};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};

/// Compact UTC timestamp format used for the expiry stamp (`yyyyMMddHHmm`)
pub const EXPIRES_FORMAT: &str = "%Y%m%d%H%M";

/// A single robots.txt response for a scheme+host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRecord {
    /// Grouping key, e.g. `https://example.com`
    pub scheme_host: String,

    /// Status code of the robots.txt fetch
    pub status_code: i32,

    /// Raw body, only kept for 2xx responses
    pub body: String,

    /// Expiry stamp in [`EXPIRES_FORMAT`]
    pub expires: String,

    /// Whether the record came out of a cache
    pub cached: bool,
}

impl RobotsRecord {
    /// Creates an empty, uncached record for a scheme+host
    pub fn new(scheme_host: impl Into<String>) -> Self {
        Self {
            scheme_host: scheme_host.into(),
            ..Self::default()
        }
    }

    pub fn set_status_code(mut self, code: i32) -> Self {
        self.status_code = code;
        self
    }

    pub fn set_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Stamps the expiry relative to `fetched_at`
    ///
    /// Server errors are trusted for one hour, everything else for a day.
    pub fn set_expires_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        let ttl = if (500..600).contains(&self.status_code) {
            TimeDelta::hours(1)
        } else {
            TimeDelta::hours(24)
        };
        self.expires = (fetched_at + ttl).format(EXPIRES_FORMAT).to_string();
        self
    }

    /// Parses the stored expiry stamp
    pub fn expires_at(&self) -> Result<DateTime<Utc>, RobotsError> {
        NaiveDateTime::parse_from_str(&self.expires, EXPIRES_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|source| RobotsError::Expires {
                value: self.expires.clone(),
                source,
            })
    }

    /// Whether the record must be re-fetched at `now`
    pub fn expired_at(&self, now: DateTime<Utc>) -> Result<bool, RobotsError> {
        Ok(now >= self.expires_at()?)
    }

    /// Like [`expired_at`](Self::expired_at), treating an unreadable stamp as expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expired_at(now).unwrap_or(true)
    }

    /// Rules for this record, following the status of the fetch
    pub fn rules(&self) -> Result<ParsedRobots, RobotsError> {
        ParsedRobots::from_status_and_body(self.status_code, &self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_set_expires_ok_response() {
        let record = RobotsRecord::new("https://example.com")
            .set_status_code(200)
            .set_expires_at(at(2015, 12, 15, 4, 35, 35));
        assert_eq!(record.expires, "201512160435");
    }

    #[test]
    fn test_set_expires_server_error() {
        let record = RobotsRecord::new("https://example.com")
            .set_status_code(500)
            .set_expires_at(at(2019, 12, 31, 23, 6, 47));
        assert_eq!(record.expires, "202001010006");
    }

    #[test]
    fn test_client_error_uses_full_day() {
        let record = RobotsRecord::new("https://example.com")
            .set_status_code(404)
            .set_expires_at(at(2020, 3, 1, 12, 0, 0));
        assert_eq!(record.expires, "202003021200");
    }

    #[test]
    fn test_expired_boundaries() {
        let mut record = RobotsRecord::new("https://example.com");
        record.expires = "201512160435".to_string();

        assert!(!record.expired_at(at(2015, 12, 16, 4, 34, 59)).unwrap());
        assert!(record.expired_at(at(2015, 12, 16, 4, 35, 0)).unwrap());
        assert!(record.expired_at(at(2016, 1, 1, 0, 0, 0)).unwrap());
    }

    #[test]
    fn test_malformed_expiry_is_expired() {
        let mut record = RobotsRecord::new("https://example.com");
        record.expires = "20191230".to_string();

        assert!(matches!(
            record.expired_at(at(2019, 1, 1, 0, 0, 0)),
            Err(RobotsError::Expires { .. })
        ));
        assert!(record.is_expired_at(at(2019, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_empty_record_is_expired() {
        let record = RobotsRecord::new("https://example.com");
        assert!(!record.cached);
        assert!(record.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_rules_follow_status() {
        let record = RobotsRecord::new("https://example.com")
            .set_status_code(200)
            .set_body("User-agent: *\nDisallow: /private");
        let rules = record.rules().unwrap();
        assert!(!rules.is_allowed("https://example.com/private", "TestBot"));
        assert!(rules.is_allowed("https://example.com/public", "TestBot"));

        let never_fetched = RobotsRecord::new("https://example.com");
        assert!(matches!(
            never_fetched.rules(),
            Err(RobotsError::UnexpectedStatus(0))
        ));
    }
}
