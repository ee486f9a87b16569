use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_TIMEZONE: &str = "Africa/Cairo";

/// Values at or above this are epoch milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Looks up a named zone. Returning `None` makes the normalizer fall back to UTC.
pub trait TimezoneResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Tz>;
}

/// Resolves names against the IANA database compiled into `chrono-tz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TzDatabase;

impl TimezoneResolver for TzDatabase {
    fn resolve(&self, name: &str) -> Option<Tz> {
        name.parse::<Tz>().ok()
    }
}

/// Resolver with no zone data; every lookup falls back to UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcOnly;

impl TimezoneResolver for UtcOnly {
    fn resolve(&self, _name: &str) -> Option<Tz> {
        None
    }
}

/// Formats epoch values from record rows as `YYYY-MM-DD HH:MM:SS (ZONE)`.
#[derive(Debug, Clone)]
pub struct TimestampNormalizer {
    zone: Option<Tz>,
    label: String,
}

impl TimestampNormalizer {
    pub fn new(resolver: &dyn TimezoneResolver, zone_name: &str) -> Self {
        match resolver.resolve(zone_name) {
            Some(tz) => Self { zone: Some(tz), label: tz.name().to_string() },
            None => {
                tracing::debug!(zone = zone_name, "timezone unavailable, using UTC");
                Self::utc()
            }
        }
    }

    pub fn utc() -> Self {
        Self { zone: None, label: "UTC".to_string() }
    }

    /// Zone name printed in the output, `UTC` when the fallback is active.
    pub fn zone_label(&self) -> &str {
        &self.label
    }

    /// Never fails: unparseable or out-of-range input comes back unchanged.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed.to_string();
        }
        match self.format_epoch(trimmed) {
            Some(s) => s,
            None => trimmed.to_string(),
        }
    }

    fn format_epoch(&self, digits: &str) -> Option<String> {
        let value: i64 = digits.parse().ok()?;
        let secs = if value >= MILLIS_THRESHOLD { value / 1000 } else { value };
        let utc: DateTime<Utc> = Utc.timestamp_opt(secs, 0).single()?;
        let stamp = match self.zone {
            Some(tz) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => utc.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        Some(format!("{stamp} ({})", self.label))
    }
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(&TzDatabase, DEFAULT_TIMEZONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_and_millis_agree() {
        let n = TimestampNormalizer::default();
        let s = n.normalize("1561135881");
        assert_eq!(s, "2019-06-21 18:51:21 (Africa/Cairo)");
        assert_eq!(n.normalize("1561135881000"), s);
        assert_eq!(n.normalize("1561135881999"), s);
    }

    #[test]
    fn missing_zone_data_falls_back_to_utc() {
        let n = TimestampNormalizer::new(&UtcOnly, DEFAULT_TIMEZONE);
        assert_eq!(n.zone_label(), "UTC");
        assert_eq!(n.normalize("1561135881"), "2019-06-21 16:51:21 (UTC)");
    }

    #[test]
    fn unknown_zone_name_falls_back_to_utc() {
        let n = TimestampNormalizer::new(&TzDatabase, "Mars/Olympus_Mons");
        assert_eq!(n.normalize("0"), "1970-01-01 00:00:00 (UTC)");
    }

    #[test]
    fn passthrough_cases() {
        let n = TimestampNormalizer::default();
        assert_eq!(n.normalize(""), "");
        assert_eq!(n.normalize("   "), "");
        assert_eq!(n.normalize("21/06/2019"), "21/06/2019");
        assert_eq!(n.normalize("-5"), "-5");
        // overflows i64
        assert_eq!(n.normalize("99999999999999999999999"), "99999999999999999999999");
        // parses, but beyond chrono's range even after the millis division
        assert_eq!(n.normalize("999999999999999999"), "999999999999999999");
    }
}
