use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{QuotaError, Result};

/// Format a timestamp for storage.
///
/// Fixed-width UTC microseconds keep lexicographic order equal to time order,
/// so window filters can compare the TEXT columns directly.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| QuotaError::Parse(format!("Invalid timestamp {:?}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = a + Duration::microseconds(1);
        assert_eq!(format_timestamp(a), "2026-01-01T00:00:00.000000Z");
        assert_eq!(format_timestamp(a).len(), format_timestamp(b).len());
        assert!(format_timestamp(a) < format_timestamp(b));
    }

    #[test]
    fn test_parse_formatted() {
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(t)).unwrap(), t);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(QuotaError::Parse(_))
        ));
    }
}
