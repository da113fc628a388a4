//! Fixed-width timestamp encoding used by the CloudBerry history log.
//!
//! Every timestamp column in `cbbackup.db` is TEXT in `YYYYMMDDHHMMSS`,
//! UTC, no separators. Lexicographic order equals chronological order,
//! which the window-join query in `history` relies on.

use chrono::{DateTime, NaiveDateTime, Utc};

const CBB_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parse a `YYYYMMDDHHMMSS` string into a UTC timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(s, CBB_TIME_FORMAT).map(|dt| dt.and_utc())
}

/// Format a UTC timestamp back into the log's fixed-width encoding.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(CBB_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_known_value() {
        let t = parse_timestamp("20240101020000").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn formats_known_value() {
        let t = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(format_timestamp(t), "20231231235959");
    }

    #[test]
    fn round_trips_at_second_precision() {
        for s in ["19991231235959", "20240229120000", "20380119031407"] {
            let t = parse_timestamp(s).unwrap();
            assert_eq!(format_timestamp(t), s);
            assert_eq!(parse_timestamp(&format_timestamp(t)).unwrap(), t);
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2024-01-01 02:00:00").is_err());
        assert!(parse_timestamp("not a time").is_err());
    }
}
