//! Flexible datetime parsing for tool inputs.
//!
//! The model sends dates in whatever ISO shape fits the utterance:
//! a full RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS`, or a bare
//! `YYYY-MM-DD`. Date-only values default the time to 12:00 — except a
//! date that is exactly tomorrow, which keeps the current wall-clock time
//! ("tomorrow" without a time means "tomorrow around now").

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};

/// Parse a model-supplied date or datetime string. Naive values are
/// interpreted as UTC. Returns `None` when the string is unparseable.
pub fn parse_flexible(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(normalize(dt.with_timezone(&Utc), now));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Some(normalize(Utc.from_utc_datetime(&naive), now));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Some(normalize(Utc.from_utc_datetime(&naive), now));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        return Some(normalize(midnight, now));
    }

    None
}

/// Parse a bare ISO date (for UI navigation targets).
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

/// Midnight means "only a date was given": default to noon, or to the
/// current time when the date is tomorrow.
fn normalize(parsed: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if parsed.hour() != 0 || parsed.minute() != 0 || parsed.second() != 0 {
        return parsed;
    }

    let days_ahead = (parsed.date_naive() - now.date_naive()).num_days();
    let time = if days_ahead == 1 {
        now.time()
    } else {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
    };
    Utc.from_utc_datetime(&parsed.date_naive().and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 16, 9, 30, 15).unwrap()
    }

    #[test]
    fn full_timestamp_is_kept() {
        let parsed = parse_flexible("2025-11-20T14:30:00Z", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 20, 14, 30, 0).unwrap());
    }

    #[test]
    fn naive_timestamp_is_utc() {
        let parsed = parse_flexible("2025-11-20T14:30:00", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 20, 14, 30, 0).unwrap());
    }

    #[test]
    fn date_only_defaults_to_noon() {
        let parsed = parse_flexible("2025-12-01", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn tomorrow_keeps_current_time() {
        let parsed = parse_flexible("2025-11-17", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 11, 17, 9, 30, 15).unwrap());
    }

    #[test]
    fn explicit_midnight_also_normalizes() {
        // Midnight is indistinguishable from "date only"; it normalizes too.
        let parsed = parse_flexible("2025-12-01T00:00:00", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_flexible("next tuesday", now()).is_none());
        assert!(parse_flexible("", now()).is_none());
    }

    #[test]
    fn bare_date_parsing() {
        assert_eq!(
            parse_date("2025-12-01"),
            Some(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap())
        );
        assert!(parse_date("December").is_none());
    }
}
