//! Query windows in a site's local wall-clock time
//!
//! The monitoring API interprets `startTime`/`endTime` in the site's own
//! timezone, so every window is computed from a single UTC instant converted
//! into that zone.

use crate::error::{SolarPollError, Result};
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Wire format used by the monitoring API for window bounds
pub const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `[start, end]` range in a site's local wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
    timezone: Tz,
}

impl TimeWindow {
    /// Rolling window ending at `now` and starting `lookback_minutes` earlier
    pub fn lookback_at(now: DateTime<Utc>, timezone: Tz, lookback_minutes: i64) -> Result<Self> {
        if lookback_minutes <= 0 {
            return Err(SolarPollError::validation(
                "lookback_minutes".to_string(),
                format!("window must be non-empty, got {} minutes", lookback_minutes),
            ));
        }
        let end = now.with_timezone(&timezone).naive_local();
        let mut start = (now - Duration::minutes(lookback_minutes))
            .with_timezone(&timezone)
            .naive_local();
        // Wall clock repeats after a DST fall-back
        if start >= end {
            start = end - Duration::minutes(lookback_minutes);
        }
        Ok(Self {
            start,
            end,
            timezone,
        })
    }

    /// `[local midnight today, local midnight tomorrow]` for daily aggregates
    pub fn midnight_at(now: DateTime<Utc>, timezone: Tz) -> Self {
        let today = now.with_timezone(&timezone).date_naive();
        let tomorrow = today.succ_opt().unwrap_or(today);
        Self {
            start: today.and_time(NaiveTime::MIN),
            end: tomorrow.and_time(NaiveTime::MIN),
            timezone,
        }
    }

    /// Rolling window ending now
    pub fn lookback(timezone: Tz, lookback_minutes: i64) -> Result<Self> {
        Self::lookback_at(Utc::now(), timezone, lookback_minutes)
    }

    /// Daily window for today
    pub fn midnight(timezone: Tz) -> Self {
        Self::midnight_at(Utc::now(), timezone)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Start bound in wire format, space percent-encoded
    pub fn start_param(&self) -> String {
        encode_bound(self.start)
    }

    /// End bound in wire format, space percent-encoded
    pub fn end_param(&self) -> String {
        encode_bound(self.end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} .. {}] {}",
            self.start.format(WINDOW_FORMAT),
            self.end.format(WINDOW_FORMAT),
            self.timezone.name()
        )
    }
}

fn encode_bound(bound: NaiveDateTime) -> String {
    bound.format(WINDOW_FORMAT).to_string().replace(' ', "%20")
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| SolarPollError::config(format!("Invalid timezone '{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn lookback_converts_into_site_zone() {
        let tz = parse_timezone("America/Los_Angeles").unwrap();
        // 18:30 UTC in July is 11:30 PDT
        let w = TimeWindow::lookback_at(instant(2024, 7, 1, 18, 30), tz, 60).unwrap();
        assert_eq!(w.end_param(), "2024-07-01%2011:30:00");
        assert_eq!(w.start_param(), "2024-07-01%2010:30:00");
        assert!(w.start() < w.end());
    }

    #[test]
    fn lookback_crosses_local_midnight() {
        let tz = chrono_tz::Europe::Amsterdam;
        // 23:20 UTC in winter is 00:20 CET on the next day
        let w = TimeWindow::lookback_at(instant(2024, 1, 10, 23, 20), tz, 90).unwrap();
        assert_eq!(w.start_param(), "2024-01-10%2022:50:00");
        assert_eq!(w.end_param(), "2024-01-11%2000:20:00");
    }

    #[test]
    fn lookback_stays_ordered_across_fall_back() {
        let tz = chrono_tz::Europe::Amsterdam;
        // 01:10 UTC on Oct 27 2024 is the second 02:10 local; an hour earlier is the first
        let w = TimeWindow::lookback_at(instant(2024, 10, 27, 1, 10), tz, 60).unwrap();
        assert!(w.start() < w.end());
        assert_eq!(w.start_param(), "2024-10-27%2001:10:00");
    }

    #[test]
    fn empty_lookback_is_rejected() {
        assert!(TimeWindow::lookback_at(Utc::now(), chrono_tz::UTC, 0).is_err());
    }

    #[test]
    fn midnight_window_uses_local_date() {
        let tz = chrono_tz::Australia::Sydney;
        // 20:00 UTC on Mar 3 is already Mar 4 in Sydney
        let w = TimeWindow::midnight_at(instant(2024, 3, 3, 20, 0), tz);
        assert_eq!(w.start_param(), "2024-03-04%2000:00:00");
        assert_eq!(w.end_param(), "2024-03-05%2000:00:00");
    }

    #[test]
    fn midnight_window_spans_month_end() {
        let w = TimeWindow::midnight_at(instant(2024, 2, 29, 12, 0), chrono_tz::UTC);
        assert_eq!(w.end_param(), "2024-03-01%2000:00:00");
    }

    #[test]
    fn bad_timezone_is_configuration_error() {
        let err = parse_timezone("Not/AZone").unwrap_err();
        assert!(matches!(err, SolarPollError::Config { .. }));
    }

    #[test]
    fn display_names_zone() {
        let w = TimeWindow::midnight_at(instant(2024, 5, 1, 12, 0), chrono_tz::UTC);
        assert_eq!(
            w.to_string(),
            "[2024-05-01 00:00:00 .. 2024-05-02 00:00:00] UTC"
        );
    }
}
