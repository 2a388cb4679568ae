//! Time sources and local calendar-day arithmetic.
//!
//! Every engine component reads time through [`Clock`] so tests can drive
//! windows and cooldowns with a [`ManualClock`]. Day windows follow the
//! calendar of a [`CalendarZone`]: midnight in the device timezone, not a
//! rolling 24 hour span.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveTime, Offset, TimeDelta, TimeZone, Utc};

use crate::error::{AdError, Result};

pub const SECOND_MS: i64 = 1_000;
pub const HOUR_MS: i64 = 60 * 60 * SECOND_MS;

/// Milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.advance_ms(delta);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Timezone whose calendar decides where a day window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    /// The device's current timezone, re-read on every computation.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl CalendarZone {
    /// Parse `local`, `utc`, or an offset such as `+09:00` / `-0530`.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        match trimmed.to_lowercase().as_str() {
            "local" | "" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::utc()),
            _ => {}
        }

        trimmed
            .parse::<FixedOffset>()
            .map(Self::Fixed)
            .map_err(|_| {
                AdError::Config(format!(
                    "invalid timezone {value:?} (expected local|utc|+HH:MM)"
                ))
            })
    }

    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Start of the calendar day containing `at_ms`, in epoch milliseconds.
    #[must_use]
    pub fn day_start_ms(&self, at_ms: i64) -> i64 {
        match self {
            Self::Local => day_start_in(&Local, at_ms),
            Self::Fixed(offset) => day_start_in(offset, at_ms),
        }
    }
}

fn day_start_in<Tz: TimeZone>(tz: &Tz, at_ms: i64) -> i64 {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(at_ms) else {
        return at_ms;
    };
    let midnight = utc.with_timezone(tz).date_naive().and_time(NaiveTime::MIN);
    if let Some(start) = tz.from_local_datetime(&midnight).earliest() {
        return start.timestamp_millis();
    }
    // Midnight skipped by a DST jump: the day begins at the first valid instant.
    let mut probe = midnight;
    for _ in 0..4 {
        probe += TimeDelta::minutes(30);
        if let Some(start) = tz.from_local_datetime(&probe).earliest() {
            return start.timestamp_millis();
        }
    }
    at_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn parses_zone_specs() {
        assert_eq!(CalendarZone::parse("local").unwrap(), CalendarZone::Local);
        assert_eq!(CalendarZone::parse("UTC").unwrap(), CalendarZone::utc());
        let seoul = CalendarZone::parse("+09:00").unwrap();
        assert_eq!(
            seoul,
            CalendarZone::Fixed(FixedOffset::east_opt(9 * 3600).unwrap())
        );
        let india = CalendarZone::parse("+0530").unwrap();
        assert_eq!(
            india,
            CalendarZone::Fixed(FixedOffset::east_opt(5 * 3600 + 1800).unwrap())
        );
        assert!(CalendarZone::parse("+9").is_err());
        assert!(CalendarZone::parse("+09:75").is_err());
        assert!(CalendarZone::parse("tomorrow").is_err());
    }

    #[test]
    fn day_start_follows_the_zone_calendar() {
        // 2024-03-10T23:30:00Z is already 08:30 on the 11th in Seoul.
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap().timestamp_millis();
        let utc_start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap().timestamp_millis();
        let seoul_start = Utc.with_ymd_and_hms(2024, 3, 10, 15, 0, 0).unwrap().timestamp_millis();

        assert_eq!(CalendarZone::utc().day_start_ms(at), utc_start);
        assert_eq!(CalendarZone::parse("+09:00").unwrap().day_start_ms(at), seoul_start);
    }

    #[test]
    fn day_start_is_idempotent() {
        let zone = CalendarZone::parse("-05:00").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 3, 0, 0).unwrap().timestamp_millis();
        let start = zone.day_start_ms(at);
        assert!(start <= at);
        assert_eq!(zone.day_start_ms(start), start);
        assert!(at - start < 24 * HOUR_MS);
    }
}
