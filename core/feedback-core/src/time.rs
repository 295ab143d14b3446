//! Timestamp helpers and the clock seam.
//!
//! Session timestamps travel as epoch seconds (possibly fractional) but some
//! producers send milliseconds; anything above [`MILLIS_THRESHOLD`] is treated
//! as milliseconds. Tab records and history bookkeeping use epoch milliseconds.

use chrono::{DateTime, Local, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Values above this are epoch milliseconds, not seconds.
pub const MILLIS_THRESHOLD: f64 = 1e12;

/// Normalizes an epoch timestamp to seconds.
pub fn normalize_timestamp(value: f64) -> f64 {
    if value > MILLIS_THRESHOLD {
        value / 1000.0
    } else {
        value
    }
}

/// Converts an epoch timestamp in either unit to milliseconds.
pub fn to_millis(value: f64) -> i64 {
    (normalize_timestamp(value) * 1000.0).round() as i64
}

pub fn millis_to_secs(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Start of the local calendar day containing `now_ms`, in epoch seconds.
pub fn today_start_secs(now_ms: i64) -> f64 {
    let local_start = Local
        .timestamp_millis_opt(now_ms)
        .single()
        .and_then(|now| now.date_naive().and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|start| start.timestamp());

    match local_start {
        Some(secs) => secs as f64,
        None => (now_ms.div_euclid(86_400_000) * 86_400) as f64,
    }
}

pub fn format_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// `YYYY-MM-DD` in UTC, used for export file names.
pub fn format_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown-date".to_string())
}

/// Source of "now" for everything time-dependent.
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

/// Hand-advanced clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: i64) -> i64 {
        self.now.fetch_add(ms, Ordering::SeqCst) + ms
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_pass_through() {
        assert_eq!(normalize_timestamp(1_700_000_000.5), 1_700_000_000.5);
    }

    #[test]
    fn millis_are_scaled_down() {
        assert_eq!(normalize_timestamp(1_700_000_000_000.0), 1_700_000_000.0);
    }

    #[test]
    fn to_millis_accepts_both_units() {
        assert_eq!(to_millis(1_700_000_000.0), 1_700_000_000_000);
        assert_eq!(to_millis(1_700_000_000_000.0), 1_700_000_000_000);
    }

    #[test]
    fn today_start_is_not_after_now() {
        let now_ms = 1_700_000_123_456;
        let start = today_start_secs(now_ms);
        assert!(start <= millis_to_secs(now_ms));
        assert!(millis_to_secs(now_ms) - start < 86_400.0 + 3_600.0);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn format_date_is_utc_day() {
        assert_eq!(format_date(0), "1970-01-01");
    }
}
