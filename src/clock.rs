use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use std::sync::Mutex;

use crate::error::ClockError;

/// Microseconds since the Unix epoch.
pub type Micros = i64;

/// Default maximum distance the clock may run ahead of wall time (1 minute).
pub const DEFAULT_MAX_DRIFT_US: i64 = 60_000_000;

/// Issues strictly increasing commit timestamps.
///
/// Every call to [`Clock::now`] returns `max(wall_time, last + 1)`, so two
/// commits made through the same clock never share a timestamp and a sync
/// cursor minted after a read is always older than the next commit.
pub struct Clock {
    last: Mutex<Micros>,
    max_drift_us: i64,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_max_drift(DEFAULT_MAX_DRIFT_US)
    }

    pub fn with_max_drift(max_drift_us: i64) -> Self {
        Self {
            last: Mutex::new(0),
            max_drift_us,
        }
    }

    /// Generate the next commit timestamp.
    pub fn now(&self) -> Result<Micros, ClockError> {
        let physical = wall_clock_micros();
        // A poisoned lock still holds a valid timestamp.
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        if *last > physical + self.max_drift_us {
            return Err(ClockError::ExcessiveDrift(*last - physical));
        }

        Ok(advance(&mut last, physical))
    }

    /// Generate a sync cursor.
    ///
    /// Same ordering as [`Clock::now`] but never fails: a cursor only has to
    /// sort after everything already issued, however far the wall clock has
    /// fallen behind.
    pub fn cursor(&self) -> Micros {
        let physical = wall_clock_micros();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        advance(&mut last, physical)
    }

    #[cfg(test)]
    pub(crate) fn advance_to(&self, ts: Micros) {
        *self.last.lock().unwrap() = ts;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn advance(last: &mut Micros, physical: Micros) -> Micros {
    let next = if physical > *last { physical } else { *last + 1 };
    *last = next;
    next
}

pub(crate) fn wall_clock_micros() -> Micros {
    Utc::now().timestamp_micros()
}

/// Render a timestamp the way it appears on the wire and in cursors.
pub fn format_timestamp(ts: Micros) -> String {
    DateTime::<Utc>::from_timestamp_micros(ts)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a client-supplied cursor.
///
/// Accepts RFC 3339 timestamps with any offset, and offset-less ISO 8601
/// timestamps which are read as UTC. Anything else, including the empty
/// string, is the beginning of time.
pub fn parse_cursor(cursor: &str) -> Micros {
    let cursor = cursor.trim();
    if cursor.is_empty() {
        return 0;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(cursor) {
        return ts.timestamp_micros();
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cursor, format) {
            return naive.and_utc().timestamp_micros();
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_strictly_increases() {
        let clock = Clock::new();

        let t1 = clock.now().unwrap();
        let t2 = clock.now().unwrap();
        let t3 = clock.now().unwrap();

        assert!(t1 < t2);
        assert!(t2 < t3);
    }

    #[test]
    fn test_now_rejects_excessive_drift() {
        let clock = Clock::with_max_drift(1_000_000);
        clock.advance_to(wall_clock_micros() + 10_000_000);

        assert!(matches!(clock.now(), Err(ClockError::ExcessiveDrift(_))));
    }

    #[test]
    fn test_now_tolerates_small_drift() {
        let clock = Clock::with_max_drift(10_000_000);
        let ahead = wall_clock_micros() + 1_000_000;
        clock.advance_to(ahead);

        assert_eq!(clock.now().unwrap(), ahead + 1);
    }

    #[test]
    fn test_cursor_ignores_drift() {
        let clock = Clock::with_max_drift(1_000_000);
        let ahead = wall_clock_micros() + 10_000_000;
        clock.advance_to(ahead);

        assert_eq!(clock.cursor(), ahead + 1);
        assert_eq!(clock.cursor(), ahead + 2);
        assert!(clock.now().is_err());
    }

    #[test]
    fn test_cursor_and_now_share_ordering() {
        let clock = Clock::new();

        let commit = clock.now().unwrap();
        let cursor = clock.cursor();
        let next_commit = clock.now().unwrap();

        assert!(commit < cursor);
        assert!(cursor < next_commit);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00.000000Z");
        assert_eq!(
            format_timestamp(1_700_000_000_123_456),
            "2023-11-14T22:13:20.123456Z"
        );
    }

    #[test]
    fn test_parse_cursor_formats() {
        let ts = 1_700_000_000_123_456;
        assert_eq!(parse_cursor(&format_timestamp(ts)), ts);
        assert_eq!(parse_cursor("2023-11-14T23:13:20.123456+01:00"), ts);
        assert_eq!(parse_cursor("2023-11-14T22:13:20.123456"), ts);
    }

    #[test]
    fn test_parse_cursor_degrades_to_epoch() {
        assert_eq!(parse_cursor(""), 0);
        assert_eq!(parse_cursor("   "), 0);
        assert_eq!(parse_cursor("not-a-date"), 0);
        assert_eq!(parse_cursor("2023-13-45T99:00:00Z"), 0);
    }
}
