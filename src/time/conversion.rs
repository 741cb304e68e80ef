use crate::error::{Result, StackLensError};
use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const MS_PER_HOUR: i64 = 3_600_000;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// `now_ms - hours`, saturating
pub fn hours_before(now_ms: i64, hours: u32) -> i64 {
    now_ms.saturating_sub(i64::from(hours) * MS_PER_HOUR)
}

pub fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| StackLensError::InvalidConfig(format!("unknown timezone '{}': {}", name, e)))
}

/// Render epoch milliseconds in `tz`, e.g. `2024-08-24 14:22:33.123 CST`
pub fn format_timestamp(ms: i64, tz: &Tz) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(utc) => utc
            .with_timezone(tz)
            .format("%Y-%m-%d %H:%M:%S%.3f %Z")
            .to_string(),
        None => format!("{}ms", ms),
    }
}

/// Epoch milliseconds as RFC3339 UTC
pub fn to_iso(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

/// Resolve a local wall-clock time in `tz`, handling DST boundaries
fn resolve_local(naive: &NaiveDateTime, tz: &Tz, input: &str) -> Result<i64> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt.timestamp_millis()),
        LocalResult::Ambiguous(earlier, _later) => {
            // DST ends: same local time maps to two instants, take the earlier
            log::debug!("Ambiguous time {} in {}, using earlier interpretation", input, tz);
            Ok(earlier.timestamp_millis())
        }
        LocalResult::None => {
            // DST starts: the local time does not exist, shift forward one hour
            let adjusted = *naive + chrono::Duration::hours(1);
            match tz.from_local_datetime(&adjusted) {
                LocalResult::Single(dt) => {
                    log::debug!("Non-existent time {} in {}, adjusted to {}", input, tz, dt);
                    Ok(dt.timestamp_millis())
                }
                _ => Err(StackLensError::InvalidConfig(format!(
                    "time '{}' falls in a DST gap in {}",
                    input, tz
                ))),
            }
        }
    }
}

/// Parse a point in time given on the command line or in config.
///
/// Accepts bare epoch milliseconds, RFC3339, or a zone-less
/// `YYYY-MM-DD[T ]HH:MM[:SS[.mmm]]` interpreted in `tz`.
pub fn parse_time_ms(s: &str, tz: &Tz) -> Result<i64> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    let candidates = [
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.3f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.3f",
    ];
    for pat in candidates.iter() {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pat) {
            return resolve_local(&naive, tz, s);
        }
    }

    Err(StackLensError::InvalidConfig(format!("invalid datetime '{}'", s)))
}
