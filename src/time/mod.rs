mod conversion;

pub use conversion::{
    format_timestamp, hours_before, now_ms, parse_time_ms, parse_tz, to_iso, MS_PER_HOUR,
};
