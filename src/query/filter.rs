use crate::time::hours_before;
use crate::types::{CrashFilter, CrashRecord};

/// Oldest timestamp still inside the filter's time window
pub fn cutoff_ms(filter: &CrashFilter, now_ms: i64) -> i64 {
    hours_before(now_ms, filter.time_range_hours)
}

/// Case-insensitive substring test
pub fn contains_ignore_case(text: &str, pattern: &str) -> bool {
    text.to_lowercase().contains(&pattern.to_lowercase())
}

fn optional_contains(value: Option<&str>, pattern: &str) -> bool {
    value.map(|v| contains_ignore_case(v, pattern)).unwrap_or(false)
}

/// Whether `record` passes every condition of `filter`.
///
/// Empty package / search strings count as absent.
pub fn matches_filter(record: &CrashRecord, filter: &CrashFilter, cutoff_ms: i64) -> bool {
    if !filter.categories.contains(&record.category) || !filter.type_filter.matches(record.category) {
        return false;
    }

    if let Some(pkg) = filter.package_name.as_deref().filter(|p| !p.is_empty()) {
        if !optional_contains(record.package_name.as_deref(), pkg) {
            return false;
        }
    }

    if let Some(query) = filter.search_query.as_deref().filter(|q| !q.is_empty()) {
        let hit = contains_ignore_case(&record.content, query)
            || optional_contains(record.package_name.as_deref(), query)
            || optional_contains(record.app_name.as_deref(), query);
        if !hit {
            return false;
        }
    }

    record.timestamp >= cutoff_ms
}
