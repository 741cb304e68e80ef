mod filter;
mod grouping;

pub use filter::{contains_ignore_case, cutoff_ms, matches_filter};
pub use grouping::{filter_and_group, filter_and_group_with, filter_records, group_records};
