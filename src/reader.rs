use crate::error::{Result, StackLensError};
use crate::parser::parse_entry;
use crate::source::{LogSource, NoRegistry, PackageRegistry};
use crate::time::{hours_before, now_ms};
use crate::types::{CrashCategory, CrashRecord};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-entry read cap when the caller has no preference
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024;

/// Records from one read pass over the log source
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    /// Newest first
    pub records: Vec<CrashRecord>,
    /// At least one category could not be read for lack of access
    pub permission_denied: bool,
}

/// Reads DropBox categories through a [`LogSource`] and parses every entry
pub struct CrashReader {
    source: Box<dyn LogSource>,
    registry: Box<dyn PackageRegistry>,
    cancel_flag: Arc<AtomicBool>,
}

impl CrashReader {
    pub fn new(source: Box<dyn LogSource>) -> Self {
        Self {
            source,
            registry: Box::new(NoRegistry),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the registry used to resolve app display names
    pub fn with_registry(mut self, registry: Box<dyn PackageRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Flag checked between entries; set it to abandon a read in progress
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_flag)
    }

    /// Read every entry of `categories` newer than `since_hours` ago
    pub fn read_crash_logs(
        &self,
        categories: &[CrashCategory],
        since_hours: u32,
        max_content_length: usize,
    ) -> Result<ReadOutcome> {
        self.read_crash_logs_since(categories, hours_before(now_ms(), since_hours), max_content_length)
    }

    /// Read every entry of `categories` with a timestamp after `since_ms`.
    ///
    /// Categories are read in parallel and merged afterwards. A category
    /// the source refuses access to is skipped and flagged; other
    /// per-category failures are logged and skipped. Only cancellation
    /// aborts the whole pass.
    pub fn read_crash_logs_since(
        &self,
        categories: &[CrashCategory],
        since_ms: i64,
        max_content_length: usize,
    ) -> Result<ReadOutcome> {
        let per_category: Vec<(CrashCategory, Result<Vec<CrashRecord>>)> = categories
            .par_iter()
            .map(|&c| (c, self.read_category(c, since_ms, max_content_length)))
            .collect();

        let mut outcome = ReadOutcome::default();
        let mut seen: HashSet<(CrashCategory, i64)> = HashSet::new();

        for (category, result) in per_category {
            match result {
                Ok(records) => {
                    for record in records {
                        if seen.insert((record.category, record.id)) {
                            outcome.records.push(record);
                        }
                    }
                }
                Err(StackLensError::Cancelled) => return Err(StackLensError::Cancelled),
                Err(StackLensError::PermissionDenied(reason)) => {
                    log::warn!("No access to {} entries: {}", category, reason);
                    outcome.permission_denied = true;
                }
                Err(e) => {
                    log::warn!("Skipping {} entries: {}", category, e);
                }
            }
        }

        outcome.records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        log::debug!(
            "Read {} records from {} categories (permission denied: {})",
            outcome.records.len(),
            categories.len(),
            outcome.permission_denied
        );
        Ok(outcome)
    }

    fn read_category(
        &self,
        category: CrashCategory,
        since_ms: i64,
        max_content_length: usize,
    ) -> Result<Vec<CrashRecord>> {
        let mut records = Vec::new();
        let mut cursor = since_ms;

        loop {
            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(StackLensError::Cancelled);
            }
            let Some(entry) = self.source.next_entry(category.tag(), cursor, max_content_length)? else {
                break;
            };
            if entry.timestamp_ms <= cursor {
                log::warn!(
                    "Log source returned {} entry at {} for cursor {}; stopping",
                    category,
                    entry.timestamp_ms,
                    cursor
                );
                break;
            }
            cursor = entry.timestamp_ms;
            records.push(parse_entry(category, entry.timestamp_ms, entry.text, self.registry.as_ref()));
        }

        Ok(records)
    }

    /// Number of entries per category in the last `since_hours`
    pub fn crash_stats(&self, since_hours: u32) -> Result<BTreeMap<CrashCategory, usize>> {
        let outcome = self.read_crash_logs(&CrashCategory::ALL, since_hours, DEFAULT_MAX_CONTENT_LENGTH)?;
        let mut stats = BTreeMap::new();
        for record in &outcome.records {
            *stats.entry(record.category).or_insert(0) += 1;
        }
        Ok(stats)
    }
}
