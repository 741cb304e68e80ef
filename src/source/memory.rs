use crate::error::Result;
use crate::source::{truncate_text, LogSource, RawEntry};
use std::collections::{BTreeMap, HashMap};

/// In-memory log source, keyed by tag then timestamp
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: HashMap<String, BTreeMap<i64, String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a second entry with the same tag and timestamp replaces the first
    pub fn push(&mut self, tag: impl Into<String>, timestamp_ms: i64, text: impl Into<String>) {
        self.entries
            .entry(tag.into())
            .or_default()
            .insert(timestamp_ms, text.into());
    }

    pub fn with_entry(mut self, tag: impl Into<String>, timestamp_ms: i64, text: impl Into<String>) -> Self {
        self.push(tag, timestamp_ms, text);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSource for MemorySource {
    fn next_entry(&self, tag: &str, after_ms: i64, max_len: usize) -> Result<Option<RawEntry>> {
        let Some(by_time) = self.entries.get(tag) else {
            return Ok(None);
        };
        let next = by_time
            .range(after_ms.saturating_add(1)..)
            .next()
            .map(|(ts, text)| RawEntry {
                tag: tag.to_string(),
                timestamp_ms: *ts,
                text: truncate_text(text.clone(), max_len),
            });
        Ok(next)
    }
}
