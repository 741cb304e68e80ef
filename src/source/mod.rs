//! Collaborators the crash reader consumes: where raw DropBox entries
//! come from and how package names resolve to display labels.

mod bugreport;
mod dropbox;
mod memory;

pub use bugreport::BugreportArchive;
pub use dropbox::{parse_file_name, DropBoxDirectory, DropBoxFileName, EntryKind};
pub use memory::MemorySource;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One entry as handed out by a log source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub tag: String,
    pub timestamp_ms: i64,
    pub text: String,
}

/// Point-in-time access to the diagnostic log buffer.
///
/// Mirrors `DropBoxManager.getNextEntry`: returns the first entry for `tag`
/// with a timestamp strictly greater than `after_ms`, with its text capped
/// at `max_len` bytes. Access denial is reported as
/// [`StackLensError::PermissionDenied`](crate::error::StackLensError::PermissionDenied).
pub trait LogSource: Send + Sync {
    fn next_entry(&self, tag: &str, after_ms: i64, max_len: usize) -> Result<Option<RawEntry>>;
}

/// Resolves a package to its user-visible label
pub trait PackageRegistry: Send + Sync {
    /// `None` when the package is not installed / unknown
    fn app_label(&self, package: &str) -> Option<String>;
}

/// Registry that knows no packages; records fall back to the package name
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

impl PackageRegistry for NoRegistry {
    fn app_label(&self, _package: &str) -> Option<String> {
        None
    }
}

/// Fixed package -> label map, e.g. loaded from a JSON object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRegistry {
    labels: HashMap<String, String>,
}

impl StaticRegistry {
    pub fn insert(&mut self, package: impl Into<String>, label: impl Into<String>) {
        self.labels.insert(package.into(), label.into());
    }

    /// Load a `{"com.example.app": "Example"}` JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl PackageRegistry for StaticRegistry {
    fn app_label(&self, package: &str) -> Option<String> {
        self.labels.get(package).cloned()
    }
}

/// Cut `text` to at most `max_len` bytes without splitting a character
pub fn truncate_text(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Open a bugreport `.zip` or an extracted DropBox directory
pub fn open_path(path: &Path) -> Result<Box<dyn LogSource>> {
    if is_zip(path) {
        Ok(Box::new(BugreportArchive::open(path)?))
    } else {
        Ok(Box::new(DropBoxDirectory::open(path)?))
    }
}
