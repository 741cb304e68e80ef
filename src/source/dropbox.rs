use crate::error::{Result, StackLensError};
use crate::source::{truncate_text, LogSource, RawEntry};
use crate::types::CrashCategory;
use flate2::read::GzDecoder;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Payload kind encoded in a DropBox file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Text,
    Data,
    /// Content dropped by the system (quota / too large)
    Lost,
}

/// A parsed `<tag>@<epoch_ms>.<ext>` DropBox file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropBoxFileName {
    pub tag: String,
    pub timestamp_ms: i64,
    pub kind: EntryKind,
    pub compressed: bool,
}

/// Parse a DropBox file name such as `data_app_crash@1697000000000.txt.gz`.
/// Temp files and anything else that does not follow the scheme yield `None`.
pub fn parse_file_name(name: &str) -> Option<DropBoxFileName> {
    let (tag, rest) = name.rsplit_once('@')?;
    if tag.is_empty() {
        return None;
    }
    let (millis, ext) = rest.split_once('.')?;
    let timestamp_ms: i64 = millis.parse().ok()?;
    let (kind, compressed) = match ext {
        "txt" => (EntryKind::Text, false),
        "txt.gz" => (EntryKind::Text, true),
        "dat" => (EntryKind::Data, false),
        "dat.gz" => (EntryKind::Data, true),
        "lost" => (EntryKind::Lost, false),
        _ => return None,
    };
    Some(DropBoxFileName {
        tag: tag.to_string(),
        timestamp_ms,
        kind,
        compressed,
    })
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedEntry<L> {
    pub kind: EntryKind,
    pub compressed: bool,
    pub location: L,
}

/// Tag -> time-ordered entries, shared by the directory and archive sources
#[derive(Debug, Clone)]
pub(crate) struct DropBoxIndex<L> {
    by_tag: HashMap<String, BTreeMap<i64, IndexedEntry<L>>>,
}

impl<L> Default for DropBoxIndex<L> {
    fn default() -> Self {
        Self { by_tag: HashMap::new() }
    }
}

impl<L> DropBoxIndex<L> {
    pub fn insert(&mut self, name: DropBoxFileName, location: L) {
        self.by_tag.entry(name.tag).or_default().insert(
            name.timestamp_ms,
            IndexedEntry {
                kind: name.kind,
                compressed: name.compressed,
                location,
            },
        );
    }

    pub fn next_after(&self, tag: &str, after_ms: i64) -> Option<(i64, &IndexedEntry<L>)> {
        self.by_tag
            .get(tag)?
            .range(after_ms.saturating_add(1)..)
            .next()
            .map(|(ts, e)| (*ts, e))
    }

    pub fn len(&self) -> usize {
        self.by_tag.values().map(|m| m.len()).sum()
    }

    /// Tags present in the dump that no crash category reads
    pub fn unknown_tags(&self) -> BTreeSet<&str> {
        self.by_tag
            .keys()
            .map(String::as_str)
            .filter(|t| CrashCategory::from_tag(t).is_none())
            .collect()
    }
}

/// Read an entry payload, decompressing if needed, capped at `max_len` bytes
pub(crate) fn read_payload<R: Read>(
    reader: R,
    kind: EntryKind,
    compressed: bool,
    max_len: usize,
) -> Result<String> {
    if kind == EntryKind::Lost {
        return Ok(String::new());
    }
    let mut buf = Vec::new();
    let limit = max_len as u64;
    if compressed {
        GzDecoder::new(reader).take(limit).read_to_end(&mut buf)?;
    } else {
        reader.take(limit).read_to_end(&mut buf)?;
    }
    Ok(truncate_text(String::from_utf8_lossy(&buf).into_owned(), max_len))
}

/// Map IO errors that mean "not allowed to look" onto permission denial
pub(crate) fn access_error(path: &Path, e: std::io::Error) -> StackLensError {
    match e.kind() {
        ErrorKind::PermissionDenied | ErrorKind::NotFound => {
            StackLensError::PermissionDenied(format!("{}: {}", path.display(), e))
        }
        _ => StackLensError::Io(e),
    }
}

/// An extracted `/data/system/dropbox` directory
#[derive(Debug)]
pub struct DropBoxDirectory {
    root: PathBuf,
    index: DropBoxIndex<PathBuf>,
}

impl DropBoxDirectory {
    /// Index the directory. A missing or unreadable directory is a
    /// permission denial, the same way a device without READ_LOGS sees it.
    pub fn open(root: &Path) -> Result<Self> {
        let mut index = DropBoxIndex::default();
        let dir = std::fs::read_dir(root).map_err(|e| access_error(root, e))?;

        for entry in dir {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            match parse_file_name(name) {
                Some(parsed) => index.insert(parsed, entry.path()),
                None => log::debug!("Skipping non-DropBox file {}", name),
            }
        }

        let unknown = index.unknown_tags();
        if !unknown.is_empty() {
            log::debug!("Ignoring DropBox tags with no crash category: {:?}", unknown);
        }
        log::info!("Indexed {} DropBox entries in {}", index.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }
}

impl LogSource for DropBoxDirectory {
    fn next_entry(&self, tag: &str, after_ms: i64, max_len: usize) -> Result<Option<RawEntry>> {
        let Some((timestamp_ms, entry)) = self.index.next_after(tag, after_ms) else {
            return Ok(None);
        };
        let text = if entry.kind == EntryKind::Lost {
            String::new()
        } else {
            let file = File::open(&entry.location).map_err(|e| access_error(&entry.location, e))?;
            read_payload(file, entry.kind, entry.compressed, max_len)?
        };
        Ok(Some(RawEntry {
            tag: tag.to_string(),
            timestamp_ms,
            text,
        }))
    }
}
