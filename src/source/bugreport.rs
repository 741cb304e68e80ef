use crate::error::{Result, StackLensError};
use crate::source::dropbox::{access_error, parse_file_name, read_payload, DropBoxIndex, EntryKind};
use crate::source::{LogSource, RawEntry};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use zip::read::ZipArchive;

/// Directory inside a bugreport zip that holds the DropBox dump
const DROPBOX_DIR: &str = "data/system/dropbox/";

/// DropBox entries captured inside a bugreport `.zip`
/// (`FS/data/system/dropbox/<tag>@<ms>.<ext>`)
pub struct BugreportArchive {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
    index: DropBoxIndex<usize>,
}

impl BugreportArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| access_error(path, e))?;
        let mut archive = ZipArchive::new(file)?;
        let mut index = DropBoxIndex::default();

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if entry.is_dir() || !name.contains(DROPBOX_DIR) {
                continue;
            }
            let file_name = name.rsplit('/').next().unwrap_or(&name);
            if let Some(parsed) = parse_file_name(file_name) {
                index.insert(parsed, i);
            }
        }

        if index.len() == 0 {
            log::warn!("No DropBox entries found in {}", path.display());
        } else {
            log::info!("Indexed {} DropBox entries in {}", index.len(), path.display());
        }
        let unknown = index.unknown_tags();
        if !unknown.is_empty() {
            log::debug!("Ignoring DropBox tags with no crash category: {:?}", unknown);
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive: Mutex::new(archive),
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }
}

impl LogSource for BugreportArchive {
    fn next_entry(&self, tag: &str, after_ms: i64, max_len: usize) -> Result<Option<RawEntry>> {
        let Some((timestamp_ms, entry)) = self.index.next_after(tag, after_ms) else {
            return Ok(None);
        };
        let text = if entry.kind == EntryKind::Lost {
            String::new()
        } else {
            let mut archive = self.archive.lock().map_err(|_| StackLensError::StatePoisoned)?;
            let file = archive.by_index(entry.location)?;
            read_payload(file, entry.kind, entry.compressed, max_len)?
        };
        Ok(Some(RawEntry {
            tag: tag.to_string(),
            timestamp_ms,
            text,
        }))
    }
}
