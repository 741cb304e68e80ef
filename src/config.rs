use crate::error::{Result, StackLensError};
use crate::reader::DEFAULT_MAX_CONTENT_LENGTH;
use crate::repository::DEFAULT_RETENTION_DAYS;
use crate::signature::{ExceptionPattern, SignatureGenerator, DEFAULT_FRAME_COUNT};
use crate::store::CrashDatabase;
use crate::types::{CrashCategory, DEFAULT_TIME_RANGE_HOURS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for reading and grouping, loadable from JSON.
/// Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackLensConfig {
    pub categories: Vec<CrashCategory>,
    pub since_hours: u32,
    pub max_content_length: usize,
    pub retention_days: u32,
    pub frame_count: usize,
    pub exception_priority: Vec<ExceptionPattern>,
    pub database_path: Option<PathBuf>,
}

impl Default for StackLensConfig {
    fn default() -> Self {
        Self {
            categories: CrashCategory::ALL.to_vec(),
            since_hours: DEFAULT_TIME_RANGE_HOURS,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            retention_days: DEFAULT_RETENTION_DAYS,
            frame_count: DEFAULT_FRAME_COUNT,
            exception_priority: ExceptionPattern::DEFAULT_PRIORITY.to_vec(),
            database_path: None,
        }
    }
}

impl StackLensConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: StackLensConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_content_length == 0 {
            return Err(StackLensError::InvalidConfig(
                "maxContentLength must be positive".to_string(),
            ));
        }
        if self.exception_priority.is_empty() {
            return Err(StackLensError::InvalidConfig(
                "exceptionPriority must name at least one pattern".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_categories(mut self, categories: Vec<CrashCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_since_hours(mut self, hours: u32) -> Self {
        self.since_hours = hours;
        self
    }

    pub fn with_max_content_length(mut self, bytes: usize) -> Self {
        self.max_content_length = bytes;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_frame_count(mut self, count: usize) -> Self {
        self.frame_count = count;
        self
    }

    pub fn with_exception_priority(mut self, priority: Vec<ExceptionPattern>) -> Self {
        self.exception_priority = priority;
        self
    }

    pub fn with_database_path(mut self, path: PathBuf) -> Self {
        self.database_path = Some(path);
        self
    }

    pub fn signature_generator(&self) -> SignatureGenerator {
        SignatureGenerator::new()
            .with_priority(self.exception_priority.clone())
            .with_frame_count(self.frame_count)
    }

    /// Configured cache path, else `~/.stacklens/crashes.db`
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(CrashDatabase::default_path)
    }
}
