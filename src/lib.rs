//! Crash signature and grouping engine for Android DropBox diagnostics.
//!
//! Raw entries come from a [`source::LogSource`], the [`reader`] parses
//! them into [`CrashRecord`]s, and [`query`] filters and groups them by
//! signature. [`repository`] adds an optional SQLite cache on top.

pub mod config;
pub mod error;
pub mod insight;
pub mod parser;
pub mod query;
pub mod reader;
pub mod repository;
pub mod signature;
pub mod source;
pub mod store;
pub mod time;
pub mod types;

pub use config::StackLensConfig;
pub use error::{Result, StackLensError};
pub use query::{filter_and_group, filter_and_group_with};
pub use reader::{CrashReader, ReadOutcome};
pub use repository::{CrashRepository, RepositoryResult, RepositoryStrategy};
pub use signature::{ExceptionPattern, SignatureGenerator};
pub use types::{
    CategoryFilter, CrashCategory, CrashFilter, CrashGroup, CrashInsight, CrashRecord,
    FilteredView, SortOrder,
};

/// Signature of `content` under the default generator
pub fn generate_signature(content: &str, category: CrashCategory) -> String {
    SignatureGenerator::default().generate_signature(content, category)
}

/// Exception type of `content` under the default generator
pub fn extract_exception_type(content: &str, category: Option<CrashCategory>) -> String {
    SignatureGenerator::default().extract_exception_type(content, category)
}
