//! AI crash summaries. The core only consumes a provider's state; it
//! never drives model downloads or inference itself.

mod command;

pub use command::CommandProvider;

use crate::error::Result;
use crate::store::CrashDatabase;
use crate::time::now_ms;
use crate::types::{CrashInsight, CrashRecord};
use serde::{Deserialize, Serialize};

/// Characters of the crash body included in a prompt
pub const PROMPT_CONTENT_CHARS: usize = 1500;

const SUMMARY: &str = "SUMMARY:";
const ROOT_CAUSE: &str = "ROOT_CAUSE:";
const SUGGESTED_FIX: &str = "SUGGESTED_FIX:";
const AFFECTED_LINE: &str = "AFFECTED_LINE:";
const MARKERS: [&str; 4] = [SUMMARY, ROOT_CAUSE, SUGGESTED_FIX, AFFECTED_LINE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelStatus {
    Unavailable,
    Downloadable,
    Downloading,
    Available,
}

/// Outcome of asking for an insight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "value")]
pub enum InsightResult {
    Success(CrashInsight),
    Error(String),
    Unavailable,
    Downloading,
}

/// A text-generation backend
pub trait InsightProvider: Send + Sync {
    fn status(&self) -> ModelStatus;

    fn is_available(&self) -> bool {
        self.status() == ModelStatus::Available
    }

    /// Ask the backend to fetch its model. Progress is reported through `status()`.
    fn request_download(&self) -> Result<()>;

    fn generate(&self, prompt: &str) -> Result<String>;
}

pub fn build_prompt(record: &CrashRecord) -> String {
    let body: String = record.content.chars().take(PROMPT_CONTENT_CHARS).collect();
    let package = record.package_name.as_deref().unwrap_or("Unknown");
    let app = record.app_name.as_deref().unwrap_or(package);

    format!(
        "Analyze this Android crash log and provide insights.\n\
         \n\
         Crash Type: {}\n\
         App: {}\n\
         Package: {}\n\
         \n\
         Stack Trace:\n\
         {}\n\
         \n\
         Respond in this exact format:\n\
         \n\
         {} [One sentence explaining what happened]\n\
         \n\
         {} [The specific cause of the crash]\n\
         \n\
         {} [How to fix this issue]\n\
         \n\
         {} [The key line from the stack trace, or N/A]",
        record.category.display_name(),
        app,
        package,
        body,
        SUMMARY,
        ROOT_CAUSE,
        SUGGESTED_FIX,
        AFFECTED_LINE,
    )
}

/// Text after `marker` up to the next known marker, trimmed.
/// Marker matching ignores ASCII case.
pub fn extract_section(text: &str, marker: &str) -> Option<String> {
    let upper = text.to_ascii_uppercase();
    let marker_upper = marker.to_ascii_uppercase();
    let start = upper.find(&marker_upper)? + marker_upper.len();

    let end = MARKERS
        .iter()
        .filter(|m| !m.eq_ignore_ascii_case(marker))
        .filter_map(|m| upper[start..].find(m).map(|i| start + i))
        .min()
        .unwrap_or(text.len());

    Some(text[start..end].trim().to_string())
}

/// Build an insight for `crash_id` from a model response
pub fn parse_insight_response(crash_id: i64, response: &str, created_at: i64) -> CrashInsight {
    let summary = extract_section(response, SUMMARY)
        .unwrap_or_else(|| "Unable to determine summary".to_string());
    let root_cause = extract_section(response, ROOT_CAUSE)
        .unwrap_or_else(|| "Unable to determine root cause".to_string());
    let suggested_fix = extract_section(response, SUGGESTED_FIX)
        .unwrap_or_else(|| "Unable to suggest fix".to_string());
    let affected_line = extract_section(response, AFFECTED_LINE)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("N/A"));

    CrashInsight {
        crash_id,
        summary,
        root_cause,
        suggested_fix,
        affected_line,
        created_at,
    }
}

/// Summarizes crashes through a provider, caching results when a database is attached
pub struct InsightService {
    provider: Box<dyn InsightProvider>,
    cache: Option<CrashDatabase>,
}

impl InsightService {
    pub fn new(provider: Box<dyn InsightProvider>) -> Self {
        Self { provider, cache: None }
    }

    pub fn with_cache(mut self, db: CrashDatabase) -> Self {
        self.cache = Some(db);
        self
    }

    pub fn status(&self) -> ModelStatus {
        self.provider.status()
    }

    pub fn cached_insight(&self, crash_id: i64) -> Result<Option<CrashInsight>> {
        match &self.cache {
            Some(db) => db.insight_for_crash(crash_id),
            None => Ok(None),
        }
    }

    pub fn summarize(&self, record: &CrashRecord) -> InsightResult {
        match self.cached_insight(record.id) {
            Ok(Some(insight)) => {
                log::debug!("Using cached insight for crash {}", record.id);
                return InsightResult::Success(insight);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Insight cache lookup failed: {}", e),
        }

        let status = self.provider.status();
        log::debug!("Insight provider status: {:?}", status);
        match status {
            ModelStatus::Unavailable => return InsightResult::Unavailable,
            ModelStatus::Downloading => return InsightResult::Downloading,
            ModelStatus::Downloadable => {
                log::info!("Insight model downloadable, requesting download");
                if let Err(e) = self.provider.request_download() {
                    return InsightResult::Error(e.to_string());
                }
                return InsightResult::Downloading;
            }
            ModelStatus::Available => {}
        }

        let prompt = build_prompt(record);
        let response = match self.provider.generate(&prompt) {
            Ok(text) if text.trim().is_empty() => {
                return InsightResult::Error("Empty response from model".to_string())
            }
            Ok(text) => text,
            Err(e) => return InsightResult::Error(e.to_string()),
        };

        let insight = parse_insight_response(record.id, &response, now_ms());
        if let Some(db) = &self.cache {
            if let Err(e) = db.insert_insight(&insight) {
                log::warn!("Failed to cache insight for crash {}: {}", record.id, e);
            }
        }
        InsightResult::Success(insight)
    }
}
