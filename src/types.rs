use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Diagnostic categories written to the DropBox by the Android system.
///
/// The serialized form is the DropBox tag itself, so records round-trip
/// through JSON and the cache database using the same key the log source
/// is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrashCategory {
    // App crashes (Java/Kotlin)
    #[serde(rename = "data_app_crash")]
    DataAppCrash,
    #[serde(rename = "system_app_crash")]
    SystemAppCrash,

    // Application Not Responding
    #[serde(rename = "data_app_anr")]
    DataAppAnr,
    #[serde(rename = "system_app_anr")]
    SystemAppAnr,

    // Native (tombstone) crashes
    #[serde(rename = "SYSTEM_TOMBSTONE")]
    SystemTombstone,

    // Watchdog / system_server
    #[serde(rename = "system_server_crash")]
    SystemServerCrash,
    #[serde(rename = "system_server_anr")]
    SystemServerAnr,
    #[serde(rename = "system_server_wtf")]
    SystemServerWtf,

    #[serde(rename = "data_app_strictmode")]
    DataAppStrictmode,

    // Kernel
    #[serde(rename = "SYSTEM_LAST_KMSG")]
    SystemLastKmsg,
    #[serde(rename = "APANIC_CONSOLE")]
    ApanicConsole,
    #[serde(rename = "APANIC_THREADS")]
    ApanicThreads,
}

impl CrashCategory {
    pub const ALL: [CrashCategory; 12] = [
        CrashCategory::DataAppCrash,
        CrashCategory::SystemAppCrash,
        CrashCategory::DataAppAnr,
        CrashCategory::SystemAppAnr,
        CrashCategory::SystemTombstone,
        CrashCategory::SystemServerCrash,
        CrashCategory::SystemServerAnr,
        CrashCategory::SystemServerWtf,
        CrashCategory::DataAppStrictmode,
        CrashCategory::SystemLastKmsg,
        CrashCategory::ApanicConsole,
        CrashCategory::ApanicThreads,
    ];

    pub const APP_CRASHES: [CrashCategory; 2] =
        [CrashCategory::DataAppCrash, CrashCategory::SystemAppCrash];

    pub const ANRS: [CrashCategory; 2] = [CrashCategory::DataAppAnr, CrashCategory::SystemAppAnr];

    pub const NATIVE: [CrashCategory; 1] = [CrashCategory::SystemTombstone];

    /// DropBox tag used as the log source query key
    pub fn tag(self) -> &'static str {
        match self {
            CrashCategory::DataAppCrash => "data_app_crash",
            CrashCategory::SystemAppCrash => "system_app_crash",
            CrashCategory::DataAppAnr => "data_app_anr",
            CrashCategory::SystemAppAnr => "system_app_anr",
            CrashCategory::SystemTombstone => "SYSTEM_TOMBSTONE",
            CrashCategory::SystemServerCrash => "system_server_crash",
            CrashCategory::SystemServerAnr => "system_server_anr",
            CrashCategory::SystemServerWtf => "system_server_wtf",
            CrashCategory::DataAppStrictmode => "data_app_strictmode",
            CrashCategory::SystemLastKmsg => "SYSTEM_LAST_KMSG",
            CrashCategory::ApanicConsole => "APANIC_CONSOLE",
            CrashCategory::ApanicThreads => "APANIC_THREADS",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CrashCategory::DataAppCrash => "App Crash",
            CrashCategory::SystemAppCrash => "System App Crash",
            CrashCategory::DataAppAnr => "ANR",
            CrashCategory::SystemAppAnr => "System ANR",
            CrashCategory::SystemTombstone => "Native Crash",
            CrashCategory::SystemServerCrash => "System Server Crash",
            CrashCategory::SystemServerAnr => "System Server ANR",
            CrashCategory::SystemServerWtf => "System WTF",
            CrashCategory::DataAppStrictmode => "StrictMode Violation",
            CrashCategory::SystemLastKmsg => "Kernel Log",
            CrashCategory::ApanicConsole => "Kernel Panic",
            CrashCategory::ApanicThreads => "Panic Threads",
        }
    }

    pub fn from_tag(tag: &str) -> Option<CrashCategory> {
        CrashCategory::ALL.iter().copied().find(|c| c.tag() == tag)
    }

    pub fn is_app_crash(self) -> bool {
        CrashCategory::APP_CRASHES.contains(&self)
    }

    pub fn is_anr(self) -> bool {
        CrashCategory::ANRS.contains(&self)
    }

    pub fn is_native(self) -> bool {
        CrashCategory::NATIVE.contains(&self)
    }
}

impl std::fmt::Display for CrashCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for CrashCategory {
    type Err = crate::error::StackLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrashCategory::from_tag(s)
            .ok_or_else(|| crate::error::StackLensError::UnknownCategory(s.to_string()))
    }
}

/// One DropBox entry after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashRecord {
    /// Derived from the entry timestamp; dedup key when merging read passes
    pub id: i64,
    pub category: CrashCategory,
    pub package_name: Option<String>,
    pub app_name: Option<String>,
    /// Epoch milliseconds as reported by the log source
    pub timestamp: i64,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub process_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pid: Option<i32>,
}

/// Records sharing one signature. Always recomputed, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashGroup {
    pub signature: String,
    pub exception_type: String,
    /// Newest first
    pub crashes: Vec<CrashRecord>,
    pub count: usize,
    pub first_occurrence: i64,
    pub last_occurrence: i64,
}

impl CrashGroup {
    /// The most recent crash, used as the representative of the group.
    /// On equal timestamps the earlier element wins.
    pub fn latest_crash(&self) -> Option<&CrashRecord> {
        self.crashes
            .iter()
            .reduce(|best, c| if c.timestamp > best.timestamp { c } else { best })
    }

    pub fn app_name(&self) -> Option<&str> {
        self.latest_crash().and_then(|c| c.app_name.as_deref())
    }

    pub fn package_name(&self) -> Option<&str> {
        self.latest_crash().and_then(|c| c.package_name.as_deref())
    }

    pub fn category(&self) -> Option<CrashCategory> {
        self.latest_crash().map(|c| c.category)
    }
}

/// AI-generated explanation of one crash, cached by crash id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashInsight {
    pub crash_id: i64,
    pub summary: String,
    pub root_cause: String,
    pub suggested_fix: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub affected_line: Option<String>,
    /// Epoch milliseconds
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl SortOrder {
    pub fn display_name(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "Newest first",
            SortOrder::OldestFirst => "Oldest first",
        }
    }
}

/// Coarse type filter applied on top of the category set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFilter {
    #[default]
    All,
    Crashes,
    Anrs,
    Native,
}

impl CategoryFilter {
    pub fn display_name(self) -> &'static str {
        match self {
            CategoryFilter::All => "All",
            CategoryFilter::Crashes => "Crashes",
            CategoryFilter::Anrs => "ANRs",
            CategoryFilter::Native => "Native",
        }
    }

    pub fn matches(self, category: CrashCategory) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Crashes => category.is_app_crash(),
            CategoryFilter::Anrs => category.is_anr(),
            CategoryFilter::Native => category.is_native(),
        }
    }
}

impl std::str::FromStr for CategoryFilter {
    type Err = crate::error::StackLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(CategoryFilter::All),
            "crashes" | "crash" => Ok(CategoryFilter::Crashes),
            "anrs" | "anr" => Ok(CategoryFilter::Anrs),
            "native" => Ok(CategoryFilter::Native),
            other => Err(crate::error::StackLensError::InvalidFilter(format!(
                "unknown type filter '{}'",
                other
            ))),
        }
    }
}

pub const DEFAULT_TIME_RANGE_HOURS: u32 = 168;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrashFilter {
    pub categories: BTreeSet<CrashCategory>,
    pub package_name: Option<String>,
    pub search_query: Option<String>,
    pub time_range_hours: u32,
    pub sort_order: SortOrder,
    pub type_filter: CategoryFilter,
}

impl Default for CrashFilter {
    fn default() -> Self {
        Self {
            categories: CrashCategory::ALL.iter().copied().collect(),
            package_name: None,
            search_query: None,
            time_range_hours: DEFAULT_TIME_RANGE_HOURS,
            sort_order: SortOrder::NewestFirst,
            type_filter: CategoryFilter::All,
        }
    }
}

/// Result of `filter_and_group`: the flat list view and the grouped view
/// over the same filtered records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredView {
    pub flat: Vec<CrashRecord>,
    pub groups: Vec<CrashGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64) -> CrashRecord {
        CrashRecord {
            id: ts,
            category: CrashCategory::DataAppCrash,
            package_name: Some(format!("com.example.p{}", ts)),
            app_name: None,
            timestamp: ts,
            content: String::new(),
            process_name: None,
            pid: None,
        }
    }

    #[test]
    fn test_tag_round_trip() {
        for c in CrashCategory::ALL {
            assert_eq!(CrashCategory::from_tag(c.tag()), Some(c));
        }
        assert_eq!(CrashCategory::from_tag("nope"), None);
        assert!("nope".parse::<CrashCategory>().is_err());
    }

    #[test]
    fn test_category_serializes_as_tag() {
        let json = serde_json::to_string(&CrashCategory::SystemTombstone).unwrap();
        assert_eq!(json, "\"SYSTEM_TOMBSTONE\"");
        let parsed: CrashCategory = serde_json::from_str("\"data_app_anr\"").unwrap();
        assert_eq!(parsed, CrashCategory::DataAppAnr);
    }

    #[test]
    fn test_category_groups() {
        assert!(CrashCategory::DataAppCrash.is_app_crash());
        assert!(CrashCategory::SystemAppAnr.is_anr());
        assert!(!CrashCategory::SystemServerAnr.is_anr());
        assert!(CrashCategory::SystemTombstone.is_native());
        assert!(CategoryFilter::Anrs.matches(CrashCategory::DataAppAnr));
        assert!(!CategoryFilter::Native.matches(CrashCategory::DataAppAnr));
        assert!(CategoryFilter::All.matches(CrashCategory::ApanicThreads));
    }

    #[test]
    fn test_filter_default() {
        let f = CrashFilter::default();
        assert_eq!(f.categories.len(), CrashCategory::ALL.len());
        assert_eq!(f.time_range_hours, 168);
        assert_eq!(f.sort_order, SortOrder::NewestFirst);
        assert_eq!(f.type_filter, CategoryFilter::All);
    }

    #[test]
    fn test_group_latest_crash_proxies() {
        let group = CrashGroup {
            signature: "X:data_app_crash:0".to_string(),
            exception_type: "X".to_string(),
            crashes: vec![record(20), record(10)],
            count: 2,
            first_occurrence: 10,
            last_occurrence: 20,
        };
        assert_eq!(group.latest_crash().unwrap().timestamp, 20);
        assert_eq!(group.package_name(), Some("com.example.p20"));
        assert_eq!(group.app_name(), None);
        assert_eq!(group.category(), Some(CrashCategory::DataAppCrash));
    }

    #[test]
    fn test_type_filter_from_str() {
        assert_eq!("ANRs".parse::<CategoryFilter>().unwrap(), CategoryFilter::Anrs);
        assert_eq!("native".parse::<CategoryFilter>().unwrap(), CategoryFilter::Native);
        assert!("bogus".parse::<CategoryFilter>().is_err());
    }
}
