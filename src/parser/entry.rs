use crate::source::PackageRegistry;
use crate::types::{CrashCategory, CrashRecord};
use once_cell::sync::Lazy;
use regex::Regex;

/// `Process: com.example.app` or `Process: com.example.app:service`
static PROCESS_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Process:\s*([A-Za-z0-9_.]+)").unwrap()
});

/// `Package: com.example.app v1 (1.0)`
static PACKAGE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Package:\s*([A-Za-z0-9_.]+)").unwrap()
});

static ANR_IN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ANR in ([A-Za-z0-9_.]+)").unwrap()
});

static CMDLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"cmdline:\s*([A-Za-z0-9_.]+)").unwrap()
});

/// Tombstone header: `pid: 1234, tid: 1234, name: main  >>> com.game.app <<<`
static TOMBSTONE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r">>>\s*([A-Za-z0-9_.]+)\s*<<<").unwrap()
});

/// Any lowercase identifier with at least two dots
static DOTTED_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*){2,})").unwrap()
});

static PROCESS_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Process:\s+(.+)").unwrap()
});

static PID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"PID:\s+([0-9]+)").unwrap()
});

fn first_capture<'a>(re: &Regex, content: &'a str) -> Option<&'a str> {
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Strip a `:service` style suffix from a process name
fn before_colon(name: &str) -> &str {
    name.split(':').next().unwrap_or(name)
}

fn common_package_patterns(content: &str) -> Option<String> {
    if let Some(process) = first_capture(&PROCESS_LINE_RE, content) {
        return Some(before_colon(process).to_string());
    }
    first_capture(&PACKAGE_LINE_RE, content).map(str::to_string)
}

/// Best-effort package name for a DropBox entry body.
///
/// Patterns are tried in a category-specific order and the first match in
/// document order wins. `None` means nothing matched; it is never an error.
pub fn extract_package_name(content: &str, category: CrashCategory) -> Option<String> {
    match category {
        CrashCategory::DataAppCrash | CrashCategory::SystemAppCrash => {
            common_package_patterns(content)
        }
        CrashCategory::DataAppAnr | CrashCategory::SystemAppAnr => {
            first_capture(&ANR_IN_RE, content)
                .map(|p| before_colon(p).to_string())
                .or_else(|| common_package_patterns(content))
        }
        CrashCategory::SystemTombstone => {
            first_capture(&CMDLINE_RE, content)
                .or_else(|| first_capture(&TOMBSTONE_NAME_RE, content))
                .map(str::to_string)
                .or_else(|| common_package_patterns(content))
        }
        _ => common_package_patterns(content)
            .or_else(|| first_capture(&DOTTED_ID_RE, content).map(str::to_string)),
    }
}

/// `Process:` line value, trimmed. Independent of the package extraction,
/// so the two may disagree.
pub fn extract_process_name(content: &str) -> Option<String> {
    first_capture(&PROCESS_NAME_RE, content).map(|p| p.trim().to_string())
}

pub fn extract_pid(content: &str) -> Option<i32> {
    first_capture(&PID_RE, content).and_then(|p| p.parse().ok())
}

/// Turn one raw `(category, timestamp, text)` triple into a record.
///
/// The display name comes from `registry`; packages it does not know
/// (not installed) keep the raw package name.
pub fn parse_entry(
    category: CrashCategory,
    timestamp: i64,
    content: String,
    registry: &dyn PackageRegistry,
) -> CrashRecord {
    let package_name = extract_package_name(&content, category);
    let app_name = package_name
        .as_deref()
        .map(|p| registry.app_label(p).unwrap_or_else(|| p.to_string()));

    CrashRecord {
        id: timestamp,
        category,
        package_name,
        app_name,
        timestamp,
        process_name: extract_process_name(&content),
        pid: extract_pid(&content),
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{NoRegistry, StaticRegistry};

    const APP_CRASH: &str = "Process: com.example.app:remote\n\
PID: 4321\n\
Flags: 0x38c83e44\n\
Package: com.example.other v12 (1.2)\n\
Build: google/sunfish/sunfish:13\n\
\n\
java.lang.IllegalStateException: boom\n\
\tat com.example.app.Main.run(Main.kt:42)\n";

    #[test]
    fn test_app_crash_process_line_wins() {
        assert_eq!(
            extract_package_name(APP_CRASH, CrashCategory::DataAppCrash).as_deref(),
            Some("com.example.app")
        );
        assert_eq!(extract_process_name(APP_CRASH).as_deref(), Some("com.example.app:remote"));
        assert_eq!(extract_pid(APP_CRASH), Some(4321));
    }

    #[test]
    fn test_package_line_fallback() {
        let body = "Package: com.example.pkg v3 (3.0)\nsomething";
        assert_eq!(
            extract_package_name(body, CrashCategory::SystemAppCrash).as_deref(),
            Some("com.example.pkg")
        );
    }

    #[test]
    fn test_process_line_must_start_the_line() {
        let body = "  Process: com.indented.app\n";
        assert_eq!(extract_package_name(body, CrashCategory::DataAppCrash), None);
    }

    #[test]
    fn test_anr_package_and_pid() {
        let body = "ANR in com.example.app\nPID: 123\nReason: Input dispatching timed out";
        assert_eq!(
            extract_package_name(body, CrashCategory::DataAppAnr).as_deref(),
            Some("com.example.app")
        );
        assert_eq!(extract_pid(body), Some(123));
    }

    #[test]
    fn test_anr_falls_back_to_common_patterns() {
        let body = "Process: com.example.anr\nSubject: Broadcast of Intent";
        assert_eq!(
            extract_package_name(body, CrashCategory::SystemAppAnr).as_deref(),
            Some("com.example.anr")
        );
    }

    #[test]
    fn test_tombstone_cmdline() {
        let body = "Build fingerprint: 'x'\nABI: 'arm64'\ncmdline: com.game.app\npid: 1, tid: 2";
        assert_eq!(
            extract_package_name(body, CrashCategory::SystemTombstone).as_deref(),
            Some("com.game.app")
        );
    }

    #[test]
    fn test_tombstone_name_marker() {
        let body = "pid: 8123, tid: 8150, name: RenderThread  >>> com.game.other <<<\nsignal 11 (SIGSEGV)";
        assert_eq!(
            extract_package_name(body, CrashCategory::SystemTombstone).as_deref(),
            Some("com.game.other")
        );
    }

    #[test]
    fn test_other_category_dotted_heuristic() {
        let body = "Watchdog: blocked in handler on com.android.server.am.ActivityManagerService";
        assert_eq!(
            extract_package_name(body, CrashCategory::SystemServerWtf).as_deref(),
            Some("com.android.server.am")
        );
        // the heuristic is not used for app crashes
        assert_eq!(extract_package_name(body, CrashCategory::DataAppCrash), None);
    }

    #[test]
    fn test_no_match_is_none() {
        for c in CrashCategory::ALL {
            assert_eq!(extract_package_name("", c), None);
        }
        assert_eq!(extract_process_name("nothing here"), None);
        assert_eq!(extract_pid("PID: abc"), None);
    }

    #[test]
    fn test_pid_overflow_is_none() {
        assert_eq!(extract_pid("PID: 99999999999999"), None);
    }

    #[test]
    fn test_package_names_are_ascii_only() {
        assert_eq!(
            extract_package_name("Process: com.exämple.app\n", CrashCategory::DataAppCrash).as_deref(),
            Some("com.ex")
        );
        assert_eq!(
            extract_package_name("ANR in com.exämple.app\n", CrashCategory::DataAppAnr).as_deref(),
            Some("com.ex")
        );
        assert_eq!(
            extract_package_name("cmdline: ком.game\n", CrashCategory::SystemTombstone),
            None
        );
        assert_eq!(extract_pid("PID: ١٢٣"), None);
    }

    #[test]
    fn test_parse_entry_registry_lookup() {
        let mut registry = StaticRegistry::default();
        registry.insert("com.example.app", "Example");
        let rec = parse_entry(CrashCategory::DataAppCrash, 1000, APP_CRASH.to_string(), &registry);
        assert_eq!(rec.id, 1000);
        assert_eq!(rec.app_name.as_deref(), Some("Example"));

        let rec = parse_entry(CrashCategory::DataAppCrash, 1000, APP_CRASH.to_string(), &NoRegistry);
        assert_eq!(rec.app_name.as_deref(), Some("com.example.app"));
    }

    #[test]
    fn test_parse_entry_truncated_body() {
        let body = "Process: com.exa";
        let rec = parse_entry(CrashCategory::DataAppCrash, 5, body.to_string(), &NoRegistry);
        assert_eq!(rec.package_name.as_deref(), Some("com.exa"));
        assert_eq!(rec.pid, None);

        let rec = parse_entry(CrashCategory::ApanicConsole, 5, String::new(), &NoRegistry);
        assert_eq!(rec.package_name, None);
        assert_eq!(rec.app_name, None);
        assert_eq!(rec.process_name, None);
    }
}
