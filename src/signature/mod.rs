//! Grouping keys for crash bodies.
//!
//! A signature is `{exceptionType}:{categoryTag}:{framesHash}`. The frames
//! hash covers the first few application frames with line numbers
//! stripped, so rebuilds that only move lines around keep grouping
//! together while a different fault site splits off.

use crate::types::CrashCategory;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Frames kept per signature when not configured otherwise
pub const DEFAULT_FRAME_COUNT: usize = 3;

/// Characters of the raw body hashed when no frame survives filtering
const FALLBACK_PREFIX_CHARS: usize = 200;

/// Frames from these packages carry no discriminating signal
const FRAMEWORK_PREFIXES: [&str; 4] = [
    "android.",
    "java.lang.reflect.",
    "dalvik.",
    "com.android.internal.",
];

static GENERIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_.]*(?:Exception|Error))(?::|\s|$)").unwrap()
});

static CAUSED_BY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Caused by:\s*([A-Za-z0-9_.]*(?:Exception|Error))").unwrap()
});

static FATAL_EXCEPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"FATAL EXCEPTION:.*\n.*?([A-Za-z0-9_.]*(?:Exception|Error))").unwrap()
});

static ANR_IN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ANR in ([A-Za-z0-9_.]+)").unwrap()
});

static NATIVE_SIGNAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"signal\s+([0-9]+)\s+\(([A-Z]+)\)").unwrap()
});

static FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+at\s+([A-Za-z0-9_.$<>]+\([^)]*\))").unwrap()
});

static LINE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r":[0-9]+\)").unwrap()
});

/// Exception-type patterns, evaluated in a configurable priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExceptionPattern {
    /// Any `...Exception` / `...Error` token followed by `:`, whitespace or end
    Generic,
    /// `Caused by: x.y.SomeException`
    CausedBy,
    /// First exception token on the line after `FATAL EXCEPTION:`
    FatalException,
    /// `ANR in com.example.app`; yields the package, not a class
    AnrIn,
    /// `signal 11 (SIGSEGV)`; yields the signal number
    NativeSignal,
    /// Same line as `NativeSignal` but yields the name (`SIGSEGV`). Not in
    /// either built-in order.
    NativeSignalName,
}

impl ExceptionPattern {
    /// Order used by the shipped generator: the generic token first
    pub const DEFAULT_PRIORITY: [ExceptionPattern; 5] = [
        ExceptionPattern::Generic,
        ExceptionPattern::CausedBy,
        ExceptionPattern::FatalException,
        ExceptionPattern::AnrIn,
        ExceptionPattern::NativeSignal,
    ];

    /// Innermost cause first; causes are usually more specific than the wrapper
    pub const CAUSE_FIRST_PRIORITY: [ExceptionPattern; 5] = [
        ExceptionPattern::CausedBy,
        ExceptionPattern::Generic,
        ExceptionPattern::FatalException,
        ExceptionPattern::AnrIn,
        ExceptionPattern::NativeSignal,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            ExceptionPattern::Generic => &GENERIC_RE,
            ExceptionPattern::CausedBy => &CAUSED_BY_RE,
            ExceptionPattern::FatalException => &FATAL_EXCEPTION_RE,
            ExceptionPattern::AnrIn => &ANR_IN_RE,
            ExceptionPattern::NativeSignal | ExceptionPattern::NativeSignalName => &NATIVE_SIGNAL_RE,
        }
    }

    /// Bare label for the first match, package prefix stripped
    pub fn find<'a>(self, content: &'a str) -> Option<&'a str> {
        let caps = self.regex().captures(content)?;
        let token = match self {
            ExceptionPattern::NativeSignalName => caps.get(2),
            _ => caps.get(1),
        }?
        .as_str();
        Some(token.rsplit('.').next().unwrap_or(token))
    }
}

/// Label used when no pattern matches
pub fn fallback_exception_type(category: Option<CrashCategory>) -> &'static str {
    match category {
        Some(c) if c.is_anr() => "ANR",
        Some(c) if c.is_native() => "NativeCrash",
        _ => "UnknownException",
    }
}

/// SHA-1 of `input`, first 8 bytes as 16 lowercase hex chars
pub fn short_hash(input: &str) -> String {
    let digest = Sha1::digest(input.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Normalized `at ...(...)` frames: line numbers removed, framework frames dropped
pub fn normalized_frames(content: &str, count: usize) -> Vec<String> {
    FRAME_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| LINE_NUMBER_RE.replace_all(m.as_str(), ")").into_owned())
        .filter(|frame| !FRAMEWORK_PREFIXES.iter().any(|p| frame.starts_with(p)))
        .take(count)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignatureGenerator {
    priority: Vec<ExceptionPattern>,
    frame_count: usize,
}

impl Default for SignatureGenerator {
    fn default() -> Self {
        Self {
            priority: ExceptionPattern::DEFAULT_PRIORITY.to_vec(),
            frame_count: DEFAULT_FRAME_COUNT,
        }
    }
}

impl SignatureGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the exception pattern order. Patterns left out are not tried.
    pub fn with_priority(mut self, priority: Vec<ExceptionPattern>) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = frame_count;
        self
    }

    pub fn priority(&self) -> &[ExceptionPattern] {
        &self.priority
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Bare exception class name (e.g. `NullPointerException`), or a
    /// category fallback label when nothing matches.
    pub fn extract_exception_type(&self, content: &str, category: Option<CrashCategory>) -> String {
        self.priority
            .iter()
            .find_map(|p| p.find(content))
            .unwrap_or_else(|| fallback_exception_type(category))
            .to_string()
    }

    pub fn generate_signature(&self, content: &str, category: CrashCategory) -> String {
        let exception_type = self.extract_exception_type(content, Some(category));
        let frames = normalized_frames(content, self.frame_count);
        let frames_hash = if frames.is_empty() {
            let prefix: String = content.chars().take(FALLBACK_PREFIX_CHARS).collect();
            short_hash(&prefix)
        } else {
            short_hash(&frames.join("|"))
        };
        format!("{}:{}:{}", exception_type, category.tag(), frames_hash)
    }
}
