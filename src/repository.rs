use crate::error::Result;
use crate::query::filter_and_group_with;
use crate::reader::{CrashReader, ReadOutcome, DEFAULT_MAX_CONTENT_LENGTH};
use crate::signature::SignatureGenerator;
use crate::store::CrashDatabase;
use crate::time::{hours_before, now_ms};
use crate::types::{CrashCategory, CrashFilter, FilteredView, DEFAULT_TIME_RANGE_HOURS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Where crash records come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RepositoryStrategy {
    /// Read the log source on every query
    Live,
    /// Persist what the source returns and merge it with earlier reads,
    /// keeping history the device has already rotated out
    #[serde(rename_all = "camelCase")]
    CachedMerge { retention_days: u32 },
}

/// Query result plus the permission state of the underlying read
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryResult {
    pub view: FilteredView,
    pub permission_denied: bool,
}

enum Backing {
    Live,
    Cached {
        db: CrashDatabase,
        retention_days: u32,
    },
}

pub struct CrashRepository {
    reader: CrashReader,
    backing: Backing,
    generator: SignatureGenerator,
    max_content_length: usize,
}

impl CrashRepository {
    pub fn live(reader: CrashReader) -> Self {
        Self {
            reader,
            backing: Backing::Live,
            generator: SignatureGenerator::default(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }

    pub fn cached(reader: CrashReader, db: CrashDatabase, retention_days: u32) -> Self {
        Self {
            reader,
            backing: Backing::Cached { db, retention_days },
            generator: SignatureGenerator::default(),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }

    pub fn with_generator(mut self, generator: SignatureGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_max_content_length(mut self, max_content_length: usize) -> Self {
        self.max_content_length = max_content_length;
        self
    }

    pub fn strategy(&self) -> RepositoryStrategy {
        match &self.backing {
            Backing::Live => RepositoryStrategy::Live,
            Backing::Cached { retention_days, .. } => RepositoryStrategy::CachedMerge {
                retention_days: *retention_days,
            },
        }
    }

    pub fn reader(&self) -> &CrashReader {
        &self.reader
    }

    pub fn database(&self) -> Option<&CrashDatabase> {
        match &self.backing {
            Backing::Live => None,
            Backing::Cached { db, .. } => Some(db),
        }
    }

    pub fn into_database(self) -> Option<CrashDatabase> {
        match self.backing {
            Backing::Live => None,
            Backing::Cached { db, .. } => Some(db),
        }
    }

    /// Records of `categories` from the last `since_hours`, newest first
    pub fn get_crash_logs(&mut self, categories: &[CrashCategory], since_hours: u32) -> Result<ReadOutcome> {
        let now = now_ms();
        self.get_crash_logs_at(categories, hours_before(now, since_hours), now)
    }

    /// Records of `categories` after `since_ms`, with retention evaluated at `now_ms`
    pub fn get_crash_logs_at(
        &mut self,
        categories: &[CrashCategory],
        since_ms: i64,
        now_ms: i64,
    ) -> Result<ReadOutcome> {
        let live = self
            .reader
            .read_crash_logs_since(categories, since_ms, self.max_content_length)?;

        let (db, retention_days) = match &mut self.backing {
            Backing::Live => return Ok(live),
            Backing::Cached { db, retention_days } => (db, *retention_days),
        };

        let retention_cutoff = hours_before(now_ms, retention_days.saturating_mul(24));
        let expired = db.delete_older_than(retention_cutoff)?;
        if expired > 0 {
            let orphans = db.delete_orphaned_insights()?;
            log::info!("Removed {} expired crash records ({} insights)", expired, orphans);
        }

        let fresh: Vec<_> = live
            .records
            .iter()
            .filter(|r| r.timestamp >= retention_cutoff)
            .cloned()
            .collect();
        db.insert_all(&fresh)?;
        let persisted = db.query_by_tags_since(categories, since_ms)?;

        let mut seen: HashSet<i64> = HashSet::new();
        let mut records = Vec::with_capacity(live.records.len() + persisted.len());
        let live_count = live.records.len();
        for record in live.records.into_iter().chain(persisted) {
            if seen.insert(record.id) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        log::debug!(
            "Merged {} live records with cache into {} records",
            live_count,
            records.len()
        );
        Ok(ReadOutcome {
            records,
            permission_denied: live.permission_denied,
        })
    }

    /// Read according to the strategy, then filter and group
    pub fn query(&mut self, filter: &CrashFilter) -> Result<RepositoryResult> {
        self.query_at(filter, now_ms())
    }

    pub fn query_at(&mut self, filter: &CrashFilter, now_ms: i64) -> Result<RepositoryResult> {
        let categories: Vec<CrashCategory> = filter.categories.iter().copied().collect();
        let since = hours_before(now_ms, filter.time_range_hours);
        let outcome = self.get_crash_logs_at(&categories, since, now_ms)?;
        let view = filter_and_group_with(&outcome.records, filter, &self.generator, now_ms);
        Ok(RepositoryResult {
            view,
            permission_denied: outcome.permission_denied,
        })
    }

    /// Distinct packages with app crashes or ANRs, sorted
    pub fn crashed_packages(&mut self) -> Result<Vec<String>> {
        let window_hours = match self.strategy() {
            RepositoryStrategy::Live => DEFAULT_TIME_RANGE_HOURS,
            RepositoryStrategy::CachedMerge { retention_days } => retention_days.saturating_mul(24),
        };
        let categories: Vec<CrashCategory> = CrashCategory::APP_CRASHES
            .iter()
            .chain(CrashCategory::ANRS.iter())
            .copied()
            .collect();

        let outcome = self.get_crash_logs(&categories, window_hours)?;
        let packages: BTreeSet<String> = outcome
            .records
            .into_iter()
            .filter_map(|r| r.package_name)
            .collect();
        Ok(packages.into_iter().collect())
    }

    /// Number of records per category in the last `since_hours`
    pub fn crash_stats(&mut self, since_hours: u32) -> Result<BTreeMap<CrashCategory, usize>> {
        let outcome = self.get_crash_logs(&CrashCategory::ALL, since_hours)?;
        let mut stats = BTreeMap::new();
        for record in &outcome.records {
            *stats.entry(record.category).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::types::CrashInsight;

    const HOUR: i64 = 3_600_000;

    fn npe(package: &str) -> String {
        format!(
            "Process: {}\njava.lang.NullPointerException: boom\n\tat com.example.Main.run(Main.java:10)\n",
            package
        )
    }

    fn reader(source: MemorySource) -> CrashReader {
        CrashReader::new(Box::new(source))
    }

    #[test]
    fn test_live_query_groups_and_filters() {
        let now = crate::time::now_ms();
        let source = MemorySource::new()
            .with_entry("data_app_crash", now - HOUR, npe("com.a"))
            .with_entry("data_app_crash", now - 2 * HOUR, npe("com.a"))
            .with_entry("data_app_anr", now - 3 * HOUR, "ANR in com.b\nPID: 9\n")
            .with_entry("data_app_crash", now - 200 * HOUR, npe("com.old"));

        let mut repo = CrashRepository::live(reader(source));
        assert_eq!(repo.strategy(), RepositoryStrategy::Live);

        let result = repo.query_at(&CrashFilter::default(), now).unwrap();
        assert!(!result.permission_denied);
        assert_eq!(result.view.flat.len(), 3);
        assert_eq!(result.view.groups.len(), 2);
        assert_eq!(result.view.groups[0].count, 2);
        assert_eq!(result.view.groups[0].exception_type, "NullPointerException");

        assert_eq!(repo.crashed_packages().unwrap(), vec!["com.a".to_string(), "com.b".to_string()]);
        assert!(repo.database().is_none());
    }

    #[test]
    fn test_cached_merge_keeps_rotated_entries() {
        let now = crate::time::now_ms();
        let first = MemorySource::new()
            .with_entry("data_app_crash", now - 5 * HOUR, npe("com.a"))
            .with_entry("data_app_crash", now - 10 * 24 * HOUR, npe("com.expired"));
        let mut repo = CrashRepository::cached(
            reader(first),
            CrashDatabase::open_in_memory().unwrap(),
            DEFAULT_RETENTION_DAYS,
        );
        let outcome = repo.get_crash_logs_at(&CrashCategory::ALL, 0, now).unwrap();
        assert_eq!(outcome.records.len(), 2);

        // The device has rotated the old entry out; a newer one arrived
        let db = repo.into_database().unwrap();
        let second = MemorySource::new().with_entry("data_app_crash", now - HOUR, npe("com.a"));
        let mut repo = CrashRepository::cached(reader(second), db, DEFAULT_RETENTION_DAYS);
        assert_eq!(
            repo.strategy(),
            RepositoryStrategy::CachedMerge { retention_days: DEFAULT_RETENTION_DAYS }
        );

        let result = repo.query_at(&CrashFilter::default(), now).unwrap();
        let ts: Vec<i64> = result.view.flat.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![now - HOUR, now - 5 * HOUR]);
        assert_eq!(result.view.groups.len(), 1);
        assert_eq!(result.view.groups[0].count, 2);

        // Expired row was dropped from the cache by retention
        assert_eq!(repo.database().unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_retention_removes_orphaned_insights() {
        let now = crate::time::now_ms();
        let old = now - 30 * 24 * HOUR;
        let mut db = CrashDatabase::open_in_memory().unwrap();
        let seeded = reader(MemorySource::new().with_entry("data_app_crash", old, npe("com.a")))
            .read_crash_logs_since(&CrashCategory::ALL, 0, 1024)
            .unwrap();
        db.insert_all(&seeded.records).unwrap();
        db.insert_insight(&CrashInsight {
            crash_id: old,
            summary: "s".into(),
            root_cause: "r".into(),
            suggested_fix: "f".into(),
            affected_line: None,
            created_at: now,
        })
        .unwrap();

        let mut repo = CrashRepository::cached(reader(MemorySource::new()), db, 7);
        repo.get_crash_logs_at(&CrashCategory::ALL, 0, now).unwrap();
        let db = repo.database().unwrap();
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.insight_for_crash(old).unwrap(), None);
    }

    #[test]
    fn test_crash_stats() {
        let now = crate::time::now_ms();
        let source = MemorySource::new()
            .with_entry("data_app_crash", now - HOUR, npe("com.a"))
            .with_entry("data_app_anr", now - HOUR, "ANR in com.b\n")
            .with_entry("data_app_anr", now - 2 * HOUR, "ANR in com.b\n");
        let mut repo = CrashRepository::live(reader(source));
        let stats = repo.crash_stats(24).unwrap();
        assert_eq!(stats.get(&CrashCategory::DataAppCrash), Some(&1));
        assert_eq!(stats.get(&CrashCategory::DataAppAnr), Some(&2));
        assert_eq!(stats.get(&CrashCategory::SystemTombstone), None);
    }
}
