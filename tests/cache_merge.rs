use stacklens_lib::source::MemorySource;
use stacklens_lib::store::CrashDatabase;
use stacklens_lib::time::{now_ms, MS_PER_HOUR};
use stacklens_lib::{CrashCategory, CrashFilter, CrashReader, CrashRepository, RepositoryStrategy};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_db_path() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir()
        .join(format!("stacklens_it_cache_{}", nanos))
        .join("crashes.db")
}

fn crash(exception: &str) -> String {
    format!(
        "Process: com.example.app\nPID: 77\n{}: boom\n\tat com.example.app.Worker.run(Worker.kt:5)\n",
        exception
    )
}

#[test]
fn cached_history_survives_source_rotation() {
    let path = temp_db_path();
    let now = now_ms();

    {
        let source = MemorySource::new()
            .with_entry("data_app_crash", now - 6 * MS_PER_HOUR, crash("java.lang.IllegalStateException"))
            .with_entry("data_app_anr", now - 5 * MS_PER_HOUR, "ANR in com.example.app\nPID: 77\n");
        let db = CrashDatabase::open(&path).unwrap();
        let mut repo = CrashRepository::cached(CrashReader::new(Box::new(source)), db, 7);
        let result = repo.query(&CrashFilter::default()).unwrap();
        assert_eq!(result.view.flat.len(), 2);
    }

    // Fresh process: the device buffer only holds a newer entry now
    let source = MemorySource::new().with_entry(
        "data_app_crash",
        now - MS_PER_HOUR,
        crash("java.lang.IllegalStateException"),
    );
    let db = CrashDatabase::open_existing(&path).unwrap();
    assert_eq!(db.count().unwrap(), 2);
    let mut repo = CrashRepository::cached(CrashReader::new(Box::new(source)), db, 7);
    assert_eq!(repo.strategy(), RepositoryStrategy::CachedMerge { retention_days: 7 });

    let result = repo.query(&CrashFilter::default()).unwrap();
    assert!(!result.permission_denied);
    assert_eq!(result.view.flat.len(), 3);
    assert_eq!(result.view.flat[0].timestamp, now - MS_PER_HOUR);

    let ise = result
        .view
        .groups
        .iter()
        .find(|g| g.exception_type == "IllegalStateException")
        .unwrap();
    assert_eq!(ise.count, 2);
    assert_eq!(ise.first_occurrence, now - 6 * MS_PER_HOUR);
    assert_eq!(ise.last_occurrence, now - MS_PER_HOUR);

    assert_eq!(repo.crashed_packages().unwrap(), vec!["com.example.app".to_string()]);
    let stats = repo.crash_stats(24).unwrap();
    assert_eq!(stats.get(&CrashCategory::DataAppCrash), Some(&2));
    assert_eq!(stats.get(&CrashCategory::DataAppAnr), Some(&1));

    if let Some(dir) = path.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn live_strategy_sees_only_the_source() {
    let now = now_ms();
    let source = MemorySource::new()
        .with_entry("data_app_crash", now - MS_PER_HOUR, crash("java.lang.IllegalStateException"));
    let mut repo = CrashRepository::live(CrashReader::new(Box::new(source)));
    let result = repo.query(&CrashFilter::default()).unwrap();
    assert_eq!(result.view.flat.len(), 1);
    assert!(repo.into_database().is_none());
}
