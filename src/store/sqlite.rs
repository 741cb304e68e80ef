use crate::error::{Result, StackLensError};
use crate::types::{CrashCategory, CrashInsight, CrashRecord};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS crash_logs (
        id INTEGER PRIMARY KEY,
        tag TEXT NOT NULL,
        package_name TEXT,
        app_name TEXT,
        timestamp INTEGER NOT NULL,
        content TEXT NOT NULL,
        process_name TEXT,
        pid INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_crash_logs_timestamp ON crash_logs(timestamp);

    CREATE TABLE IF NOT EXISTS crash_insights (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        crash_id INTEGER NOT NULL UNIQUE,
        summary TEXT NOT NULL,
        root_cause TEXT NOT NULL,
        suggested_fix TEXT NOT NULL,
        affected_line TEXT,
        created_at INTEGER NOT NULL
    );
"#;

const SELECT_COLUMNS: &str =
    "id, tag, package_name, app_name, timestamp, content, process_name, pid";

/// SQLite cache of crash records and their insights
pub struct CrashDatabase {
    conn: Connection,
}

impl CrashDatabase {
    /// Open (or create) the cache at `db_path`, creating parent directories
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(|e| StackLensError::Database(e.to_string()))?;

        Self::init(conn)
    }

    /// Open a cache that must already exist
    pub fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(StackLensError::CacheNotFound(
                db_path.display().to_string()
            ));
        }
        Self::open(db_path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        Self::init(conn)
    }

    /// `~/.stacklens/crashes.db`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".stacklens").join("crashes.db"))
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Begin a transaction for batch inserts
    pub fn begin_batch(&mut self) -> Result<BatchInserter<'_>> {
        self.conn
            .execute("BEGIN TRANSACTION", [])
            .map_err(|e| StackLensError::Database(e.to_string()))?;

        Ok(BatchInserter { db: self, committed: false })
    }

    /// Insert or replace a single record
    pub fn insert(&self, record: &CrashRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO crash_logs (id, tag, package_name, app_name, timestamp, content, process_name, pid) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.category.tag(),
                    record.package_name,
                    record.app_name,
                    record.timestamp,
                    record.content,
                    record.process_name,
                    record.pid,
                ],
            )
            .map_err(|e| StackLensError::Database(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace all records in one transaction
    pub fn insert_all(&mut self, records: &[CrashRecord]) -> Result<usize> {
        let batch = self.begin_batch()?;
        for record in records {
            batch.insert(record)?;
        }
        batch.commit()?;
        Ok(records.len())
    }

    /// Records of the given categories at or after `since_ms`, newest first
    pub fn query_by_tags_since(
        &self,
        categories: &[CrashCategory],
        since_ms: i64,
    ) -> Result<Vec<CrashRecord>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=categories.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM crash_logs WHERE tag IN ({}) AND timestamp >= ?{} ORDER BY timestamp DESC",
            SELECT_COLUMNS,
            placeholders,
            categories.len() + 1
        );

        let mut values: Vec<Value> = categories
            .iter()
            .map(|c| Value::Text(c.tag().to_string()))
            .collect();
        values.push(Value::Integer(since_ms));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), record_from_row)
            .map_err(|e| StackLensError::Database(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    /// Delete records older than `cutoff_ms`; returns the number removed
    pub fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        self.conn
            .execute("DELETE FROM crash_logs WHERE timestamp < ?1", params![cutoff_ms])
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    pub fn latest_timestamp(&self) -> Result<Option<i64>> {
        self.conn
            .query_row("SELECT MAX(timestamp) FROM crash_logs", [], |r| r.get(0))
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    /// Get total row count
    pub fn count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM crash_logs", [], |r| r.get(0))
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    pub fn delete_all(&self) -> Result<usize> {
        self.conn
            .execute("DELETE FROM crash_logs", [])
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    /// Store an insight, replacing any previous one for the same crash
    pub fn insert_insight(&self, insight: &CrashInsight) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO crash_insights (crash_id, summary, root_cause, suggested_fix, affected_line, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    insight.crash_id,
                    insight.summary,
                    insight.root_cause,
                    insight.suggested_fix,
                    insight.affected_line,
                    insight.created_at,
                ],
            )
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        Ok(())
    }

    pub fn insight_for_crash(&self, crash_id: i64) -> Result<Option<CrashInsight>> {
        self.conn
            .query_row(
                "SELECT crash_id, summary, root_cause, suggested_fix, affected_line, created_at FROM crash_insights WHERE crash_id = ?1",
                params![crash_id],
                |r| {
                    Ok(CrashInsight {
                        crash_id: r.get(0)?,
                        summary: r.get(1)?,
                        root_cause: r.get(2)?,
                        suggested_fix: r.get(3)?,
                        affected_line: r.get(4)?,
                        created_at: r.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    /// Drop insights whose crash row no longer exists
    pub fn delete_orphaned_insights(&self) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM crash_insights WHERE crash_id NOT IN (SELECT id FROM crash_logs)",
                [],
            )
            .map_err(|e| StackLensError::Database(e.to_string()))
    }

    fn commit(&self) -> Result<()> {
        self.conn
            .execute("COMMIT", [])
            .map_err(|e| StackLensError::Database(e.to_string()))?;
        Ok(())
    }

    /// Get the underlying connection for advanced queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<CrashRecord> {
    let tag: String = r.get(1)?;
    let category = CrashCategory::from_tag(&tag).unwrap_or_else(|| {
        log::debug!("Unknown cached tag {:?}, treating as {}", tag, CrashCategory::DataAppCrash);
        CrashCategory::DataAppCrash
    });
    Ok(CrashRecord {
        id: r.get(0)?,
        category,
        package_name: r.get(2)?,
        app_name: r.get(3)?,
        timestamp: r.get(4)?,
        content: r.get(5)?,
        process_name: r.get(6)?,
        pid: r.get(7)?,
    })
}

/// Batch inserter for efficient bulk inserts
pub struct BatchInserter<'a> {
    db: &'a mut CrashDatabase,
    committed: bool,
}

impl<'a> BatchInserter<'a> {
    /// Insert a record in the current transaction
    pub fn insert(&self, record: &CrashRecord) -> Result<()> {
        self.db.insert(record)
    }

    /// Commit the batch
    pub fn commit(mut self) -> Result<()> {
        self.db.commit()?;
        self.committed = true;
        Ok(())
    }
}

impl<'a> Drop for BatchInserter<'a> {
    fn drop(&mut self) {
        // Rollback only if not committed
        if !self.committed {
            let _ = self.db.conn.execute("ROLLBACK", []);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_db_path() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir()
            .join(format!("stacklens_test_{}", nanos))
            .join("crashes.db")
    }

    fn record(category: CrashCategory, ts: i64, package: &str) -> CrashRecord {
        CrashRecord {
            id: ts,
            category,
            package_name: Some(package.to_string()),
            app_name: Some(package.to_string()),
            timestamp: ts,
            content: format!("Process: {}\njava.lang.IllegalStateException", package),
            process_name: Some(package.to_string()),
            pid: Some(4242),
        }
    }

    #[test]
    fn test_open_creates_parent_dirs_and_persists() {
        let path = temp_db_path();
        {
            let mut db = CrashDatabase::open(&path).unwrap();
            db.insert_all(&[record(CrashCategory::DataAppCrash, 1000, "com.a")]).unwrap();
        }

        let db = CrashDatabase::open_existing(&path).unwrap();
        assert_eq!(db.count().unwrap(), 1);

        // Cleanup
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_open_existing_missing() {
        let path = temp_db_path();
        assert!(matches!(
            CrashDatabase::open_existing(&path),
            Err(StackLensError::CacheNotFound(_))
        ));
    }

    #[test]
    fn test_insert_all_replaces_by_id() {
        let mut db = CrashDatabase::open_in_memory().unwrap();
        db.insert_all(&[
            record(CrashCategory::DataAppCrash, 1000, "com.a"),
            record(CrashCategory::DataAppAnr, 2000, "com.b"),
        ])
        .unwrap();

        let mut updated = record(CrashCategory::DataAppCrash, 1000, "com.a");
        updated.app_name = Some("App A".to_string());
        updated.pid = None;
        db.insert_all(&[updated.clone()]).unwrap();

        assert_eq!(db.count().unwrap(), 2);
        let rows = db.query_by_tags_since(&[CrashCategory::DataAppCrash], 0).unwrap();
        assert_eq!(rows, vec![updated]);
    }

    #[test]
    fn test_query_by_tags_since() {
        let mut db = CrashDatabase::open_in_memory().unwrap();
        db.insert_all(&[
            record(CrashCategory::DataAppCrash, 1000, "com.a"),
            record(CrashCategory::DataAppCrash, 3000, "com.a"),
            record(CrashCategory::DataAppAnr, 2000, "com.b"),
            record(CrashCategory::SystemTombstone, 4000, "com.c"),
        ])
        .unwrap();

        let rows = db
            .query_by_tags_since(&[CrashCategory::DataAppCrash, CrashCategory::DataAppAnr], 1500)
            .unwrap();
        let ts: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![3000, 2000]);

        assert!(db.query_by_tags_since(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_tag_loads_as_app_crash() {
        let db = CrashDatabase::open_in_memory().unwrap();
        db.connection()
            .execute(
                "INSERT INTO crash_logs (id, tag, timestamp, content) VALUES (7, 'netstats_error', 7, 'x')",
                [],
            )
            .unwrap();

        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT {} FROM crash_logs", SELECT_COLUMNS))
            .unwrap();
        let rows: Vec<CrashRecord> = stmt
            .query_map([], record_from_row)
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rows[0].category, CrashCategory::DataAppCrash);
        assert_eq!(rows[0].pid, None);
    }

    #[test]
    fn test_retention_and_latest() {
        let mut db = CrashDatabase::open_in_memory().unwrap();
        assert_eq!(db.latest_timestamp().unwrap(), None);

        db.insert_all(&[
            record(CrashCategory::DataAppCrash, 1000, "com.a"),
            record(CrashCategory::DataAppCrash, 5000, "com.a"),
        ])
        .unwrap();
        assert_eq!(db.latest_timestamp().unwrap(), Some(5000));

        assert_eq!(db.delete_older_than(2000).unwrap(), 1);
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(db.delete_all().unwrap(), 1);
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_dropped_batch_rolls_back() {
        let mut db = CrashDatabase::open_in_memory().unwrap();
        {
            let batch = db.begin_batch().unwrap();
            batch.insert(&record(CrashCategory::DataAppCrash, 1000, "com.a")).unwrap();
        }
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_insight_cache() {
        let mut db = CrashDatabase::open_in_memory().unwrap();
        db.insert_all(&[record(CrashCategory::DataAppCrash, 1000, "com.a")]).unwrap();

        let insight = CrashInsight {
            crash_id: 1000,
            summary: "Null receiver".to_string(),
            root_cause: "View used after destroy".to_string(),
            suggested_fix: "Check lifecycle".to_string(),
            affected_line: Some("MainActivity.kt:42".to_string()),
            created_at: 1,
        };
        db.insert_insight(&insight).unwrap();
        assert_eq!(db.insight_for_crash(1000).unwrap(), Some(insight.clone()));
        assert_eq!(db.insight_for_crash(999).unwrap(), None);

        let newer = CrashInsight { summary: "Updated".to_string(), created_at: 2, ..insight };
        db.insert_insight(&newer).unwrap();
        assert_eq!(db.insight_for_crash(1000).unwrap().unwrap().summary, "Updated");

        assert_eq!(db.delete_orphaned_insights().unwrap(), 0);
        db.delete_all().unwrap();
        assert_eq!(db.delete_orphaned_insights().unwrap(), 1);
        assert_eq!(db.insight_for_crash(1000).unwrap(), None);
    }
}
