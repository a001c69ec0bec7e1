use idscan_core::{ExtractedRecord, ScanRecord};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::files::SavedScan;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    connect(&format!("sqlite:{}?mode=rwc", path.display())).await
}

/// In-memory index for tests. Every call gets a fresh, private database.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    connect("sqlite::memory:").await
}

async fn connect(url: &str) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            captured_at TEXT NOT NULL,
            student_no TEXT NOT NULL,
            name TEXT NOT NULL,
            course TEXT NOT NULL,
            year TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            data_path TEXT,
            original_path TEXT,
            processed_path TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scans_student_no ON scans(student_no)")
        .execute(pool)
        .await?;

    Ok(())
}

/// A row of the `scans` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredScan {
    pub id: i64,
    /// RFC 3339 local timestamp of the capture.
    pub captured_at: String,
    pub record: ExtractedRecord,
    pub raw_text: String,
    pub data_path: Option<String>,
}

pub async fn insert_scan(pool: &DbPool, scan: &ScanRecord, saved: Option<&SavedScan>) -> Result<i64, sqlx::Error> {
    let path_str = |p: &Path| p.display().to_string();
    let result = sqlx::query(
        "INSERT INTO scans (captured_at, student_no, name, course, year, raw_text, data_path, original_path, processed_path)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(scan.captured_at.to_rfc3339())
    .bind(&scan.record.student_no)
    .bind(&scan.record.name)
    .bind(&scan.record.course)
    .bind(&scan.record.year)
    .bind(&scan.raw_text)
    .bind(saved.map(|s| path_str(&s.data_path)))
    .bind(saved.and_then(|s| s.original_path.as_deref()).map(path_str))
    .bind(saved.and_then(|s| s.processed_path.as_deref()).map(path_str))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

type ScanRow = (i64, String, String, String, String, String, String, Option<String>);

fn row_to_scan(r: ScanRow) -> StoredScan {
    StoredScan {
        id: r.0,
        captured_at: r.1,
        record: ExtractedRecord { student_no: r.2, name: r.3, course: r.4, year: r.5 },
        raw_text: r.6,
        data_path: r.7,
    }
}

/// Most recent scans first.
pub async fn get_recent_scans(pool: &DbPool, limit: u32) -> Result<Vec<StoredScan>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ScanRow>(
        "SELECT id, captured_at, student_no, name, course, year, raw_text, data_path FROM scans ORDER BY id DESC LIMIT ?",
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_scan).collect())
}

pub async fn get_scans_by_student_no(pool: &DbPool, student_no: &str) -> Result<Vec<StoredScan>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ScanRow>(
        "SELECT id, captured_at, student_no, name, course, year, raw_text, data_path FROM scans WHERE student_no = ? ORDER BY id DESC",
    )
    .bind(student_no)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_scan).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::path::PathBuf;

    fn scan(student_no: &str, name: &str) -> ScanRecord {
        let record = ExtractedRecord {
            student_no: student_no.into(),
            name: name.into(),
            course: "BSIT".into(),
            year: String::new(),
        };
        let at = Local.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        ScanRecord::new(record, "raw", at)
    }

    #[tokio::test]
    async fn insert_and_list_newest_first() {
        let pool = create_memory_db().await.unwrap();
        let first = insert_scan(&pool, &scan("1111-11", "Ana Reyes"), None).await.unwrap();
        let second = insert_scan(&pool, &scan("2222-22", "Pedro Cruz"), None).await.unwrap();
        assert!(second > first);

        let rows = get_recent_scans(&pool, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record.student_no, "2222-22");
        assert_eq!(rows[1].record.name, "Ana Reyes");
        assert_eq!(rows[1].record.year, "");
        assert_eq!(rows[1].raw_text, "raw");

        assert_eq!(get_recent_scans(&pool, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn saved_paths_are_indexed() {
        let pool = create_memory_db().await.unwrap();
        let saved = SavedScan {
            data_path: PathBuf::from("out/id_scan_20260301_093000_data.txt"),
            original_path: None,
            processed_path: None,
        };
        insert_scan(&pool, &scan("1234-56", "Juan"), Some(&saved)).await.unwrap();

        let rows = get_scans_by_student_no(&pool, "1234-56").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data_path.as_deref(), Some("out/id_scan_20260301_093000_data.txt"));
        assert!(get_scans_by_student_no(&pool, "0000-00").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn database_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.db");
        let pool = create_db(&path).await.unwrap();
        insert_scan(&pool, &scan("1234-56", "Juan"), None).await.unwrap();
        assert!(path.exists());
    }
}
