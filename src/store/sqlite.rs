use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};

use crate::app::{GemtrailError, Result};
use crate::domain::Visit;
use crate::store::HistoryRecorder;

/// SQLite-backed visit history.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| GemtrailError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            GemtrailError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    /// Most recent visits first.
    pub fn recent_visits(&self, limit: usize) -> Result<Vec<Visit>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, uri, title, visited_at FROM visits
             ORDER BY visited_at DESC, id DESC LIMIT ?1",
        )?;

        let visits = stmt
            .query_map(params![limit as i64], |row| {
                Ok(Visit {
                    id: row.get(0)?,
                    uri: row.get(1)?,
                    title: row.get(2)?,
                    visited_at: row
                        .get::<_, String>(3)
                        .ok()
                        .and_then(|s| Self::parse_datetime(&s))
                        .unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(visits)
    }

    pub fn clear_history(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM visits", [])?)
    }
}

impl HistoryRecorder for SqliteStore {
    fn record(&self, uri: &str, title: Option<&str>, visited_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO visits (uri, title, visited_at) VALUES (?1, ?2, ?3)",
            params![uri, title, visited_at.to_rfc3339()],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_record_and_list() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .record("gemini://example.org/", Some("Example"), Utc::now())
            .unwrap();

        let visits = store.recent_visits(10).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].uri, "gemini://example.org/");
        assert_eq!(visits[0].display_title(), "Example");
    }

    #[test]
    fn test_untitled_visit_displays_uri() {
        let store = SqliteStore::in_memory().unwrap();
        store.record("gemini://example.org/raw", None, Utc::now()).unwrap();

        let visits = store.recent_visits(10).unwrap();
        assert_eq!(visits[0].display_title(), "gemini://example.org/raw");
    }

    #[test]
    fn test_recent_visits_newest_first_and_limited() {
        let store = SqliteStore::in_memory().unwrap();
        let start = Utc::now();
        for i in 0..5 {
            store
                .record(
                    &format!("gemini://example.org/{}", i),
                    None,
                    start + Duration::seconds(i),
                )
                .unwrap();
        }

        let visits = store.recent_visits(3).unwrap();
        let uris: Vec<_> = visits.iter().map(|v| v.uri.as_str()).collect();
        assert_eq!(
            uris,
            vec![
                "gemini://example.org/4",
                "gemini://example.org/3",
                "gemini://example.org/2"
            ]
        );
    }

    #[test]
    fn test_clear_history() {
        let store = SqliteStore::in_memory().unwrap();
        store.record("gemini://a/", None, Utc::now()).unwrap();
        store.record("gemini://b/", None, Utc::now()).unwrap();

        assert_eq!(store.clear_history().unwrap(), 2);
        assert!(store.recent_visits(10).unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.record("gemini://a/", Some("A"), Utc::now()).unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        assert_eq!(reopened.recent_visits(10).unwrap().len(), 1);
    }
}
