//! SQLite-backed key/value store for the schedule record.
//! Same contract as the JSON file store; useful when the app already keeps a
//! local database.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use dailyread_core::error::{DailyReadError, Result};
use rusqlite::OptionalExtension;

use crate::store::{SCHEDULE_KEY, ScheduleDescriptor, ScheduleStore};

pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path)
            .map_err(|e| DailyReadError::Storage(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| DailyReadError::Storage(format!("DB open: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| DailyReadError::Storage(format!("Migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| DailyReadError::Storage("connection poisoned".into()))
    }
}

impl ScheduleStore for SqliteStore {
    fn load(&self) -> Result<Option<ScheduleDescriptor>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                rusqlite::params![SCHEDULE_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DailyReadError::Storage(format!("Load schedule: {e}")))?;
        match raw {
            Some(raw) => ScheduleDescriptor::decode(&raw),
            None => Ok(None),
        }
    }

    fn save(&self, descriptor: &ScheduleDescriptor) -> Result<()> {
        let encoded = descriptor.encode()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![SCHEDULE_KEY, encoded, Utc::now().to_rfc3339()],
        )
        .map_err(|e| DailyReadError::Storage(format!("Save schedule: {e}")))?;
        tracing::debug!("💾 Saved schedule record to SQLite");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM kv_store WHERE key = ?1",
            rusqlite::params![SCHEDULE_KEY],
        )
        .map_err(|e| DailyReadError::Storage(format!("Clear schedule: {e}")))?;
        Ok(())
    }
}
