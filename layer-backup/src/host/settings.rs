//! Settings stores for the persisted backup preferences.

use super::{Preferences, SettingsStore, DEFAULT_INTERVAL_MINUTES};
use crate::utils::errors::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

const KEY_DIRECTORY: &str = "backup_directory";
const KEY_INTERVAL: &str = "interval_minutes";

/// Key/value settings table in a SQLite database.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;
             CREATE TABLE IF NOT EXISTS settings (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM settings WHERE key = ?", params![key], |row| row.get(0))
            .optional()?)
    }

    fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self) -> Result<Preferences> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let backup_directory = Self::get(&conn, KEY_DIRECTORY)?.unwrap_or_default();
        let interval_minutes = match Self::get(&conn, KEY_INTERVAL)? {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Ignoring unparsable saved interval");
                DEFAULT_INTERVAL_MINUTES
            }),
            None => DEFAULT_INTERVAL_MINUTES,
        };

        Ok(Preferences {
            backup_directory,
            interval_minutes,
        })
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction()?;
        Self::set(&tx, KEY_DIRECTORY, &preferences.backup_directory)?;
        Self::set(&tx, KEY_INTERVAL, &preferences.interval_minutes.to_string())?;
        tx.commit()?;
        Ok(())
    }
}

/// Preferences held in memory only; they last as long as the process.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    preferences: Mutex<Preferences>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preferences(preferences: Preferences) -> Self {
        Self {
            preferences: Mutex::new(preferences),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Preferences> {
        Ok(self.preferences.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        *self.preferences.lock().unwrap_or_else(|e| e.into_inner()) = preferences.clone();
        Ok(())
    }
}
