//! Local key-value storage using SQLite

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

use crate::error::Result;
use crate::models::{ChatMode, Gender, MatchingPreferences};

const KEY_GENDER: &str = "matching.preferred_gender";
const KEY_COUNTRY: &str = "matching.preferred_country";
const KEY_CHAT_MODE: &str = "matching.chat_mode";

pub struct PreferenceStore {
    conn: Mutex<Connection>,
}

impl PreferenceStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("lingomatch.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Option<String> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .ok()
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ========================================================================
    // Matching preferences
    // ========================================================================

    /// Stored preferences. Missing or unreadable values fall back to the
    /// defaults (any gender, any country, text chat).
    pub fn load_preferences(&self) -> MatchingPreferences {
        let defaults = MatchingPreferences::default();

        MatchingPreferences {
            preferred_gender: self
                .get_setting(KEY_GENDER)
                .and_then(|v| v.parse::<Gender>().ok())
                .unwrap_or(defaults.preferred_gender),
            preferred_country: self.get_setting(KEY_COUNTRY).unwrap_or(defaults.preferred_country),
            chat_mode: self
                .get_setting(KEY_CHAT_MODE)
                .and_then(|v| v.parse::<ChatMode>().ok())
                .unwrap_or(defaults.chat_mode),
        }
    }

    pub fn save_preferences(&self, preferences: &MatchingPreferences) -> Result<()> {
        self.save_setting(KEY_GENDER, preferences.preferred_gender.as_str())?;
        self.save_setting(KEY_COUNTRY, &preferences.preferred_country)?;
        self.save_setting(KEY_CHAT_MODE, preferences.chat_mode.as_str())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let store = PreferenceStore::in_memory().unwrap();
        assert_eq!(store.load_preferences(), MatchingPreferences::default());
    }

    #[test]
    fn test_preferences_persist() {
        let store = PreferenceStore::in_memory().unwrap();
        let prefs = MatchingPreferences::new(Gender::Other, "jp", ChatMode::Video);
        store.save_preferences(&prefs).unwrap();

        let loaded = store.load_preferences();
        assert_eq!(loaded.preferred_gender, Gender::Other);
        assert_eq!(loaded.preferred_country, "JP");
        assert_eq!(loaded.chat_mode, ChatMode::Video);
    }

    #[test]
    fn test_corrupt_value_falls_back() {
        let store = PreferenceStore::in_memory().unwrap();
        store.save_setting(KEY_CHAT_MODE, "hologram").unwrap();
        assert_eq!(store.load_preferences().chat_mode, ChatMode::Text);

        store.delete_setting(KEY_CHAT_MODE).unwrap();
        assert!(store.get_setting(KEY_CHAT_MODE).is_none());
    }
}
