//! SQLite persistence layer for the key/value store
//!
//! Values are stored as JSON text under string keys such as `files.shares`.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Database error types
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),
}

/// Database handle for key/value persistence
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the specified path
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DatabaseError::CreateDir)?;
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Get the raw value stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM store WHERE key = ?1")?;

        let result: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;

        Ok(result)
    }

    /// Insert or replace the raw value stored under `key`
    pub fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO store (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete the value stored under `key`
    pub fn delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        assert!(db.get("files.shares").unwrap().is_none());
    }

    #[test]
    fn test_key_value_operations() {
        let db = Database::open_in_memory().unwrap();

        assert!(db.get("test_key").unwrap().is_none());

        db.set("test_key", "[1,2]").unwrap();
        assert_eq!(db.get("test_key").unwrap(), Some("[1,2]".to_string()));

        // Replace, not append
        db.set("test_key", "[]").unwrap();
        assert_eq!(db.get("test_key").unwrap(), Some("[]".to_string()));

        db.delete("test_key").unwrap();
        assert!(db.get("test_key").unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.delete("nope").is_ok());
    }

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("dir").join("store.db");

        assert!(!db_path.parent().unwrap().exists());

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.parent().unwrap().exists());

        db.set("test", "\"value\"").unwrap();
        assert_eq!(db.get("test").unwrap(), Some("\"value\"".to_string()));
    }

    #[test]
    fn test_values_persist_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("store.db");

        {
            let db = Database::open(&db_path).unwrap();
            db.set("files.shares", "[]").unwrap();
        }

        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.get("files.shares").unwrap(), Some("[]".to_string()));
    }
}
