use crate::StateResult;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tempx_core::{Watermark, WatermarkStore};

/// Watermarks in a single SQLite table, one row per key
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StateResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS watermarks (
                key TEXT PRIMARY KEY,
                low INTEGER,
                high INTEGER
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WatermarkStore for SqliteStateStore {
    fn get(&self, key: &str) -> anyhow::Result<Watermark> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row = conn
            .query_row(
                "SELECT low, high FROM watermarks WHERE key = ?1",
                params![key],
                |r| Ok(Watermark::new(r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row.unwrap_or_default())
    }

    fn set(&self, key: &str, watermark: Watermark) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO watermarks (key, low, high) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET low = excluded.low, high = excluded.high",
            params![key, watermark.low, watermark.high],
        )?;
        Ok(())
    }
}
