//! Per-(peer, action) sync watermark persistence
//!
//! A watermark records the logical timestamp of the most recent document
//! known to have been fully applied from a peer for one sync action.
//! Watermarks only ever move forward.

use pod_common::{PodError, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Persisted sync cursor, keyed by (peer id, action id).
pub trait WatermarkStore: Send + Sync {
    fn get(&self, peer_id: &str, action_id: &str) -> Result<Option<i64>>;

    /// Advance the watermark. Values at or below the stored one are ignored.
    fn advance(&self, peer_id: &str, action_id: &str, time: i64) -> Result<()>;

    /// Drop all watermarks (full resync at startup).
    fn clear(&self) -> Result<()>;
}

/// SQLite-backed watermark store.
pub struct SqliteWatermarkStore {
    conn: Mutex<Connection>,
}

impl SqliteWatermarkStore {
    /// Open or create the watermark database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| PodError::Store(format!("failed to open {:?}: {}", path, e)))?;

        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| PodError::Store(format!("failed to apply schema: {}", e)))?;

        tracing::info!("watermark database opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn get(&self, peer_id: &str, action_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let mut stmt = conn
            .prepare("SELECT time FROM watermarks WHERE peer_id = ?1 AND action_id = ?2")
            .map_err(store_err)?;

        let mut rows = stmt.query([peer_id, action_id]).map_err(store_err)?;
        match rows.next().map_err(store_err)? {
            Some(row) => Ok(Some(row.get::<_, i64>(0).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    fn advance(&self, peer_id: &str, action_id: &str, time: i64) -> Result<()> {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT INTO watermarks (peer_id, action_id, time, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(peer_id, action_id) DO UPDATE SET
                time = MAX(watermarks.time, excluded.time),
                updated_at = excluded.updated_at",
            params![peer_id, action_id, time, updated_at],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute("DELETE FROM watermarks", []).map_err(store_err)?;
        Ok(())
    }
}

/// In-memory watermark store for tests and ephemeral pods.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    marks: RwLock<HashMap<(String, String), i64>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn get(&self, peer_id: &str, action_id: &str) -> Result<Option<i64>> {
        let marks = self.marks.read().map_err(poisoned)?;
        Ok(marks
            .get(&(peer_id.to_string(), action_id.to_string()))
            .copied())
    }

    fn advance(&self, peer_id: &str, action_id: &str, time: i64) -> Result<()> {
        let mut marks = self.marks.write().map_err(poisoned)?;
        let entry = marks
            .entry((peer_id.to_string(), action_id.to_string()))
            .or_insert(time);
        if time > *entry {
            *entry = time;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.marks.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

fn store_err(e: rusqlite::Error) -> PodError {
    PodError::Store(e.to_string())
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> PodError {
    PodError::Store("watermark lock poisoned".to_string())
}
