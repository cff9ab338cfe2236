//! Durable store for write payloads awaiting replay.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// Schema for the pending-record queue.
// AUTOINCREMENT keeps ids monotonic: a record id is never reused after clear().
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload BLOB NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// A durably queued, not-yet-delivered write payload.
#[derive(Debug, Clone)]
pub struct PendingRecord {
  pub id: i64,
  pub payload: Value,
  pub queued_at: DateTime<Utc>,
}

/// Trait for the durable record store backing deferred sync.
pub trait RecordStore: Send + Sync {
  /// Durably commit a new record; returns the auto-assigned id.
  fn append(&self, payload: &Value) -> Result<i64>;

  /// All currently stored records, in no guaranteed order.
  fn list_all(&self) -> Result<Vec<PendingRecord>>;

  /// Remove every record. Called only after a fully successful sync pass.
  fn clear(&self) -> Result<()>;

  fn len(&self) -> Result<usize>;

  fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}

/// SQLite-backed record store.
pub struct SqliteQueue {
  conn: Mutex<Connection>,
}

impl SqliteQueue {
  /// Open (creating table if absent) the queue at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create storage directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    let queue = Self {
      conn: Mutex::new(conn),
    };
    queue.run_migrations()?;

    Ok(queue)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }
}

impl RecordStore for SqliteQueue {
  fn append(&self, payload: &Value) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_records (payload, queued_at) VALUES (?, datetime('now'))",
        params![data],
      )
      .map_err(|e| eyre!("Failed to queue record: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn list_all(&self) -> Result<Vec<PendingRecord>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM pending_records")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(i64, Vec<u8>, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to list records: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut records = Vec::with_capacity(rows.len());
    for (id, data, queued_at_str) in rows {
      let payload: Value = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Corrupt payload for record {}: {}", id, e))?;
      let queued_at = parse_datetime(&queued_at_str)?;

      records.push(PendingRecord {
        id,
        payload,
        queued_at,
      });
    }

    Ok(records)
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM pending_records", [])
      .map_err(|e| eyre!("Failed to clear records: {}", e))?;

    Ok(())
  }

  fn len(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM pending_records", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count records: {}", e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn open_queue() -> (tempfile::TempDir, SqliteQueue) {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqliteQueue::open(&dir.path().join("queue.db")).unwrap();
    (dir, queue)
  }

  #[test]
  fn test_append_and_list_roundtrip() {
    let (_dir, queue) = open_queue();

    let id = queue.append(&json!({"name": "x"})).unwrap();

    let records = queue.list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].payload, json!({"name": "x"}));
    assert!(records[0].queued_at <= Utc::now());
  }

  #[test]
  fn test_ids_are_monotonic() {
    let (_dir, queue) = open_queue();

    let first = queue.append(&json!({"n": 1})).unwrap();
    let second = queue.append(&json!({"n": 2})).unwrap();

    assert!(second > first);
  }

  #[test]
  fn test_ids_never_reused_after_clear() {
    let (_dir, queue) = open_queue();

    let before = queue.append(&json!({"n": 1})).unwrap();
    queue.clear().unwrap();
    let after = queue.append(&json!({"n": 2})).unwrap();

    assert!(after > before);
  }

  #[test]
  fn test_clear_removes_everything() {
    let (_dir, queue) = open_queue();

    queue.append(&json!({"n": 1})).unwrap();
    queue.append(&json!({"n": 2})).unwrap();
    assert_eq!(queue.len().unwrap(), 2);

    queue.clear().unwrap();

    assert!(queue.is_empty().unwrap());
    assert!(queue.list_all().unwrap().is_empty());
  }

  #[test]
  fn test_open_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let queue = SqliteQueue::open(&path).unwrap();
    queue.append(&json!({"n": 1})).unwrap();
    drop(queue);

    // Reopening must keep existing records and accept new ones
    let queue = SqliteQueue::open(&path).unwrap();
    assert_eq!(queue.len().unwrap(), 1);
    queue.append(&json!({"n": 2})).unwrap();
    assert_eq!(queue.len().unwrap(), 2);
  }
}
