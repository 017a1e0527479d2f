//! SQLite-backed record storage.
//!
//! # Responsibility
//! - Track live records in memory between saves.
//! - Flush the tracked set to the `records` table and load it back.
//!
//! # Invariants
//! - Tracked records are keyed by `Record::storage_key()`.
//! - `persist_all` writes the whole tracked set in one transaction.
//! - Loading rebuilds records from their stored body and rejects rows whose
//!   `class`/`id` columns disagree with that body.

use crate::model::record::{ClassName, Record};
use crate::model::timestamp::format_timestamp;
use crate::storage::{Storage, StorageError, StorageResult};
use log::{error, info};
use rusqlite::{params, Connection};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Instant;

const UPSERT_SQL: &str = "INSERT INTO records (class, id, created_at, updated_at, body)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (class, id) DO UPDATE SET
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        body = excluded.body;";

/// Record storage over a borrowed SQLite connection.
pub struct SqliteStorage<'conn> {
    conn: &'conn Connection,
    tracked: RefCell<BTreeMap<String, Record>>,
}

impl<'conn> SqliteStorage<'conn> {
    /// Wraps a connection from `db::open_db*`; tracks nothing until
    /// `load_all` or `register` is called.
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            tracked: RefCell::new(BTreeMap::new()),
        }
    }

    /// Loads every stored record into the tracked set and returns how many
    /// rows were read. Loaded records replace tracked ones with the same key.
    pub fn load_all(&self) -> StorageResult<usize> {
        let started_at = Instant::now();
        let loaded = self.read_rows().inspect_err(|err| {
            error!("event=records_load module=storage status=error error={err}");
        })?;

        let count = loaded.len();
        let mut tracked = self.tracked.borrow_mut();
        for record in loaded {
            tracked.insert(record.storage_key(), record);
        }

        info!(
            "event=records_load module=storage status=ok count={count} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(count)
    }

    /// Returns a snapshot of one tracked record.
    pub fn get(&self, class: &ClassName, id: &str) -> Option<Record> {
        self.tracked.borrow().get(&key_of(class, id)).cloned()
    }

    /// Returns snapshots of all tracked records ordered by storage key.
    pub fn all(&self) -> Vec<Record> {
        self.tracked.borrow().values().cloned().collect()
    }

    /// Returns snapshots of the tracked records of one class.
    pub fn all_of(&self, class: &ClassName) -> Vec<Record> {
        self.tracked
            .borrow()
            .values()
            .filter(|record| record.class() == class)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracked.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.borrow().is_empty()
    }

    /// Stops tracking a record and deletes its stored row.
    ///
    /// Returns `NotFound` when the record is neither tracked nor stored.
    pub fn remove(&self, class: &ClassName, id: &str) -> StorageResult<()> {
        let key = key_of(class, id);
        let deleted = self.conn.execute(
            "DELETE FROM records WHERE class = ?1 AND id = ?2;",
            params![class.as_str(), id],
        )?;
        // Tracking only changes once the row is gone.
        let was_tracked = self.tracked.borrow_mut().remove(&key).is_some();

        if !was_tracked && deleted == 0 {
            return Err(StorageError::NotFound(key));
        }

        info!("event=record_remove module=storage status=ok class={class}");
        Ok(())
    }

    fn read_rows(&self) -> StorageResult<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare("SELECT class, id, body FROM records ORDER BY class, id;")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();

        while let Some(row) = rows.next()? {
            let class: String = row.get("class")?;
            let id: String = row.get("id")?;
            let body: String = row.get("body")?;

            let record: Record = serde_json::from_str(&body).map_err(|err| {
                StorageError::InvalidData(format!("row `{class}.{id}` has unreadable body: {err}"))
            })?;
            if record.class().as_str() != class || record.id().as_str() != id {
                return Err(StorageError::InvalidData(format!(
                    "row `{class}.{id}` holds body for `{}`",
                    record.storage_key()
                )));
            }
            records.push(record);
        }

        Ok(records)
    }

    fn write_all(&self) -> StorageResult<usize> {
        let tracked = self.tracked.borrow();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for record in tracked.values() {
                let body = serde_json::to_string(record)?;
                stmt.execute(params![
                    record.class().as_str(),
                    record.id().as_str(),
                    format_timestamp(&record.created_at()),
                    format_timestamp(&record.updated_at()),
                    body,
                ])?;
            }
        }
        tx.commit()?;
        Ok(tracked.len())
    }
}

impl Storage for SqliteStorage<'_> {
    fn register(&self, record: &Record) -> StorageResult<()> {
        let key = record.storage_key();
        let mut tracked = self.tracked.borrow_mut();
        if tracked.contains_key(&key) {
            return Err(StorageError::Duplicate(key));
        }
        tracked.insert(key, record.clone());
        Ok(())
    }

    fn refresh(&self, record: &Record) -> StorageResult<()> {
        self.tracked
            .borrow_mut()
            .insert(record.storage_key(), record.clone());
        Ok(())
    }

    fn persist_all(&self) -> StorageResult<()> {
        let started_at = Instant::now();
        match self.write_all() {
            Ok(count) => {
                info!(
                    "event=records_persist module=storage status=ok count={count} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=records_persist module=storage status=error duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }
}

fn key_of(class: &ClassName, id: &str) -> String {
    format!("{class}.{id}")
}
