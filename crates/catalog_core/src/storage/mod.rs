//! Storage collaborator contract and implementations.
//!
//! # Responsibility
//! - Define what a `Record` needs from the layer that tracks and persists it.
//! - Keep SQL details behind `SqliteStorage`.
//!
//! # Invariants
//! - `register` is only called for freshly created records.
//! - `persist_all` flushes the whole tracked collection, not a single record.

use crate::db::DbError;
use crate::model::record::{Record, RecordError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite_storage;

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by storage implementations.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    /// A stored body could not be turned back into a record.
    Record(RecordError),
    Encode(serde_json::Error),
    /// `register` saw a key that is already tracked.
    Duplicate(String),
    NotFound(String),
    InvalidData(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Record(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "record body encoding failed: {err}"),
            Self::Duplicate(key) => write!(f, "record already tracked: {key}"),
            Self::NotFound(key) => write!(f, "record not found: {key}"),
            Self::InvalidData(message) => write!(f, "invalid stored record data: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Record(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Duplicate(_) | Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RecordError> for StorageError {
    fn from(value: RecordError) -> Self {
        Self::Record(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

/// What records consume from their storage layer.
pub trait Storage {
    /// Starts tracking a freshly created record.
    fn register(&self, record: &Record) -> StorageResult<()>;
    /// Replaces the tracked snapshot of `record` with its current state.
    fn refresh(&self, record: &Record) -> StorageResult<()>;
    /// Flushes every tracked record to durable form.
    fn persist_all(&self) -> StorageResult<()>;
}
