//! Core record model and persistence for the object catalog.
//! Concrete catalog types are stored as `Record`s tagged with their class name.

pub mod db;
pub mod logging;
pub mod model;
pub mod storage;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{ClassName, Record, RecordError, RecordId, CLASS_KEY};
pub use model::timestamp::{format_timestamp, parse_timestamp, TimestampError};
pub use storage::sqlite_storage::SqliteStorage;
pub use storage::{Storage, StorageError, StorageResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
