//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire configuration, logging, the record store and one record lifecycle.
//! - Keep output line-oriented for quick local sanity checks.
//!
//! Configuration: first argument or `CATALOG_DB_PATH` picks the database file,
//! `CATALOG_LOG_DIR` enables file logging, `CATALOG_LOG_LEVEL` overrides the
//! default level.

use catalog_core::db::open_db;
use catalog_core::{default_log_level, init_logging, ClassName, Record, SqliteStorage};
use log::info;
use std::env;
use std::error::Error;
use std::process::ExitCode;

const DEFAULT_DB_PATH: &str = "catalog.sqlite3";

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("catalog: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = env::var("CATALOG_LOG_DIR") {
        let level =
            env::var("CATALOG_LOG_LEVEL").unwrap_or_else(|_| default_log_level().to_string());
        init_logging(&level, &log_dir)?;
    }

    let db_path = env::args()
        .nth(1)
        .or_else(|| env::var("CATALOG_DB_PATH").ok())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

    let conn = open_db(&db_path)?;
    let storage = SqliteStorage::new(&conn);
    let loaded = storage.load_all()?;

    let mut record = Record::new(ClassName::base_model(), &storage)?;
    record.set_attribute("name", "smoke")?;
    record.save(&storage)?;
    info!(
        "event=cli_smoke module=cli status=ok loaded={loaded} tracked={}",
        storage.len()
    );

    println!("catalog_core version={}", catalog_core::core_version());
    println!("db={db_path} loaded={loaded} tracked={}", storage.len());
    println!("{record}");
    println!("{}", serde_json::to_string(&record.to_dict())?);
    Ok(())
}
