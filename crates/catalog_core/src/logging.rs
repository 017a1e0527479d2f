//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start one rotating file logger per process behind the `log` facade.
//! - Capture panics into the log before the default hook runs.
//!
//! # Invariants
//! - A second init with the same level and directory is a no-op.
//! - A second init with a different level or directory is refused.
//! - Initialization reports failures as `Err`, never by panicking.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_BASENAME: &str = "catalog";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;
const PANIC_MESSAGE_LIMIT: usize = 160;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Normalized logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    dir: PathBuf,
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Starts file logging at `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - Unknown level, empty or relative directory.
/// - Directory creation or logger start-up failure.
/// - Logging already active with different settings.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let wanted = LogSettings {
        level: parse_level(level)?,
        dir: parse_dir(log_dir)?,
    };

    let active = ACTIVE.get_or_try_init(|| start(&wanted))?;
    ensure_same(&active.settings, &wanted)
}

/// `(level, directory)` of the active logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.settings.level, active.settings.dir.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(settings: &LogSettings) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&settings.dir).map_err(|err| {
        format!(
            "cannot create log directory `{}`: {err}",
            settings.dir.display()
        )
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| format!("cannot use log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.dir.as_path())
                .basename(LOG_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("logger start-up failed: {err}"))?;

    install_panic_hook();
    info!(
        "event=logging_init module=core status=ok level={} log_dir={} version={}",
        settings.level,
        settings.dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLogger {
        settings: settings.clone(),
        _handle: handle,
    })
}

fn ensure_same(active: &LogSettings, wanted: &LogSettings) -> Result<(), String> {
    if active.dir != wanted.dir {
        return Err(format!(
            "logging is already writing to `{}`; refusing to switch to `{}`",
            active.dir.display(),
            wanted.dir.display()
        ));
    }
    if active.level != wanted.level {
        return Err(format!(
            "logging is already at level `{}`; refusing to switch to `{}`",
            active.level, wanted.level
        ));
    }
    Ok(())
}

fn parse_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unknown log level `{other}`; use trace|debug|info|warn|error"
        )),
    }
}

fn parse_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log directory must not be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log directory must be absolute, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic module=core status=error location={location} payload={}",
            single_line(&payload, PANIC_MESSAGE_LIMIT)
        );
        previous(info);
    }));
}

/// Flattens line breaks and caps length so one panic stays one log line.
fn single_line(text: &str, limit: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    let mut out: String = flat.chars().take(limit).collect();
    if flat.chars().count() > limit {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, parse_dir, parse_level, single_line};

    #[test]
    fn parse_level_normalizes_case_and_aliases() {
        assert_eq!(parse_level(" DEBUG ").unwrap(), "debug");
        assert_eq!(parse_level("warning").unwrap(), "warn");
        assert!(parse_level("loud").unwrap_err().contains("unknown log level"));
    }

    #[test]
    fn parse_dir_requires_absolute_path() {
        assert!(parse_dir("  ").unwrap_err().contains("empty"));
        assert!(parse_dir("logs/dev").unwrap_err().contains("absolute"));
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        let out = single_line("a\nb\rcdefgh", 4);
        assert_eq!(out, "a b ...");
    }

    #[test]
    fn init_logging_is_idempotent_and_refuses_changes() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_dir = first.path().to_str().unwrap().to_string();
        let second_dir = second.path().to_str().unwrap().to_string();

        init_logging("info", &first_dir).unwrap();
        init_logging("INFO", &first_dir).unwrap();

        let err = init_logging("debug", &first_dir).unwrap_err();
        assert!(err.contains("refusing to switch"));
        let err = init_logging("info", &second_dir).unwrap_err();
        assert!(err.contains("refusing to switch"));

        let (level, dir) = logging_status().unwrap();
        assert_eq!(level, "info");
        assert_eq!(dir, first.path());
    }
}
