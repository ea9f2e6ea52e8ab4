use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "multiquery.log";

static TELEMETRY_ENABLED: Lazy<std::sync::RwLock<bool>> =
    Lazy::new(|| std::sync::RwLock::new(false));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }
}

/**
 * \brief Turn the file event log on or off for the whole process.
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY_ENABLED.write() {
        *guard = enabled;
    }
}

pub fn is_enabled() -> bool {
    TELEMETRY_ENABLED.read().map(|g| *g).unwrap_or(false)
}

/**
 * \brief Record a routine event. Callers must never pass the API key.
 */
pub fn log_event(category: &str, message: &str) {
    record(Level::Info, category, message);
}

/**
 * \brief Record a failure.
 */
pub fn log_error(category: &str, message: &str) {
    record(Level::Error, category, message);
}

fn record(level: Level, category: &str, message: &str) {
    if !is_enabled() {
        return;
    }
    if let Err(err) = append_line(Path::new(LOG_DIR), level, category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

fn append_line(dir: &Path, level: Level, category: &str, message: &str) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    let path = dir.join(LOG_FILE);
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", format_line(&timestamp, level, category, message))?;
    Ok(path)
}

fn format_line(timestamp: &str, level: Level, category: &str, message: &str) -> String {
    // one event per line
    let message = message.replace(['\r', '\n'], " ");
    format!("{} [{}] {} - {}", timestamp, level.as_str(), category, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_flattens_newlines() {
        let line = format_line(
            "2024-01-01T00:00:00Z",
            Level::Error,
            "dispatch.attempt",
            "boom\nsecond line",
        );
        assert_eq!(
            line,
            "2024-01-01T00:00:00Z [ERROR] dispatch.attempt - boom second line"
        );
    }

    #[test]
    fn test_append_line_writes_into_dir() {
        let dir = std::env::temp_dir().join(format!("multiquery-telemetry-{}", std::process::id()));
        let path = append_line(&dir, Level::Info, "gate", "validated").expect("append");
        let content = std::fs::read_to_string(&path).expect("read log");
        assert!(content.contains("[INFO] gate - validated"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
