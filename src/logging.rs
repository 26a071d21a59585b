//! Structured logging module for Mindful Youth
//!
//! Every line goes to `tracing` and to a daily file under the configured log dir.
//! Categories:
//! - CRISIS: Detection hits and escalation outcomes
//! - CHAT: Conversational turns
//! - JOURNAL: Entry lifecycle and analysis
//! - STORAGE: Key/value store reads and writes
//! - ORACLE: Model calls
//! - ERROR: Errors
//!
//! Never pass user-authored text in here. Lengths and outcomes only.

use chrono::{Local, Utc};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Log categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Crisis,
    Chat,
    Journal,
    Storage,
    Oracle,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Crisis => "CRISIS",
            LogCategory::Chat => "CHAT",
            LogCategory::Journal => "JOURNAL",
            LogCategory::Storage => "STORAGE",
            LogCategory::Oracle => "ORACLE",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Directory the daily files go to, set once by `init_logging`
static LOG_DIR: OnceCell<PathBuf> = OnceCell::new();

fn log_file_path(log_dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("mindful-{}.log", today))
}

/// Initialize the logging system - creates the log directory and installs the subscriber
pub fn init_logging(log_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    let _ = LOG_DIR.set(log_dir.to_path_buf());

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();

    log(LogCategory::Storage, None, "Mindful logging initialized");

    Ok(())
}

/// Format one log line. Session ids are shortened to 8 chars.
pub fn format_line(category: LogCategory, session_id: Option<&str>, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let session_context = session_id
        .map(|id| format!("session={} | ", id.get(..8).unwrap_or(id)))
        .unwrap_or_default();

    format!(
        "[{}] [{}] {}{}",
        timestamp,
        category.as_str(),
        session_context,
        message
    )
}

/// Log a message with category and optional chat session context
pub fn log(category: LogCategory, session_id: Option<&str>, message: &str) {
    let line = format_line(category, session_id, message);

    match category {
        LogCategory::Error => tracing::error!(category = category.as_str(), "{}", line),
        LogCategory::Crisis => tracing::warn!(category = category.as_str(), "{}", line),
        _ => tracing::info!(category = category.as_str(), "{}", line),
    }

    if let Some(dir) = LOG_DIR.get() {
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path(dir))
        {
            let _ = writeln!(file, "{}", line);
        }
    }
}

pub fn log_crisis(session_id: Option<&str>, message: &str) {
    log(LogCategory::Crisis, session_id, message);
}

pub fn log_chat(session_id: Option<&str>, message: &str) {
    log(LogCategory::Chat, session_id, message);
}

pub fn log_journal(session_id: Option<&str>, message: &str) {
    log(LogCategory::Journal, session_id, message);
}

pub fn log_storage(message: &str) {
    log(LogCategory::Storage, None, message);
}

pub fn log_oracle(message: &str) {
    log(LogCategory::Oracle, None, message);
}

pub fn log_error(session_id: Option<&str>, message: &str) {
    log(LogCategory::Error, session_id, message);
}

/// Clean up old log files, keeping the last `retention_days`
pub fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> Result<usize, Box<dyn std::error::Error>> {
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().map(|ext| ext == "log").unwrap_or(false);
        if !is_log {
            continue;
        }

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                    deleted += 1;
                }
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_shortens_session() {
        let line = format_line(LogCategory::Crisis, Some("0123456789abcdef"), "escalation succeeded");
        assert!(line.contains("[CRISIS]"));
        assert!(line.contains("session=01234567 | escalation succeeded"));
        assert!(!line.contains("89abcdef"));
    }

    #[test]
    fn test_format_line_short_session_and_none() {
        let line = format_line(LogCategory::Chat, Some("abc"), "turn");
        assert!(line.contains("session=abc | turn"));

        let line = format_line(LogCategory::Storage, None, "opened");
        assert!(line.ends_with("[STORAGE] opened"));
    }

    #[test]
    fn test_cleanup_skips_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mindful-2099-01-01.log"), "fresh").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let deleted = cleanup_old_logs(dir.path(), 7).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("notes.txt").exists());
    }
}
