use crate::error::AppError;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024; // browser local storage budget
pub const MAX_ENTRIES_PER_WEEK: usize = 8;
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Everything the app needs to know before it opens the store or talks to the model.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub user_id: String,
    pub request_timeout_secs: u64,
    pub storage_quota: usize,
    pub enable_search: bool,
    pub max_entries_per_week: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            log_dir: data_dir.join("logs"),
            data_dir,
            user_id: "local".to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage_quota: DEFAULT_STORAGE_QUOTA,
            enable_search: true,
            max_entries_per_week: MAX_ENTRIES_PER_WEEK,
        }
    }
}

impl AppConfig {
    /// Resolve config from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve config from any key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();

        config.api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .filter(|k| !k.trim().is_empty());

        if let Some(model) = lookup("MINDFUL_MODEL") {
            config.model = model;
        }
        if let Some(base) = lookup("MINDFUL_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("MINDFUL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.log_dir = config.data_dir.join("logs");
        }
        if let Some(dir) = lookup("MINDFUL_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(user) = lookup("MINDFUL_USER") {
            config.user_id = user;
        }
        if let Some(raw) = lookup("MINDFUL_TIMEOUT_SECS") {
            config.request_timeout_secs = raw
                .parse()
                .map_err(|_| AppError::Config(format!("MINDFUL_TIMEOUT_SECS is not a number: {}", raw)))?;
        }
        if let Some(raw) = lookup("MINDFUL_STORAGE_QUOTA") {
            config.storage_quota = raw
                .parse()
                .map_err(|_| AppError::Config(format!("MINDFUL_STORAGE_QUOTA is not a number: {}", raw)))?;
        }
        if let Some(raw) = lookup("MINDFUL_SEARCH") {
            config.enable_search = parse_bool(&raw)
                .ok_or_else(|| AppError::Config(format!("MINDFUL_SEARCH is not a boolean: {}", raw)))?;
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("mindful.db")
    }
}

fn default_data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mindful-youth")
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_entries_per_week, 8);
        assert!(config.api_key.is_none());
        assert!(config.enable_search);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("API_KEY", "k-123"),
            ("MINDFUL_DATA_DIR", "/var/lib/mindful"),
            ("MINDFUL_USER", "sam"),
            ("MINDFUL_SEARCH", "off"),
            ("MINDFUL_API_BASE", "http://localhost:9000/"),
        ]))
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.log_dir, PathBuf::from("/var/lib/mindful/logs"));
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/mindful/mindful.db"));
        assert_eq!(config.user_id, "sam");
        assert!(!config.enable_search);
        assert_eq!(config.api_base, "http://localhost:9000");
    }

    #[test]
    fn test_gemini_key_wins_and_blank_is_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "primary"),
            ("API_KEY", "secondary"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));

        let config = AppConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_bad_numbers_are_config_errors() {
        let err = AppConfig::from_lookup(lookup_from(&[("MINDFUL_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
