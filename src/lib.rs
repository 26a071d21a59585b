pub mod chat;
pub mod config;
pub mod crisis;
pub mod dashboard;
pub mod error;
pub mod gemini;
pub mod journal;
pub mod logging;
pub mod oracle;
pub mod prompts;
pub mod schemas;
pub mod store;
pub mod writer;

use chat::Conversation;
use config::{AppConfig, LOG_RETENTION_DAYS};
use dashboard::Dashboard;
use error::AppError;
use gemini::GeminiClient;
use journal::Journal;
use oracle::Oracle;
use std::sync::Arc;
use store::Store;
use writer::MessageBrief;

/// Application state. Every operation reaches config, storage and the
/// model through this value; nothing is global except the log directory.
#[derive(Clone)]
pub struct MindfulApp {
    config: AppConfig,
    store: Store,
    oracle: Arc<dyn Oracle>,
    journal: Journal,
    dashboard: Dashboard,
}

// ============ App Initialization ============

/// Open the on-disk store named by the config
pub fn open_store(config: &AppConfig) -> Result<Store, AppError> {
    Ok(Store::open(&config.db_path(), config.storage_quota)?)
}

/// Check a key against the API and store it when accepted
pub async fn validate_and_save_api_key(config: &AppConfig, store: &Store, api_key: &str) -> Result<bool, AppError> {
    let client = GeminiClient::new(api_key, config)?;
    let valid = client.validate_api_key().await?;
    if valid {
        store.save_api_key(api_key)?;
        logging::log_storage("API key validated and saved");
    } else {
        logging::log_oracle("API key rejected");
    }
    Ok(valid)
}

impl MindfulApp {
    /// Set up logging, open the store and connect to the model.
    ///
    /// The key comes from the environment first, then from the store.
    pub fn init(config: AppConfig) -> Result<Self, AppError> {
        if let Err(e) = logging::init_logging(&config.log_dir) {
            eprintln!("Failed to initialize logging: {}", e);
        }
        match logging::cleanup_old_logs(&config.log_dir, LOG_RETENTION_DAYS) {
            Ok(0) => {}
            Ok(removed) => logging::log_storage(&format!("Removed {} old log files", removed)),
            Err(e) => logging::log_error(None, &format!("Log cleanup failed: {}", e)),
        }

        let store = open_store(&config)?;
        let api_key = match config.api_key.clone() {
            Some(key) => key,
            None => store.get_api_key()?.ok_or(AppError::MissingApiKey)?,
        };
        let oracle: Arc<dyn Oracle> = Arc::new(GeminiClient::new(&api_key, &config)?);

        logging::log_storage(&format!("App initialized for user {}", config.user_id));
        Ok(Self::with_oracle(config, store, oracle))
    }

    /// Assemble the app around an existing store and oracle
    pub fn with_oracle(config: AppConfig, store: Store, oracle: Arc<dyn Oracle>) -> Self {
        let journal = Journal::new(
            store.clone(),
            oracle.clone(),
            config.user_id.clone(),
            config.max_entries_per_week,
        );
        let dashboard = Dashboard::new(store.clone(), oracle.clone(), journal.clone(), config.user_id.clone());
        Self {
            config,
            store,
            oracle,
            journal,
            dashboard,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    /// Remove the stored key; the next start asks for one again
    pub fn forget_api_key(&self) -> Result<(), AppError> {
        self.store.clear_api_key()?;
        logging::log_storage("API key cleared");
        Ok(())
    }

    // ============ Chat ============

    pub fn new_conversation(&self) -> Result<Conversation, AppError> {
        Conversation::new(self.oracle.clone(), self.journal.clone(), self.config.enable_search)
    }

    // ============ Journal ============

    /// Plain-text report for a week of this user's journal
    pub fn weekly_report(&self, week: &str) -> Result<String, AppError> {
        let entries = self.journal.entries(week)?;
        Ok(journal::weekly_report(week, &entries)?)
    }

    // ============ Writer ============

    pub async fn draft_message(&self, brief: &MessageBrief) -> Result<String, AppError> {
        writer::draft_message(self.oracle.as_ref(), brief).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::ScriptedOracle;
    use std::collections::HashMap;

    fn temp_config(dir: &std::path::Path, api_key: Option<&str>) -> AppConfig {
        let mut vars = HashMap::new();
        vars.insert("MINDFUL_DATA_DIR", dir.to_string_lossy().to_string());
        if let Some(key) = api_key {
            vars.insert("GEMINI_API_KEY", key.to_string());
        }
        AppConfig::from_lookup(|k| vars.get(k).cloned()).unwrap()
    }

    fn app(oracle: ScriptedOracle) -> MindfulApp {
        let store = Store::open_in_memory(1024 * 1024).unwrap();
        MindfulApp::with_oracle(AppConfig::default(), store, Arc::new(oracle))
    }

    #[test]
    fn test_init_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let result = MindfulApp::init(temp_config(dir.path(), None));
        assert!(matches!(result, Err(AppError::MissingApiKey)));
    }

    #[test]
    fn test_init_uses_stored_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path(), None);
        open_store(&config).unwrap().save_api_key("stored-key").unwrap();

        let app = MindfulApp::init(config).unwrap();
        assert_eq!(app.store().get_api_key().unwrap().as_deref(), Some("stored-key"));
    }

    #[test]
    fn test_forget_api_key_requires_setup_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(dir.path(), None);
        open_store(&config).unwrap().save_api_key("stored-key").unwrap();

        MindfulApp::init(config.clone()).unwrap().forget_api_key().unwrap();
        assert!(matches!(MindfulApp::init(config), Err(AppError::MissingApiKey)));
    }

    #[test]
    fn test_init_with_env_key() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MindfulApp::init(temp_config(dir.path(), Some("env-key"))).is_ok());
    }

    #[tokio::test]
    async fn test_crisis_turn_through_app() {
        let app = app(ScriptedOracle::new().then_err(error::OracleError::Transport("offline".into())));
        let mut conversation = app.new_conversation().unwrap();

        let outcome = conversation.send_message("I want to kill myself", None, false).await.unwrap();
        assert!(outcome.message.is_crisis);
        assert!(outcome.message.resource.is_some());
        assert!(outcome.message.friend_message_draft.is_some());
    }

    #[tokio::test]
    async fn test_journal_report_through_app() {
        let app = app(ScriptedOracle::new());
        let week = journal::current_week_id();
        app.journal().add_entry(&week, "First", "Hello journal").unwrap();

        let report = app.weekly_report(&week).unwrap();
        assert!(report.contains("First"));
        assert!(report.contains("Hello journal"));
    }

    #[tokio::test]
    async fn test_draft_through_app() {
        let app = app(ScriptedOracle::new().then_ok("Hi, can we talk?"));
        let draft = app.draft_message(&MessageBrief::default()).await.unwrap();
        assert_eq!(draft, "Hi, can we talk?");
    }
}
