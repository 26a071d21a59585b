//! Error types shared across the companion.
//!
//! Oracle failures are a closed set so the crisis escalation can match on
//! them exhaustively. Nothing in here is ever shown to the user verbatim;
//! use the wording constants at the bottom of this module for that.

use thiserror::Error;

/// Failure of a call to the hosted model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// Network failure, timeout, non-success status
    #[error("transport error: {0}")]
    Transport(String),

    /// Quota or rate limit reported by the service
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Reply arrived but did not match the requested shape
    #[error("schema error: {0}")]
    Schema(String),
}

impl OracleError {
    /// Classify a raw failure message, picking out quota and rate limit wording.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("quota") || lower.contains("rate limit") {
            OracleError::RateLimited(message)
        } else {
            OracleError::Transport(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }

    /// Calm, in-voice wording for a failed chat or journal turn.
    pub fn user_message(&self) -> &'static str {
        if self.is_rate_limited() {
            RATE_LIMIT_MESSAGE
        } else {
            APOLOGY_MESSAGE
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OracleError::Schema(err.to_string())
        } else {
            OracleError::from_message(err.to_string())
        }
    }
}

/// Failure of the local key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error returned by `MindfulApp` operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Journal analysis call failed; shown with the journal wording
    #[error("journal analysis failed: {0}")]
    Analysis(#[source] OracleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("nothing to send")]
    EmptyInput,

    #[error("no API key configured")]
    MissingApiKey,
}

impl AppError {
    /// Short in-voice wording for the front end
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Oracle(e) => e.user_message(),
            AppError::Analysis(_) => JOURNAL_ANALYSIS_FAILED,
            AppError::Store(StoreError::QuotaExceeded { .. }) => JOURNAL_SAVE_WARNING,
            AppError::EmptyInput => "Please write something first.",
            AppError::MissingApiKey => "Please add your API key to get started.",
            _ => APOLOGY_MESSAGE,
        }
    }
}

// ============ User-facing wording ============

pub const APOLOGY_MESSAGE: &str = "I'm sorry, something went wrong. Could you please try again?";
pub const RATE_LIMIT_MESSAGE: &str =
    "It looks like I'm getting a lot of requests right now. Please wait a moment before sending another message.";
pub const JOURNAL_ANALYSIS_FAILED: &str =
    "Sorry, I couldn't analyze this entry. Please check your connection or try again later.";
pub const JOURNAL_SAVE_WARNING: &str =
    "Could not save your journal entry. Your data may not be persisted.";
pub const JOURNAL_LOAD_FAILED: &str =
    "Could not load your journal entries. Please try again later.";
pub const SUMMARY_FAILED: &str = "Couldn't generate your weekly summary. Please try again later.";
pub const DRAFT_FAILED: &str =
    "Sorry, I couldn't generate a draft right now. Please check your connection or try again.";
