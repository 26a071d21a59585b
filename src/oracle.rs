//! The seam between the companion and the hosted model.
//!
//! Everything above this trait treats the model as an opaque oracle with two
//! call shapes: free-form chat and schema-constrained generation.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One message of oracle-side chat history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Model, text: text.into() }
    }
}

/// Image sent alongside a chat utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// Free-form chat reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub sources: Vec<GroundingSource>,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// Continue a conversation. `history` excludes the new utterance.
    async fn converse(
        &self,
        system: &str,
        history: &[ChatTurn],
        utterance: &str,
        attachment: Option<&Attachment>,
    ) -> Result<Reply, OracleError>;

    /// Single-shot free-form generation
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    /// Single-shot generation constrained to `schema`; returns the raw JSON text
    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String, OracleError>;
}

/// Strip the Markdown fences models like to wrap JSON in
pub fn clean_json(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Schema-constrained call parsed into `T`. Any parse failure is a `Schema` error.
pub async fn structured<T: DeserializeOwned>(
    oracle: &dyn Oracle,
    prompt: &str,
    schema: &Value,
) -> Result<T, OracleError> {
    let raw = oracle.generate_structured(prompt, schema).await?;
    let cleaned = clean_json(&raw);
    serde_json::from_str(cleaned).map_err(|e| {
        OracleError::Schema(format!(
            "{} (response was {} chars)",
            e,
            cleaned.len()
        ))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle used by the flow tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Converse { utterance: String, history_len: usize, has_attachment: bool },
        Generate { prompt: String },
        Structured { prompt: String },
    }

    /// Pops one scripted result per call, in order, regardless of call shape.
    /// An exhausted script answers with a transport error.
    #[derive(Default)]
    pub struct ScriptedOracle {
        script: Mutex<VecDeque<Result<String, OracleError>>>,
        sources: Mutex<Vec<GroundingSource>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedOracle {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn then_ok(self, text: impl Into<String>) -> Self {
            self.script.lock().unwrap().push_back(Ok(text.into()));
            self
        }

        pub fn then_err(self, err: OracleError) -> Self {
            self.script.lock().unwrap().push_back(Err(err));
            self
        }

        pub fn with_sources(self, sources: Vec<GroundingSource>) -> Self {
            *self.sources.lock().unwrap() = sources;
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn next(&self) -> Result<String, OracleError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Transport("script exhausted".to_string())))
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn converse(
            &self,
            _system: &str,
            history: &[ChatTurn],
            utterance: &str,
            attachment: Option<&Attachment>,
        ) -> Result<Reply, OracleError> {
            self.calls.lock().unwrap().push(Call::Converse {
                utterance: utterance.to_string(),
                history_len: history.len(),
                has_attachment: attachment.is_some(),
            });
            let text = self.next()?;
            Ok(Reply {
                text,
                sources: self.sources.lock().unwrap().clone(),
            })
        }

        async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
            self.calls.lock().unwrap().push(Call::Generate { prompt: prompt.to_string() });
            self.next()
        }

        async fn generate_structured(&self, prompt: &str, _schema: &Value) -> Result<String, OracleError> {
            self.calls.lock().unwrap().push(Call::Structured { prompt: prompt.to_string() });
            self.next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedOracle;
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Flag {
        ok: bool,
    }

    #[test]
    fn test_clean_json_strips_fences() {
        assert_eq!(clean_json("```json\n{\"ok\": true}\n```"), "{\"ok\": true}");
        assert_eq!(clean_json("```\n[]\n```"), "[]");
        assert_eq!(clean_json("  {}  "), "{}");
    }

    #[tokio::test]
    async fn test_structured_parses_fenced_reply() {
        let oracle = ScriptedOracle::new().then_ok("```json\n{\"ok\": true}\n```");
        let flag: Flag = structured(&oracle, "p", &serde_json::json!({})).await.unwrap();
        assert!(flag.ok);
    }

    #[tokio::test]
    async fn test_structured_malformed_is_schema_error() {
        let oracle = ScriptedOracle::new().then_ok("{\"ok\": ");
        let err = structured::<Flag>(&oracle, "p", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, OracleError::Schema(_)));
    }

    #[tokio::test]
    async fn test_structured_passes_transport_error_through() {
        let oracle = ScriptedOracle::new().then_err(OracleError::Transport("down".into()));
        let err = structured::<Flag>(&oracle, "p", &serde_json::json!({})).await.unwrap_err();
        assert_eq!(err, OracleError::Transport("down".into()));
    }
}
