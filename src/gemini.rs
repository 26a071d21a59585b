use crate::config::AppConfig;
use crate::error::OracleError;
use crate::logging;
use crate::oracle::{Attachment, ChatRole, ChatTurn, GroundingSource, Oracle, Reply};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const JSON_MIME: &str = "application/json";

// ============ Wire types ============

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
    status: Option<String>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(|r| r.to_string()),
        parts: vec![Part {
            text: Some(text.to_string()),
            inline_data: None,
        }],
    }
}

fn role_name(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Model => "model",
    }
}

// ============ Client ============

pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    enable_search: bool,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &AppConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            api_base: config.api_base.clone(),
            model: config.model.clone(),
            enable_search: config.enable_search,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn send(&self, request: &GenerateContentRequest) -> Result<Reply, OracleError> {
        let response = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", JSON_MIME)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let err = classify_failure(status, &error_text);
            logging::log_oracle(&format!("generateContent failed: {}", err));
            return Err(err);
        }

        let body: GenerateContentResponse = response.json().await?;
        extract_reply(body)
    }

    /// Validate the API key with a minimal request. Rejected keys are `Ok(false)`.
    pub async fn validate_api_key(&self) -> Result<bool, OracleError> {
        let request = GenerateContentRequest {
            contents: vec![text_content(Some("user"), "Say 'ok'")],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: None,
        };

        let response = self.client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(true);
        }
        if matches!(status, 400 | 401 | 403) {
            return Ok(false);
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &error_text))
    }
}

/// Map a non-success HTTP answer onto the oracle error taxonomy
fn classify_failure(status: u16, body: &str) -> OracleError {
    let detail = match serde_json::from_str::<GeminiError>(body) {
        Ok(parsed) => match parsed.error.status {
            Some(code) => format!("{} - {}", code, parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body.to_string(),
    };
    let message = format!("Gemini API error ({}): {}", status, detail);

    if status == 429 {
        OracleError::RateLimited(message)
    } else {
        OracleError::from_message(message)
    }
}

/// Pull text and grounding sources out of the first candidate
fn extract_reply(body: GenerateContentResponse) -> Result<Reply, OracleError> {
    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Schema("No candidates in Gemini response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OracleError::Schema("No text response from Gemini".to_string()));
    }

    let sources = candidate
        .grounding_metadata
        .map(|m| {
            m.grounding_chunks
                .into_iter()
                .filter_map(|chunk| chunk.web)
                .filter_map(|web| {
                    let uri = web.uri?;
                    let title = web.title.unwrap_or_else(|| uri.clone());
                    Some(GroundingSource { uri, title })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Reply { text, sources })
}

#[async_trait]
impl Oracle for GeminiClient {
    async fn converse(
        &self,
        system: &str,
        history: &[ChatTurn],
        utterance: &str,
        attachment: Option<&Attachment>,
    ) -> Result<Reply, OracleError> {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| text_content(Some(role_name(turn.role)), &turn.text))
            .collect();

        let mut parts = Vec::new();
        if let Some(image) = attachment {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(&image.data),
                }),
            });
        }
        if !utterance.is_empty() {
            parts.push(Part {
                text: Some(utterance.to_string()),
                inline_data: None,
            });
        }
        contents.push(Content {
            role: Some("user".to_string()),
            parts,
        });

        let tools = if self.enable_search {
            vec![Tool { google_search: GoogleSearch {} }]
        } else {
            Vec::new()
        };

        logging::log_oracle(&format!(
            "chat call: model={}, history={}, attachment={}",
            self.model,
            history.len(),
            attachment.is_some()
        ));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(text_content(None, system)),
            tools,
            generation_config: None,
        };

        self.send(&request).await
    }

    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        logging::log_oracle(&format!("generate call: model={}", self.model));

        let request = GenerateContentRequest {
            contents: vec![text_content(Some("user"), prompt)],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: None,
        };

        Ok(self.send(&request).await?.text)
    }

    async fn generate_structured(&self, prompt: &str, schema: &Value) -> Result<String, OracleError> {
        logging::log_oracle(&format!("structured call: model={}", self.model));

        let request = GenerateContentRequest {
            contents: vec![text_content(Some("user"), prompt)],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_mime_type: Some(JSON_MIME.to_string()),
                response_schema: Some(schema.clone()),
            }),
        };

        Ok(self.send(&request).await?.text)
    }
}
