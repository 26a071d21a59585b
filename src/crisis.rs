//! Crisis detection and the safety-first escalation path.
//!
//! Detection is a pure keyword screen that runs before anything else on a
//! turn. When it fires, the turn never reaches the conversational model; it
//! asks for a schema-constrained crisis reply instead and falls back to a
//! static reply if that call fails for any reason. Either way the turn ends
//! with a resource and a friend-message draft in front of the user.

use crate::error::OracleError;
use crate::logging;
use crate::oracle::{self, Oracle};
use crate::prompts::{self, Template};
use crate::schemas;
use serde::{Deserialize, Serialize};

// ============ Detection ============

/// Phrases matched against the normalized utterance by plain substring
/// containment. "cant" and "no point" will also fire inside longer words.
pub const CRISIS_KEYWORDS: &[&str] = &[
    // Direct suicidal ideation
    "kill myself", "kll myself", "kms",
    "end my life", "ending my life",
    "take my own life",
    "want to die", "wanna die",
    "commit suicide", "suicidal thoughts", "suicidal",
    "i am going to kill myself",
    // Self-harm
    "hurt myself", "harm myself", "cut myself",
    // Hopelessness
    "no reason to live", "no point in living", "no point anymore",
    "cant go on",
    "dont see a point",
    "no point",
    "cant take it anymore",
    "cant do this anymore",
    "cant take it",
    "end it all",
    "give up on life", "give up",
    "everything is pointless",
    // Being a burden
    "better off without me", "burden to everyone", "i am a burden",
    // Wanting to disappear
    "want to disappear", "want to not exist",
    "dont want to be here anymore",
    "dont want to be here",
    "dont want to live",
];

/// Characters removed before matching
const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', '/', '#', '!', '$', '\'', '?', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`', '~', '(', ')',
];

/// Lowercase and drop the stripped punctuation set
pub fn normalize(utterance: &str) -> String {
    utterance
        .to_lowercase()
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect()
}

/// True when the utterance contains any catalog phrase after normalization
pub fn detect_crisis(utterance: &str) -> bool {
    let normalized = normalize(utterance);
    CRISIS_KEYWORDS.iter().any(|kw| normalized.contains(kw))
}

/// Every catalog phrase that fires for this utterance
pub fn matched_keywords(utterance: &str) -> Vec<&'static str> {
    let normalized = normalize(utterance);
    CRISIS_KEYWORDS
        .iter()
        .copied()
        .filter(|kw| normalized.contains(kw))
        .collect()
}

// ============ Resources ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisResource {
    pub name: String,
    pub description: String,
    pub contact: String,
    pub url: String,
}

impl CrisisResource {
    fn is_actionable(&self) -> bool {
        !self.name.trim().is_empty() && !self.contact.trim().is_empty()
    }
}

/// One entry of the resource list offered to the model
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogEntry {
    pub guidance: &'static str,
    pub name: &'static str,
    pub contact: &'static str,
    pub url: &'static str,
    pub description: &'static str,
}

pub const RESOURCE_CATALOG: [CatalogEntry; 3] = [
    CatalogEntry {
        guidance: "Primary/default for immediate danger in the US",
        name: "988 Suicide & Crisis Lifeline",
        contact: "Call or text 988",
        url: "https://988lifeline.org",
        description: "Free, confidential support from trained counselors, 24/7.",
    },
    CatalogEntry {
        guidance: "For text-based support",
        name: "Crisis Text Line",
        contact: "Text HOME to 741741",
        url: "https://www.crisistextline.org",
        description: "Text-based support for any crisis.",
    },
    CatalogEntry {
        guidance: "For LGBTQ+ youth",
        name: "The Trevor Project",
        contact: "Call 1-866-488-7386 or text START to 678-678",
        url: "https://www.thetrevorproject.org",
        description: "Crisis support for LGBTQ young people.",
    },
];

// ============ Fail-safe ============

pub const FAILSAFE_RESPONSE: &str =
    "I'm deeply concerned about what you're sharing. Please reach out for help immediately.";
pub const FAILSAFE_FRIEND_DRAFT: &str =
    "I'm having a really hard time right now and could use someone to talk to. Are you free?";

/// The static resource shown whenever the model cannot be used
pub fn failsafe_resource() -> CrisisResource {
    CrisisResource {
        name: "988 Suicide & Crisis Lifeline".to_string(),
        description: "Free, confidential support from trained counselors, 24/7.".to_string(),
        contact: "Call or Text 988".to_string(),
        url: "https://988lifeline.org".to_string(),
    }
}

// ============ Escalation ============

/// Shape the model is asked to return on a crisis turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisReply {
    pub is_crisis: bool,
    pub response: String,
    pub resource: CrisisResource,
    pub friend_message_draft: String,
}

impl CrisisReply {
    pub fn failsafe() -> Self {
        Self {
            is_crisis: true,
            response: FAILSAFE_RESPONSE.to_string(),
            resource: failsafe_resource(),
            friend_message_draft: FAILSAFE_FRIEND_DRAFT.to_string(),
        }
    }

    /// Reject replies that parse but would leave the user without something to act on
    fn validate(self) -> Result<Self, OracleError> {
        if !self.is_crisis {
            return Err(OracleError::Schema("is_crisis was false".to_string()));
        }
        if self.response.trim().is_empty() {
            return Err(OracleError::Schema("empty response".to_string()));
        }
        if !self.resource.is_actionable() {
            return Err(OracleError::Schema("resource lacks name or contact".to_string()));
        }
        if self.friend_message_draft.trim().is_empty() {
            return Err(OracleError::Schema("empty friend_message_draft".to_string()));
        }
        Ok(self)
    }
}

/// Where a crisis turn ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    Normal,
    CrisisDetected,
    EscalationSucceeded,
    EscalationFailed,
}

/// Terminal result of one escalation. Both arms carry a usable reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    Succeeded(CrisisReply),
    Failed { reply: CrisisReply, cause: OracleError },
}

impl Escalation {
    pub fn reply(&self) -> &CrisisReply {
        match self {
            Escalation::Succeeded(reply) => reply,
            Escalation::Failed { reply, .. } => reply,
        }
    }

    pub fn into_reply(self) -> CrisisReply {
        match self {
            Escalation::Succeeded(reply) => reply,
            Escalation::Failed { reply, .. } => reply,
        }
    }

    pub fn state(&self) -> TurnState {
        match self {
            Escalation::Succeeded(_) => TurnState::EscalationSucceeded,
            Escalation::Failed { .. } => TurnState::EscalationFailed,
        }
    }
}

#[derive(Serialize)]
struct CrisisPromptContext<'a> {
    utterance: &'a str,
    default_draft: &'a str,
    resources: &'a [CatalogEntry],
}

/// Render the crisis prompt for an utterance
pub fn crisis_prompt(utterance: &str) -> Result<String, minijinja::Error> {
    prompts::render(
        Template::Crisis,
        CrisisPromptContext {
            utterance,
            default_draft: FAILSAFE_FRIEND_DRAFT,
            resources: &RESOURCE_CATALOG,
        },
    )
}

async fn request_crisis_reply(oracle: &dyn Oracle, utterance: &str) -> Result<CrisisReply, OracleError> {
    let prompt = crisis_prompt(utterance)
        .map_err(|e| OracleError::Schema(format!("crisis prompt failed to render: {}", e)))?;
    let reply: CrisisReply = oracle::structured(oracle, &prompt, &schemas::crisis_response()).await?;
    reply.validate()
}

/// Run the escalation for a detected crisis turn: one oracle call, static fallback on any failure.
pub async fn escalate(oracle: &dyn Oracle, utterance: &str, session_id: Option<&str>) -> Escalation {
    logging::log_crisis(session_id, &format!(
        "Crisis detected ({} keyword hits), requesting escalation reply",
        matched_keywords(utterance).len()
    ));

    match request_crisis_reply(oracle, utterance).await {
        Ok(reply) => {
            logging::log_crisis(session_id, &format!("Escalation succeeded: resource={}", reply.resource.name));
            Escalation::Succeeded(reply)
        }
        Err(cause) => {
            logging::log_error(session_id, &format!("Crisis escalation failed, using fail-safe: {}", cause));
            Escalation::Failed {
                reply: CrisisReply::failsafe(),
                cause,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{Call, ScriptedOracle};
    use serde_json::json;

    fn trevor_reply() -> String {
        json!({
            "is_crisis": true,
            "response": "I hear you. Please reach out right now.",
            "resource": {
                "name": "The Trevor Project",
                "description": "Crisis support for LGBTQ young people.",
                "contact": "Call 1-866-488-7386 or text START to 678-678",
                "url": "https://www.thetrevorproject.org"
            },
            "friend_message_draft": "Hey, I'm struggling a lot. Can we talk?"
        })
        .to_string()
    }

    #[test]
    fn test_direct_match() {
        assert!(detect_crisis("I want to kill myself"));
        assert_eq!(matched_keywords("I want to kill myself"), vec!["kill myself"]);
    }

    #[test]
    fn test_non_crisis() {
        assert!(!detect_crisis("I had a good day at school"));
        assert!(matched_keywords("I had a good day at school").is_empty());
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        assert!(detect_crisis("I CAN'T GO ON."));
        assert!(detect_crisis("honestly... i don't want to be here!!"));
        assert!(detect_crisis("KILL MYSELF?!"));
        assert!(detect_crisis("(suicidal)"));
    }

    #[test]
    fn test_substring_matching_is_not_word_aware() {
        // Known false positive: "give up" inside an unrelated sentence
        assert!(detect_crisis("I'll never give up piano"));
        // Known miss: curly apostrophes are not in the stripped set
        assert!(!detect_crisis("I can’t go on"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Don't_Stop-Me (Now)!"), "dontstopme now");
    }

    #[test]
    fn test_every_keyword_detects_itself() {
        for kw in CRISIS_KEYWORDS {
            assert!(detect_crisis(&kw.to_uppercase()), "{} not detected", kw);
        }
    }

    #[test]
    fn test_crisis_prompt_lists_catalog_and_utterance() {
        let prompt = crisis_prompt("I want to end it all").unwrap();
        for entry in RESOURCE_CATALOG.iter() {
            assert!(prompt.contains(entry.name));
            assert!(prompt.contains(entry.contact));
        }
        assert!(prompt.contains("User's message: \"I want to end it all\""));
    }

    #[tokio::test]
    async fn test_escalation_uses_oracle_resource() {
        let oracle = ScriptedOracle::new().then_ok(trevor_reply());
        let escalation = escalate(&oracle, "I want to kill myself", None).await;

        assert_eq!(escalation.state(), TurnState::EscalationSucceeded);
        assert_eq!(escalation.reply().resource.name, "The Trevor Project");
        assert_eq!(oracle.call_count(), 1);
        assert!(matches!(&oracle.calls()[0], Call::Structured { prompt } if prompt.contains("CRISIS MODE")));
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        let oracle = ScriptedOracle::new().then_err(OracleError::Transport("offline".into()));
        let escalation = escalate(&oracle, "I want to kill myself", None).await;

        match &escalation {
            Escalation::Failed { reply, cause } => {
                assert_eq!(*cause, OracleError::Transport("offline".into()));
                assert_eq!(reply.resource.name, "988 Suicide & Crisis Lifeline");
                assert_eq!(reply.resource.contact, "Call or Text 988");
                assert_eq!(reply.friend_message_draft, FAILSAFE_FRIEND_DRAFT);
            }
            other => panic!("expected fail-safe, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_falls_back() {
        let oracle = ScriptedOracle::new().then_ok("{\"is_crisis\": true, \"response\": ");
        let escalation = escalate(&oracle, "no reason to live", None).await;

        assert_eq!(escalation.state(), TurnState::EscalationFailed);
        assert!(matches!(escalation, Escalation::Failed { cause: OracleError::Schema(_), .. }));
    }

    #[tokio::test]
    async fn test_schema_violations_fall_back() {
        let not_crisis = json!({
            "is_crisis": false,
            "response": "ok",
            "resource": {"name": "x", "description": "y", "contact": "z", "url": "u"},
            "friend_message_draft": "hi"
        });
        let no_contact = json!({
            "is_crisis": true,
            "response": "ok",
            "resource": {"name": "x", "description": "y", "contact": " ", "url": "u"},
            "friend_message_draft": "hi"
        });
        let missing_draft = json!({
            "is_crisis": true,
            "response": "ok",
            "resource": {"name": "x", "description": "y", "contact": "z", "url": "u"}
        });

        for body in [not_crisis, no_contact, missing_draft] {
            let oracle = ScriptedOracle::new().then_ok(body.to_string());
            let escalation = escalate(&oracle, "kms", None).await;
            assert_eq!(escalation.into_reply(), CrisisReply::failsafe());
        }
    }
}
