//! One chat session with the companion.
//!
//! Every turn is screened for crisis language first. A crisis turn goes
//! down the escalation path and never reaches the conversational model;
//! everything else is either captured as a journal entry (journal mode) or
//! sent to the model with the running history.

use crate::crisis::{self, CrisisReply, CrisisResource, Escalation, TurnState};
use crate::error::AppError;
use crate::journal::{AIAnalysis, Journal, JournalEntry};
use crate::logging;
use crate::oracle::{Attachment, ChatTurn, GroundingSource, Oracle};
use crate::prompts::{self, JOURNAL_TOKEN};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub has_attachment: bool,
    pub is_crisis: bool,
    pub resource: Option<CrisisResource>,
    pub friend_message_draft: Option<String>,
    pub analysis: Option<AIAnalysis>,
    pub journal_title: Option<String>,
    pub is_journal_worthy: bool,
    pub original_user_message: Option<String>,
    pub sources: Vec<GroundingSource>,
    /// Apology shown after a failed call; replaced by the next one
    pub is_error: bool,
}

impl Message {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
            has_attachment: false,
            is_crisis: false,
            resource: None,
            friend_message_draft: None,
            analysis: None,
            journal_title: None,
            is_journal_worthy: false,
            original_user_message: None,
            sources: Vec::new(),
            is_error: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Sender::Ai, text)
    }

    /// Crisis turn message. Always carries a resource and a friend draft.
    pub fn crisis(reply: &CrisisReply) -> Self {
        Self {
            is_crisis: true,
            resource: Some(reply.resource.clone()),
            friend_message_draft: Some(reply.friend_message_draft.clone()),
            ..Self::ai(reply.response.clone())
        }
    }

    /// Analysis card for a saved entry; the text is intentionally empty
    pub fn journal_analysis(entry: &JournalEntry) -> Self {
        Self {
            id: entry.id.clone(),
            analysis: entry.analysis.clone(),
            journal_title: Some(entry.title.clone()),
            ..Self::ai("")
        }
    }

    fn apology(text: &'static str) -> Self {
        Self {
            is_error: true,
            ..Self::ai(text)
        }
    }
}

/// Result of one user action
#[derive(Debug)]
pub struct TurnOutcome {
    pub state: TurnState,
    /// The single AI message appended for the action
    pub message: Message,
    /// Failure recovered from while producing `message`
    pub error: Option<AppError>,
    /// Non-fatal notice to show alongside the message
    pub warning: Option<&'static str>,
}

/// Split a trailing journal token off a reply
pub fn strip_journal_token(text: &str) -> (String, bool) {
    match text.trim_end().strip_suffix(JOURNAL_TOKEN) {
        Some(shown) => (shown.trim().to_string(), true),
        None => (text.to_string(), false),
    }
}

pub struct Conversation {
    id: String,
    system: String,
    oracle: Arc<dyn Oracle>,
    journal: Journal,
    messages: Vec<Message>,
    /// Only completed non-crisis exchanges, raw model text
    history: Vec<ChatTurn>,
    turn_state: TurnState,
}

impl Conversation {
    pub fn new(oracle: Arc<dyn Oracle>, journal: Journal, search_enabled: bool) -> Result<Self, AppError> {
        let id = Uuid::new_v4().to_string();
        logging::log_chat(Some(id.as_str()), "Conversation started");
        Ok(Self {
            id,
            system: prompts::companion_system(search_enabled)?,
            oracle,
            journal,
            messages: Vec::new(),
            history: Vec::new(),
            turn_state: TurnState::Normal,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// State the last turn ended in
    pub fn turn_state(&self) -> &TurnState {
        &self.turn_state
    }

    fn push(&mut self, message: Message) -> Message {
        self.messages.push(message.clone());
        message
    }

    fn push_failure(&mut self, err: AppError) -> TurnOutcome {
        logging::log_error(Some(self.id.as_str()), &format!("Turn failed: {}", err));
        self.messages.retain(|m| !m.is_error);
        let message = self.push(Message::apology(err.user_message()));
        TurnOutcome {
            state: TurnState::Normal,
            message,
            error: Some(err),
            warning: None,
        }
    }

    /// Handle one user submission. Exactly one AI message is appended.
    ///
    /// Crisis screening runs before either mode. `&mut self` keeps a second
    /// submission from starting while this one is in flight.
    pub async fn send_message(
        &mut self,
        text: &str,
        attachment: Option<Attachment>,
        journal_mode: bool,
    ) -> Result<TurnOutcome, AppError> {
        let has_text = !text.trim().is_empty();
        if !has_text && (journal_mode || attachment.is_none()) {
            return Err(AppError::EmptyInput);
        }

        let mut user_message = Message::user(text);
        user_message.has_attachment = attachment.is_some() && !journal_mode;
        self.push(user_message);
        self.turn_state = TurnState::Normal;

        if crisis::detect_crisis(text) {
            return Ok(self.escalate(text).await);
        }

        if journal_mode {
            return Ok(self.capture(text).await);
        }

        logging::log_chat(Some(self.id.as_str()), &format!(
            "Sending turn ({} chars, attachment={}, history={})",
            text.len(),
            attachment.is_some(),
            self.history.len()
        ));

        let reply = match self
            .oracle
            .converse(&self.system, &self.history, text, attachment.as_ref())
            .await
        {
            Ok(reply) => reply,
            Err(e) => return Ok(self.push_failure(AppError::Oracle(e))),
        };

        self.history.push(ChatTurn::user(text));
        self.history.push(ChatTurn::model(reply.text.clone()));

        let (shown, worthy) = strip_journal_token(&reply.text);
        let mut message = Message::ai(shown);
        message.sources = reply.sources;
        if worthy {
            message.is_journal_worthy = true;
            message.original_user_message = Some(text.to_string());
        }
        logging::log_chat(Some(self.id.as_str()), &format!(
            "Reply received ({} chars, journal_worthy={}, sources={})",
            message.text.len(),
            worthy,
            message.sources.len()
        ));

        Ok(TurnOutcome {
            state: TurnState::Normal,
            message: self.push(message),
            error: None,
            warning: None,
        })
    }

    async fn escalate(&mut self, text: &str) -> TurnOutcome {
        self.turn_state = TurnState::CrisisDetected;
        let escalation = crisis::escalate(self.oracle.as_ref(), text, Some(self.id.as_str())).await;
        self.turn_state = escalation.state();

        let message = self.push(Message::crisis(escalation.reply()));
        let error = match escalation {
            Escalation::Succeeded(_) => None,
            Escalation::Failed { cause, .. } => Some(AppError::Oracle(cause)),
        };
        TurnOutcome {
            state: self.turn_state.clone(),
            message,
            error,
            warning: None,
        }
    }

    async fn capture(&mut self, text: &str) -> TurnOutcome {
        match self.journal.capture(text).await {
            Ok((entry, warning)) => {
                logging::log_chat(Some(self.id.as_str()), &format!("Captured journal entry {}", entry.id));
                TurnOutcome {
                    state: TurnState::Normal,
                    message: self.push(Message::journal_analysis(&entry)),
                    error: None,
                    warning,
                }
            }
            Err(e) => self.push_failure(e),
        }
    }

    /// Save the utterance behind a journal-worthy reply as an analysed entry.
    ///
    /// The reply's flag is cleared before the call, so a second request for
    /// the same message is `NotFound` rather than a duplicate entry.
    pub async fn save_journal_from_chat(&mut self, message_id: &str) -> Result<TurnOutcome, AppError> {
        let original = self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender == Sender::Ai && m.is_journal_worthy)
            .and_then(|m| {
                m.is_journal_worthy = false;
                m.original_user_message.clone()
            })
            .ok_or_else(|| AppError::NotFound(format!("journal-worthy message {}", message_id)))?;

        self.turn_state = TurnState::Normal;
        Ok(self.capture(&original).await)
    }
}
